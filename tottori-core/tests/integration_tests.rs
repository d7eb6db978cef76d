//! Integration tests for tottori-core infrastructure

use tottori_core::{
    init_logging, performance, validation_error, with_timeout, Locale, LogFormat,
    LoggingConfig, TottoriConfig, TottoriError,
};

#[test]
fn test_error_macros() {
    let error = validation_error!("email is empty", "email", "cli");
    match &error {
        TottoriError::Validation {
            message,
            field,
            context,
        } => {
            assert_eq!(message, "email is empty");
            assert_eq!(field.as_deref(), Some("email"));
            assert_eq!(context.component, "cli");
        }
        _ => panic!("Expected Validation error"),
    }

    // Logging an error must not panic without a subscriber
    error.log();

    assert_eq!(error.suggestions().len(), 1);
}

#[test]
fn test_config_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = TottoriConfig::default();
    config.locale = Locale::En;
    config.auth.base_url = "https://stats.pref.example.jp".to_string();
    config.auth.refresh_leeway_seconds = 120;
    config.save_to_file(&path).unwrap();

    let loaded = TottoriConfig::from_file(&path).unwrap();
    assert_eq!(loaded.locale, Locale::En);
    assert_eq!(loaded.auth.base_url, "https://stats.pref.example.jp");
    assert_eq!(loaded.auth.refresh_leeway_seconds, 120);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_load_or_default_without_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = TottoriConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.locale, Locale::Ja);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[auth\nbase_url = 1").unwrap();

    let err = TottoriConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, TottoriError::Config { source: Some(_), .. }));
    assert_eq!(
        err.context().and_then(|c| c.operation.as_deref()),
        Some("parse_toml")
    );
    assert!(!err.suggestions().is_empty());
}

#[test]
fn test_logging_initialization() {
    let config = LoggingConfig {
        level: "debug".to_string(),
        format: LogFormat::Compact,
        directives: vec!["tottori_core=debug".to_string()],
        ..LoggingConfig::default()
    };

    // A global subscriber can only be installed once per process, so a second
    // attempt must report an error instead of panicking.
    let first = init_logging(&config);
    let second = init_logging(&config);
    assert!(first.is_ok());
    assert!(second.is_err());
}

#[test]
fn test_measured_operation_under_timeout() {
    let value = tokio_test::block_on(performance::measure_async(
        "measured",
        with_timeout(async { 42 }, 1000, "measured"),
    ))
    .unwrap();
    assert_eq!(value, 42);

    let timed_out = tokio_test::block_on(with_timeout(
        std::future::pending::<()>(),
        10,
        "never",
    ));
    let error = timed_out.unwrap_err();
    assert!(matches!(error, TottoriError::Timeout { duration_ms: 10, .. }));
    assert!(!error.suggestions().is_empty());
}
