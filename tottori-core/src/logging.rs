//! Logging setup
//!
//! The CLI installs one `tracing` subscriber at startup; the library crates
//! only emit events. Output goes to stderr so it never mixes with command
//! output on stdout.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_subscriber::{
    filter::Directive,
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
    /// Print source file and line with each event
    pub include_location: bool,
    /// Append to this file instead of writing to stderr
    pub log_file: Option<PathBuf>,
    /// Emit an event with the elapsed time when a span closes
    pub span_timings: bool,
    /// Extra `EnvFilter` directives such as `tottori_session=debug`
    pub directives: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
            include_location: false,
            log_file: None,
            span_timings: false,
            directives: Vec::new(),
        }
    }
}

impl LoggingConfig {
    /// Preset behind `--verbose`: debug events from the Tottori crates
    pub fn verbose() -> Self {
        Self {
            level: "info".to_string(),
            include_location: true,
            span_timings: true,
            directives: ["tottori_core", "tottori_session", "tottori"]
                .iter()
                .map(|target| format!("{}=debug", target))
                .collect(),
            ..Self::default()
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = config.directives.iter().try_fold(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level)),
        |filter, directive| directive.parse::<Directive>().map(|d| filter.add_directive(d)),
    )?;

    let writer = match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let layer = fmt::layer()
        .with_writer(writer)
        .with_span_events(if config.span_timings {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry.with(layer.json()).try_init()?,
        LogFormat::Pretty => registry.with(layer.pretty()).try_init()?,
        LogFormat::Compact => registry.with(layer.compact()).try_init()?,
    }

    Ok(())
}

pub mod performance {
    use std::future::Future;
    use std::time::Instant;
    use tracing::{info_span, Instrument};

    /// Run `future` inside an `operation` span and log how long it took
    pub async fn measure_async<F, T>(operation_name: &str, future: F) -> T
    where
        F: Future<Output = T>,
    {
        let started = Instant::now();
        let result = future
            .instrument(info_span!("operation", operation = operation_name))
            .await;

        tracing::debug!(
            target: "performance",
            operation = operation_name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Operation timed"
        );

        result
    }
}

/// `info!` event marking the start of a named operation, with optional fields
#[macro_export]
macro_rules! log_operation_start {
    ($operation:expr $(, $($field:tt)+)?) => {
        ::tracing::info!(operation = $operation, $($($field)+,)? "Starting operation")
    };
}

#[macro_export]
macro_rules! log_operation_success {
    ($operation:expr $(, $($field:tt)+)?) => {
        ::tracing::info!(operation = $operation, $($($field)+,)? "Operation completed")
    };
}

/// Failures are warnings: the caller decides whether they matter
#[macro_export]
macro_rules! log_operation_error {
    ($operation:expr, $error:expr $(, $($field:tt)+)?) => {
        ::tracing::warn!(
            operation = $operation,
            error = %$error,
            $($($field)+,)?
            "Operation failed"
        )
    };
}
