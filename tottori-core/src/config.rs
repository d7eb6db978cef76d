//! Configuration management

use crate::error::{TottoriError, TottoriResult};
use crate::types::{AuthServiceConfig, Locale, StorageConfig, TottoriConfig};

use std::path::{Path, PathBuf};

impl Default for AuthServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_prefix: "/api/v1/auth".to_string(),
            timeout_seconds: 30,
            user_agent: format!("tottori-dashboard/{}", env!("CARGO_PKG_VERSION")),
            refresh_leeway_seconds: 60,
            logout_timeout_ms: 5000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            token_file: "~/.tottori/session.json".to_string(),
        }
    }
}

impl Default for TottoriConfig {
    fn default() -> Self {
        Self {
            locale: Locale::Ja,
            auth: AuthServiceConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl AuthServiceConfig {
    /// Full URL of an authentication endpoint, e.g. `endpoint("/login")`
    pub fn endpoint(&self, path: &str) -> String {
        let mut url = self.base_url.trim_end_matches('/').to_string();
        let segments = [
            self.api_prefix.trim_matches('/'),
            path.trim_start_matches('/'),
        ];
        for segment in segments.into_iter().filter(|s| !s.is_empty()) {
            url.push('/');
            url.push_str(segment);
        }
        url
    }
}

impl StorageConfig {
    /// Token file path with a leading `~` expanded to the home directory
    pub fn token_file_path(&self) -> PathBuf {
        expand_home(&self.token_file)
    }
}

/// Default location of the configuration file (`~/.tottori/config.toml`)
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tottori")
        .join("config.toml")
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}

impl TottoriConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> TottoriResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TottoriError::config(
                format!("Failed to read config file: {}", e),
                Some(Box::new(e)),
                "read_file",
                "Check if the config file exists and is readable",
            )
        })?;

        toml::from_str(&content).map_err(|e| {
            TottoriError::config(
                format!("Failed to parse config: {}", e),
                Some(Box::new(e)),
                "parse_toml",
                "Check TOML syntax in config file",
            )
        })
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> TottoriResult<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating its directory
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> TottoriResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            TottoriError::config(
                format!("Failed to serialize config: {}", e),
                Some(Box::new(e)),
                "serialize_toml",
                "Report this configuration as a bug",
            )
        })?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content).map_err(|e| {
            TottoriError::config(
                format!("Failed to write config file: {}", e),
                Some(Box::new(e)),
                "write_file",
                "Check if the directory exists and is writable",
            )
        })
    }

    pub fn validate(&self) -> TottoriResult<()> {
        let url = url::Url::parse(&self.auth.base_url).map_err(|e| {
            TottoriError::config(
                format!("Invalid auth.base_url '{}': {}", self.auth.base_url, e),
                Some(Box::new(e)),
                "validate",
                "Use an absolute URL such as http://localhost:8000",
            )
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(TottoriError::config(
                format!("Unsupported scheme in auth.base_url: {}", url.scheme()),
                None,
                "validate",
                "Use http or https",
            ));
        }

        if self.auth.timeout_seconds == 0 {
            return Err(crate::validation_error!(
                "auth.timeout_seconds must be greater than 0",
                "auth.timeout_seconds",
                "config"
            ));
        }

        if self.storage.token_file.trim().is_empty() {
            return Err(crate::validation_error!(
                "storage.token_file must not be empty",
                "storage.token_file",
                "config"
            ));
        }

        Ok(())
    }
}
