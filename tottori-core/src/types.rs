//! Core data type definitions

use serde::{Deserialize, Serialize};

/// Top-level dashboard client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TottoriConfig {
    /// Language used for fallback error messages
    #[serde(default)]
    pub locale: Locale,
    /// Auth Service connection settings
    #[serde(default)]
    pub auth: AuthServiceConfig,
    /// Durable token mirror settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Auth Service connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthServiceConfig {
    /// Scheme, host and port of the dashboard backend
    pub base_url: String,
    /// Path prefix of the authentication endpoints
    pub api_prefix: String,
    /// Request timeout in seconds, applied by the HTTP transport
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
    /// Refresh the access token when it expires within this many seconds
    pub refresh_leeway_seconds: u64,
    /// Upper bound for the best-effort logout notification
    pub logout_timeout_ms: u64,
}

/// Durable token mirror settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// File holding the `token` and `refreshToken` slots
    pub token_file: String,
}

/// Supported message locales
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Ja,
    En,
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locale::Ja => write!(f, "ja"),
            Locale::En => write!(f, "en"),
        }
    }
}

impl std::str::FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ja" => Ok(Locale::Ja),
            "en" => Ok(Locale::En),
            _ => Err(format!("Unknown locale: {}", s)),
        }
    }
}
