//! Errors raised by the shared infrastructure
//!
//! Each failure that comes from configuration, the network layer or a timeout
//! carries an `ErrorContext`, so the id printed to the user can be found in
//! the logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type TottoriResult<T> = Result<T, TottoriError>;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Where and when an error happened, plus hints for the user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub error_id: String,
    pub timestamp: DateTime<Utc>,
    /// Module that raised the error, e.g. `config` or `http_client`
    pub component: String,
    pub operation: Option<String>,
    pub suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.suggestions.push(suggestion.to_string());
        self
    }
}

#[derive(Error, Debug)]
pub enum TottoriError {
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxedSource>,
        context: ErrorContext,
    },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<BoxedSource>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("{operation} did not finish within {duration_ms} ms")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TottoriError {
    /// Failure while reading, writing or checking the configuration file
    pub fn config(
        message: impl Into<String>,
        source: Option<BoxedSource>,
        operation: &str,
        suggestion: &str,
    ) -> Self {
        TottoriError::Config {
            message: message.into(),
            source,
            context: ErrorContext::new("config")
                .with_operation(operation)
                .with_suggestion(suggestion),
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            TottoriError::Config { context, .. }
            | TottoriError::Network { context, .. }
            | TottoriError::Validation { context, .. }
            | TottoriError::Timeout { context, .. } => Some(context),
            TottoriError::Io(_) | TottoriError::Serialization(_) => None,
        }
    }

    /// Hints for the user, empty for plain IO and serialization errors
    pub fn suggestions(&self) -> &[String] {
        self.context()
            .map(|c| c.suggestions.as_slice())
            .unwrap_or(&[])
    }

    /// Log the error. Network trouble and timeouts are warnings, since the
    /// next attempt may well succeed.
    pub fn log(&self) {
        let error_id = self.context().map(|c| c.error_id.as_str());
        let component = self.context().map(|c| c.component.as_str());

        match self {
            TottoriError::Network { .. } | TottoriError::Timeout { .. } => {
                warn!(?error_id, ?component, error = %self, "Transient failure");
            }
            _ => {
                error!(?error_id, ?component, error = %self, "Failure");
            }
        }
    }
}

/// `TottoriError::Validation` for a named field
#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::TottoriError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}
