//! Tottori Session - client-side session and authorization management
//!
//! This crate owns the dashboard's authentication state on the client:
//!
//! - Token lifecycle: login, refresh, logout and recovery from expired tokens
//! - A durable mirror of the access and refresh tokens
//! - Role-derived authorization flags consumed by route guards and views
//!
//! ## Architecture
//!
//! - **Client** ([`client`]): the `AuthService` seam and its reqwest implementation
//! - **Session** ([`session`]): the `SessionManager`, session state and token storage
//! - **Auth** ([`auth`]): roles and the access flags derived from them

pub mod auth;
pub mod client;
pub mod messages;
pub mod session;
pub mod types;

pub use auth::{AccessFlags, AccessRequirement, UserRole};
pub use client::{AuthService, HttpAuthClient, ServiceError, ServiceResult};
pub use messages::Operation;
pub use session::{
    FileTokenStore, MemoryTokenStore, SessionManager, SessionPhase, SessionSettings,
    SessionSnapshot, StoredTokens, TokenStore,
};
pub use types::{
    Credentials, PasswordChange, ProfileUpdate, Registration, RemoteSession, UserProfile,
};

/// Session-level error type
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Authentication required for {operation}")]
    NotAuthenticated { operation: &'static str },

    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Session changed while {operation} was in flight")]
    Superseded { operation: &'static str },

    #[error("Token refresh failed: {0}")]
    RefreshFailed(#[source] ServiceError),

    #[error("Auth service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    /// Create a storage error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage error with source
    pub fn storage_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Whether this is a precondition failure detected before any network call
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            SessionError::NotAuthenticated { .. } | SessionError::MissingRefreshToken
        )
    }
}

/// Result of an operation whose expected failures are reported as values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Success { message: Option<String> },
    Failure { message: String },
}

impl AuthOutcome {
    pub fn success() -> Self {
        Self::Success { message: None }
    }

    pub fn success_with(message: Option<String>) -> Self {
        Self::Success { message }
    }

    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success { .. })
    }

    /// Server message on success, error message on failure
    pub fn message(&self) -> Option<&str> {
        match self {
            AuthOutcome::Success { message } => message.as_deref(),
            AuthOutcome::Failure { message } => Some(message),
        }
    }
}
