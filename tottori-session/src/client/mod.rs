//! Auth Service client
//!
//! The session manager only talks to the Auth Service through the
//! [`AuthService`] trait. [`HttpAuthClient`] implements it over HTTP with
//! reqwest; tests substitute scripted implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{
    Credentials, PasswordChange, ProfileUpdate, Registration, RemoteSession, UserProfile,
};

pub mod http;

pub use http::HttpAuthClient;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failure talking to the Auth Service
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The service answered with a non-2xx status
    #[error("Auth service returned HTTP {status}: {}", .detail.as_deref().unwrap_or("no detail"))]
    Rejected { status: u16, detail: Option<String> },

    /// The request never produced a response
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A 2xx response whose body could not be decoded
    #[error("Unexpected response from auth service: {message}")]
    Decode { message: String },
}

impl ServiceError {
    pub fn rejected(status: u16, detail: Option<String>) -> Self {
        Self::Rejected { status, detail }
    }

    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// HTTP status for rejections
    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The access token was refused (HTTP 401)
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Server-supplied message, if any
    pub fn detail(&self) -> Option<&str> {
        match self {
            ServiceError::Rejected { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

/// Successful login response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Access token lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<f64>,
    pub user: UserProfile,
}

/// Successful refresh response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<f64>,
}

/// Generic `{message}` acknowledgement
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Operations the session manager needs from the Auth Service
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Exchange credentials for tokens and the user's profile
    async fn login(&self, credentials: &Credentials) -> ServiceResult<LoginResponse>;

    /// Create an account; does not sign in
    async fn register(&self, registration: &Registration) -> ServiceResult<MessageResponse>;

    /// Invalidate the server-side session of `access_token`
    async fn logout(&self, access_token: &str) -> ServiceResult<()>;

    /// Obtain a new access token
    async fn refresh(&self, refresh_token: &str) -> ServiceResult<RefreshResponse>;

    /// Profile of the token's owner; 401 when the token is refused
    async fn current_user(&self, access_token: &str) -> ServiceResult<UserProfile>;

    async fn update_profile(
        &self,
        access_token: &str,
        update: &ProfileUpdate,
    ) -> ServiceResult<UserProfile>;

    async fn change_password(
        &self,
        access_token: &str,
        change: &PasswordChange,
    ) -> ServiceResult<MessageResponse>;

    async fn request_password_reset(&self, email: &str) -> ServiceResult<MessageResponse>;

    async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> ServiceResult<MessageResponse>;

    async fn verify_email(&self, token: &str) -> ServiceResult<MessageResponse>;

    /// Server-side login sessions of the token's owner
    async fn list_sessions(&self, access_token: &str) -> ServiceResult<Vec<RemoteSession>>;

    async fn terminate_session(
        &self,
        access_token: &str,
        session_id: i64,
    ) -> ServiceResult<MessageResponse>;
}
