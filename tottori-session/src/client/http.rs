//! HTTP implementation of the Auth Service client

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use tottori_core::{AuthServiceConfig, ErrorContext, TottoriError, TottoriResult};
use tracing::{debug, info};

use super::{
    AuthService, LoginResponse, MessageResponse, RefreshResponse, ServiceError, ServiceResult,
};
use crate::types::{
    Credentials, PasswordChange, ProfileUpdate, Registration, RemoteSession, UserProfile,
};

/// Auth Service client over HTTP
pub struct HttpAuthClient {
    client: reqwest::Client,
    config: AuthServiceConfig,
}

impl HttpAuthClient {
    /// Create a new client
    pub fn new(config: AuthServiceConfig) -> TottoriResult<Self> {
        let client = create_http_client(&config)?;

        info!("Created auth service client for {}", config.base_url);

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        self.config.endpoint(path)
    }

    /// Send a request and decode a JSON body from a 2xx response
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> ServiceResult<T> {
        let body = self.send(request, operation).await?;

        serde_json::from_slice(&body).map_err(|e| {
            ServiceError::decode(format!("{} returned an unreadable body: {}", operation, e))
        })
    }

    /// Send a request, returning the raw body of a 2xx response
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> ServiceResult<Vec<u8>> {
        let response = request.send().await.map_err(|e| ServiceError::Transport {
            message: format!("Failed to reach auth service for {}: {}", operation, e),
            source: Some(Box::new(e)),
        })?;

        let status = response.status();
        debug!(operation = operation, status = status.as_u16(), "Auth service responded");

        if !status.is_success() {
            return Err(handle_response_error(response).await);
        }

        let body = response.bytes().await.map_err(|e| ServiceError::Transport {
            message: format!("Failed to read response body for {}: {}", operation, e),
            source: Some(Box::new(e)),
        })?;

        Ok(body.to_vec())
    }
}

#[async_trait]
impl AuthService for HttpAuthClient {
    async fn login(&self, credentials: &Credentials) -> ServiceResult<LoginResponse> {
        let request = self.client.post(self.url("/login")).json(credentials);
        self.send_json(request, "login").await
    }

    async fn register(&self, registration: &Registration) -> ServiceResult<MessageResponse> {
        let request = self.client.post(self.url("/register")).json(registration);
        self.send_json(request, "register").await
    }

    async fn logout(&self, access_token: &str) -> ServiceResult<()> {
        let request = self
            .client
            .post(self.url("/logout"))
            .bearer_auth(access_token);
        self.send(request, "logout").await.map(|_| ())
    }

    async fn refresh(&self, refresh_token: &str) -> ServiceResult<RefreshResponse> {
        let request = self
            .client
            .post(self.url("/refresh"))
            .json(&json!({ "refresh_token": refresh_token }));
        self.send_json(request, "refresh").await
    }

    async fn current_user(&self, access_token: &str) -> ServiceResult<UserProfile> {
        let request = self.client.get(self.url("/me")).bearer_auth(access_token);
        self.send_json(request, "current_user").await
    }

    async fn update_profile(
        &self,
        access_token: &str,
        update: &ProfileUpdate,
    ) -> ServiceResult<UserProfile> {
        let request = self
            .client
            .put(self.url("/me"))
            .bearer_auth(access_token)
            .json(update);
        self.send_json(request, "update_profile").await
    }

    async fn change_password(
        &self,
        access_token: &str,
        change: &PasswordChange,
    ) -> ServiceResult<MessageResponse> {
        let request = self
            .client
            .post(self.url("/change-password"))
            .bearer_auth(access_token)
            .json(change);
        self.send_json(request, "change_password").await
    }

    async fn request_password_reset(&self, email: &str) -> ServiceResult<MessageResponse> {
        let request = self
            .client
            .post(self.url("/request-password-reset"))
            .json(&json!({ "email": email }));
        self.send_json(request, "request_password_reset").await
    }

    async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> ServiceResult<MessageResponse> {
        let request = self
            .client
            .post(self.url("/reset-password"))
            .json(&json!({ "token": token, "new_password": new_password }));
        self.send_json(request, "reset_password").await
    }

    async fn verify_email(&self, token: &str) -> ServiceResult<MessageResponse> {
        let request = self
            .client
            .post(self.url("/verify-email"))
            .json(&json!({ "token": token }));
        self.send_json(request, "verify_email").await
    }

    async fn list_sessions(&self, access_token: &str) -> ServiceResult<Vec<RemoteSession>> {
        let request = self
            .client
            .get(self.url("/sessions"))
            .bearer_auth(access_token);
        self.send_json(request, "list_sessions").await
    }

    async fn terminate_session(
        &self,
        access_token: &str,
        session_id: i64,
    ) -> ServiceResult<MessageResponse> {
        let request = self
            .client
            .delete(self.url(&format!("/sessions/{}", session_id)))
            .bearer_auth(access_token);
        self.send_json(request, "terminate_session").await
    }
}

/// Create the HTTP client with timeout and user agent from configuration
pub(crate) fn create_http_client(config: &AuthServiceConfig) -> TottoriResult<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();

    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_str(&config.user_agent).map_err(|e| {
            TottoriError::Config {
                message: format!("Invalid user agent: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("http_client").with_operation("create_client"),
            }
        })?,
    );

    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static("application/json"),
    );

    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_seconds))
        .default_headers(headers)
        .build()
        .map_err(|e| TottoriError::Network {
            message: format!("Failed to create HTTP client: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_client").with_operation("create_client"),
        })
}

/// Turn a non-2xx response into a rejection carrying the server's `detail`
pub(crate) async fn handle_response_error(response: reqwest::Response) -> ServiceError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    ServiceError::Rejected {
        status,
        detail: extract_detail(&body),
    }
}

/// `detail` is only used when it is a plain string; validation errors carry a
/// list there and get the generic message instead.
fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("detail")
        .and_then(|detail| detail.as_str())
        .filter(|detail| !detail.trim().is_empty())
        .map(str::to_string)
}
