//! Session Manager - single writer of the client session
//!
//! Every operation reads what it needs from the session, releases the lock,
//! talks to the Auth Service and then applies its result in one short
//! critical section together with the token mirror write. Writes that land
//! after the session was cleared or replaced are discarded, so a late
//! response can never bring a logged-out session back.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tokio::sync::watch;
use tottori_core::{
    log_operation_error, log_operation_start, log_operation_success, with_timeout, Locale,
    TottoriConfig, TottoriResult,
};
use tracing::{debug, info, warn};

use super::state::{expiry_from, non_empty, Session, SessionPhase, SessionSnapshot};
use super::storage::{FileTokenStore, StoredTokens, TokenStore};
use crate::auth::AccessFlags;
use crate::client::{AuthService, HttpAuthClient, MessageResponse, ServiceError, ServiceResult};
use crate::messages::Operation;
use crate::types::{
    Credentials, PasswordChange, ProfileUpdate, Registration, RemoteSession, UserProfile,
};
use crate::{AuthOutcome, SessionError, SessionResult};

/// A refused access token is refreshed and the call retried at most this often
const MAX_AUTH_RETRIES: u32 = 1;

/// Session manager settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Language of fallback error messages
    pub locale: Locale,
    /// Refresh proactively when the access token expires within this window
    pub refresh_leeway_seconds: u64,
    /// Upper bound for the logout notification
    pub logout_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            locale: Locale::Ja,
            refresh_leeway_seconds: 60,
            logout_timeout_ms: 5000,
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &TottoriConfig) -> Self {
        Self {
            locale: config.locale,
            refresh_leeway_seconds: config.auth.refresh_leeway_seconds,
            logout_timeout_ms: config.auth.logout_timeout_ms,
        }
    }
}

/// Outcome of a call that needs the access token
enum Authorized<T> {
    /// The service answered; `epoch` is the session the answer belongs to
    Completed { value: T, epoch: u64 },
    /// The call failed. Auth and transport failures have already ended the session.
    Failed(ServiceError),
}

/// Owns the client session and runs every operation that changes it
pub struct SessionManager {
    service: Arc<dyn AuthService>,
    store: Arc<dyn TokenStore>,
    settings: SessionSettings,
    session: RwLock<Session>,
    updates: watch::Sender<SessionSnapshot>,
}

impl SessionManager {
    /// Create a manager, seeding the session from `store`
    pub fn new(
        service: Arc<dyn AuthService>,
        store: Arc<dyn TokenStore>,
        settings: SessionSettings,
    ) -> Self {
        let tokens = store.load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read stored tokens, starting without a session");
            StoredTokens::default()
        });

        let session = Session::hydrated(tokens);
        info!(
            has_access_token = session.access_token.is_some(),
            has_refresh_token = session.refresh_token.is_some(),
            "Session hydrated from token store"
        );

        let (updates, _) = watch::channel(session.snapshot());

        Self {
            service,
            store,
            settings,
            session: RwLock::new(session),
            updates,
        }
    }

    /// Manager backed by the HTTP client and the token file from `config`
    pub fn from_config(config: &TottoriConfig) -> TottoriResult<Self> {
        let service = Arc::new(HttpAuthClient::new(config.auth.clone())?);
        let store = Arc::new(FileTokenStore::new(config.storage.token_file_path()));

        Ok(Self::new(
            service,
            store,
            SessionSettings::from_config(config),
        ))
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    // ----- Read access -----

    /// Current state of the session
    pub fn snapshot(&self) -> SessionSnapshot {
        self.read(Session::snapshot)
    }

    /// Receive a snapshot after every session change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    /// Authorization flags computed from the session as it is now
    pub fn access(&self) -> AccessFlags {
        self.read(Session::access)
    }

    pub fn is_authenticated(&self) -> bool {
        self.access().is_authenticated
    }

    pub fn is_admin(&self) -> bool {
        self.access().is_admin
    }

    pub fn is_analyst(&self) -> bool {
        self.access().is_analyst
    }

    pub fn is_policy_maker(&self) -> bool {
        self.access().is_policy_maker
    }

    pub fn phase(&self) -> SessionPhase {
        self.read(Session::phase)
    }

    pub fn is_loading(&self) -> bool {
        self.read(|s| s.in_flight > 0)
    }

    pub fn last_error(&self) -> Option<String> {
        self.read(|s| s.last_error.clone())
    }

    /// The user resolved for this session, without contacting the service
    pub fn current_user_cached(&self) -> Option<UserProfile> {
        self.read(|s| s.current_user.clone())
    }

    pub fn has_refresh_token(&self) -> bool {
        self.read(|s| s.refresh_token.is_some())
    }

    // ----- Operations -----

    /// Sign in, replacing whatever session existed
    pub async fn login(&self, credentials: &Credentials) -> AuthOutcome {
        let operation = Operation::Login;
        let _guard = self.begin(false);
        log_operation_start!(operation.name(), user = %credentials.username_or_email);

        let epoch = self.update(|s| {
            s.last_error = None;
            s.epoch
        });

        let result = self
            .service
            .login(credentials)
            .await
            .and_then(|response| {
                if response.access_token.is_empty() {
                    Err(ServiceError::decode("login response carried no access token"))
                } else {
                    Ok(response)
                }
            });

        let response = match result {
            Ok(response) => response,
            Err(error) => return self.fail(operation, &error),
        };

        let user_id = response.user.id;
        let applied = self.update(|s| {
            if s.epoch != epoch {
                return false;
            }
            s.access_token = Some(response.access_token);
            s.refresh_token = non_empty(response.refresh_token);
            s.current_user = Some(response.user);
            s.access_expires_at = expiry_from(response.expires_in, Utc::now());
            s.last_error = None;
            s.epoch += 1;
            self.mirror(s);
            true
        });

        if !applied {
            warn!("Session changed while login was in flight, discarding the response");
            return AuthOutcome::failure(
                operation
                    .fallback_message(self.settings.locale)
                    .unwrap_or_default(),
            );
        }

        log_operation_success!(operation.name(), user_id = user_id);
        AuthOutcome::success()
    }

    /// Create an account. Does not sign in.
    pub async fn register(&self, registration: &Registration) -> AuthOutcome {
        let _guard = self.begin(false);
        log_operation_start!(Operation::Register.name(), username = %registration.username);
        self.set_error(None);

        let result = self.service.register(registration).await;
        self.settle(Operation::Register, result)
    }

    /// End the session. The service is told on a best-effort basis; the local
    /// session and the token mirror are always cleared.
    pub async fn logout(&self) {
        let operation = Operation::Logout;
        let _guard = self.begin(false);
        log_operation_start!(operation.name());

        if let Some(token) = self.read(|s| s.access_token.clone()) {
            let notified = with_timeout(
                self.service.logout(&token),
                self.settings.logout_timeout_ms,
                operation.name(),
            )
            .await;

            match notified {
                Ok(Ok(())) => debug!("Auth service acknowledged logout"),
                Ok(Err(error)) => {
                    log_operation_error!(operation.name(), error);
                }
                Err(error) => {
                    log_operation_error!(operation.name(), error);
                }
            }
        }

        self.update(|s| {
            s.clear();
            self.mirror(s);
        });

        log_operation_success!(operation.name());
    }

    /// Exchange the refresh token for a new access token
    ///
    /// A refused refresh ends the session before the error is returned.
    pub async fn refresh_access_token(&self) -> SessionResult<String> {
        let operation = Operation::Refresh;
        let (refresh_token, epoch) = self.read(|s| (s.refresh_token.clone(), s.epoch));
        let Some(refresh_token) = refresh_token else {
            debug!("Refresh requested without a refresh token");
            return Err(SessionError::MissingRefreshToken);
        };

        let _guard = self.begin(true);
        log_operation_start!(operation.name());

        let result = self
            .service
            .refresh(&refresh_token)
            .await
            .and_then(|response| {
                if response.access_token.is_empty() {
                    Err(ServiceError::decode("refresh response carried no access token"))
                } else {
                    Ok(response)
                }
            });

        match result {
            Ok(response) => {
                let applied = self.update(|s| {
                    if s.epoch != epoch {
                        return false;
                    }
                    s.access_token = Some(response.access_token.clone());
                    s.access_expires_at = expiry_from(response.expires_in, Utc::now());
                    self.mirror(s);
                    true
                });

                if !applied {
                    warn!("Session ended while the token was being refreshed, discarding it");
                    return Err(SessionError::Superseded {
                        operation: operation.name(),
                    });
                }

                log_operation_success!(operation.name());
                Ok(response.access_token)
            }
            Err(error) => {
                log_operation_error!(operation.name(), error);
                self.logout_if_current(epoch).await;
                Err(SessionError::RefreshFailed(error))
            }
        }
    }

    /// Fetch the profile of the signed-in user
    ///
    /// `Ok(None)` means there is no usable session: none existed, or the
    /// token was refused and could not be renewed, or the service failed
    /// unexpectedly. In the last two cases the session has been ended.
    pub async fn current_user(&self) -> SessionResult<Option<UserProfile>> {
        let operation = Operation::FetchUser;
        let _guard = self.begin(false);

        if self.read(|s| s.access_token.is_none()) {
            return Ok(None);
        }

        log_operation_start!(operation.name());

        let attempt = self
            .authorized(operation, |token| async move {
                self.service.current_user(&token).await
            })
            .await;

        match attempt {
            Ok(Authorized::Completed { value: user, epoch }) => {
                let applied = self.update(|s| {
                    if s.epoch != epoch || s.access_token.is_none() {
                        return false;
                    }
                    s.current_user = Some(user.clone());
                    true
                });

                if !applied {
                    debug!("Session changed while the profile was loading");
                    return Ok(None);
                }

                log_operation_success!(operation.name(), user_id = user.id, role = %user.role);
                Ok(Some(user))
            }
            Ok(Authorized::Failed(error @ ServiceError::Rejected { .. }))
                if !error.is_unauthorized() =>
            {
                Err(SessionError::Service(error))
            }
            Ok(Authorized::Failed(_)) | Err(SessionError::NotAuthenticated { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Update profile fields of the signed-in user
    pub async fn update_profile(&self, update: &ProfileUpdate) -> SessionResult<AuthOutcome> {
        let operation = Operation::UpdateProfile;
        self.require_token(operation)?;

        let _guard = self.begin(false);
        log_operation_start!(operation.name());
        self.set_error(None);

        let attempt = self
            .authorized(operation, |token| async move {
                self.service.update_profile(&token, update).await
            })
            .await?;

        match attempt {
            Authorized::Completed { value: user, epoch } => {
                let applied = self.update(|s| {
                    if s.epoch != epoch || s.access_token.is_none() {
                        return false;
                    }
                    s.current_user = Some(user);
                    true
                });

                if applied {
                    log_operation_success!(operation.name());
                } else {
                    debug!("Session changed while the profile update was in flight");
                }
                Ok(AuthOutcome::success())
            }
            Authorized::Failed(error) => Ok(self.fail(operation, &error)),
        }
    }

    /// Change the password. A successful change always ends the session the
    /// change was made in.
    pub async fn change_password(&self, change: &PasswordChange) -> SessionResult<AuthOutcome> {
        let operation = Operation::ChangePassword;
        self.require_token(operation)?;

        let _guard = self.begin(false);
        log_operation_start!(operation.name());
        self.set_error(None);

        let attempt = self
            .authorized(operation, |token| async move {
                self.service.change_password(&token, change).await
            })
            .await?;

        match attempt {
            Authorized::Completed { value, epoch } => {
                log_operation_success!(operation.name());
                info!("Password changed, ending the session");
                self.logout_if_current(epoch).await;
                Ok(AuthOutcome::success_with(value.message))
            }
            Authorized::Failed(error) => Ok(self.fail(operation, &error)),
        }
    }

    pub async fn request_password_reset(&self, email: &str) -> AuthOutcome {
        let _guard = self.begin(false);
        log_operation_start!(Operation::RequestPasswordReset.name());
        self.set_error(None);

        let result = self.service.request_password_reset(email).await;
        self.settle(Operation::RequestPasswordReset, result)
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthOutcome {
        let _guard = self.begin(false);
        log_operation_start!(Operation::ResetPassword.name());
        self.set_error(None);

        let result = self.service.reset_password(token, new_password).await;
        self.settle(Operation::ResetPassword, result)
    }

    pub async fn verify_email(&self, token: &str) -> AuthOutcome {
        let _guard = self.begin(false);
        log_operation_start!(Operation::VerifyEmail.name());
        self.set_error(None);

        let result = self.service.verify_email(token).await;
        self.settle(Operation::VerifyEmail, result)
    }

    /// Resolve the user for a session restored from storage
    ///
    /// Meant to run once at startup. A stored token that does not lead to a
    /// user ends the session, unless a login replaced it in the meantime.
    pub async fn initialize(&self) {
        if self.read(|s| s.access_token.is_none()) {
            debug!("No stored session to restore");
            return;
        }

        let _guard = self.begin(false);
        log_operation_start!("initialize");
        let epoch = self.read(|s| s.epoch);

        match self.current_user().await {
            Ok(Some(user)) => {
                info!(user_id = user.id, role = %user.role, "Restored stored session");
            }
            Ok(None) => {
                if self.read(|s| s.access_token.is_some()) {
                    warn!("Stored token did not resolve a user, ending the session");
                    self.logout_if_current(epoch).await;
                } else {
                    info!("Stored session is no longer valid");
                }
            }
            Err(error) => {
                log_operation_error!("initialize", error);
                self.logout_if_current(epoch).await;
            }
        }
    }

    /// Access token for an outbound request, refreshed first when it is
    /// about to expire
    pub async fn valid_access_token(&self) -> SessionResult<String> {
        let leeway = self.settings.refresh_leeway_seconds;
        let (token, expiring, can_refresh) = self.read(|s| {
            (
                s.access_token.clone(),
                s.expires_within(leeway, Utc::now()),
                s.refresh_token.is_some(),
            )
        });

        let token = token.ok_or(SessionError::NotAuthenticated {
            operation: "valid_access_token",
        })?;

        if !expiring || !can_refresh {
            return Ok(token);
        }

        info!(leeway_seconds = leeway, "Access token is about to expire, refreshing");
        self.refresh_access_token().await
    }

    /// Server-side login sessions of the signed-in user
    pub async fn list_sessions(&self) -> SessionResult<Vec<RemoteSession>> {
        let operation = Operation::ListSessions;
        self.require_token(operation)?;

        let _guard = self.begin(false);
        log_operation_start!(operation.name());

        let attempt = self
            .authorized(operation, |token| async move {
                self.service.list_sessions(&token).await
            })
            .await?;

        match attempt {
            Authorized::Completed { value, .. } => {
                log_operation_success!(operation.name(), count = value.len());
                Ok(value)
            }
            Authorized::Failed(error) => {
                log_operation_error!(operation.name(), error);
                self.require_token(operation)?;
                Err(SessionError::Service(error))
            }
        }
    }

    /// End one of the user's server-side sessions
    pub async fn terminate_session(&self, session_id: i64) -> SessionResult<AuthOutcome> {
        let operation = Operation::TerminateSession;
        self.require_token(operation)?;

        let _guard = self.begin(false);
        log_operation_start!(operation.name(), session_id = session_id);
        self.set_error(None);

        let attempt = self
            .authorized(operation, |token| async move {
                self.service.terminate_session(&token, session_id).await
            })
            .await?;

        match attempt {
            Authorized::Completed { value, .. } => {
                log_operation_success!(operation.name(), session_id = session_id);
                Ok(AuthOutcome::success_with(value.message))
            }
            Authorized::Failed(error) => Ok(self.fail(operation, &error)),
        }
    }

    // ----- Internals -----

    /// Run `call` with the access token, renewing a refused token once
    ///
    /// A refused token that cannot be renewed, and any failure other than a
    /// rejection, end the session the call was made for.
    async fn authorized<T, F, Fut>(
        &self,
        operation: Operation,
        call: F,
    ) -> SessionResult<Authorized<T>>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let mut retries_left = MAX_AUTH_RETRIES;

        loop {
            let (token, epoch) = self.read(|s| (s.access_token.clone(), s.epoch));
            let token = token.ok_or(SessionError::NotAuthenticated {
                operation: operation.name(),
            })?;

            let error = match call(token).await {
                Ok(value) => return Ok(Authorized::Completed { value, epoch }),
                Err(error) => error,
            };

            if error.is_unauthorized() {
                if retries_left > 0 && self.has_refresh_token() {
                    retries_left -= 1;
                    info!(operation = operation.name(), "Access token refused, refreshing");

                    match self.refresh_access_token().await {
                        Ok(_) => continue,
                        Err(refresh_error) => {
                            debug!(error = %refresh_error, "Refresh did not recover the session");
                        }
                    }
                }

                warn!(operation = operation.name(), "Access token refused, ending the session");
                self.logout_if_current(epoch).await;
            } else if !matches!(error, ServiceError::Rejected { .. }) {
                log_operation_error!(operation.name(), error);
                self.logout_if_current(epoch).await;
            }

            return Ok(Authorized::Failed(error));
        }
    }

    /// Log out unless the session already changed since `epoch`
    async fn logout_if_current(&self, epoch: u64) {
        if self.read(|s| s.epoch) == epoch {
            self.logout().await;
        } else {
            debug!("Session already replaced, skipping logout");
        }
    }

    fn require_token(&self, operation: Operation) -> SessionResult<()> {
        if self.read(|s| s.access_token.is_some()) {
            Ok(())
        } else {
            Err(SessionError::NotAuthenticated {
                operation: operation.name(),
            })
        }
    }

    /// Outcome for a stateless delegation
    fn settle(&self, operation: Operation, result: ServiceResult<MessageResponse>) -> AuthOutcome {
        match result {
            Ok(response) => {
                log_operation_success!(operation.name());
                AuthOutcome::success_with(response.message)
            }
            Err(error) => self.fail(operation, &error),
        }
    }

    /// Record a failed call in `last_error` and build its outcome
    fn fail(&self, operation: Operation, error: &ServiceError) -> AuthOutcome {
        log_operation_error!(operation.name(), error);
        let message = operation.failure_message(error, self.settings.locale);
        self.set_error(Some(message.clone()));
        AuthOutcome::failure(message)
    }

    fn set_error(&self, message: Option<String>) {
        self.update(|s| s.last_error = message);
    }

    /// Write the session's tokens to the store. Failures are logged only;
    /// the in-memory session stays authoritative.
    fn mirror(&self, session: &Session) {
        let tokens = session.tokens();
        let result = if tokens.is_empty() {
            self.store.clear()
        } else {
            self.store.save(&tokens)
        };

        if let Err(error) = result {
            warn!(error = %error, "Failed to mirror session tokens to storage");
        }
    }

    fn read<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        let session = self.session.read().unwrap_or_else(PoisonError::into_inner);
        f(&session)
    }

    /// Mutate the session and publish the resulting snapshot
    fn update<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut session);
        self.updates.send_replace(session.snapshot());
        result
    }

    fn begin(&self, refreshing: bool) -> InFlight<'_> {
        self.update(|s| {
            s.in_flight += 1;
            if refreshing {
                s.refreshing += 1;
            }
        });
        InFlight {
            manager: self,
            refreshing,
        }
    }
}

/// Keeps `is_loading` raised while an operation runs, including when it
/// returns early or its future is dropped
struct InFlight<'a> {
    manager: &'a SessionManager,
    refreshing: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let refreshing = self.refreshing;
        self.manager.update(|s| {
            s.in_flight = s.in_flight.saturating_sub(1);
            if refreshing {
                s.refreshing = s.refreshing.saturating_sub(1);
            }
        });
    }
}
