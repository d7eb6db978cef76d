//! Session state and the read-only views handed to consumers

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::storage::StoredTokens;
use crate::auth::AccessFlags;
use crate::types::UserProfile;

/// Where the session stands in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No usable session
    Anonymous,
    /// An operation is in flight and no user is resolved yet
    Authenticating,
    /// Token and user are both present
    Authenticated,
    /// The access token is being renewed
    Refreshing,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Anonymous => write!(f, "anonymous"),
            SessionPhase::Authenticating => write!(f, "authenticating"),
            SessionPhase::Authenticated => write!(f, "authenticated"),
            SessionPhase::Refreshing => write!(f, "refreshing"),
        }
    }
}

/// Point-in-time view of the session for UI and route guards
///
/// Tokens are deliberately not part of the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub current_user: Option<UserProfile>,
    pub is_loading: bool,
    pub last_error: Option<String>,
    pub access: AccessFlags,
    pub phase: SessionPhase,
    pub has_refresh_token: bool,
    pub access_expires_at: Option<DateTime<Utc>>,
}

/// The in-memory session. Only the session manager mutates it.
#[derive(Clone, Default)]
pub(crate) struct Session {
    pub(crate) access_token: Option<String>,
    pub(crate) refresh_token: Option<String>,
    pub(crate) current_user: Option<UserProfile>,
    pub(crate) last_error: Option<String>,
    pub(crate) access_expires_at: Option<DateTime<Utc>>,
    /// Bumped whenever the session is cleared or replaced by a new login
    pub(crate) epoch: u64,
    pub(crate) in_flight: usize,
    pub(crate) refreshing: usize,
}

impl Session {
    /// Session seeded from the durable mirror
    pub(crate) fn hydrated(tokens: StoredTokens) -> Self {
        Self {
            access_token: non_empty(tokens.access_token),
            refresh_token: non_empty(tokens.refresh_token),
            ..Self::default()
        }
    }

    /// Drop tokens, user, error and expiry. In-flight counters are untouched.
    pub(crate) fn clear(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.current_user = None;
        self.last_error = None;
        self.access_expires_at = None;
        self.epoch += 1;
    }

    pub(crate) fn tokens(&self) -> StoredTokens {
        StoredTokens::new(self.access_token.clone(), self.refresh_token.clone())
    }

    pub(crate) fn access(&self) -> AccessFlags {
        AccessFlags::derive(self.access_token.is_some(), self.current_user.as_ref())
    }

    pub(crate) fn phase(&self) -> SessionPhase {
        if self.refreshing > 0 {
            SessionPhase::Refreshing
        } else if self.access_token.is_some() && self.current_user.is_some() {
            SessionPhase::Authenticated
        } else if self.in_flight > 0 {
            SessionPhase::Authenticating
        } else {
            SessionPhase::Anonymous
        }
    }

    /// Whether the known expiry falls within `leeway_seconds` of `now`
    pub(crate) fn expires_within(&self, leeway_seconds: u64, now: DateTime<Utc>) -> bool {
        let leeway = Duration::seconds(leeway_seconds.min(MAX_LIFETIME_SECONDS) as i64);
        self.access_expires_at
            .map(|expires_at| expires_at - leeway <= now)
            .unwrap_or(false)
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            current_user: self.current_user.clone(),
            is_loading: self.in_flight > 0,
            last_error: self.last_error.clone(),
            access: self.access(),
            phase: self.phase(),
            has_refresh_token: self.refresh_token.is_some(),
            access_expires_at: self.access_expires_at,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("current_user", &self.current_user.as_ref().map(|u| u.id))
            .field("last_error", &self.last_error)
            .field("epoch", &self.epoch)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

/// Ten years; longer lifetimes are clamped
const MAX_LIFETIME_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Absolute expiry for a token issued `now` with lifetime `expires_in` seconds
pub(crate) fn expiry_from(expires_in: Option<f64>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let seconds = expires_in.filter(|s| s.is_finite() && *s > 0.0)?;
    let seconds = (seconds as u64).min(MAX_LIFETIME_SECONDS) as i64;
    Some(now + Duration::seconds(seconds))
}
