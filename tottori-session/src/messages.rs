//! Operation names and localized fallback messages

use crate::client::ServiceError;
use tottori_core::Locale;

/// Session manager operations, used for log fields and fallback messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Login,
    Register,
    Logout,
    Refresh,
    FetchUser,
    UpdateProfile,
    ChangePassword,
    RequestPasswordReset,
    ResetPassword,
    VerifyEmail,
    ListSessions,
    TerminateSession,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Login => "login",
            Operation::Register => "register",
            Operation::Logout => "logout",
            Operation::Refresh => "refresh_access_token",
            Operation::FetchUser => "current_user",
            Operation::UpdateProfile => "update_profile",
            Operation::ChangePassword => "change_password",
            Operation::RequestPasswordReset => "request_password_reset",
            Operation::ResetPassword => "reset_password",
            Operation::VerifyEmail => "verify_email",
            Operation::ListSessions => "list_sessions",
            Operation::TerminateSession => "terminate_session",
        }
    }

    /// Generic message used when the service gives no usable detail
    ///
    /// `None` for operations that never produce an `AuthOutcome`: logout
    /// cannot fail, and the rest report failures as `SessionError`.
    pub fn fallback_message(&self, locale: Locale) -> Option<&'static str> {
        let message = match (self, locale) {
            (Operation::Login, Locale::Ja) => "ログインに失敗しました",
            (Operation::Login, Locale::En) => "Login failed",
            (Operation::Register, Locale::Ja) => "ユーザー登録に失敗しました",
            (Operation::Register, Locale::En) => "Registration failed",
            (Operation::UpdateProfile, Locale::Ja) => "プロフィール更新に失敗しました",
            (Operation::UpdateProfile, Locale::En) => "Failed to update the profile",
            (Operation::ChangePassword, Locale::Ja) => "パスワード変更に失敗しました",
            (Operation::ChangePassword, Locale::En) => "Failed to change the password",
            (Operation::RequestPasswordReset, Locale::Ja) => "パスワードリセット要求に失敗しました",
            (Operation::RequestPasswordReset, Locale::En) => "Failed to request a password reset",
            (Operation::ResetPassword, Locale::Ja) => "パスワードリセットに失敗しました",
            (Operation::ResetPassword, Locale::En) => "Failed to reset the password",
            (Operation::VerifyEmail, Locale::Ja) => "メール認証に失敗しました",
            (Operation::VerifyEmail, Locale::En) => "Email verification failed",
            (Operation::TerminateSession, Locale::Ja) => "セッション終了に失敗しました",
            (Operation::TerminateSession, Locale::En) => "Failed to terminate the session",
            (
                Operation::Logout
                | Operation::Refresh
                | Operation::FetchUser
                | Operation::ListSessions,
                _,
            ) => return None,
        };
        Some(message)
    }

    /// Message reported to the caller for a failed call: the service's
    /// `detail` when present, otherwise the fallback, otherwise the error
    /// itself
    pub fn failure_message(&self, error: &ServiceError, locale: Locale) -> String {
        error
            .detail()
            .or_else(|| self.fallback_message(locale))
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string())
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_wins_over_fallback() {
        let error = ServiceError::rejected(401, Some("ユーザー名またはパスワードが正しくません".to_string()));
        assert_eq!(
            Operation::Login.failure_message(&error, Locale::En),
            "ユーザー名またはパスワードが正しくません"
        );
    }

    #[test]
    fn test_only_outcome_operations_have_fallbacks() {
        for operation in [
            Operation::Logout,
            Operation::Refresh,
            Operation::FetchUser,
            Operation::ListSessions,
        ] {
            assert!(operation.fallback_message(Locale::Ja).is_none());
        }
        assert!(Operation::TerminateSession.fallback_message(Locale::En).is_some());
    }

    #[test]
    fn test_fallback_is_localized() {
        let error = ServiceError::rejected(500, None);
        assert_eq!(
            Operation::Login.failure_message(&error, Locale::Ja),
            "ログインに失敗しました"
        );
        assert_eq!(
            Operation::Login.failure_message(&error, Locale::En),
            "Login failed"
        );

        let transport = ServiceError::transport("connection refused");
        assert_eq!(
            Operation::FetchUser.failure_message(&transport, Locale::Ja),
            transport.to_string()
        );
        assert_eq!(
            Operation::VerifyEmail.failure_message(&transport, Locale::Ja),
            "メール認証に失敗しました"
        );
    }
}
