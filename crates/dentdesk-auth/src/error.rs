//! Authentication error types.

use dentdesk_core::error::DeskError;
use dentdesk_core::models::subscription::SubscriptionStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials, {attempts_remaining} attempts remaining")]
    InvalidCredentials { attempts_remaining: u32 },

    #[error("account is blocked")]
    AccountInactive,

    #[error("clinic subscription is not active ({status:?})")]
    SubscriptionInactive { status: SubscriptionStatus },

    #[error("too many failed attempts, try again in {minutes_left} min")]
    LockedOut { minutes_left: i64 },

    #[error("invalid or expired code")]
    InvalidOrExpiredOtp,

    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("current password is incorrect")]
    CurrentPasswordIncorrect,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error(transparent)]
    Core(#[from] DeskError),
}

impl AuthError {
    /// Form-level errors the caller re-renders inline.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AuthError::PasswordTooShort { .. }
                | AuthError::PasswordMismatch
                | AuthError::CurrentPasswordIncorrect
                | AuthError::Core(DeskError::UsernameTaken(_))
                | AuthError::Core(DeskError::Validation { .. })
        )
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
