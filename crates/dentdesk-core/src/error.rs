//! Error types for the DentDesk system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("Username already taken: {0}")]
    UsernameTaken(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Clinic not found: {0}")]
    ClinicNotFound(String),

    #[error("Subscription not found for clinic: {0}")]
    SubscriptionNotFound(String),

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Storage quota exceeded")]
    QuotaExceeded,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeskError {
    /// Shorthand for a [`DeskError::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

pub type DeskResult<T> = Result<T, DeskError>;
