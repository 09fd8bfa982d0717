//! Database-specific error types and conversions.

use dentdesk_core::error::DeskError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Corrupt document under key {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<DbError> for DeskError {
    fn from(err: DbError) -> Self {
        DeskError::Storage(err.to_string())
    }
}
