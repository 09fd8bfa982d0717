//! Pending one-time code for password resets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One pending challenge per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpChallenge {
    pub user_id: Uuid,
    /// SHA-256 hex digest of the user id and the code; the code itself
    /// is never stored.
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
}
