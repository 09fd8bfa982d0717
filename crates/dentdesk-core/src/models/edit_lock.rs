//! Advisory per-patient edit lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Marker warning that someone is editing a patient record. It never
/// blocks a write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditLock {
    pub patient_id: String,
    pub user_id: Uuid,
    pub user_name: String,
    pub locked_at: DateTime<Utc>,
}
