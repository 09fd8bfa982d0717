//! Clinic (tenant) domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Clinic id of the superadmin and of cross-clinic log entries.
pub const WILDCARD_CLINIC_ID: &str = "*";

/// Fallback tenant for users and data not assigned to any clinic.
pub const DEFAULT_CLINIC_ID: &str = "clinic_default";

/// A tenant organization using the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clinic {
    /// Immutable; referenced by users and subscriptions.
    pub id: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub license: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreateClinic {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub license: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateClinic {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    /// `Some(Some(v))` = set, `Some(None)` = clear, `None` = no change.
    pub license: Option<Option<String>>,
    pub is_active: Option<bool>,
}
