//! Clinic-scoped operational event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Operational events recorded in the action log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Login,
    LoginFailed,
    Logout,
    PasswordResetRequested,
    PasswordResetCompleted,
    PasswordChanged,
    PasswordReset,
    ProfileUpdated,
    UserCreated,
    UserUpdated,
    UserBlock,
    UserUnblock,
    ClinicCreated,
    ClinicUpdated,
    SubscriptionUpdated,
    LockoutsCleared,
    DefaultsSeeded,
}

impl ActionKind {
    pub fn label(self) -> &'static str {
        match self {
            ActionKind::Login => "Signed in",
            ActionKind::LoginFailed => "Failed sign-in",
            ActionKind::Logout => "Signed out",
            ActionKind::PasswordResetRequested => "Password reset requested",
            ActionKind::PasswordResetCompleted => "Password reset completed",
            ActionKind::PasswordChanged => "Password changed",
            ActionKind::PasswordReset => "Temporary password issued",
            ActionKind::ProfileUpdated => "Profile updated",
            ActionKind::UserCreated => "User created",
            ActionKind::UserUpdated => "User updated",
            ActionKind::UserBlock => "User blocked",
            ActionKind::UserUnblock => "User unblocked",
            ActionKind::ClinicCreated => "Clinic created",
            ActionKind::ClinicUpdated => "Clinic updated",
            ActionKind::SubscriptionUpdated => "Subscription updated",
            ActionKind::LockoutsCleared => "Login lockouts cleared",
            ActionKind::DefaultsSeeded => "Default data seeded",
        }
    }
}

/// Kind of record an action log entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Clinic,
    Subscription,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub id: Uuid,
    /// Owning clinic, or `*` for cross-clinic events.
    pub clinic_id: String,
    pub user_id: String,
    pub user_name: String,
    pub action: ActionKind,
    pub entity: EntityKind,
    pub entity_id: String,
    pub details: String,
    pub ip: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateActionLogEntry {
    /// Blank is stored as `*`.
    pub clinic_id: String,
    pub user_id: String,
    pub user_name: String,
    pub action: ActionKind,
    pub entity: EntityKind,
    pub entity_id: String,
    pub details: String,
}

/// Read filter for the action log.
#[derive(Debug, Clone, Default)]
pub struct ActionLogFilter {
    /// Entries of this clinic plus every `*` entry.
    pub clinic_id: Option<String>,
    /// Truncates the result, never the stored log.
    pub limit: Option<usize>,
}
