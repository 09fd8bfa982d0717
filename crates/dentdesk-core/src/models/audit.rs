//! Audit trail for sensitive account operations.
//!
//! Each entry records who (actor) did what (action) to whom (target).
//! The trail is append-only and keeps only the most recent entries;
//! see `AuditTrail` in `dentdesk-auth` for the retention cap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Auditable actor→target actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // --- Account lifecycle ---
    /// A user account was created.
    UserCreated,
    /// Profile fields of a user were edited.
    UserEdited,
    /// A user was deactivated.
    UserBlocked,
    /// A user was reactivated.
    UserUnblocked,

    // --- Credentials ---
    /// A password was replaced by its owner or an administrator.
    PasswordChanged,
    /// A temporary password was generated by an administrator.
    PasswordReset,

    // --- Clinical records ---
    /// Fields of a patient record were changed.
    PatientEdited,
}

impl AuditAction {
    pub fn label(self) -> &'static str {
        match self {
            AuditAction::UserCreated => "User created",
            AuditAction::UserEdited => "User edited",
            AuditAction::UserBlocked => "User blocked",
            AuditAction::UserUnblocked => "User unblocked",
            AuditAction::PasswordChanged => "Password changed",
            AuditAction::PasswordReset => "Temporary password issued",
            AuditAction::PatientEdited => "Patient record edited",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: AuditAction,
    pub actor_id: String,
    pub actor_name: String,
    pub target_id: String,
    pub target_name: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuditEntry {
    pub action: AuditAction,
    pub actor_id: String,
    pub actor_name: String,
    pub target_id: String,
    pub target_name: String,
    pub details: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_tags_are_snake_case() {
        let json = serde_json::to_string(&AuditAction::PatientEdited).unwrap();
        assert_eq!(json, "\"patient_edited\"");
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let parsed: Result<AuditAction, _> = serde_json::from_str("\"user_creatd\"");
        assert!(parsed.is_err());
    }
}
