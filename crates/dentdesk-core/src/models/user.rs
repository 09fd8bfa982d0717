//! User domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of roles a user can hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Superadmin,
    ClinicAdmin,
    Admin,
    Doctor,
    Registrar,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Superadmin => "superadmin",
            Role::ClinicAdmin => "clinic_admin",
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Registrar => "registrar",
        }
    }

    pub fn is_superadmin(self) -> bool {
        self == Role::Superadmin
    }
}

/// One human credential holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Always stored lower-cased.
    pub username: String,
    pub phone: String,
    pub email: String,
    pub role: Role,
    /// Owning clinic, or `*` for the superadmin.
    pub clinic_id: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub is_active: bool,
    #[serde(default)]
    pub must_change_password: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub name: String,
    pub username: String,
    pub phone: String,
    pub email: String,
    pub role: Role,
    /// Raw password (hashed with Argon2id before storage).
    pub password: String,
    /// Defaults to `clinic_default` (or `*` for a superadmin).
    pub clinic_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub clinic_id: Option<String>,
    pub is_active: Option<bool>,
    pub must_change_password: Option<bool>,
}

impl UpdateUser {
    /// Names of the fields this patch touches, in declaration order.
    pub fn touched_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.name.is_some() {
            fields.push("name");
        }
        if self.username.is_some() {
            fields.push("username");
        }
        if self.phone.is_some() {
            fields.push("phone");
        }
        if self.email.is_some() {
            fields.push("email");
        }
        if self.role.is_some() {
            fields.push("role");
        }
        if self.clinic_id.is_some() {
            fields.push("clinic_id");
        }
        if self.is_active.is_some() {
            fields.push("is_active");
        }
        if self.must_change_password.is_some() {
            fields.push("must_change_password");
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.touched_fields().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_snake_case() {
        let json = serde_json::to_string(&Role::ClinicAdmin).unwrap();
        assert_eq!(json, "\"clinic_admin\"");
        let back: Role = serde_json::from_str("\"registrar\"").unwrap();
        assert_eq!(back, Role::Registrar);
    }

    #[test]
    fn touched_fields_lists_only_set_fields() {
        let patch = UpdateUser {
            email: Some("a@b.c".into()),
            phone: Some("+992".into()),
            ..Default::default()
        };
        assert_eq!(patch.touched_fields(), vec!["phone", "email"]);
        assert!(UpdateUser::default().is_empty());
    }
}
