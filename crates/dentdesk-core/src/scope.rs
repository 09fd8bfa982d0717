//! Row-level filters for the hosted patient/visit/treatment tables.
//!
//! DentDesk does not own those tables. It only builds the predicate
//! the external table API applies (`clinic_id = ?`, and for doctors
//! `doctor_id = ?`). A deployment that exposes patient data over a
//! network must apply [`PatientQueryScope::permits`] on the server
//! side as well; the predicate alone is advisory.

use serde::Serialize;

use crate::models::clinic::DEFAULT_CLINIC_ID;
use crate::models::session::Session;
use crate::models::user::Role;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatientQueryScope {
    /// `None` means every clinic.
    pub clinic_id: Option<String>,
    /// `None` means every doctor.
    pub doctor_id: Option<String>,
}

impl PatientQueryScope {
    pub fn for_session(session: &Session) -> Self {
        if session.role.is_superadmin() {
            return Self::default();
        }
        let clinic_id = if session.clinic_id.is_empty() {
            DEFAULT_CLINIC_ID.to_string()
        } else {
            session.clinic_id.clone()
        };
        let doctor_id = (session.role == Role::Doctor).then(|| session.user_id.to_string());
        Self {
            clinic_id: Some(clinic_id),
            doctor_id,
        }
    }

    /// Whether a row owned by `clinic_id`/`doctor_id` falls inside
    /// this scope.
    pub fn permits(&self, clinic_id: &str, doctor_id: Option<&str>) -> bool {
        if let Some(scope_clinic) = &self.clinic_id {
            if scope_clinic != clinic_id {
                return false;
            }
        }
        match &self.doctor_id {
            Some(scope_doctor) => doctor_id == Some(scope_doctor.as_str()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;

    fn session(role: Role, clinic_id: &str) -> Session {
        let now = Utc::now();
        Session {
            user_id: Uuid::new_v4(),
            login: "someone".into(),
            role,
            name: "Someone".into(),
            clinic_id: clinic_id.into(),
            issued_at: now,
            expires_at: now + Duration::hours(8),
        }
    }

    #[test]
    fn superadmin_is_unrestricted() {
        let scope = PatientQueryScope::for_session(&session(Role::Superadmin, "*"));
        assert_eq!(scope, PatientQueryScope::default());
        assert!(scope.permits("clinic_a", Some("anyone")));
    }

    #[test]
    fn registrar_is_scoped_to_clinic() {
        let scope = PatientQueryScope::for_session(&session(Role::Registrar, "clinic_a"));
        assert_eq!(scope.clinic_id.as_deref(), Some("clinic_a"));
        assert!(scope.doctor_id.is_none());
        assert!(scope.permits("clinic_a", None));
        assert!(!scope.permits("clinic_b", None));
    }

    #[test]
    fn doctor_is_scoped_to_own_rows() {
        let s = session(Role::Doctor, "clinic_a");
        let me = s.user_id.to_string();
        let scope = PatientQueryScope::for_session(&s);
        assert_eq!(scope.doctor_id.as_deref(), Some(me.as_str()));
        assert!(scope.permits("clinic_a", Some(&me)));
        assert!(!scope.permits("clinic_a", Some("other-doctor")));
        assert!(!scope.permits("clinic_a", None));
    }

    #[test]
    fn blank_clinic_falls_back_to_default() {
        let scope = PatientQueryScope::for_session(&session(Role::Admin, ""));
        assert_eq!(scope.clinic_id.as_deref(), Some(DEFAULT_CLINIC_ID));
    }
}
