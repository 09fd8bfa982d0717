//! Credential store: user records and their password hashes.
//!
//! The store does not log. Callers pair every mutation with the audit
//! or action entry that describes it, inside the same [`Txn`].

use std::sync::Arc;

use dentdesk_core::clock::Clock;
use dentdesk_core::error::{DeskError, DeskResult};
use dentdesk_core::models::clinic::{DEFAULT_CLINIC_ID, WILDCARD_CLINIC_ID};
use dentdesk_core::models::user::{CreateUser, Role, UpdateUser, User};
use dentdesk_core::store::{KvStore, Txn, keys};
use uuid::Uuid;

use crate::password;

#[derive(Debug, Clone)]
pub struct CredentialStore {
    clock: Arc<dyn Clock>,
    pepper: Option<String>,
    temporary_password_length: usize,
}

fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Superadmins belong to every clinic; anyone else without a clinic
/// lands in the default one.
fn normalize_clinic(role: Role, clinic_id: Option<&str>) -> String {
    if role.is_superadmin() {
        return WILDCARD_CLINIC_ID.to_string();
    }
    match clinic_id.map(str::trim) {
        Some(id) if !id.is_empty() && id != WILDCARD_CLINIC_ID => id.to_string(),
        _ => DEFAULT_CLINIC_ID.to_string(),
    }
}

impl CredentialStore {
    pub fn new(
        clock: Arc<dyn Clock>,
        pepper: Option<String>,
        temporary_password_length: usize,
    ) -> Self {
        Self {
            clock,
            pepper,
            temporary_password_length,
        }
    }

    pub async fn list<S: KvStore>(&self, tx: &Txn<'_, S>) -> DeskResult<Vec<User>> {
        tx.load_or_default(keys::USERS).await
    }

    /// Users visible to someone of `role` in `clinic_id`.
    pub async fn list_for_clinic<S: KvStore>(
        &self,
        tx: &Txn<'_, S>,
        clinic_id: &str,
        role: Role,
    ) -> DeskResult<Vec<User>> {
        let users = self.list(tx).await?;
        if role.is_superadmin() {
            return Ok(users);
        }
        Ok(users
            .into_iter()
            .filter(|u| u.clinic_id == clinic_id)
            .collect())
    }

    pub async fn find_by_username<S: KvStore>(
        &self,
        tx: &Txn<'_, S>,
        username: &str,
    ) -> DeskResult<Option<User>> {
        let wanted = normalize_username(username);
        Ok(self
            .list(tx)
            .await?
            .into_iter()
            .find(|u| u.username.to_lowercase() == wanted))
    }

    pub async fn find_by_id<S: KvStore>(&self, tx: &Txn<'_, S>, id: Uuid) -> DeskResult<Option<User>> {
        Ok(self.list(tx).await?.into_iter().find(|u| u.id == id))
    }

    /// Match a username, e-mail address or phone number.
    pub async fn find_by_identifier<S: KvStore>(
        &self,
        tx: &Txn<'_, S>,
        identifier: &str,
    ) -> DeskResult<Option<User>> {
        let lowered = identifier.trim().to_lowercase();
        if lowered.is_empty() {
            return Ok(None);
        }
        let phone = strip_whitespace(&lowered);
        Ok(self.list(tx).await?.into_iter().find(|u| {
            u.username.to_lowercase() == lowered
                || (!u.email.is_empty() && u.email.to_lowercase() == lowered)
                || (!u.phone.is_empty() && strip_whitespace(&u.phone) == phone)
        }))
    }

    pub async fn create<S: KvStore>(&self, tx: &mut Txn<'_, S>, input: CreateUser) -> DeskResult<User> {
        let username = normalize_username(&input.username);
        if username.is_empty() {
            return Err(DeskError::validation("username must not be empty"));
        }

        let mut users = self.list(tx).await?;
        if users.iter().any(|u| u.username.to_lowercase() == username) {
            return Err(DeskError::UsernameTaken(username));
        }

        let user = User {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            username,
            phone: input.phone.trim().to_string(),
            email: input.email.trim().to_string(),
            role: input.role,
            clinic_id: normalize_clinic(input.role, input.clinic_id.as_deref()),
            password_hash: password::hash_password(&input.password, self.pepper.as_deref())?,
            is_active: true,
            must_change_password: false,
            created_at: self.clock.now(),
        };

        users.push(user.clone());
        tx.stage(keys::USERS, &users)?;
        Ok(user)
    }

    pub async fn update<S: KvStore>(
        &self,
        tx: &mut Txn<'_, S>,
        id: Uuid,
        patch: UpdateUser,
    ) -> DeskResult<User> {
        let mut users = self.list(tx).await?;

        if let Some(username) = &patch.username {
            let wanted = normalize_username(username);
            if wanted.is_empty() {
                return Err(DeskError::validation("username must not be empty"));
            }
            if users
                .iter()
                .any(|u| u.id != id && u.username.to_lowercase() == wanted)
            {
                return Err(DeskError::UsernameTaken(wanted));
            }
        }

        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| DeskError::UserNotFound(id.to_string()))?;

        if let Some(name) = patch.name {
            user.name = name.trim().to_string();
        }
        if let Some(username) = patch.username {
            user.username = normalize_username(&username);
        }
        if let Some(phone) = patch.phone {
            user.phone = phone.trim().to_string();
        }
        if let Some(email) = patch.email {
            user.email = email.trim().to_string();
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        if patch.role.is_some() || patch.clinic_id.is_some() {
            let clinic = patch.clinic_id.as_deref().unwrap_or(&user.clinic_id);
            user.clinic_id = normalize_clinic(user.role, Some(clinic));
        }
        if let Some(active) = patch.is_active {
            user.is_active = active;
        }
        if let Some(flag) = patch.must_change_password {
            user.must_change_password = flag;
        }

        let updated = user.clone();
        tx.stage(keys::USERS, &users)?;
        Ok(updated)
    }

    /// Replace the password hash. `must_change_password` is left as is.
    pub async fn set_password<S: KvStore>(
        &self,
        tx: &mut Txn<'_, S>,
        id: Uuid,
        new_password: &str,
    ) -> DeskResult<User> {
        let hash = password::hash_password(new_password, self.pepper.as_deref())?;
        self.modify(tx, id, |user| user.password_hash = hash).await
    }

    /// Issue a temporary password and force a change on next login.
    ///
    /// The plaintext is returned exactly once and is never stored.
    pub async fn reset_to_temporary<S: KvStore>(
        &self,
        tx: &mut Txn<'_, S>,
        id: Uuid,
    ) -> DeskResult<(User, String)> {
        let temporary = password::generate_temporary_password(self.temporary_password_length);
        let hash = password::hash_password(&temporary, self.pepper.as_deref())?;
        let user = self
            .modify(tx, id, |user| {
                user.password_hash = hash;
                user.must_change_password = true;
            })
            .await?;
        Ok((user, temporary))
    }

    pub async fn toggle_active<S: KvStore>(&self, tx: &mut Txn<'_, S>, id: Uuid) -> DeskResult<User> {
        self.modify(tx, id, |user| user.is_active = !user.is_active)
            .await
    }

    pub async fn clear_must_change_password<S: KvStore>(
        &self,
        tx: &mut Txn<'_, S>,
        id: Uuid,
    ) -> DeskResult<User> {
        self.modify(tx, id, |user| user.must_change_password = false)
            .await
    }

    pub fn verify(&self, plain: &str, stored_hash: &str) -> DeskResult<bool> {
        password::verify_password(plain, stored_hash, self.pepper.as_deref())
    }

    async fn modify<S, F>(&self, tx: &mut Txn<'_, S>, id: Uuid, f: F) -> DeskResult<User>
    where
        S: KvStore,
        F: FnOnce(&mut User),
    {
        let mut users = self.list(tx).await?;
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| DeskError::UserNotFound(id.to_string()))?;
        f(user);
        let updated = user.clone();
        tx.stage(keys::USERS, &users)?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use dentdesk_core::clock::SystemClock;
    use dentdesk_core::store::MemoryStore;

    use super::*;

    fn store() -> CredentialStore {
        CredentialStore::new(Arc::new(SystemClock), None, 10)
    }

    fn doctor(username: &str) -> CreateUser {
        CreateUser {
            name: "Dr. Karimov".into(),
            username: username.into(),
            phone: "+992 90 123 45 67".into(),
            email: "karimov@clinic.tj".into(),
            role: Role::Doctor,
            password: "doctor123".into(),
            clinic_id: Some("clinic_a".into()),
        }
    }

    #[tokio::test]
    async fn username_uniqueness_is_case_insensitive() {
        let kv = MemoryStore::new();
        let creds = store();
        let mut tx = Txn::begin(&kv);
        creds.create(&mut tx, doctor("doc1")).await.unwrap();
        let err = creds.create(&mut tx, doctor("Doc1")).await.unwrap_err();
        assert!(matches!(err, DeskError::UsernameTaken(_)));
    }

    #[tokio::test]
    async fn lookup_ignores_case() {
        let kv = MemoryStore::new();
        let creds = store();
        let mut tx = Txn::begin(&kv);
        let created = creds.create(&mut tx, doctor("Doctor")).await.unwrap();
        assert_eq!(created.username, "doctor");
        assert!(created.is_active);
        assert!(!created.must_change_password);

        let found = creds.find_by_username(&tx, "DOCTOR").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(creds.find_by_id(&tx, created.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn identifier_matches_email_and_phone() {
        let kv = MemoryStore::new();
        let creds = store();
        let mut tx = Txn::begin(&kv);
        let created = creds.create(&mut tx, doctor("doctor")).await.unwrap();

        let by_email = creds
            .find_by_identifier(&tx, "Karimov@Clinic.TJ")
            .await
            .unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(created.id));

        let by_phone = creds
            .find_by_identifier(&tx, "+992901234567")
            .await
            .unwrap();
        assert_eq!(by_phone.map(|u| u.id), Some(created.id));

        assert!(creds.find_by_identifier(&tx, "  ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_rejects_taken_username_and_lowercases() {
        let kv = MemoryStore::new();
        let creds = store();
        let mut tx = Txn::begin(&kv);
        let a = creds.create(&mut tx, doctor("alpha")).await.unwrap();
        creds.create(&mut tx, doctor("beta")).await.unwrap();

        let err = creds
            .update(
                &mut tx,
                a.id,
                UpdateUser {
                    username: Some("BETA".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::UsernameTaken(_)));

        let renamed = creds
            .update(
                &mut tx,
                a.id,
                UpdateUser {
                    username: Some("Gamma".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.username, "gamma");
    }

    #[tokio::test]
    async fn update_unknown_user_fails() {
        let kv = MemoryStore::new();
        let creds = store();
        let mut tx = Txn::begin(&kv);
        let err = creds
            .update(&mut tx, Uuid::new_v4(), UpdateUser::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn clinic_defaults_follow_role() {
        let kv = MemoryStore::new();
        let creds = store();
        let mut tx = Txn::begin(&kv);

        let mut input = doctor("nobody");
        input.clinic_id = None;
        let user = creds.create(&mut tx, input).await.unwrap();
        assert_eq!(user.clinic_id, DEFAULT_CLINIC_ID);

        let mut input = doctor("root");
        input.role = Role::Superadmin;
        let admin = creds.create(&mut tx, input).await.unwrap();
        assert_eq!(admin.clinic_id, WILDCARD_CLINIC_ID);
    }

    #[tokio::test]
    async fn set_password_keeps_forced_change_flag() {
        let kv = MemoryStore::new();
        let creds = store();
        let mut tx = Txn::begin(&kv);
        let user = creds.create(&mut tx, doctor("doctor")).await.unwrap();

        let (_, temporary) = creds.reset_to_temporary(&mut tx, user.id).await.unwrap();
        let after = creds.set_password(&mut tx, user.id, "brand-new").await.unwrap();
        assert!(after.must_change_password);
        assert!(creds.verify("brand-new", &after.password_hash).unwrap());
        assert!(!creds.verify(&temporary, &after.password_hash).unwrap());

        let cleared = creds
            .clear_must_change_password(&mut tx, user.id)
            .await
            .unwrap();
        assert!(!cleared.must_change_password);
    }

    #[tokio::test]
    async fn toggle_active_flips_flag() {
        let kv = MemoryStore::new();
        let creds = store();
        let mut tx = Txn::begin(&kv);
        let user = creds.create(&mut tx, doctor("doctor")).await.unwrap();
        assert!(!creds.toggle_active(&mut tx, user.id).await.unwrap().is_active);
        assert!(creds.toggle_active(&mut tx, user.id).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn list_for_clinic_scopes_non_superadmins() {
        let kv = MemoryStore::new();
        let creds = store();
        let mut tx = Txn::begin(&kv);
        creds.create(&mut tx, doctor("a")).await.unwrap();
        let mut other = doctor("b");
        other.clinic_id = Some("clinic_b".into());
        creds.create(&mut tx, other).await.unwrap();

        let scoped = creds
            .list_for_clinic(&tx, "clinic_a", Role::ClinicAdmin)
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        let all = creds
            .list_for_clinic(&tx, "*", Role::Superadmin)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }
}
