//! Authentication service — login, password flows, administration
//! and patient-edit bookkeeping.
//!
//! Each public operation runs in one [`Txn`]: the state change and the
//! audit/action entries describing it are committed together or not at
//! all. The caller is trusted to have checked the actor's role; this
//! layer records who acted but does not enforce permissions.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dentdesk_core::clock::Clock;
use dentdesk_core::error::DeskError;
use dentdesk_core::models::action_log::{
    ActionKind, ActionLogEntry, ActionLogFilter, CreateActionLogEntry, EntityKind,
};
use dentdesk_core::models::audit::{AuditAction, AuditEntry, CreateAuditEntry};
use dentdesk_core::models::clinic::{
    Clinic, CreateClinic, DEFAULT_CLINIC_ID, UpdateClinic, WILDCARD_CLINIC_ID,
};
use dentdesk_core::models::edit_lock::EditLock;
use dentdesk_core::models::login_failure::FailureState;
use dentdesk_core::models::patient_log::{CreatePatientChange, FieldDiff, PatientChangeLogEntry};
use dentdesk_core::models::session::Session;
use dentdesk_core::models::subscription::{
    AccessCheck, CreateSubscription, Plan, Subscription, SubscriptionStatus,
};
use dentdesk_core::models::user::{CreateUser, Role, UpdateUser, User};
use dentdesk_core::scope::PatientQueryScope;
use dentdesk_core::store::{KvStore, Txn};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditTrail;
use crate::config::AuthConfig;
use crate::credentials::CredentialStore;
use crate::edit_lock::EditLockRegistry;
use crate::error::{AuthError, AuthResult};
use crate::lockout::LoginGovernor;
use crate::otp::OtpIssuer;
use crate::password;
use crate::session::SessionIssuer;
use crate::subscription::ClinicRegistry;
use crate::token::SessionClaims;

/// Maximum number of action log entries included in a clinic export.
const EXPORT_LOG_LIMIT: usize = 1000;

/// Result of a successful credential check.
#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(Session),
    /// The password was right but is temporary. No session was issued;
    /// hand the grant to [`AuthService::complete_forced_password_change`].
    PasswordChangeRequired(PasswordChangeGrant),
}

/// Proof that a user just authenticated with a temporary password.
///
/// Only [`AuthService::login`] creates one and
/// [`AuthService::complete_forced_password_change`] consumes it.
#[derive(Debug)]
pub struct PasswordChangeGrant {
    user: User,
}

impl PasswordChangeGrant {
    pub fn user(&self) -> &User {
        &self.user
    }
}

/// A freshly issued temporary password. Show it once, then drop it.
pub struct TemporaryPassword {
    pub user: User,
    pub password: String,
}

impl fmt::Debug for TemporaryPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryPassword")
            .field("user", &self.user.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Proof that a password-reset code was verified for a user.
///
/// Only [`AuthService::verify_password_reset`] creates one and
/// [`AuthService::complete_password_reset`] consumes it.
#[derive(Debug)]
pub struct PasswordResetGrant {
    user_id: Uuid,
}

impl PasswordResetGrant {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }
}

fn minutes_left(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (until - now).num_seconds();
    ((secs + 59) / 60).max(1)
}

fn user_action(user: &User, action: ActionKind, details: impl Into<String>) -> CreateActionLogEntry {
    CreateActionLogEntry {
        clinic_id: user.clinic_id.clone(),
        user_id: user.id.to_string(),
        user_name: user.name.clone(),
        action,
        entity: EntityKind::User,
        entity_id: user.id.to_string(),
        details: details.into(),
    }
}

fn actor_action(
    actor: &Session,
    action: ActionKind,
    entity: EntityKind,
    entity_id: impl Into<String>,
    details: impl Into<String>,
) -> CreateActionLogEntry {
    CreateActionLogEntry {
        clinic_id: actor.clinic_id.clone(),
        user_id: actor.user_id.to_string(),
        user_name: actor.actor_name().to_string(),
        action,
        entity,
        entity_id: entity_id.into(),
        details: details.into(),
    }
}

fn audit_entry(
    actor: &Session,
    action: AuditAction,
    target: &User,
    details: impl Into<String>,
) -> CreateAuditEntry {
    CreateAuditEntry {
        action,
        actor_id: actor.user_id.to_string(),
        actor_name: actor.actor_name().to_string(),
        target_id: target.id.to_string(),
        target_name: target.name.clone(),
        details: details.into(),
    }
}

fn self_audit(user: &User, action: AuditAction, details: impl Into<String>) -> CreateAuditEntry {
    CreateAuditEntry {
        action,
        actor_id: user.id.to_string(),
        actor_name: user.name.clone(),
        target_id: user.id.to_string(),
        target_name: user.name.clone(),
        details: details.into(),
    }
}

/// DentDesk access-control service.
///
/// `S` is the long-lived store for everything except the session; `T`
/// is the tab-lifetime store that holds the current session.
pub struct AuthService<S: KvStore, T: KvStore> {
    store: S,
    tab: T,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
    credentials: CredentialStore,
    governor: LoginGovernor,
    otp: OtpIssuer,
    sessions: SessionIssuer,
    registry: ClinicRegistry,
    audit: AuditTrail,
    edit_locks: EditLockRegistry,
}

impl<S: KvStore, T: KvStore> AuthService<S, T> {
    pub fn new(store: S, tab: T, config: AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            credentials: CredentialStore::new(
                clock.clone(),
                config.pepper.clone(),
                config.temporary_password_length,
            ),
            governor: LoginGovernor::new(
                clock.clone(),
                config.max_failed_login_attempts,
                config.lockout_duration_secs,
            ),
            otp: OtpIssuer::new(clock.clone(), config.otp_lifetime_secs),
            sessions: SessionIssuer::new(clock.clone(), config.clone()),
            registry: ClinicRegistry::new(
                clock.clone(),
                config.trial_days,
                config.default_subscription_days,
                config.missing_subscription_policy,
            ),
            audit: AuditTrail::new(
                clock.clone(),
                config.audit_log_capacity,
                config.action_log_capacity,
                config.patient_log_capacity,
                config.client_ip.clone(),
            ),
            edit_locks: EditLockRegistry::new(clock.clone(), config.edit_lock_lifetime_secs),
            store,
            tab,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn registry(&self) -> &ClinicRegistry {
        &self.registry
    }

    /// Check a new password and its confirmation against the policy
    /// without touching any state.
    pub fn check_new_password(&self, new_password: &str, confirm: &str) -> AuthResult<()> {
        password::validate_new_password(new_password, confirm, self.config.min_password_length)
    }

    fn check_initial_password(&self, password: &str) -> AuthResult<()> {
        if password.chars().count() < self.config.min_password_length {
            return Err(AuthError::PasswordTooShort {
                min: self.config.min_password_length,
            });
        }
        Ok(())
    }

    async fn require_user(&self, tx: &Txn<'_, S>, id: Uuid) -> AuthResult<User> {
        self.credentials
            .find_by_id(tx, id)
            .await?
            .ok_or_else(|| DeskError::UserNotFound(id.to_string()).into())
    }

    // -------------------------------------------------------------------
    // Login / logout
    // -------------------------------------------------------------------

    /// Authenticate with username and password.
    ///
    /// Checks run in a fixed order: lockout, credentials, active flag,
    /// clinic subscription (not for superadmin). Only a credential
    /// failure counts toward the lockout.
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<LoginOutcome> {
        let username = username.trim().to_lowercase();
        let now = self.clock.now();
        let mut tx = Txn::begin(&self.store);

        // 1. Lockout. Fails before the password is looked at.
        let state = self.governor.get_failure_state(&mut tx, &username).await?;
        if let Some(until) = state.locked_until.filter(|_| state.is_locked(now)) {
            warn!(username = %username, "Login rejected: locked out");
            return Err(AuthError::LockedOut {
                minutes_left: minutes_left(until, now),
            });
        }

        // 2. Credentials. Unknown usernames count like wrong passwords.
        let user = match self.credentials.find_by_username(&tx, &username).await? {
            Some(user) if self.credentials.verify(password, &user.password_hash)? => Some(user),
            _ => None,
        };
        let Some(user) = user else {
            let state = self.governor.record_failure(&mut tx, &username).await?;
            let max = self.governor.max_attempts();
            self.audit
                .append_action(
                    &mut tx,
                    CreateActionLogEntry {
                        clinic_id: WILDCARD_CLINIC_ID.into(),
                        user_id: String::new(),
                        user_name: username.clone(),
                        action: ActionKind::LoginFailed,
                        entity: EntityKind::User,
                        entity_id: username.clone(),
                        details: format!("Failed attempt {}/{}", state.count, max),
                    },
                )
                .await?;
            tx.commit().await?;

            warn!(username = %username, count = state.count, "Login failed");
            return Err(match state.locked_until {
                Some(until) => AuthError::LockedOut {
                    minutes_left: minutes_left(until, now),
                },
                None => AuthError::InvalidCredentials {
                    attempts_remaining: max.saturating_sub(state.count),
                },
            });
        };

        // 3. Account status.
        if !user.is_active {
            warn!(user_id = %user.id, "Login rejected: account inactive");
            return Err(AuthError::AccountInactive);
        }

        // 4. Subscription.
        if !user.role.is_superadmin() {
            let access = self
                .registry
                .check_access(&tx, &user.clinic_id, user.role)
                .await?;
            if !access.active {
                warn!(
                    user_id = %user.id,
                    clinic_id = %user.clinic_id,
                    status = ?access.status,
                    "Login rejected: subscription inactive"
                );
                return Err(AuthError::SubscriptionInactive {
                    status: access.status,
                });
            }
        }

        // 5. Success.
        self.governor.clear_failures(&mut tx, &username).await?;
        let details = if user.must_change_password {
            "Login with temporary password"
        } else {
            "Successful login"
        };
        self.audit
            .append_action(&mut tx, user_action(&user, ActionKind::Login, details))
            .await?;
        tx.commit().await?;

        // 6. Temporary password: no session until it is replaced.
        if user.must_change_password {
            info!(user_id = %user.id, "Login requires password change");
            return Ok(LoginOutcome::PasswordChangeRequired(PasswordChangeGrant { user }));
        }

        let session = self.sessions.issue(&self.tab, &user).await?;
        info!(user_id = %user.id, role = user.role.as_str(), "User logged in");
        Ok(LoginOutcome::Authenticated(session))
    }

    /// Replace a temporary password and open a session.
    ///
    /// The grant is consumed even if the password is rejected, so check
    /// it first with [`AuthService::check_new_password`].
    pub async fn complete_forced_password_change(
        &self,
        grant: PasswordChangeGrant,
        new_password: &str,
        confirm: &str,
    ) -> AuthResult<Session> {
        self.check_new_password(new_password, confirm)?;

        let user_id = grant.user.id;
        let mut tx = Txn::begin(&self.store);
        let user = self.require_user(&tx, user_id).await?;
        // A grant only covers the temporary password it was issued for.
        if !user.must_change_password || user.password_hash != grant.user.password_hash {
            return Err(DeskError::validation("no password change is pending").into());
        }
        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }

        self.credentials
            .set_password(&mut tx, user_id, new_password)
            .await?;
        let user = self
            .credentials
            .clear_must_change_password(&mut tx, user_id)
            .await?;
        self.audit
            .append_audit(
                &mut tx,
                self_audit(&user, AuditAction::PasswordChanged, "Temporary password replaced"),
            )
            .await?;
        self.audit
            .append_action(
                &mut tx,
                user_action(
                    &user,
                    ActionKind::PasswordChanged,
                    "Temporary password replaced at first login",
                ),
            )
            .await?;
        tx.commit().await?;

        let session = self.sessions.issue(&self.tab, &user).await?;
        info!(user_id = %user.id, "Temporary password replaced");
        Ok(session)
    }

    pub async fn logout(&self) -> AuthResult<()> {
        if let Some(session) = self.sessions.current(&self.tab).await? {
            let mut tx = Txn::begin(&self.store);
            self.audit
                .append_action(
                    &mut tx,
                    actor_action(
                        &session,
                        ActionKind::Logout,
                        EntityKind::User,
                        session.user_id.to_string(),
                        "User logged out",
                    ),
                )
                .await?;
            tx.commit().await?;
            info!(user_id = %session.user_id, "User logged out");
        }
        self.sessions.clear(&self.tab).await?;
        Ok(())
    }

    pub async fn current_session(&self) -> AuthResult<Option<Session>> {
        Ok(self.sessions.current(&self.tab).await?)
    }

    /// Sign `session` into a token another process can verify.
    pub fn session_token(&self, session: &Session) -> AuthResult<String> {
        self.sessions.mint_token(session)
    }

    pub fn validate_session_token(&self, token: &str) -> AuthResult<SessionClaims> {
        self.sessions.validate_token(token)
    }

    // -------------------------------------------------------------------
    // Lockouts
    // -------------------------------------------------------------------

    pub async fn failure_state(&self, username: &str) -> AuthResult<FailureState> {
        let mut tx = Txn::begin(&self.store);
        let state = self.governor.get_failure_state(&mut tx, username).await?;
        tx.commit().await?;
        Ok(state)
    }

    /// Clear every lockout. Returns the number of usernames cleared.
    pub async fn unlock_all(&self) -> AuthResult<usize> {
        let mut tx = Txn::begin(&self.store);
        let cleared = self.governor.unlock_all(&mut tx).await?;
        self.audit
            .append_action(
                &mut tx,
                CreateActionLogEntry {
                    clinic_id: WILDCARD_CLINIC_ID.into(),
                    user_id: String::new(),
                    user_name: String::new(),
                    action: ActionKind::LockoutsCleared,
                    entity: EntityKind::System,
                    entity_id: String::new(),
                    details: format!("{cleared} usernames unlocked"),
                },
            )
            .await?;
        tx.commit().await?;
        info!(cleared, "All login lockouts cleared");
        Ok(cleared)
    }

    // -------------------------------------------------------------------
    // Password reset (forgot password)
    // -------------------------------------------------------------------

    /// Issue a reset code for the user matching `identifier` (username,
    /// e-mail or phone). The code must be delivered out of band.
    pub async fn request_password_reset(&self, identifier: &str) -> AuthResult<(User, String)> {
        let mut tx = Txn::begin(&self.store);
        let user = self
            .credentials
            .find_by_identifier(&tx, identifier)
            .await?
            .ok_or_else(|| DeskError::UserNotFound(identifier.trim().to_string()))?;

        let code = self.otp.issue(&mut tx, user.id).await?;
        self.audit
            .append_action(
                &mut tx,
                user_action(
                    &user,
                    ActionKind::PasswordResetRequested,
                    "One-time code issued for password reset",
                ),
            )
            .await?;
        tx.commit().await?;

        info!(user_id = %user.id, "Password reset requested");
        Ok((user, code))
    }

    pub async fn verify_password_reset(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> AuthResult<PasswordResetGrant> {
        let mut tx = Txn::begin(&self.store);
        if !self.otp.verify(&mut tx, user_id, code).await? {
            warn!(user_id = %user_id, "Invalid or expired reset code");
            return Err(AuthError::InvalidOrExpiredOtp);
        }
        tx.commit().await?;
        Ok(PasswordResetGrant { user_id })
    }

    /// Set the new password for a verified reset.
    ///
    /// The grant is consumed even if the password is rejected, so check
    /// it first with [`AuthService::check_new_password`].
    pub async fn complete_password_reset(
        &self,
        grant: PasswordResetGrant,
        new_password: &str,
        confirm: &str,
    ) -> AuthResult<User> {
        self.check_new_password(new_password, confirm)?;

        let mut tx = Txn::begin(&self.store);
        let user = self
            .credentials
            .set_password(&mut tx, grant.user_id, new_password)
            .await?;
        self.audit
            .append_action(
                &mut tx,
                user_action(
                    &user,
                    ActionKind::PasswordResetCompleted,
                    "Password reset with one-time code",
                ),
            )
            .await?;
        tx.commit().await?;

        info!(user_id = %user.id, "Password reset completed");
        Ok(user)
    }

    // -------------------------------------------------------------------
    // Password change
    // -------------------------------------------------------------------

    /// Issue a code the actor needs to change their own password.
    pub async fn request_password_change_code(&self, actor: &Session) -> AuthResult<String> {
        let mut tx = Txn::begin(&self.store);
        let user = self.require_user(&tx, actor.user_id).await?;
        let code = self.otp.issue(&mut tx, user.id).await?;
        self.audit
            .append_action(
                &mut tx,
                user_action(
                    &user,
                    ActionKind::PasswordResetRequested,
                    "One-time code issued for password change",
                ),
            )
            .await?;
        tx.commit().await?;
        Ok(code)
    }

    /// Change `target_id`'s password.
    ///
    /// Changing one's own password requires a valid one-time `code`;
    /// an administrator changing someone else's does not.
    pub async fn change_password(
        &self,
        actor: &Session,
        target_id: Uuid,
        new_password: &str,
        confirm: &str,
        code: Option<&str>,
    ) -> AuthResult<User> {
        self.check_new_password(new_password, confirm)?;

        let mut tx = Txn::begin(&self.store);
        let target = self.require_user(&tx, target_id).await?;

        let own = target.id == actor.user_id;
        if own {
            let verified = match code {
                Some(code) => self.otp.verify(&mut tx, target.id, code).await?,
                None => false,
            };
            if !verified {
                warn!(user_id = %target.id, "Password change rejected: invalid code");
                return Err(AuthError::InvalidOrExpiredOtp);
            }
        }

        let user = self
            .credentials
            .set_password(&mut tx, target.id, new_password)
            .await?;
        let details = if own {
            "Password changed with one-time code"
        } else {
            "Password changed by administrator"
        };
        self.audit
            .append_audit(
                &mut tx,
                audit_entry(actor, AuditAction::PasswordChanged, &user, details),
            )
            .await?;
        self.audit
            .append_action(
                &mut tx,
                actor_action(
                    actor,
                    ActionKind::PasswordChanged,
                    EntityKind::User,
                    user.id.to_string(),
                    details,
                ),
            )
            .await?;
        tx.commit().await?;

        info!(actor_id = %actor.user_id, user_id = %user.id, "Password changed");
        Ok(user)
    }

    /// Update the actor's own contact details and, optionally, password.
    ///
    /// `current_password` is checked before anything else. Only name,
    /// username, phone and e-mail are taken from `patch`.
    pub async fn update_own_profile(
        &self,
        actor: &Session,
        current_password: &str,
        patch: UpdateUser,
        new_password: Option<(&str, &str)>,
    ) -> AuthResult<User> {
        let mut tx = Txn::begin(&self.store);
        let user = self.require_user(&tx, actor.user_id).await?;
        if !self
            .credentials
            .verify(current_password, &user.password_hash)?
        {
            return Err(AuthError::CurrentPasswordIncorrect);
        }
        if let Some((new_password, confirm)) = new_password {
            self.check_new_password(new_password, confirm)?;
        }

        let patch = UpdateUser {
            name: patch.name,
            username: patch.username,
            phone: patch.phone,
            email: patch.email,
            ..Default::default()
        };
        let mut user = user;
        if !patch.is_empty() {
            let fields = patch.touched_fields().join(", ");
            user = self.credentials.update(&mut tx, user.id, patch).await?;
            self.audit
                .append_action(
                    &mut tx,
                    user_action(&user, ActionKind::ProfileUpdated, format!("Fields: {fields}")),
                )
                .await?;
        }
        if let Some((new_password, _)) = new_password {
            user = self
                .credentials
                .set_password(&mut tx, user.id, new_password)
                .await?;
            self.audit
                .append_audit(
                    &mut tx,
                    self_audit(&user, AuditAction::PasswordChanged, "Changed own password"),
                )
                .await?;
            self.audit
                .append_action(
                    &mut tx,
                    user_action(&user, ActionKind::PasswordChanged, "Changed own password"),
                )
                .await?;
        }
        tx.commit().await?;
        Ok(user)
    }

    // -------------------------------------------------------------------
    // User administration
    // -------------------------------------------------------------------

    /// Users the actor may see: everyone for a superadmin, otherwise the
    /// actor's clinic.
    pub async fn list_users(&self, actor: &Session) -> AuthResult<Vec<User>> {
        let tx = Txn::begin(&self.store);
        Ok(self
            .credentials
            .list_for_clinic(&tx, &actor.clinic_id, actor.role)
            .await?)
    }

    pub async fn find_user(&self, id: Uuid) -> AuthResult<Option<User>> {
        let tx = Txn::begin(&self.store);
        Ok(self.credentials.find_by_id(&tx, id).await?)
    }

    /// Create a user. Without an explicit clinic the user joins the
    /// actor's clinic.
    pub async fn create_user(&self, actor: &Session, mut input: CreateUser) -> AuthResult<User> {
        self.check_initial_password(&input.password)?;
        if input.clinic_id.is_none() && !actor.role.is_superadmin() {
            input.clinic_id = Some(actor.clinic_id.clone());
        }

        let mut tx = Txn::begin(&self.store);
        let user = self.credentials.create(&mut tx, input).await?;
        self.audit
            .append_audit(
                &mut tx,
                audit_entry(
                    actor,
                    AuditAction::UserCreated,
                    &user,
                    format!("{}: {}", user.role.as_str(), user.username),
                ),
            )
            .await?;
        self.audit
            .append_action(
                &mut tx,
                actor_action(
                    actor,
                    ActionKind::UserCreated,
                    EntityKind::User,
                    user.id.to_string(),
                    user.username.clone(),
                ),
            )
            .await?;
        tx.commit().await?;

        info!(actor_id = %actor.user_id, user_id = %user.id, "User created");
        Ok(user)
    }

    pub async fn update_user(&self, actor: &Session, id: Uuid, patch: UpdateUser) -> AuthResult<User> {
        let fields = patch.touched_fields().join(", ");

        let mut tx = Txn::begin(&self.store);
        let user = self.credentials.update(&mut tx, id, patch).await?;
        self.audit
            .append_audit(
                &mut tx,
                audit_entry(
                    actor,
                    AuditAction::UserEdited,
                    &user,
                    format!("Fields: {fields}"),
                ),
            )
            .await?;
        self.audit
            .append_action(
                &mut tx,
                actor_action(
                    actor,
                    ActionKind::UserUpdated,
                    EntityKind::User,
                    user.id.to_string(),
                    format!("Fields: {fields}"),
                ),
            )
            .await?;
        tx.commit().await?;
        Ok(user)
    }

    /// Block an active user or unblock a blocked one.
    pub async fn toggle_user_active(&self, actor: &Session, id: Uuid) -> AuthResult<User> {
        let mut tx = Txn::begin(&self.store);
        let user = self.credentials.toggle_active(&mut tx, id).await?;
        let (audit_action, action, details) = if user.is_active {
            (
                AuditAction::UserUnblocked,
                ActionKind::UserUnblock,
                "User unblocked",
            )
        } else {
            (
                AuditAction::UserBlocked,
                ActionKind::UserBlock,
                "User blocked",
            )
        };
        self.audit
            .append_audit(&mut tx, audit_entry(actor, audit_action, &user, details))
            .await?;
        self.audit
            .append_action(
                &mut tx,
                actor_action(
                    actor,
                    action,
                    EntityKind::User,
                    user.id.to_string(),
                    user.name.clone(),
                ),
            )
            .await?;
        tx.commit().await?;

        info!(actor_id = %actor.user_id, user_id = %user.id, active = user.is_active, "User active flag toggled");
        Ok(user)
    }

    /// Give the user a temporary password they must change at next login.
    pub async fn reset_user_password(&self, actor: &Session, id: Uuid) -> AuthResult<TemporaryPassword> {
        let mut tx = Txn::begin(&self.store);
        let (user, password) = self.credentials.reset_to_temporary(&mut tx, id).await?;
        self.audit
            .append_audit(
                &mut tx,
                audit_entry(
                    actor,
                    AuditAction::PasswordReset,
                    &user,
                    "Temporary password issued",
                ),
            )
            .await?;
        self.audit
            .append_action(
                &mut tx,
                actor_action(
                    actor,
                    ActionKind::PasswordReset,
                    EntityKind::User,
                    user.id.to_string(),
                    format!("Temporary password set for {}", user.name),
                ),
            )
            .await?;
        tx.commit().await?;

        info!(actor_id = %actor.user_id, user_id = %user.id, "Temporary password issued");
        Ok(TemporaryPassword { user, password })
    }

    // -------------------------------------------------------------------
    // Clinics & subscriptions
    // -------------------------------------------------------------------

    pub async fn list_clinics(&self) -> AuthResult<Vec<Clinic>> {
        let tx = Txn::begin(&self.store);
        Ok(self.registry.list_clinics(&tx).await?)
    }

    pub async fn get_clinic(&self, id: &str) -> AuthResult<Option<Clinic>> {
        let tx = Txn::begin(&self.store);
        Ok(self.registry.get_clinic(&tx, id).await?)
    }

    pub async fn list_subscriptions(&self) -> AuthResult<Vec<Subscription>> {
        let tx = Txn::begin(&self.store);
        Ok(self.registry.list_subscriptions(&tx).await?)
    }

    pub async fn get_subscription(&self, clinic_id: &str) -> AuthResult<Option<Subscription>> {
        let tx = Txn::begin(&self.store);
        Ok(self.registry.get_subscription(&tx, clinic_id).await?)
    }

    pub async fn check_access(&self, clinic_id: &str, role: Role) -> AuthResult<AccessCheck> {
        let tx = Txn::begin(&self.store);
        Ok(self.registry.check_access(&tx, clinic_id, role).await?)
    }

    /// Create a clinic, its trial subscription and its `clinic_admin`
    /// account in one step.
    pub async fn create_clinic_with_admin(
        &self,
        actor: &Session,
        clinic: CreateClinic,
        mut admin: CreateUser,
    ) -> AuthResult<(Clinic, User)> {
        self.check_initial_password(&admin.password)?;

        let mut tx = Txn::begin(&self.store);
        let clinic = self.registry.create_clinic(&mut tx, clinic).await?;

        admin.role = Role::ClinicAdmin;
        admin.clinic_id = Some(clinic.id.clone());
        let user = self.credentials.create(&mut tx, admin).await?;

        let mut clinic_action = actor_action(
            actor,
            ActionKind::ClinicCreated,
            EntityKind::Clinic,
            clinic.id.clone(),
            clinic.name.clone(),
        );
        clinic_action.clinic_id = clinic.id.clone();
        self.audit.append_action(&mut tx, clinic_action).await?;

        let mut user_created = actor_action(
            actor,
            ActionKind::UserCreated,
            EntityKind::User,
            user.id.to_string(),
            format!("clinic_admin: {}", user.username),
        );
        user_created.clinic_id = clinic.id.clone();
        self.audit.append_action(&mut tx, user_created).await?;
        self.audit
            .append_audit(
                &mut tx,
                audit_entry(
                    actor,
                    AuditAction::UserCreated,
                    &user,
                    format!("clinic_admin: {}", user.username),
                ),
            )
            .await?;
        tx.commit().await?;

        info!(actor_id = %actor.user_id, clinic_id = %clinic.id, "Clinic created");
        Ok((clinic, user))
    }

    pub async fn update_clinic(
        &self,
        actor: &Session,
        id: &str,
        patch: UpdateClinic,
    ) -> AuthResult<Clinic> {
        let mut tx = Txn::begin(&self.store);
        let clinic = self.registry.update_clinic(&mut tx, id, patch).await?;
        let mut action = actor_action(
            actor,
            ActionKind::ClinicUpdated,
            EntityKind::Clinic,
            clinic.id.clone(),
            clinic.name.clone(),
        );
        action.clinic_id = clinic.id.clone();
        self.audit.append_action(&mut tx, action).await?;
        tx.commit().await?;
        Ok(clinic)
    }

    pub async fn set_subscription(
        &self,
        actor: &Session,
        clinic_id: &str,
        plan: Plan,
        status: SubscriptionStatus,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<Subscription> {
        let mut tx = Txn::begin(&self.store);
        if self.registry.get_clinic(&tx, clinic_id).await?.is_none() {
            return Err(DeskError::ClinicNotFound(clinic_id.to_string()).into());
        }
        let sub = self
            .registry
            .set_subscription(&mut tx, clinic_id, plan, status, expires_at)
            .await?;

        let mut action = actor_action(
            actor,
            ActionKind::SubscriptionUpdated,
            EntityKind::Subscription,
            sub.id.to_string(),
            format!(
                "{}/{} until {}",
                sub.plan.as_str(),
                sub.status.as_str(),
                sub.expires_at.format("%Y-%m-%d")
            ),
        );
        action.clinic_id = clinic_id.to_string();
        self.audit.append_action(&mut tx, action).await?;
        tx.commit().await?;

        info!(actor_id = %actor.user_id, clinic_id, "Subscription updated");
        Ok(sub)
    }

    /// Pretty-printed JSON snapshot of a clinic: its record, its
    /// subscription and its most recent action log entries.
    pub async fn export_clinic_data(&self, clinic_id: &str) -> AuthResult<String> {
        let tx = Txn::begin(&self.store);
        let clinic = self
            .registry
            .get_clinic(&tx, clinic_id)
            .await?
            .ok_or_else(|| DeskError::ClinicNotFound(clinic_id.to_string()))?;
        let subscription = self.registry.get_subscription(&tx, clinic_id).await?;
        let logs = self
            .audit
            .list_actions(
                &tx,
                &ActionLogFilter {
                    clinic_id: Some(clinic_id.to_string()),
                    limit: Some(EXPORT_LOG_LIMIT),
                },
            )
            .await?;

        let document = json!({
            "clinic": clinic,
            "subscription": subscription,
            "logs": logs,
            "exported_at": self.clock.now(),
        });
        Ok(serde_json::to_string_pretty(&document).map_err(DeskError::from)?)
    }

    // -------------------------------------------------------------------
    // Logs
    // -------------------------------------------------------------------

    pub async fn list_audit(&self) -> AuthResult<Vec<AuditEntry>> {
        let tx = Txn::begin(&self.store);
        Ok(self.audit.list_audit(&tx).await?)
    }

    pub async fn list_actions(&self, filter: &ActionLogFilter) -> AuthResult<Vec<ActionLogEntry>> {
        let tx = Txn::begin(&self.store);
        Ok(self.audit.list_actions(&tx, filter).await?)
    }

    pub async fn list_patient_changes(
        &self,
        patient_id: Option<&str>,
    ) -> AuthResult<Vec<PatientChangeLogEntry>> {
        let tx = Txn::begin(&self.store);
        Ok(self.audit.list_patient_changes(&tx, patient_id).await?)
    }

    // -------------------------------------------------------------------
    // Patients
    // -------------------------------------------------------------------

    /// Row filter the patient table API must apply for `session`.
    pub fn patient_scope(&self, session: &Session) -> PatientQueryScope {
        PatientQueryScope::for_session(session)
    }

    /// Record a saved patient edit: one change-log entry per field and a
    /// single audit entry. Nothing is written when `diffs` is empty.
    pub async fn record_patient_edit(
        &self,
        session: &Session,
        patient_id: &str,
        patient_name: &str,
        diffs: &[FieldDiff],
    ) -> AuthResult<()> {
        if diffs.is_empty() {
            return Ok(());
        }

        let mut tx = Txn::begin(&self.store);
        for diff in diffs {
            self.audit
                .append_patient_change(
                    &mut tx,
                    CreatePatientChange {
                        patient_id: patient_id.to_string(),
                        field_name: diff.field_name.clone(),
                        old_value: diff.old_value.clone(),
                        new_value: diff.new_value.clone(),
                        changed_by: session.user_id.to_string(),
                        changed_by_name: session.actor_name().to_string(),
                    },
                )
                .await?;
        }
        let fields: Vec<&str> = diffs.iter().map(|d| d.field_name.as_str()).collect();
        self.audit
            .append_audit(
                &mut tx,
                CreateAuditEntry {
                    action: AuditAction::PatientEdited,
                    actor_id: session.user_id.to_string(),
                    actor_name: session.actor_name().to_string(),
                    target_id: patient_id.to_string(),
                    target_name: patient_name.to_string(),
                    details: format!("Fields: {}", fields.join(", ")),
                },
            )
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn acquire_edit_lock(&self, patient_id: &str, session: &Session) -> AuthResult<EditLock> {
        let mut tx = Txn::begin(&self.store);
        let lock = self.edit_locks.acquire(&mut tx, patient_id, session).await?;
        tx.commit().await?;
        Ok(lock)
    }

    pub async fn inspect_edit_lock(&self, patient_id: &str) -> AuthResult<Option<EditLock>> {
        let mut tx = Txn::begin(&self.store);
        let lock = self.edit_locks.inspect(&mut tx, patient_id).await?;
        tx.commit().await?;
        Ok(lock)
    }

    pub async fn release_edit_lock(&self, patient_id: &str) -> AuthResult<()> {
        let mut tx = Txn::begin(&self.store);
        self.edit_locks.release(&mut tx, patient_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Run `body` while holding the edit lock on `patient_id`. See
    /// [`EditLockRegistry::hold`].
    pub async fn with_edit_lock<F, Fut, R>(
        &self,
        patient_id: &str,
        session: &Session,
        body: F,
    ) -> AuthResult<R>
    where
        F: FnOnce(Option<EditLock>) -> Fut,
        Fut: Future<Output = AuthResult<R>>,
    {
        self.edit_locks
            .hold(&self.store, patient_id, session, body)
            .await
    }

    // -------------------------------------------------------------------
    // Bootstrap
    // -------------------------------------------------------------------

    /// Seed the default clinic, its subscription and the superadmin
    /// account where missing. Safe to run on every start.
    ///
    /// Returns the superadmin's password only when one was generated.
    pub async fn bootstrap(&self) -> AuthResult<Option<TemporaryPassword>> {
        let now = self.clock.now();
        let mut tx = Txn::begin(&self.store);
        let mut seeded = Vec::new();

        if self
            .registry
            .get_clinic(&tx, DEFAULT_CLINIC_ID)
            .await?
            .is_none()
        {
            self.registry
                .insert_clinic(
                    &mut tx,
                    Clinic {
                        id: DEFAULT_CLINIC_ID.into(),
                        name: "Main clinic".into(),
                        phone: String::new(),
                        email: String::new(),
                        address: String::new(),
                        license: None,
                        is_active: true,
                        created_at: now,
                    },
                )
                .await?;
            seeded.push("clinic");
        }

        if self
            .registry
            .get_subscription(&tx, DEFAULT_CLINIC_ID)
            .await?
            .is_none()
        {
            self.registry
                .create_subscription(
                    &mut tx,
                    CreateSubscription {
                        clinic_id: DEFAULT_CLINIC_ID.into(),
                        plan: Plan::Professional,
                        status: SubscriptionStatus::Active,
                        days: self.config.default_subscription_days,
                    },
                )
                .await?;
            seeded.push("subscription");
        }

        let has_superadmin = self
            .credentials
            .list(&tx)
            .await?
            .iter()
            .any(|u| u.role.is_superadmin());
        let mut generated = None;
        if !has_superadmin {
            let (password, was_generated) = match &self.config.bootstrap_superadmin_password {
                Some(p) => (p.clone(), false),
                None => (
                    password::generate_temporary_password(self.config.temporary_password_length),
                    true,
                ),
            };
            let user = self
                .credentials
                .create(
                    &mut tx,
                    CreateUser {
                        name: "Super Admin".into(),
                        username: self.config.bootstrap_superadmin_username.clone(),
                        phone: String::new(),
                        email: String::new(),
                        role: Role::Superadmin,
                        password: password.clone(),
                        clinic_id: None,
                    },
                )
                .await?;
            let user = self
                .credentials
                .update(
                    &mut tx,
                    user.id,
                    UpdateUser {
                        must_change_password: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
            if was_generated {
                generated = Some(TemporaryPassword { user, password });
            }
            seeded.push("superadmin");
        }

        if seeded.is_empty() {
            return Ok(None);
        }
        self.audit
            .append_action(
                &mut tx,
                CreateActionLogEntry {
                    clinic_id: WILDCARD_CLINIC_ID.into(),
                    user_id: String::new(),
                    user_name: String::new(),
                    action: ActionKind::DefaultsSeeded,
                    entity: EntityKind::System,
                    entity_id: String::new(),
                    details: format!("Seeded: {}", seeded.join(", ")),
                },
            )
            .await?;
        tx.commit().await?;

        info!(seeded = ?seeded, "Default data seeded");
        Ok(generated)
    }
}

impl<S: KvStore, T: KvStore> fmt::Debug for AuthService<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthService")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn minutes_left_rounds_up_to_at_least_one() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(minutes_left(now + Duration::seconds(120), now), 2);
        assert_eq!(minutes_left(now + Duration::seconds(61), now), 2);
        assert_eq!(minutes_left(now + Duration::seconds(5), now), 1);
        assert_eq!(minutes_left(now, now), 1);
    }

    #[test]
    fn temporary_password_debug_is_redacted() {
        let tmp = TemporaryPassword {
            user: User {
                id: Uuid::new_v4(),
                name: "Admin".into(),
                username: "admin".into(),
                phone: String::new(),
                email: String::new(),
                role: Role::Admin,
                clinic_id: DEFAULT_CLINIC_ID.into(),
                password_hash: String::new(),
                is_active: true,
                must_change_password: true,
                created_at: Utc::now(),
            },
            password: "Secr3tPass".into(),
        };
        let printed = format!("{tmp:?}");
        assert!(!printed.contains("Secr3tPass"));
        assert!(printed.contains("<redacted>"));
    }
}
