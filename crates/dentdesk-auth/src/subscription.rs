//! Clinic & subscription registry.
//!
//! Answers whether a clinic may use the product right now. A clinic
//! without a subscription record is let in or kept out according to
//! [`MissingSubscriptionPolicy`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dentdesk_core::clock::Clock;
use dentdesk_core::error::{DeskError, DeskResult};
use dentdesk_core::models::clinic::{Clinic, CreateClinic, UpdateClinic};
use dentdesk_core::models::subscription::{
    AccessCheck, AccessPlan, CreateSubscription, MissingSubscriptionPolicy, Plan, Subscription,
    SubscriptionStatus, UpdateSubscription,
};
use dentdesk_core::models::user::Role;
use dentdesk_core::store::{KvStore, Txn, keys};
use uuid::Uuid;

const DAY_MS: i64 = 24 * 3600 * 1000;

#[derive(Debug, Clone)]
pub struct ClinicRegistry {
    clock: Arc<dyn Clock>,
    trial_days: i64,
    default_days: i64,
    missing_policy: MissingSubscriptionPolicy,
}

/// Whole days until `expires_at`, rounded up and never negative.
fn days_left(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let ms = (expires_at - now).num_milliseconds();
    if ms <= 0 { 0 } else { (ms + DAY_MS - 1) / DAY_MS }
}

impl ClinicRegistry {
    pub fn new(
        clock: Arc<dyn Clock>,
        trial_days: i64,
        default_days: i64,
        missing_policy: MissingSubscriptionPolicy,
    ) -> Self {
        Self {
            clock,
            trial_days,
            default_days,
            missing_policy,
        }
    }

    // -------------------------------------------------------------------
    // Clinics
    // -------------------------------------------------------------------

    pub async fn list_clinics<S: KvStore>(&self, tx: &Txn<'_, S>) -> DeskResult<Vec<Clinic>> {
        tx.load_or_default(keys::CLINICS).await
    }

    pub async fn get_clinic<S: KvStore>(&self, tx: &Txn<'_, S>, id: &str) -> DeskResult<Option<Clinic>> {
        Ok(self.list_clinics(tx).await?.into_iter().find(|c| c.id == id))
    }

    /// Create a clinic together with its trial subscription.
    pub async fn create_clinic<S: KvStore>(
        &self,
        tx: &mut Txn<'_, S>,
        input: CreateClinic,
    ) -> DeskResult<Clinic> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(DeskError::validation("clinic name must not be empty"));
        }

        let clinic = Clinic {
            id: format!("clinic_{}", Uuid::new_v4().simple()),
            name: name.to_string(),
            phone: input.phone.trim().to_string(),
            email: input.email.trim().to_string(),
            address: input.address.trim().to_string(),
            license: input.license.filter(|l| !l.trim().is_empty()),
            is_active: true,
            created_at: self.clock.now(),
        };
        self.insert_clinic(tx, clinic.clone()).await?;

        self.create_subscription(
            tx,
            CreateSubscription {
                clinic_id: clinic.id.clone(),
                plan: Plan::Trial,
                status: SubscriptionStatus::Trial,
                days: self.trial_days,
            },
        )
        .await?;

        Ok(clinic)
    }

    /// Store a fully formed clinic, keeping its id.
    pub async fn insert_clinic<S: KvStore>(&self, tx: &mut Txn<'_, S>, clinic: Clinic) -> DeskResult<()> {
        let mut clinics = self.list_clinics(tx).await?;
        if clinics.iter().any(|c| c.id == clinic.id) {
            return Err(DeskError::validation(format!(
                "clinic {} already exists",
                clinic.id
            )));
        }
        clinics.push(clinic);
        tx.stage(keys::CLINICS, &clinics)
    }

    pub async fn update_clinic<S: KvStore>(
        &self,
        tx: &mut Txn<'_, S>,
        id: &str,
        patch: UpdateClinic,
    ) -> DeskResult<Clinic> {
        let mut clinics = self.list_clinics(tx).await?;
        let clinic = clinics
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| DeskError::ClinicNotFound(id.to_string()))?;

        if let Some(name) = patch.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(DeskError::validation("clinic name must not be empty"));
            }
            clinic.name = name.to_string();
        }
        if let Some(phone) = patch.phone {
            clinic.phone = phone.trim().to_string();
        }
        if let Some(email) = patch.email {
            clinic.email = email.trim().to_string();
        }
        if let Some(address) = patch.address {
            clinic.address = address.trim().to_string();
        }
        if let Some(license) = patch.license {
            clinic.license = license;
        }
        if let Some(active) = patch.is_active {
            clinic.is_active = active;
        }

        let updated = clinic.clone();
        tx.stage(keys::CLINICS, &clinics)?;
        Ok(updated)
    }

    // -------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------

    pub async fn list_subscriptions<S: KvStore>(&self, tx: &Txn<'_, S>) -> DeskResult<Vec<Subscription>> {
        tx.load_or_default(keys::SUBSCRIPTIONS).await
    }

    pub async fn get_subscription<S: KvStore>(
        &self,
        tx: &Txn<'_, S>,
        clinic_id: &str,
    ) -> DeskResult<Option<Subscription>> {
        Ok(self
            .list_subscriptions(tx)
            .await?
            .into_iter()
            .find(|s| s.clinic_id == clinic_id))
    }

    /// Create a subscription, replacing any existing one for the clinic.
    pub async fn create_subscription<S: KvStore>(
        &self,
        tx: &mut Txn<'_, S>,
        input: CreateSubscription,
    ) -> DeskResult<Subscription> {
        let now = self.clock.now();
        let days = if input.days > 0 {
            input.days
        } else {
            self.default_days
        };
        let subscription = Subscription {
            id: Uuid::new_v4(),
            clinic_id: input.clinic_id,
            plan: input.plan,
            status: input.status,
            expires_at: now + Duration::days(days),
            limits: input.plan.limits(),
            created_at: now,
        };

        let mut subs = self.list_subscriptions(tx).await?;
        match subs
            .iter_mut()
            .find(|s| s.clinic_id == subscription.clinic_id)
        {
            Some(existing) => *existing = subscription.clone(),
            None => subs.push(subscription.clone()),
        }
        tx.stage(keys::SUBSCRIPTIONS, &subs)?;
        Ok(subscription)
    }

    pub async fn update_subscription<S: KvStore>(
        &self,
        tx: &mut Txn<'_, S>,
        clinic_id: &str,
        patch: UpdateSubscription,
    ) -> DeskResult<Subscription> {
        let mut subs = self.list_subscriptions(tx).await?;
        let sub = subs
            .iter_mut()
            .find(|s| s.clinic_id == clinic_id)
            .ok_or_else(|| DeskError::SubscriptionNotFound(clinic_id.to_string()))?;

        if let Some(plan) = patch.plan {
            sub.plan = plan;
            // Limits follow the plan unless given explicitly.
            sub.limits = plan.limits();
        }
        if let Some(status) = patch.status {
            sub.status = status;
        }
        if let Some(expires_at) = patch.expires_at {
            sub.expires_at = expires_at;
        }
        if let Some(limits) = patch.limits {
            sub.limits = limits;
        }

        let updated = sub.clone();
        tx.stage(keys::SUBSCRIPTIONS, &subs)?;
        Ok(updated)
    }

    /// Update the clinic's subscription, or create one expiring at
    /// `expires_at` when it has none.
    pub async fn set_subscription<S: KvStore>(
        &self,
        tx: &mut Txn<'_, S>,
        clinic_id: &str,
        plan: Plan,
        status: SubscriptionStatus,
        expires_at: DateTime<Utc>,
    ) -> DeskResult<Subscription> {
        if self.get_subscription(tx, clinic_id).await?.is_none() {
            self.create_subscription(
                tx,
                CreateSubscription {
                    clinic_id: clinic_id.to_string(),
                    plan,
                    status,
                    days: self.default_days,
                },
            )
            .await?;
        }
        self.update_subscription(
            tx,
            clinic_id,
            UpdateSubscription {
                plan: Some(plan),
                status: Some(status),
                expires_at: Some(expires_at),
                limits: None,
            },
        )
        .await
    }

    /// Decide whether a member of `clinic_id` with `role` may sign in.
    pub async fn check_access<S: KvStore>(
        &self,
        tx: &Txn<'_, S>,
        clinic_id: &str,
        role: Role,
    ) -> DeskResult<AccessCheck> {
        if role.is_superadmin() {
            return Ok(AccessCheck::unrestricted(AccessPlan::Superadmin));
        }
        if clinic_id.trim().is_empty() {
            return Ok(AccessCheck::unrestricted(AccessPlan::Legacy));
        }

        let Some(sub) = self.get_subscription(tx, clinic_id).await? else {
            return Ok(match self.missing_policy {
                MissingSubscriptionPolicy::FailOpen => {
                    AccessCheck::unrestricted(AccessPlan::Unmanaged)
                }
                MissingSubscriptionPolicy::FailClosed => AccessCheck {
                    active: false,
                    days_left: None,
                    status: SubscriptionStatus::Expired,
                    plan: AccessPlan::Unmanaged,
                    limits: None,
                },
            });
        };

        let now = self.clock.now();
        let status = if now >= sub.expires_at {
            SubscriptionStatus::Expired
        } else {
            sub.status
        };
        Ok(AccessCheck {
            active: !matches!(
                status,
                SubscriptionStatus::Blocked | SubscriptionStatus::Expired
            ),
            days_left: Some(days_left(sub.expires_at, now)),
            status,
            plan: AccessPlan::Plan(sub.plan),
            limits: Some(sub.limits),
        })
    }
}
