//! Subscription domain model and the access-check result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Trial,
    Starter,
    Professional,
}

impl Plan {
    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Trial => "trial",
            Plan::Starter => "starter",
            Plan::Professional => "professional",
        }
    }

    /// Informational caps attached to each plan. Nothing in this
    /// workspace enforces them.
    pub fn limits(self) -> PlanLimits {
        match self {
            Plan::Trial => PlanLimits {
                doctors: 1,
                patients: 100,
                storage_mb: 50,
            },
            Plan::Starter => PlanLimits {
                doctors: 3,
                patients: 500,
                storage_mb: 256,
            },
            Plan::Professional => PlanLimits {
                doctors: 10,
                patients: 5000,
                storage_mb: 2048,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trial,
    Expired,
    Blocked,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanLimits {
    pub doctors: u32,
    pub patients: u32,
    pub storage_mb: u32,
}

/// The plan/status state gating a clinic's access. At most one per
/// clinic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub clinic_id: String,
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub expires_at: DateTime<Utc>,
    pub limits: PlanLimits,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// `status ∉ {expired, blocked}` and not yet past `expires_at`.
    pub fn is_effectively_active(&self, now: DateTime<Utc>) -> bool {
        !matches!(
            self.status,
            SubscriptionStatus::Expired | SubscriptionStatus::Blocked
        ) && now < self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscription {
    pub clinic_id: String,
    pub plan: Plan,
    pub status: SubscriptionStatus,
    /// Lifetime in days from creation.
    pub days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateSubscription {
    pub plan: Option<Plan>,
    pub status: Option<SubscriptionStatus>,
    pub expires_at: Option<DateTime<Utc>>,
    pub limits: Option<PlanLimits>,
}

/// What to report for a clinic that has no subscription record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingSubscriptionPolicy {
    /// Allow access until an administrator creates the record.
    #[default]
    FailOpen,
    /// Deny access until an administrator creates the record.
    FailClosed,
}

/// Where the plan in an [`AccessCheck`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPlan {
    /// Superadmin bypass.
    Superadmin,
    /// No clinic id at all.
    Legacy,
    /// Clinic without a subscription record.
    Unmanaged,
    Plan(Plan),
}

/// Answer to "may this clinic use the product right now".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessCheck {
    pub active: bool,
    /// Whole days until expiry, rounded up and floored at zero.
    /// `None` when no subscription record drives the answer.
    pub days_left: Option<i64>,
    pub status: SubscriptionStatus,
    pub plan: AccessPlan,
    pub limits: Option<PlanLimits>,
}

impl AccessCheck {
    pub fn unrestricted(plan: AccessPlan) -> Self {
        Self {
            active: true,
            days_left: None,
            status: SubscriptionStatus::Active,
            plan,
            limits: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_wire_format() {
        for plan in [Plan::Trial, Plan::Starter, Plan::Professional] {
            assert_eq!(
                serde_json::to_value(plan).unwrap(),
                serde_json::Value::from(plan.as_str())
            );
        }
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::Trial,
            SubscriptionStatus::Expired,
            SubscriptionStatus::Blocked,
        ] {
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::Value::from(status.as_str())
            );
        }
    }
}
