//! Failed-login bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-username failure counter, keyed by the lower-cased username.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginFailureRecord {
    pub count: u32,
    /// Set only once `count` reaches the lockout threshold.
    pub locked_until: Option<DateTime<Utc>>,
    pub last_fail_at: DateTime<Utc>,
}

/// The view of a [`LoginFailureRecord`] handed to callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureState {
    pub count: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl FailureState {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }
}

impl From<&LoginFailureRecord> for FailureState {
    fn from(record: &LoginFailureRecord) -> Self {
        Self {
            count: record.count,
            locked_until: record.locked_until,
        }
    }
}
