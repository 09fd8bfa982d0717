//! Login-attempt governor.
//!
//! Failed logins are counted per lower-cased username. Reaching the
//! threshold locks the username for a fixed window; the lock is
//! cleared lazily by the first read after it has run out.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use dentdesk_core::clock::Clock;
use dentdesk_core::error::DeskResult;
use dentdesk_core::models::login_failure::{FailureState, LoginFailureRecord};
use dentdesk_core::store::{KvStore, Txn, keys};
use tracing::warn;

type FailureMap = BTreeMap<String, LoginFailureRecord>;

#[derive(Debug, Clone)]
pub struct LoginGovernor {
    clock: Arc<dyn Clock>,
    max_attempts: u32,
    lockout: Duration,
}

impl LoginGovernor {
    pub fn new(clock: Arc<dyn Clock>, max_attempts: u32, lockout_secs: u64) -> Self {
        Self {
            clock,
            max_attempts,
            lockout: Duration::seconds(lockout_secs as i64),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn get_failure_state<S: KvStore>(
        &self,
        tx: &mut Txn<'_, S>,
        username: &str,
    ) -> DeskResult<FailureState> {
        let key = username.trim().to_lowercase();
        let mut failures: FailureMap = tx.load_or_default(keys::LOGIN_FAILURES).await?;
        let Some(record) = failures.get(&key) else {
            return Ok(FailureState::default());
        };

        let now = self.clock.now();
        let state = FailureState::from(record);
        if state.locked_until.is_some() && !state.is_locked(now) {
            failures.remove(&key);
            tx.stage(keys::LOGIN_FAILURES, &failures)?;
            return Ok(FailureState::default());
        }
        Ok(state)
    }

    pub async fn record_failure<S: KvStore>(
        &self,
        tx: &mut Txn<'_, S>,
        username: &str,
    ) -> DeskResult<FailureState> {
        let key = username.trim().to_lowercase();
        let current = self.get_failure_state(tx, &key).await?;
        let now = self.clock.now();

        let count = current.count + 1;
        let locked_until = (count >= self.max_attempts).then(|| now + self.lockout);
        if locked_until.is_some() {
            warn!(username = %key, count, "Login locked out after repeated failures");
        }

        let record = LoginFailureRecord {
            count,
            locked_until,
            last_fail_at: now,
        };
        let state = FailureState::from(&record);

        let mut failures: FailureMap = tx.load_or_default(keys::LOGIN_FAILURES).await?;
        failures.insert(key, record);
        tx.stage(keys::LOGIN_FAILURES, &failures)?;
        Ok(state)
    }

    pub async fn clear_failures<S: KvStore>(&self, tx: &mut Txn<'_, S>, username: &str) -> DeskResult<()> {
        let key = username.trim().to_lowercase();
        let mut failures: FailureMap = tx.load_or_default(keys::LOGIN_FAILURES).await?;
        if failures.remove(&key).is_some() {
            tx.stage(keys::LOGIN_FAILURES, &failures)?;
        }
        Ok(())
    }

    /// Drop every username's failure state. Returns how many were cleared.
    pub async fn unlock_all<S: KvStore>(&self, tx: &mut Txn<'_, S>) -> DeskResult<usize> {
        let failures: FailureMap = tx.load_or_default(keys::LOGIN_FAILURES).await?;
        tx.remove(keys::LOGIN_FAILURES);
        Ok(failures.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use dentdesk_core::clock::ManualClock;
    use dentdesk_core::store::MemoryStore;

    use super::*;

    fn governor(clock: &ManualClock) -> LoginGovernor {
        LoginGovernor::new(Arc::new(clock.clone()), 5, 120)
    }

    #[tokio::test]
    async fn fifth_failure_locks_for_window() {
        let clock = ManualClock::new(Utc::now());
        let gov = governor(&clock);
        let kv = MemoryStore::new();
        let mut tx = Txn::begin(&kv);

        for n in 1..=4 {
            let state = gov.record_failure(&mut tx, "doctor").await.unwrap();
            assert_eq!(state.count, n);
            assert!(state.locked_until.is_none());
        }
        let state = gov.record_failure(&mut tx, "Doctor").await.unwrap();
        assert_eq!(state.count, 5);
        assert_eq!(state.locked_until, Some(clock.now() + Duration::minutes(2)));
        assert!(state.is_locked(clock.now()));
    }

    #[tokio::test]
    async fn lock_expires_lazily() {
        let clock = ManualClock::new(Utc::now());
        let gov = governor(&clock);
        let kv = MemoryStore::new();
        let mut tx = Txn::begin(&kv);

        for _ in 0..5 {
            gov.record_failure(&mut tx, "doctor").await.unwrap();
        }
        clock.advance(Duration::seconds(121));

        let state = gov.get_failure_state(&mut tx, "doctor").await.unwrap();
        assert_eq!(state, FailureState::default());
    }

    #[tokio::test]
    async fn lock_ends_exactly_at_locked_until() {
        let clock = ManualClock::new(Utc::now());
        let gov = governor(&clock);
        let kv = MemoryStore::new();
        let mut tx = Txn::begin(&kv);

        for _ in 0..5 {
            gov.record_failure(&mut tx, "doctor").await.unwrap();
        }
        clock.advance(Duration::seconds(119));
        assert!(gov.get_failure_state(&mut tx, "doctor").await.unwrap().is_locked(clock.now()));

        clock.advance(Duration::seconds(1));
        let state = gov.get_failure_state(&mut tx, "doctor").await.unwrap();
        assert_eq!(state, FailureState::default());
        assert!(!state.is_locked(clock.now()));

        let state = gov.record_failure(&mut tx, "doctor").await.unwrap();
        assert_eq!(state.count, 1);
        assert!(state.locked_until.is_none());
    }

    #[tokio::test]
    async fn clear_and_unlock_all() {
        let clock = ManualClock::new(Utc::now());
        let gov = governor(&clock);
        let kv = MemoryStore::new();
        let mut tx = Txn::begin(&kv);

        gov.record_failure(&mut tx, "a").await.unwrap();
        gov.record_failure(&mut tx, "b").await.unwrap();
        gov.clear_failures(&mut tx, "A").await.unwrap();
        assert_eq!(gov.get_failure_state(&mut tx, "a").await.unwrap().count, 0);
        assert_eq!(gov.get_failure_state(&mut tx, "b").await.unwrap().count, 1);

        assert_eq!(gov.unlock_all(&mut tx).await.unwrap(), 1);
        assert_eq!(gov.get_failure_state(&mut tx, "b").await.unwrap().count, 0);
    }
}
