//! Advisory per-patient edit locks.
//!
//! A lock never blocks a writer. It only tells a second editor that
//! someone else opened the record within the last few minutes.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use dentdesk_core::clock::Clock;
use dentdesk_core::error::{DeskError, DeskResult};
use dentdesk_core::models::edit_lock::EditLock;
use dentdesk_core::models::session::Session;
use dentdesk_core::store::{KvStore, Txn, keys};
use tracing::{debug, warn};

type LockMap = BTreeMap<String, EditLock>;

#[derive(Debug, Clone)]
pub struct EditLockRegistry {
    clock: Arc<dyn Clock>,
    lifetime: Duration,
}

impl EditLockRegistry {
    pub fn new(clock: Arc<dyn Clock>, lifetime_secs: u64) -> Self {
        Self {
            clock,
            lifetime: Duration::seconds(lifetime_secs as i64),
        }
    }

    /// Record `session`'s user as the holder, replacing any previous one.
    pub async fn acquire<S: KvStore>(
        &self,
        tx: &mut Txn<'_, S>,
        patient_id: &str,
        session: &Session,
    ) -> DeskResult<EditLock> {
        let lock = EditLock {
            patient_id: patient_id.to_string(),
            user_id: session.user_id,
            user_name: session.actor_name().to_string(),
            locked_at: self.clock.now(),
        };
        let mut locks: LockMap = tx.load_or_default(keys::EDIT_LOCKS).await?;
        locks.insert(patient_id.to_string(), lock.clone());
        tx.stage(keys::EDIT_LOCKS, &locks)?;
        Ok(lock)
    }

    /// The current lock, or `None` if there is none or it has outlived
    /// its lifetime (in which case it is removed).
    pub async fn inspect<S: KvStore>(
        &self,
        tx: &mut Txn<'_, S>,
        patient_id: &str,
    ) -> DeskResult<Option<EditLock>> {
        let mut locks: LockMap = tx.load_or_default(keys::EDIT_LOCKS).await?;
        let Some(lock) = locks.get(patient_id) else {
            return Ok(None);
        };
        if self.clock.now() - lock.locked_at > self.lifetime {
            locks.remove(patient_id);
            tx.stage(keys::EDIT_LOCKS, &locks)?;
            return Ok(None);
        }
        Ok(Some(lock.clone()))
    }

    pub async fn release<S: KvStore>(&self, tx: &mut Txn<'_, S>, patient_id: &str) -> DeskResult<()> {
        let mut locks: LockMap = tx.load_or_default(keys::EDIT_LOCKS).await?;
        if locks.remove(patient_id).is_some() {
            tx.stage(keys::EDIT_LOCKS, &locks)?;
        }
        Ok(())
    }

    /// Hold the lock on `patient_id` for the duration of `body`.
    ///
    /// `body` receives the lock held by another user at entry, if any.
    /// The lock is released once `body` returns, with `Ok` or `Err`. If
    /// `body` panics or this future is dropped first, the lock stays
    /// until it outlives its lifetime.
    pub async fn hold<S, F, Fut, R, E>(
        &self,
        store: &S,
        patient_id: &str,
        session: &Session,
        body: F,
    ) -> Result<R, E>
    where
        S: KvStore,
        F: FnOnce(Option<EditLock>) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<DeskError>,
    {
        let mut tx = Txn::begin(store);
        let other = self
            .inspect(&mut tx, patient_id)
            .await?
            .filter(|lock| lock.user_id != session.user_id);
        if let Some(lock) = &other {
            debug!(patient_id, holder = %lock.user_name, "Patient is being edited by another user");
        }
        self.acquire(&mut tx, patient_id, session).await?;
        tx.commit().await?;

        let result = body(other).await;

        let mut tx = Txn::begin(store);
        let released = match self.release(&mut tx, patient_id).await {
            Ok(()) => tx.commit().await,
            Err(e) => Err(e),
        };
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release_err)) => {
                warn!(patient_id, error = %release_err, "Failed to release edit lock");
                Err(e)
            }
        }
    }
}
