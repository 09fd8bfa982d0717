//! Key-value persistence contract.
//!
//! Everything DentDesk persists is a JSON document under a well-known
//! key (see [`keys`]). A [`KvStore`] only has to read one key and apply
//! a batch of writes atomically; [`Txn`] builds such batches so that a
//! state change and the log entries describing it are committed in a
//! single call.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{DeskError, DeskResult};

/// Well-known document keys.
pub mod keys {
    pub const USERS: &str = "users";
    pub const CLINICS: &str = "clinics";
    pub const SUBSCRIPTIONS: &str = "subscriptions";
    pub const LOGIN_FAILURES: &str = "login_failures";
    pub const OTP_CHALLENGES: &str = "otp_challenges";
    pub const EDIT_LOCKS: &str = "edit_locks";
    pub const AUDIT_LOG: &str = "audit_log";
    pub const ACTION_LOG: &str = "action_log";
    pub const PATIENT_CHANGE_LOG: &str = "patient_change_log";
    pub const SESSION: &str = "session";
}

/// A single staged write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put { key: String, value: Value },
    Delete { key: String },
}

impl WriteOp {
    pub fn key(&self) -> &str {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Delete { key } => key,
        }
    }
}

pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = DeskResult<Option<Value>>> + Send;

    /// Apply every write or none of them.
    fn commit(&self, ops: Vec<WriteOp>) -> impl Future<Output = DeskResult<()>> + Send;
}

impl<S: KvStore> KvStore for Arc<S> {
    fn get(&self, key: &str) -> impl Future<Output = DeskResult<Option<Value>>> + Send {
        (**self).get(key)
    }

    fn commit(&self, ops: Vec<WriteOp>) -> impl Future<Output = DeskResult<()>> + Send {
        (**self).commit(ops)
    }
}

/// Unit of work over a [`KvStore`].
///
/// Reads see the transaction's own staged writes. Nothing reaches the
/// store until [`Txn::commit`]; dropping the transaction discards it.
pub struct Txn<'a, S: KvStore> {
    store: &'a S,
    staged: BTreeMap<String, Option<Value>>,
}

impl<'a, S: KvStore> Txn<'a, S> {
    pub fn begin(store: &'a S) -> Self {
        Self {
            store,
            staged: BTreeMap::new(),
        }
    }

    pub async fn get(&self, key: &str) -> DeskResult<Option<Value>> {
        if let Some(staged) = self.staged.get(key) {
            return Ok(staged.clone());
        }
        self.store.get(key).await
    }

    /// Read and decode a document.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> DeskResult<Option<T>> {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Read and decode a document, falling back to `T::default()`.
    pub async fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> DeskResult<T> {
        Ok(self.load(key).await?.unwrap_or_default())
    }

    pub fn stage<T: Serialize>(&mut self, key: &str, value: &T) -> DeskResult<()> {
        let value = serde_json::to_value(value)?;
        self.staged.insert(key.to_string(), Some(value));
        Ok(())
    }

    pub fn remove(&mut self, key: &str) {
        self.staged.insert(key.to_string(), None);
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub async fn commit(self) -> DeskResult<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let ops: Vec<WriteOp> = self
            .staged
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => WriteOp::Put { key, value },
                None => WriteOp::Delete { key },
            })
            .collect();
        debug!(writes = ops.len(), "Committing transaction");
        self.store.commit(ops).await
    }
}

/// In-process store.
///
/// Serves as the tab-lifetime store for sessions and as the long-lived
/// store in tests. An optional quota caps the serialized size of all
/// documents; a commit that would exceed it fails with
/// [`DeskError::QuotaExceeded`] and changes nothing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::default(),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn footprint(entries: &HashMap<String, Value>) -> usize {
    entries
        .iter()
        .map(|(key, value)| key.len() + value.to_string().len())
        .sum()
}

impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> DeskResult<Option<Value>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn commit(&self, ops: Vec<WriteOp>) -> DeskResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = entries.clone();
        for op in ops {
            match op {
                WriteOp::Put { key, value } => {
                    next.insert(key, value);
                }
                WriteOp::Delete { key } => {
                    next.remove(&key);
                }
            }
        }
        if let Some(quota) = self.quota_bytes {
            if footprint(&next) > quota {
                return Err(DeskError::QuotaExceeded);
            }
        }
        *entries = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn txn_reads_its_own_writes() {
        let store = MemoryStore::new();
        let mut tx = Txn::begin(&store);
        tx.stage("k", &json!({"a": 1})).unwrap();
        assert_eq!(tx.get("k").await.unwrap(), Some(json!({"a": 1})));
        // Not visible outside before commit.
        assert!(store.get("k").await.unwrap().is_none());
        tx.commit().await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn dropped_txn_changes_nothing() {
        let store = MemoryStore::new();
        {
            let mut tx = Txn::begin(&store);
            tx.stage("k", &1).unwrap();
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn staged_remove_hides_stored_value() {
        let store = MemoryStore::new();
        store
            .commit(vec![WriteOp::Put {
                key: "k".into(),
                value: json!("v"),
            }])
            .await
            .unwrap();

        let mut tx = Txn::begin(&store);
        tx.remove("k");
        assert!(tx.get("k").await.unwrap().is_none());
        tx.commit().await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn quota_rejects_whole_batch() {
        let store = MemoryStore::with_quota(32);
        let result = store
            .commit(vec![
                WriteOp::Put {
                    key: "small".into(),
                    value: json!(1),
                },
                WriteOp::Put {
                    key: "big".into(),
                    value: json!("x".repeat(64)),
                },
            ])
            .await;
        assert!(matches!(result, Err(DeskError::QuotaExceeded)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn load_or_default_on_missing_key() {
        let store = MemoryStore::new();
        let tx = Txn::begin(&store);
        let users: Vec<String> = tx.load_or_default(keys::USERS).await.unwrap();
        assert!(users.is_empty());
    }
}
