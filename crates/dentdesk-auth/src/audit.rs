//! Audit trail, action log and patient change log.
//!
//! All three are newest-first lists capped at a fixed length; appending
//! past the cap drops the oldest entries. They are side-effect sinks:
//! appends return nothing the caller branches on.

use std::sync::Arc;

use dentdesk_core::clock::Clock;
use dentdesk_core::error::DeskResult;
use dentdesk_core::models::action_log::{ActionLogEntry, ActionLogFilter, CreateActionLogEntry};
use dentdesk_core::models::audit::{AuditEntry, CreateAuditEntry};
use dentdesk_core::models::clinic::WILDCARD_CLINIC_ID;
use dentdesk_core::models::patient_log::{CreatePatientChange, PatientChangeLogEntry};
use dentdesk_core::store::{KvStore, Txn, keys};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AuditTrail {
    clock: Arc<dyn Clock>,
    audit_capacity: usize,
    action_capacity: usize,
    patient_capacity: usize,
    client_ip: String,
}

async fn prepend<S, T>(tx: &mut Txn<'_, S>, key: &str, entry: T, capacity: usize) -> DeskResult<()>
where
    S: KvStore,
    T: Serialize + DeserializeOwned,
{
    let mut entries: Vec<T> = tx.load_or_default(key).await?;
    entries.insert(0, entry);
    entries.truncate(capacity);
    tx.stage(key, &entries)
}

impl AuditTrail {
    pub fn new(
        clock: Arc<dyn Clock>,
        audit_capacity: usize,
        action_capacity: usize,
        patient_capacity: usize,
        client_ip: impl Into<String>,
    ) -> Self {
        Self {
            clock,
            audit_capacity,
            action_capacity,
            patient_capacity,
            client_ip: client_ip.into(),
        }
    }

    pub async fn append_audit<S: KvStore>(&self, tx: &mut Txn<'_, S>, input: CreateAuditEntry) -> DeskResult<()> {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            action: input.action,
            actor_id: input.actor_id,
            actor_name: input.actor_name,
            target_id: input.target_id,
            target_name: input.target_name,
            details: input.details,
            timestamp: self.clock.now(),
        };
        prepend(tx, keys::AUDIT_LOG, entry, self.audit_capacity).await
    }

    /// Newest first.
    pub async fn list_audit<S: KvStore>(&self, tx: &Txn<'_, S>) -> DeskResult<Vec<AuditEntry>> {
        tx.load_or_default(keys::AUDIT_LOG).await
    }

    /// A blank clinic id is recorded as the cross-clinic wildcard.
    pub async fn append_action<S: KvStore>(
        &self,
        tx: &mut Txn<'_, S>,
        input: CreateActionLogEntry,
    ) -> DeskResult<()> {
        let clinic_id = if input.clinic_id.trim().is_empty() {
            WILDCARD_CLINIC_ID.to_string()
        } else {
            input.clinic_id
        };
        let entry = ActionLogEntry {
            id: Uuid::new_v4(),
            clinic_id,
            user_id: input.user_id,
            user_name: input.user_name,
            action: input.action,
            entity: input.entity,
            entity_id: input.entity_id,
            details: input.details,
            ip: self.client_ip.clone(),
            created_at: self.clock.now(),
        };
        prepend(tx, keys::ACTION_LOG, entry, self.action_capacity).await
    }

    /// Newest first. With a clinic filter, wildcard entries are always
    /// included. The limit applies to the result only.
    pub async fn list_actions<S: KvStore>(
        &self,
        tx: &Txn<'_, S>,
        filter: &ActionLogFilter,
    ) -> DeskResult<Vec<ActionLogEntry>> {
        let entries: Vec<ActionLogEntry> = tx.load_or_default(keys::ACTION_LOG).await?;
        let matching = entries.into_iter().filter(|e| match &filter.clinic_id {
            Some(clinic_id) => e.clinic_id == *clinic_id || e.clinic_id == WILDCARD_CLINIC_ID,
            None => true,
        });
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    pub async fn append_patient_change<S: KvStore>(
        &self,
        tx: &mut Txn<'_, S>,
        input: CreatePatientChange,
    ) -> DeskResult<()> {
        let entry = PatientChangeLogEntry {
            id: Uuid::new_v4(),
            patient_id: input.patient_id,
            field_name: input.field_name,
            old_value: input.old_value,
            new_value: input.new_value,
            changed_by: input.changed_by,
            changed_by_name: input.changed_by_name,
            changed_at: self.clock.now(),
        };
        prepend(tx, keys::PATIENT_CHANGE_LOG, entry, self.patient_capacity).await
    }

    pub async fn list_patient_changes<S: KvStore>(
        &self,
        tx: &Txn<'_, S>,
        patient_id: Option<&str>,
    ) -> DeskResult<Vec<PatientChangeLogEntry>> {
        let entries: Vec<PatientChangeLogEntry> =
            tx.load_or_default(keys::PATIENT_CHANGE_LOG).await?;
        Ok(match patient_id {
            Some(id) => entries.into_iter().filter(|e| e.patient_id == id).collect(),
            None => entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use dentdesk_core::clock::SystemClock;
    use dentdesk_core::models::action_log::{ActionKind, EntityKind};
    use dentdesk_core::models::audit::AuditAction;
    use dentdesk_core::store::MemoryStore;

    use super::*;

    fn trail() -> AuditTrail {
        AuditTrail::new(Arc::new(SystemClock), 500, 2000, 2000, "127.0.0.1")
    }

    fn audit(n: usize) -> CreateAuditEntry {
        CreateAuditEntry {
            action: AuditAction::UserEdited,
            actor_id: "actor".into(),
            actor_name: "Admin".into(),
            target_id: format!("target-{n}"),
            target_name: "Someone".into(),
            details: String::new(),
        }
    }

    fn action(clinic_id: &str) -> CreateActionLogEntry {
        CreateActionLogEntry {
            clinic_id: clinic_id.into(),
            user_id: "u".into(),
            user_name: "User".into(),
            action: ActionKind::Login,
            entity: EntityKind::User,
            entity_id: "u".into(),
            details: String::new(),
        }
    }

    #[tokio::test]
    async fn audit_log_keeps_newest_five_hundred() {
        let kv = MemoryStore::new();
        let log = trail();
        let mut tx = Txn::begin(&kv);
        for n in 0..501 {
            log.append_audit(&mut tx, audit(n)).await.unwrap();
        }
        tx.commit().await.unwrap();

        let tx = Txn::begin(&kv);
        let entries = log.list_audit(&tx).await.unwrap();
        assert_eq!(entries.len(), 500);
        assert_eq!(entries[0].target_id, "target-500");
        assert_eq!(entries[499].target_id, "target-1");
    }

    fn patient_change(patient_id: &str, new_value: String) -> CreatePatientChange {
        CreatePatientChange {
            patient_id: patient_id.into(),
            field_name: "phone".into(),
            old_value: "1".into(),
            new_value,
            changed_by: "u".into(),
            changed_by_name: "User".into(),
        }
    }

    #[tokio::test]
    async fn action_log_drops_oldest_past_capacity() {
        let kv = MemoryStore::new();
        let log = AuditTrail::new(Arc::new(SystemClock), 500, 3, 3, "127.0.0.1");
        let mut tx = Txn::begin(&kv);
        for n in 0..4 {
            let mut entry = action("clinic_a");
            entry.entity_id = format!("e{n}");
            log.append_action(&mut tx, entry).await.unwrap();
        }
        tx.commit().await.unwrap();

        let tx = Txn::begin(&kv);
        let entries = log
            .list_actions(&tx, &ActionLogFilter::default())
            .await
            .unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(ids, ["e3", "e2", "e1"]);
    }

    #[tokio::test]
    async fn patient_log_drops_oldest_past_capacity() {
        let kv = MemoryStore::new();
        let log = AuditTrail::new(Arc::new(SystemClock), 500, 3, 3, "127.0.0.1");
        let mut tx = Txn::begin(&kv);
        for n in 0..4 {
            log.append_patient_change(&mut tx, patient_change("p1", format!("v{n}")))
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();

        let tx = Txn::begin(&kv);
        let entries = log.list_patient_changes(&tx, None).await.unwrap();
        let values: Vec<&str> = entries.iter().map(|e| e.new_value.as_str()).collect();
        assert_eq!(values, ["v3", "v2", "v1"]);
    }

    #[test]
    fn default_capacities() {
        let config = crate::config::AuthConfig::default();
        assert_eq!(config.audit_log_capacity, 500);
        assert_eq!(config.action_log_capacity, 2000);
        assert_eq!(config.patient_log_capacity, 2000);
    }

    #[tokio::test]
    async fn action_filter_includes_wildcard_rows() {
        let kv = MemoryStore::new();
        let log = trail();
        let mut tx = Txn::begin(&kv);
        log.append_action(&mut tx, action("clinic_a")).await.unwrap();
        log.append_action(&mut tx, action("clinic_b")).await.unwrap();
        log.append_action(&mut tx, action("")).await.unwrap();

        let a = log
            .list_actions(
                &tx,
                &ActionLogFilter {
                    clinic_id: Some("clinic_a".into()),
                    limit: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].clinic_id, WILDCARD_CLINIC_ID);
        assert_eq!(a[0].ip, "127.0.0.1");

        let limited = log
            .list_actions(
                &tx,
                &ActionLogFilter {
                    clinic_id: None,
                    limit: Some(2),
                },
            )
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        let all = log
            .list_actions(&tx, &ActionLogFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn patient_changes_filter_by_patient() {
        let kv = MemoryStore::new();
        let log = trail();
        let mut tx = Txn::begin(&kv);
        for patient in ["p1", "p2", "p1"] {
            log.append_patient_change(&mut tx, patient_change(patient, "2".into()))
                .await
                .unwrap();
        }

        assert_eq!(
            log.list_patient_changes(&tx, Some("p1")).await.unwrap().len(),
            2
        );
        assert_eq!(log.list_patient_changes(&tx, None).await.unwrap().len(), 3);
    }
}
