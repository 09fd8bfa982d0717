//! Integration tests for the SurrealDB-backed store using in-memory
//! SurrealDB.

use dentdesk_core::store::{KvStore, Txn, WriteOp, keys};
use dentdesk_db::SurrealStore;
use serde::Deserialize;
use serde_json::json;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    dentdesk_db::run_migrations(&db).await.unwrap();
    db
}

#[derive(Debug, Deserialize)]
struct CountRow {
    total: u64,
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let db = setup().await;
    dentdesk_db::run_migrations(&db).await.unwrap();

    let mut result = db
        .query("SELECT count() AS total FROM _migration GROUP ALL")
        .await
        .unwrap();
    let rows: Vec<CountRow> = result.take(0).unwrap();
    assert_eq!(rows.first().map(|r| r.total), Some(1));
}

#[tokio::test]
async fn missing_key_reads_as_none() {
    let store = SurrealStore::new(setup().await);
    assert!(store.get(keys::USERS).await.unwrap().is_none());
}

#[tokio::test]
async fn put_then_get_returns_document() {
    let store = SurrealStore::new(setup().await);
    let doc = json!([{"username": "doctor", "is_active": true}]);

    store
        .commit(vec![WriteOp::Put {
            key: keys::USERS.into(),
            value: doc.clone(),
        }])
        .await
        .unwrap();

    assert_eq!(store.get(keys::USERS).await.unwrap(), Some(doc));
}

#[tokio::test]
async fn put_overwrites_and_delete_removes() {
    let store = SurrealStore::new(setup().await);

    store
        .commit(vec![WriteOp::Put {
            key: keys::EDIT_LOCKS.into(),
            value: json!({"p1": "first"}),
        }])
        .await
        .unwrap();
    store
        .commit(vec![WriteOp::Put {
            key: keys::EDIT_LOCKS.into(),
            value: json!({"p1": "second"}),
        }])
        .await
        .unwrap();
    assert_eq!(
        store.get(keys::EDIT_LOCKS).await.unwrap(),
        Some(json!({"p1": "second"}))
    );

    store
        .commit(vec![WriteOp::Delete {
            key: keys::EDIT_LOCKS.into(),
        }])
        .await
        .unwrap();
    assert!(store.get(keys::EDIT_LOCKS).await.unwrap().is_none());
}

#[tokio::test]
async fn txn_commits_all_writes_together() {
    let store = SurrealStore::new(setup().await);

    let mut tx = Txn::begin(&store);
    tx.stage(keys::CLINICS, &json!([{"id": "clinic_default"}]))
        .unwrap();
    tx.stage(keys::ACTION_LOG, &json!([{"action": "clinic_created"}]))
        .unwrap();
    tx.commit().await.unwrap();

    assert!(store.get(keys::CLINICS).await.unwrap().is_some());
    assert!(store.get(keys::ACTION_LOG).await.unwrap().is_some());
}
