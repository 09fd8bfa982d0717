//! SurrealDB implementation of [`KvStore`].

use dentdesk_core::error::DeskResult;
use dentdesk_core::store::{KvStore, WriteOp};
use serde::Deserialize;
use serde_json::Value;
use surrealdb::{Connection, Surreal};
use tracing::debug;

use crate::error::DbError;

#[derive(Debug, Deserialize)]
struct KvRow {
    payload: String,
}

/// Documents live in the `kv` table, one record per key.
///
/// A commit is sent as a single `BEGIN TRANSACTION … COMMIT TRANSACTION`
/// query, so either every write of the batch lands or none does.
#[derive(Clone)]
pub struct SurrealStore<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

fn transaction_sql(ops: &[WriteOp]) -> String {
    let mut sql = String::from("BEGIN TRANSACTION;\n");
    for (i, op) in ops.iter().enumerate() {
        match op {
            WriteOp::Put { .. } => {
                sql.push_str(&format!(
                    "UPSERT type::thing('kv', $k{i}) SET payload = $v{i};\n"
                ));
            }
            WriteOp::Delete { .. } => {
                sql.push_str(&format!("DELETE type::thing('kv', $k{i});\n"));
            }
        }
    }
    sql.push_str("COMMIT TRANSACTION;");
    sql
}

impl<C: Connection> KvStore for SurrealStore<C> {
    async fn get(&self, key: &str) -> DeskResult<Option<Value>> {
        let mut result = self
            .db
            .query("SELECT payload FROM type::thing('kv', $key)")
            .bind(("key", key.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<KvRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => {
                let value = serde_json::from_str(&row.payload).map_err(|e| DbError::Corrupt {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn commit(&self, ops: Vec<WriteOp>) -> DeskResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        debug!(writes = ops.len(), "Committing batch to SurrealDB");

        let sql = transaction_sql(&ops);
        let mut query = self.db.query(sql);
        for (i, op) in ops.into_iter().enumerate() {
            match op {
                WriteOp::Put { key, value } => {
                    query = query
                        .bind((format!("k{i}"), key))
                        .bind((format!("v{i}"), serde_json::to_string(&value)?));
                }
                WriteOp::Delete { key } => {
                    query = query.bind((format!("k{i}"), key));
                }
            }
        }

        query
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        Ok(())
    }
}
