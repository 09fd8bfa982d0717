//! Schema definitions and migration runner for SurrealDB.
//!
//! DentDesk keeps one SCHEMAFULL `kv` table: the record id is the
//! document key and `payload` holds the serialized JSON document.

use serde::Deserialize;
use surrealdb::{Connection, Surreal};
use tracing::info;

use crate::error::DbError;

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, Deserialize)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "kv_documents",
    sql: SCHEMA_V1,
}];

const SCHEMA_V1: &str = "\
DEFINE TABLE IF NOT EXISTS kv SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS payload ON TABLE kv TYPE string;
DEFINE FIELD IF NOT EXISTS updated_at ON TABLE kv TYPE datetime \
    VALUE time::now();
";

/// Migrations newer than `applied`, oldest first.
fn pending(applied: u32) -> impl Iterator<Item = &'static Migration> {
    MIGRATIONS.iter().filter(move |m| m.version > applied)
}

async fn applied_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let mut response = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let latest: Vec<MigrationRecord> = response.take(0)?;
    Ok(latest.first().map_or(0, |record| record.version))
}

/// Bring the database schema up to date.
///
/// Each migration runs in its own transaction together with the
/// `_migration` row that records it, so a failed step leaves neither
/// behind.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(format!("migration table: {e}")))?;

    let applied = applied_version(db).await?;
    for migration in pending(applied) {
        info!(version = migration.version, name = migration.name, "Applying migration");
        db.query("BEGIN TRANSACTION")
            .query(migration.sql)
            .query("CREATE _migration SET version = $version, name = $name")
            .query("COMMIT TRANSACTION")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!("v{} {}: {e}", migration.version, migration.name))
            })?;
    }

    info!(version = MIGRATIONS.last().map_or(0, |m| m.version), "Schema up to date");
    Ok(())
}

/// Returns the raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_v1_defines_document_table() {
        assert!(SCHEMA_V1.contains("DEFINE TABLE IF NOT EXISTS kv"));
        assert!(SCHEMA_V1.contains("payload"));
    }

    #[test]
    fn versions_ascend_from_one() {
        assert_eq!(MIGRATIONS.first().map(|m| m.version), Some(1));
        assert!(MIGRATIONS.windows(2).all(|w| w[0].version < w[1].version));
    }

    #[test]
    fn pending_skips_applied_versions() {
        assert_eq!(pending(0).count(), MIGRATIONS.len());
        let latest = MIGRATIONS.last().map_or(0, |m| m.version);
        assert_eq!(pending(latest).count(), 0);
    }
}
