//! SurrealDB connection management.
//!
//! The endpoint decides the engine: `ws://host:port` for a SurrealDB
//! server, `mem://` for an embedded in-process database.

use surrealdb::Surreal;
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use tracing::info;

use crate::error::DbError;

/// Configuration for connecting to SurrealDB.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Engine endpoint, e.g. `ws://127.0.0.1:8000` or `mem://`.
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    /// Root credentials. Ignored by embedded engines.
    pub username: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8000".into(),
            namespace: "dentdesk".into(),
            database: "main".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

impl DbConfig {
    /// An embedded in-memory database. Contents live as long as the
    /// process.
    pub fn in_memory() -> Self {
        Self {
            endpoint: "mem://".into(),
            ..Self::default()
        }
    }

    fn is_embedded(&self) -> bool {
        self.endpoint.starts_with("mem://")
    }
}

/// An open SurrealDB connection with namespace and database selected.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Any>,
}

impl DbManager {
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            endpoint = %config.endpoint,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to SurrealDB"
        );

        let db = any::connect(config.endpoint.as_str()).await?;
        if !config.is_embedded() {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await?;
        }
        db.use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await?;

        info!("Connected to SurrealDB");
        Ok(Self { db })
    }

    pub fn client(&self) -> &Surreal<Any> {
        &self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_endpoint_is_detected() {
        assert!(DbConfig::in_memory().is_embedded());
        assert!(!DbConfig::default().is_embedded());
    }

    #[tokio::test]
    async fn connects_to_embedded_engine() {
        let manager = DbManager::connect(&DbConfig::in_memory()).await.unwrap();
        let mut response = manager.client().query("RETURN 1 + 1").await.unwrap();
        let sum: Option<i64> = response.take(0).unwrap();
        assert_eq!(sum, Some(2));
    }
}
