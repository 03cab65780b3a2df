//! libSQL-backed key-value store.
//!
//! Values are stored as JSON text in a single `kv` table inside an embedded,
//! SQLite-compatible database. Multi-key writes run in one transaction.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use libsql::Builder;
use serde_json::{Map, Value};

use crate::kv::{KeyValueStore, StorageError};

fn backend(e: libsql::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// Durable [`KeyValueStore`] over an embedded libSQL database.
pub struct LibsqlStore {
    conn: libsql::Connection,
}

impl LibsqlStore {
    /// Opens a database at the specified path, initializing the schema if needed.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("failed to open database at: {}", path.display()))?;
        let conn = db
            .connect()
            .with_context(|| "failed to get database connection")?;

        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    /// Opens the database at the default location.
    pub async fn open_default() -> anyhow::Result<Self> {
        let data_dir = crate::default_data_dir()?;
        Self::open(&data_dir.join("tabox.db")).await
    }

    async fn init_schema(&self) -> anyhow::Result<()> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS kv (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                )",
                (),
            )
            .await
            .context("failed to create kv table")?;
        Ok(())
    }

    async fn query_value(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let mut rows = self
            .conn
            .query("SELECT value FROM kv WHERE key = ?1", libsql::params![key])
            .await
            .map_err(backend)?;
        match rows.next().await.map_err(backend)? {
            Some(row) => {
                let text: String = row.get(0).map_err(backend)?;
                Ok(Some(serde_json::from_str(&text)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl KeyValueStore for LibsqlStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StorageError> {
        let mut out = Map::new();
        for key in keys {
            if let Some(value) = self.query_value(key).await? {
                out.insert(key.to_string(), value);
            }
        }
        Ok(out)
    }

    async fn get_all(&self) -> Result<Map<String, Value>, StorageError> {
        let mut rows = self
            .conn
            .query("SELECT key, value FROM kv ORDER BY rowid", ())
            .await
            .map_err(backend)?;

        let mut out = Map::new();
        while let Some(row) = rows.next().await.map_err(backend)? {
            let key: String = row.get(0).map_err(backend)?;
            let text: String = row.get(1).map_err(backend)?;
            out.insert(key, serde_json::from_str(&text)?);
        }
        Ok(out)
    }

    async fn set(&self, items: Map<String, Value>) -> Result<(), StorageError> {
        self.replace(items, &[]).await
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        self.replace(Map::new(), keys).await
    }

    async fn bytes_in_use(&self) -> Result<usize, StorageError> {
        let mut rows = self
            .conn
            .query("SELECT COALESCE(SUM(LENGTH(key) + LENGTH(value)), 0) FROM kv", ())
            .await
            .map_err(backend)?;
        let total: i64 = match rows.next().await.map_err(backend)? {
            Some(row) => row.get(0).map_err(backend)?,
            None => 0,
        };
        Ok(total.max(0) as usize)
    }

    async fn replace(&self, items: Map<String, Value>, remove: &[&str]) -> Result<(), StorageError> {
        // Serialize everything up front so a bad value never leaves a half-open transaction.
        let encoded = items
            .into_iter()
            .map(|(k, v)| Ok((k, serde_json::to_string(&v)?)))
            .collect::<Result<Vec<(String, String)>, StorageError>>()?;

        let tx = self.conn.transaction().await.map_err(backend)?;
        for key in remove {
            tx.execute("DELETE FROM kv WHERE key = ?1", libsql::params![*key])
                .await
                .map_err(backend)?;
        }
        for (key, text) in encoded {
            tx.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                    ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                libsql::params![key, text],
            )
            .await
            .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;
        Ok(())
    }
}
