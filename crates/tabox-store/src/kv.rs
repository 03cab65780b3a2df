//! The key-value storage boundary.
//!
//! Everything tabox persists goes through [`KeyValueStore`]: a host store with
//! `get`/`set`/`remove` semantics and no native transactions. A failed write is
//! always reported as an error and leaves the store unchanged; missing keys are
//! simply absent from `get` results.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors surfaced at the storage boundary.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The write would push usage past the store's quota
    #[error("storage quota exceeded: {needed} bytes needed, quota is {quota} bytes")]
    QuotaExceeded { needed: usize, quota: usize },

    /// A value could not be serialized or deserialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend failed for any other reason
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn is_quota(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

/// Asynchronous key-value storage owned by the host.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored values for `keys`; missing keys are absent from the result.
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StorageError>;

    /// Returns every stored key.
    async fn get_all(&self) -> Result<Map<String, Value>, StorageError>;

    /// Writes all items or none of them.
    async fn set(&self, items: Map<String, Value>) -> Result<(), StorageError>;

    /// Removes the given keys. Removing a missing key is not an error.
    async fn remove(&self, keys: &[&str]) -> Result<(), StorageError>;

    /// Approximate bytes used: key length plus serialized value length, summed.
    async fn bytes_in_use(&self) -> Result<usize, StorageError>;

    /// Writes `items` and removes `remove` as one logical write.
    ///
    /// The default sets first and removes second, so a failure between the two
    /// leaves extra keys behind rather than losing the new values. Adapters with
    /// real transactions override this.
    async fn replace(&self, items: Map<String, Value>, remove: &[&str]) -> Result<(), StorageError> {
        if !items.is_empty() {
            self.set(items).await?;
        }
        if !remove.is_empty() {
            self.remove(remove).await?;
        }
        Ok(())
    }

    /// Convenience wrapper around [`KeyValueStore::get`] for one key.
    async fn get_one(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.get(&[key]).await?.remove(key))
    }

    /// Convenience wrapper around [`KeyValueStore::set`] for one key.
    async fn set_one(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut items = Map::new();
        items.insert(key.to_string(), value);
        self.set(items).await
    }
}

/// Size of one entry as counted against quota.
pub fn entry_size(key: &str, value: &Value) -> usize {
    key.len() + serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0)
}

/// Serialized size of a whole payload.
pub fn payload_size(items: &Map<String, Value>) -> usize {
    items.iter().map(|(k, v)| entry_size(k, v)).sum()
}

/// In-process store with an optional quota, mirroring the extension host's
/// local storage semantics.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<Map<String, Value>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects writes pushing usage past `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            data: Mutex::new(Map::new()),
            quota: Some(quota),
        }
    }

    /// A store seeded with `data`.
    pub fn from_map(data: Map<String, Value>) -> Self {
        Self {
            data: Mutex::new(data),
            quota: None,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Map<String, Value>>, StorageError> {
        self.data
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }

    fn check_quota(&self, data: &Map<String, Value>, items: &Map<String, Value>, remove: &[&str]) -> Result<(), StorageError> {
        let Some(quota) = self.quota else {
            return Ok(());
        };
        let mut projected = data.clone();
        for key in remove {
            projected.remove(*key);
        }
        for (k, v) in items {
            projected.insert(k.clone(), v.clone());
        }
        let needed = payload_size(&projected);
        if needed > quota {
            return Err(StorageError::QuotaExceeded { needed, quota });
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StorageError> {
        let data = self.lock()?;
        Ok(keys
            .iter()
            .filter_map(|k| data.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn get_all(&self) -> Result<Map<String, Value>, StorageError> {
        Ok(self.lock()?.clone())
    }

    async fn set(&self, items: Map<String, Value>) -> Result<(), StorageError> {
        let mut data = self.lock()?;
        self.check_quota(&data, &items, &[])?;
        for (k, v) in items {
            data.insert(k, v);
        }
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut data = self.lock()?;
        for key in keys {
            data.remove(*key);
        }
        Ok(())
    }

    async fn bytes_in_use(&self) -> Result<usize, StorageError> {
        let data = self.lock()?;
        Ok(payload_size(&data))
    }

    async fn replace(&self, items: Map<String, Value>, remove: &[&str]) -> Result<(), StorageError> {
        let mut data = self.lock()?;
        self.check_quota(&data, &items, remove)?;
        for key in remove {
            data.remove(*key);
        }
        for (k, v) in items {
            data.insert(k, v);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_keys_are_absent() {
        let store = MemoryStore::new();
        store.set_one("a", json!(1)).await.unwrap();
        let got = store.get(&["a", "b"]).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got["a"], json!(1));
        assert_eq!(store.get_one("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_quota_rejects_whole_write() {
        let store = MemoryStore::with_quota(64);
        store.set_one("small", json!("x")).await.unwrap();

        let mut items = Map::new();
        items.insert("ok".to_string(), json!(1));
        items.insert("big".to_string(), json!("y".repeat(100)));
        let err = store.set(items).await.unwrap_err();
        assert!(err.is_quota());

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1, "failed write must leave state unchanged");
    }

    #[tokio::test]
    async fn test_replace_counts_removals_against_quota() {
        let store = MemoryStore::with_quota(60);
        store.set_one("old", json!("z".repeat(40))).await.unwrap();

        let mut items = Map::new();
        items.insert("new".to_string(), json!("w".repeat(40)));
        store.replace(items, &["old"]).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert!(all.contains_key("new"));
        assert!(!all.contains_key("old"));
    }

    #[tokio::test]
    async fn test_bytes_in_use() {
        let store = MemoryStore::new();
        store.set_one("k", json!("v")).await.unwrap();
        assert_eq!(store.bytes_in_use().await.unwrap(), 1 + 3);
    }
}
