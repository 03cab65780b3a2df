//! Backups, restore and rollback chains.
//!
//! A backup is a single stored record under `<TYPE>_backup_<ts>` (or
//! `<TYPE>_backup_minimal_<ts>` when only the essential keys were kept). Backups
//! never contain bookkeeping keys (the migration lock, rollback chains or other
//! backups), and a restore never touches them.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tabox_core::keys::{self, ROLLBACK_CHAIN_PREFIX};
use tabox_core::{now_ms, uid};
use tabox_store::kv::payload_size;
use tabox_store::{KeyValueStore, StorageError};
use tracing::{debug, info, warn};

use crate::config::BackupConfig;
use crate::validate::{detect_and_validate_format, is_data_safe};

/// Shape summary stored alongside the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataReport {
    pub format: String,
    pub collection_count: usize,
    pub key_count: usize,
    pub is_valid: bool,
}

impl DataReport {
    fn of(data: &Map<String, Value>) -> Self {
        let detection = detect_and_validate_format(data);
        Self {
            format: detection.format.as_str().to_string(),
            collection_count: detection.info.collection_count,
            key_count: data.len(),
            is_valid: detection.is_valid,
        }
    }
}

/// A stored backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub id: String,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub backup_type: String,
    pub reason: String,
    pub data_report: DataReport,
    pub data_size: usize,
    #[serde(default)]
    pub minimal: bool,
    pub data: Map<String, Value>,
}

/// Where a new backup went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMeta {
    pub key: String,
    pub id: String,
    pub timestamp: i64,
    pub backup_type: String,
    pub minimal: bool,
    pub data_size: usize,
}

/// Result of [`BackupEngine::create_backup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Created(BackupMeta),
    /// Storage was already past the pressure threshold; nothing was written
    Skipped { bytes_in_use: usize },
}

impl BackupOutcome {
    pub fn key(&self) -> Option<&str> {
        match self {
            BackupOutcome::Created(meta) => Some(&meta.key),
            BackupOutcome::Skipped { .. } => None,
        }
    }
}

/// One line of [`BackupEngine::get_available_backups`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupSummary {
    pub key: String,
    pub backup_type: String,
    pub timestamp: i64,
    pub minimal: bool,
    pub reason: String,
    pub data_size: usize,
    pub collection_count: usize,
}

/// A chain entry: the backup that covers one step of a multi-step operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRef {
    /// `None` when the backup was skipped under storage pressure
    pub key: Option<String>,
    pub timestamp: i64,
    /// Set when this step reuses an earlier step's backup
    #[serde(default)]
    pub reused: bool,
}

impl BackupRef {
    pub fn from_outcome(outcome: &BackupOutcome, timestamp: i64) -> Self {
        Self {
            key: outcome.key().map(str::to_string),
            timestamp,
            reused: false,
        }
    }

    pub fn reuse(&self) -> Self {
        Self {
            reused: true,
            ..self.clone()
        }
    }

    pub fn is_usable(&self) -> bool {
        self.key.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackChain {
    pub id: String,
    pub operation_id: String,
    pub timestamp: i64,
    pub steps: Vec<String>,
    pub backups: BTreeMap<usize, BackupRef>,
    pub current_step: Option<usize>,
    pub completed: bool,
    pub rolled_back: bool,
}

impl RollbackChain {
    /// True when every step up to `current_step` has a usable backup.
    pub fn is_covered(&self) -> bool {
        match self.current_step {
            None => true,
            Some(current) => (0..=current).all(|i| self.backups.get(&i).is_some_and(BackupRef::is_usable)),
        }
    }
}

/// Which backup in a chain to roll back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackTarget {
    /// The first usable backup of the chain
    Earliest,
    /// The backup covering the given step, or the closest usable one before it
    Step(usize),
}

/// Runs `f` to completion or surfaces its error.
///
/// There is no undo here: the caller reacts to the error, usually by executing a
/// rollback chain.
pub async fn atomic_storage_transaction<T, F, Fut>(label: &str, f: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    debug!(label = %label, "transaction start");
    match f().await {
        Ok(value) => {
            debug!(label = %label, "transaction committed");
            Ok(value)
        }
        Err(e) => {
            warn!(label = %label, error = %format!("{:#}", e), "transaction failed");
            Err(e.context(format!("transaction {} failed", label)))
        }
    }
}

pub struct BackupEngine {
    kv: Arc<dyn KeyValueStore>,
    config: BackupConfig,
    last_timestamp: AtomicI64,
}

impl BackupEngine {
    pub fn new(kv: Arc<dyn KeyValueStore>, config: BackupConfig) -> Self {
        Self {
            kv,
            config,
            last_timestamp: AtomicI64::new(0),
        }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Strictly increasing timestamps so two backups never share a key.
    fn next_timestamp(&self) -> i64 {
        let now = now_ms();
        let mut last = self.last_timestamp.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self
                .last_timestamp
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    /// Every non-bookkeeping key currently stored.
    pub async fn snapshot(&self) -> Result<Map<String, Value>> {
        let mut all = self.kv.get_all().await.context("failed to read storage for backup")?;
        all.retain(|k, _| !keys::is_bookkeeping_key(k));
        Ok(all)
    }

    /// Snapshots storage (or `custom_data`) into a new backup record.
    ///
    /// Payloads over the full-backup limit are reduced to the essential keys.
    /// When total usage is already past the pressure threshold nothing is written
    /// and [`BackupOutcome::Skipped`] is returned. A quota failure while writing a
    /// full backup is retried once as a minimal backup.
    pub async fn create_backup(
        &self,
        backup_type: &str,
        reason: &str,
        custom_data: Option<Map<String, Value>>,
    ) -> Result<BackupOutcome> {
        let bytes_in_use = self.kv.bytes_in_use().await?;
        if bytes_in_use > self.config.storage_pressure_bytes {
            warn!(bytes_in_use, backup_type = %backup_type, "storage under pressure; skipping backup");
            return Ok(BackupOutcome::Skipped { bytes_in_use });
        }

        let data = match custom_data {
            Some(data) => data,
            None => self.snapshot().await?,
        };

        if payload_size(&data) > self.config.max_full_backup_bytes {
            info!(backup_type = %backup_type, "payload too large; writing minimal backup");
            return self.write_backup(backup_type, reason, minimal_subset(data), true).await;
        }

        match self.write_backup(backup_type, reason, data.clone(), false).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if is_quota(&e) => {
                warn!(backup_type = %backup_type, "quota exceeded; retrying as minimal backup");
                self.write_backup(backup_type, reason, minimal_subset(data), true)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    async fn write_backup(
        &self,
        backup_type: &str,
        reason: &str,
        data: Map<String, Value>,
        minimal: bool,
    ) -> Result<BackupOutcome> {
        let timestamp = self.next_timestamp();
        let key = keys::backup_key(backup_type, timestamp, minimal);
        let record = BackupRecord {
            id: uid::new_uid(),
            timestamp,
            backup_type: backup_type.to_string(),
            reason: reason.to_string(),
            data_report: DataReport::of(&data),
            data_size: payload_size(&data),
            minimal,
            data,
        };
        let meta = BackupMeta {
            key: key.clone(),
            id: record.id.clone(),
            timestamp,
            backup_type: record.backup_type.clone(),
            minimal,
            data_size: record.data_size,
        };

        self.kv
            .set_one(&key, serde_json::to_value(&record)?)
            .await
            .map_err(anyhow::Error::from)?;
        info!(key = %key, size = meta.data_size, minimal, "backup created");
        Ok(BackupOutcome::Created(meta))
    }

    pub async fn load_backup(&self, key: &str) -> Result<Option<BackupRecord>> {
        let Some(raw) = self.kv.get_one(key).await? else {
            return Ok(None);
        };
        let record = serde_json::from_value(raw).with_context(|| format!("backup {} is corrupt", key))?;
        Ok(Some(record))
    }

    /// Replaces storage with a backup's payload.
    ///
    /// With `validate`, a payload that fails [`is_data_safe`] is refused. The
    /// current state is backed up as `emergency` first. Data keys absent from the
    /// payload are removed; for a minimal backup only essential keys are.
    /// Returns false if the backup does not exist or failed validation.
    pub async fn restore_from_backup(&self, key: &str, validate: bool) -> Result<bool> {
        let Some(record) = self.load_backup(key).await? else {
            warn!(key = %key, "backup not found");
            return Ok(false);
        };
        if validate && !is_data_safe(&record.data) {
            warn!(key = %key, "backup failed validation; not restoring");
            return Ok(false);
        }

        self.create_backup("emergency", &format!("before restoring {}", key), None)
            .await
            .context("failed to back up current state before restore")?;

        let current = self.snapshot().await?;
        let stale: Vec<&str> = current
            .keys()
            .filter(|k| !record.data.contains_key(*k))
            .filter(|k| !record.minimal || keys::is_essential_key(k))
            .map(String::as_str)
            .collect();

        self.kv
            .replace(record.data.clone(), &stale)
            .await
            .with_context(|| format!("failed to restore backup {}", key))?;
        info!(key = %key, removed = stale.len(), "restored backup");
        Ok(true)
    }

    /// Backups of `backup_type` (or all), newest first.
    pub async fn get_available_backups(&self, backup_type: Option<&str>) -> Result<Vec<BackupSummary>> {
        let all = self.kv.get_all().await?;
        let mut out: Vec<BackupSummary> = all
            .iter()
            .filter_map(|(key, value)| {
                let (kind, timestamp, minimal) = keys::parse_backup_key(key)?;
                if backup_type.is_some_and(|t| t != kind) {
                    return None;
                }
                Some(BackupSummary {
                    key: key.clone(),
                    backup_type: kind.to_string(),
                    timestamp,
                    minimal,
                    reason: value.get("reason").and_then(Value::as_str).unwrap_or_default().to_string(),
                    data_size: value.get("dataSize").and_then(Value::as_u64).unwrap_or(0) as usize,
                    collection_count: value
                        .pointer("/dataReport/collectionCount")
                        .and_then(Value::as_u64)
                        .unwrap_or(0) as usize,
                })
            })
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(out)
    }

    /// Per backup type, keeps the newest `max_backups` that are younger than
    /// `max_age_ms`. Finished rollback chains older than `max_age_ms` go too.
    ///
    /// Returns how many records were removed.
    pub async fn cleanup_old_backups(&self, max_backups: usize, max_age_ms: i64) -> Result<usize> {
        let now = now_ms();
        let backups = self.get_available_backups(None).await?;

        let mut kept_per_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut doomed: Vec<String> = Vec::new();
        for backup in backups {
            let kept = kept_per_type.entry(backup.backup_type.clone()).or_default();
            if *kept >= max_backups || now - backup.timestamp > max_age_ms {
                doomed.push(backup.key);
            } else {
                *kept += 1;
            }
        }

        for chain in self.load_all_chains().await? {
            if (chain.completed || chain.rolled_back) && now - chain.timestamp > max_age_ms {
                doomed.push(keys::rollback_chain_key(&chain.id));
            }
        }

        if doomed.is_empty() {
            return Ok(0);
        }
        let refs: Vec<&str> = doomed.iter().map(String::as_str).collect();
        self.kv.remove(&refs).await?;
        info!(removed = doomed.len(), max_backups, max_age_ms, "cleaned up old backups");
        Ok(doomed.len())
    }

    /// Cleanup with the policy matching current storage usage.
    pub async fn cleanup_for_current_usage(&self) -> Result<usize> {
        let usage = self.kv.bytes_in_use().await?;
        let policy = self.config.cleanup_for_usage(usage);
        self.cleanup_old_backups(policy.max_backups, policy.max_age_ms()).await
    }

    // ─── Rollback chains ───────────────────────────────────────────────────

    pub async fn create_rollback_chain(&self, operation_id: &str, steps: &[String]) -> Result<String> {
        let chain = RollbackChain {
            id: uid::new_uid(),
            operation_id: operation_id.to_string(),
            timestamp: now_ms(),
            steps: steps.to_vec(),
            backups: BTreeMap::new(),
            current_step: None,
            completed: false,
            rolled_back: false,
        };
        self.save_chain(&chain).await?;
        debug!(chain = %chain.id, operation = %operation_id, steps = steps.len(), "created rollback chain");
        Ok(chain.id)
    }

    pub async fn load_chain(&self, chain_id: &str) -> Result<Option<RollbackChain>> {
        let Some(raw) = self.kv.get_one(&keys::rollback_chain_key(chain_id)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(raw).with_context(|| format!("rollback chain {} is corrupt", chain_id))?))
    }

    async fn load_all_chains(&self) -> Result<Vec<RollbackChain>> {
        let all = self.kv.get_all().await?;
        Ok(all
            .into_iter()
            .filter(|(k, _)| k.starts_with(ROLLBACK_CHAIN_PREFIX))
            .filter_map(|(k, v)| {
                serde_json::from_value(v)
                    .map_err(|e| warn!(key = %k, error = %e, "skipping corrupt rollback chain"))
                    .ok()
            })
            .collect())
    }

    async fn save_chain(&self, chain: &RollbackChain) -> Result<()> {
        self.kv
            .set_one(&keys::rollback_chain_key(&chain.id), serde_json::to_value(chain)?)
            .await?;
        Ok(())
    }

    async fn require_chain(&self, chain_id: &str) -> Result<RollbackChain> {
        match self.load_chain(chain_id).await? {
            Some(chain) => Ok(chain),
            None => bail!("rollback chain {} not found", chain_id),
        }
    }

    /// Records the backup covering `step_index` and advances `current_step`.
    pub async fn add_to_rollback_chain(&self, chain_id: &str, step_index: usize, backup: BackupRef) -> Result<()> {
        let mut chain = self.require_chain(chain_id).await?;
        chain.backups.insert(step_index, backup);
        chain.current_step = Some(chain.current_step.map_or(step_index, |c| c.max(step_index)));
        self.save_chain(&chain).await
    }

    pub async fn mark_chain_completed(&self, chain_id: &str) -> Result<()> {
        let mut chain = self.require_chain(chain_id).await?;
        chain.completed = true;
        self.save_chain(&chain).await
    }

    /// Restores the chain's backup for `target` without validation and marks
    /// the chain rolled back.
    ///
    /// Returns false when the chain has no usable backup for the target.
    pub async fn execute_rollback(&self, chain_id: &str, target: RollbackTarget) -> Result<bool> {
        let mut chain = self.require_chain(chain_id).await?;
        let usable = |(_, r): &(&usize, &BackupRef)| r.is_usable();
        let chosen = match target {
            RollbackTarget::Earliest => chain.backups.iter().find(usable),
            RollbackTarget::Step(step) => chain.backups.range(..=step).rev().find(usable),
        };
        let Some((step, backup)) = chosen else {
            warn!(chain = %chain_id, ?target, "no usable backup to roll back to");
            return Ok(false);
        };
        let step = *step;
        let Some(key) = backup.key.clone() else {
            return Ok(false);
        };

        let restored = self.restore_from_backup(&key, false).await?;
        chain.rolled_back = restored;
        self.save_chain(&chain).await?;
        info!(chain = %chain_id, step, key = %key, restored, "rollback executed");
        Ok(restored)
    }
}

fn minimal_subset(mut data: Map<String, Value>) -> Map<String, Value> {
    data.retain(|k, _| keys::is_essential_key(k));
    data
}

fn is_quota(e: &anyhow::Error) -> bool {
    e.downcast_ref::<StorageError>().is_some_and(StorageError::is_quota)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabox_store::MemoryStore;

    async fn seeded(quota: Option<usize>) -> Arc<dyn KeyValueStore> {
        let data = json!({
            "tabsArray": [{"uid": "c1", "name": "A", "tabs": [{"uid": "t1", "url": "https://a.dev"}]}],
            "theme": "dark"
        });
        let Value::Object(map) = data else { unreachable!() };
        match quota {
            Some(q) => {
                let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::with_quota(q));
                kv.set(map).await.unwrap();
                kv
            }
            None => Arc::new(MemoryStore::from_map(map)),
        }
    }

    fn data_keys(all: &Map<String, Value>) -> Map<String, Value> {
        all.iter()
            .filter(|(k, _)| !keys::is_bookkeeping_key(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_backup_restore_roundtrip() {
        let kv = seeded(None).await;
        let engine = BackupEngine::new(kv.clone(), BackupConfig::default());
        let before = data_keys(&kv.get_all().await.unwrap());

        let outcome = engine.create_backup("manual", "test", None).await.unwrap();
        let key = outcome.key().unwrap().to_string();
        assert!(key.starts_with("manual_backup_"));

        assert!(engine.restore_from_backup(&key, true).await.unwrap());
        assert_eq!(data_keys(&kv.get_all().await.unwrap()), before);
    }

    #[tokio::test]
    async fn test_restore_removes_keys_added_later() {
        let kv = seeded(None).await;
        let engine = BackupEngine::new(kv.clone(), BackupConfig::default());
        let key = engine
            .create_backup("manual", "test", None)
            .await
            .unwrap()
            .key()
            .unwrap()
            .to_string();

        kv.set_one("collection_new", json!({"uid": "new"})).await.unwrap();
        kv.set_one("tabsArray", json!([])).await.unwrap();
        assert!(engine.restore_from_backup(&key, true).await.unwrap());

        let all = kv.get_all().await.unwrap();
        assert!(!all.contains_key("collection_new"));
        assert_eq!(all["tabsArray"][0]["uid"], json!("c1"));
        assert_eq!(engine.get_available_backups(Some("emergency")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restore_refuses_invalid_backup_when_validating() {
        let kv = seeded(None).await;
        let engine = BackupEngine::new(kv.clone(), BackupConfig::default());
        let mut bad = Map::new();
        bad.insert("tabsArray".to_string(), json!("not an array"));
        let key = engine
            .create_backup("manual", "bad", Some(bad))
            .await
            .unwrap()
            .key()
            .unwrap()
            .to_string();

        assert!(!engine.restore_from_backup(&key, true).await.unwrap());
        assert!(engine.restore_from_backup(&key, false).await.unwrap());
        assert_eq!(kv.get_one("tabsArray").await.unwrap(), Some(json!("not an array")));
        assert!(!engine.restore_from_backup("nope_backup_1", true).await.unwrap());
    }

    #[tokio::test]
    async fn test_large_payload_is_minimal() {
        let kv = seeded(None).await;
        let config = BackupConfig {
            max_full_backup_bytes: 10,
            ..Default::default()
        };
        let engine = BackupEngine::new(kv, config);
        let BackupOutcome::Created(meta) = engine.create_backup("manual", "big", None).await.unwrap() else {
            panic!("expected a backup");
        };
        assert!(meta.minimal);
        assert!(meta.key.contains("_backup_minimal_"));
        let record = engine.load_backup(&meta.key).await.unwrap().unwrap();
        assert!(record.data.contains_key("tabsArray"));
        assert!(!record.data.contains_key("theme"));
    }

    #[tokio::test]
    async fn test_pressure_skips_backup() {
        let kv = seeded(None).await;
        let config = BackupConfig {
            storage_pressure_bytes: 10,
            ..Default::default()
        };
        let engine = BackupEngine::new(kv.clone(), config);
        let outcome = engine.create_backup("manual", "x", None).await.unwrap();
        assert!(matches!(outcome, BackupOutcome::Skipped { .. }));
        assert!(engine.get_available_backups(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quota_retries_minimal() {
        let kv = seeded(Some(450)).await;
        let engine = BackupEngine::new(kv.clone(), BackupConfig::default());
        let mut custom = Map::new();
        custom.insert("theme".to_string(), json!("x".repeat(300)));
        custom.insert("tabsArray".to_string(), json!([]));

        let BackupOutcome::Created(meta) = engine.create_backup("manual", "quota", Some(custom)).await.unwrap() else {
            panic!("expected a backup");
        };
        assert!(meta.minimal);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_newest_per_type() {
        let kv = seeded(None).await;
        let engine = BackupEngine::new(kv.clone(), BackupConfig::default());
        for _ in 0..4 {
            engine.create_backup("auto", "tick", None).await.unwrap();
        }
        engine.create_backup("manual", "once", None).await.unwrap();

        let removed = engine.cleanup_old_backups(2, 7 * 24 * 60 * 60 * 1000).await.unwrap();
        assert_eq!(removed, 2);
        let remaining = engine.get_available_backups(None).await.unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(remaining.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

        assert_eq!(engine.cleanup_old_backups(0, 7 * 24 * 60 * 60 * 1000).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_rollback_chain_to_step() {
        let kv = seeded(None).await;
        let engine = BackupEngine::new(kv.clone(), BackupConfig::default());
        let chain_id = engine
            .create_rollback_chain("op", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        let first = engine.create_backup("step", "a", None).await.unwrap();
        engine
            .add_to_rollback_chain(&chain_id, 0, BackupRef::from_outcome(&first, 1))
            .await
            .unwrap();
        kv.set_one("tabsArray", json!([])).await.unwrap();

        let second = engine.create_backup("step", "b", None).await.unwrap();
        engine
            .add_to_rollback_chain(&chain_id, 1, BackupRef::from_outcome(&second, 2))
            .await
            .unwrap();
        kv.set_one("theme", json!("light")).await.unwrap();

        let chain = engine.load_chain(&chain_id).await.unwrap().unwrap();
        assert!(chain.is_covered());
        assert_eq!(chain.current_step, Some(1));

        assert!(engine.execute_rollback(&chain_id, RollbackTarget::Step(1)).await.unwrap());
        assert_eq!(kv.get_one("tabsArray").await.unwrap(), Some(json!([])));
        assert_eq!(kv.get_one("theme").await.unwrap(), Some(json!("dark")));

        assert!(engine.execute_rollback(&chain_id, RollbackTarget::Earliest).await.unwrap());
        assert_eq!(kv.get_one("tabsArray").await.unwrap().unwrap()[0]["uid"], json!("c1"));
        assert!(engine.load_chain(&chain_id).await.unwrap().unwrap().rolled_back);
    }

    #[tokio::test]
    async fn test_atomic_transaction_surfaces_errors() {
        let ok = atomic_storage_transaction("ok", || async { Ok(7) }).await.unwrap();
        assert_eq!(ok, 7);

        let err = atomic_storage_transaction("boom", || async { Err::<(), _>(anyhow::anyhow!("inner")) })
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("inner"));
    }
}
