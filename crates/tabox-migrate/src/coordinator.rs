//! Runs migration paths against a key-value store.
//!
//! One [`MigrationCoordinator`] is constructed per process with the store it
//! migrates. Runs in other processes are kept out by a lock record stored in
//! the key-value store itself; runs in this process by an in-memory flag.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tabox_core::keys::{
    APP_METADATA, COLLECTIONS_INDEX, FOLDERS_INDEX, MIGRATION_HISTORY, MIGRATION_LOCK, SCHEMA_VERSION,
    SCHEMA_VERSION_UPDATED,
};
use tabox_core::{now_ms, uid};
use tabox_store::KeyValueStore;
use tracing::{error, info, warn};

use crate::backup::{atomic_storage_transaction, BackupEngine, BackupRef, RollbackTarget};
use crate::config::{BackupConfig, MigrationConfig};
use crate::steps::MigrationStep;
use crate::validate::{detect_and_validate_format, DataFormat};
use crate::version::{
    calculate_migration_path, detect_current_version_from_data, needs_color_migration, SchemaVersion,
    CURRENT_VERSION,
};

/// Replacement for a step's transformation, used to exercise failure paths.
#[doc(hidden)]
pub type StepOverride = Arc<dyn Fn(&mut Map<String, Value>) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MigrationLock {
    owner: String,
    acquired_at: i64,
}

/// One `migration_history` entry, keyed by app version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    pub completed: bool,
    pub timestamp: i64,
    pub from_version: String,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationAssessment {
    pub current_version: String,
    pub format: DataFormat,
    pub needs_migration: bool,
    pub needs_color_migration: bool,
    pub steps: Vec<MigrationStep>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOutcome {
    pub success: bool,
    pub skipped: bool,
    pub from_version: Option<String>,
    pub to_version: Option<String>,
    pub steps_completed: Vec<String>,
    pub error: Option<String>,
    /// Set only when a failed run attempted a rollback
    pub rollback_success: Option<bool>,
    pub chain_id: Option<String>,
}

impl MigrationOutcome {
    fn skipped(version: &str) -> Self {
        Self {
            success: true,
            skipped: true,
            from_version: Some(version.to_string()),
            to_version: Some(version.to_string()),
            ..Default::default()
        }
    }
}

/// Clears the in-process running flag when a run ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct MigrationCoordinator {
    kv: Arc<dyn KeyValueStore>,
    backups: BackupEngine,
    config: MigrationConfig,
    instance_id: String,
    running: AtomicBool,
    overrides: HashMap<MigrationStep, StepOverride>,
}

impl MigrationCoordinator {
    pub fn new(kv: Arc<dyn KeyValueStore>, backup_config: BackupConfig, config: MigrationConfig) -> Self {
        Self {
            backups: BackupEngine::new(kv.clone(), backup_config),
            kv,
            config,
            instance_id: uid::new_uid(),
            running: AtomicBool::new(false),
            overrides: HashMap::new(),
        }
    }

    /// Runs `f` in place of `step`'s own transformation.
    #[doc(hidden)]
    pub fn with_step_override(
        mut self,
        step: MigrationStep,
        f: impl Fn(&mut Map<String, Value>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.overrides.insert(step, Arc::new(f));
        self
    }

    pub fn backups(&self) -> &BackupEngine {
        &self.backups
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Decides whether a run is needed and which steps it would take.
    ///
    /// A completed history entry for the configured app version skips the
    /// run unless stored colors still need migrating.
    pub async fn assess_migration_needs(&self) -> Result<MigrationAssessment> {
        let data = self.backups.snapshot().await?;
        Ok(self.assess(&data))
    }

    fn assess(&self, data: &Map<String, Value>) -> MigrationAssessment {
        let version = detect_current_version_from_data(data);
        let format = detect_and_validate_format(data).format;
        let colors = needs_color_migration(data);
        let mut steps = calculate_migration_path(version);

        let reason = if self.history_completed(data) && !colors {
            steps.clear();
            format!("already migrated for {}", self.config.app_version)
        } else if steps.is_empty() && colors {
            steps.push(MigrationStep::ColorMigration);
            "stored colors need migration".to_string()
        } else if steps.is_empty() {
            "data is current".to_string()
        } else {
            format!("data is at schema {}", version)
        };

        MigrationAssessment {
            current_version: version.to_string(),
            format,
            needs_migration: !steps.is_empty(),
            needs_color_migration: colors,
            steps,
            reason,
        }
    }

    fn history_completed(&self, data: &Map<String, Value>) -> bool {
        data.get(MIGRATION_HISTORY)
            .and_then(|h| h.get(&self.config.app_version))
            .and_then(|r| r.get("completed"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Brings stored data to the current schema.
    ///
    /// Never returns a step failure as `Err`: failures roll back to the
    /// chain's earliest backup and come back as `success: false`. `force`
    /// runs the path for the detected version even when the assessment says
    /// nothing is needed.
    pub async fn execute_migration(&self, force: bool) -> MigrationOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("migration already running in this process");
            return MigrationOutcome {
                success: true,
                skipped: true,
                ..Default::default()
            };
        }
        let _guard = RunningGuard(&self.running);

        match self.run(force).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %format!("{:#}", e), "migration could not start");
                MigrationOutcome {
                    error: Some(format!("{:#}", e)),
                    ..Default::default()
                }
            }
        }
    }

    async fn run(&self, force: bool) -> Result<MigrationOutcome> {
        let data = self.backups.snapshot().await?;

        if detect_and_validate_format(&data).format == DataFormat::Empty && !data.contains_key(SCHEMA_VERSION) {
            self.initialize_fresh_install().await?;
            return Ok(MigrationOutcome::skipped(CURRENT_VERSION));
        }

        let assessment = self.assess(&data);
        let version = detect_current_version_from_data(&data);
        let steps = if force && !assessment.needs_migration {
            calculate_migration_path(version)
        } else {
            assessment.steps.clone()
        };
        if steps.is_empty() {
            info!(reason = %assessment.reason, "no migration needed");
            return Ok(MigrationOutcome::skipped(version.as_str()));
        }

        if !self.acquire_lock().await? {
            return Ok(MigrationOutcome {
                from_version: Some(version.to_string()),
                error: Some("migration is locked by another context".to_string()),
                ..Default::default()
            });
        }

        let outcome = self.run_steps(version, &steps, data).await;
        if let Err(e) = self.release_lock().await {
            warn!(error = %format!("{:#}", e), "failed to clear migration lock");
        }
        Ok(outcome)
    }

    async fn initialize_fresh_install(&self) -> Result<()> {
        let now = now_ms();
        let mut items = Map::new();
        items.insert(SCHEMA_VERSION.to_string(), json!(CURRENT_VERSION));
        items.insert(SCHEMA_VERSION_UPDATED.to_string(), json!(now));
        items.insert(
            APP_METADATA.to_string(),
            json!({"version": CURRENT_VERSION, "lastUpdated": now}),
        );
        items.insert(COLLECTIONS_INDEX.to_string(), json!({}));
        items.insert(FOLDERS_INDEX.to_string(), json!({}));
        self.kv.set(items).await.context("failed to initialize storage")?;
        info!("fresh install initialized at {}", CURRENT_VERSION);
        Ok(())
    }

    /// Takes the lock unless another owner holds a fresh one.
    async fn acquire_lock(&self) -> Result<bool> {
        let now = now_ms();
        if let Some(raw) = self.kv.get_one(MIGRATION_LOCK).await? {
            match serde_json::from_value::<MigrationLock>(raw) {
                Ok(lock) if lock.owner != self.instance_id => {
                    let age = now - lock.acquired_at;
                    if age < self.config.lock_stale_after_ms() {
                        warn!(owner = %lock.owner, age_ms = age, "migration lock held elsewhere");
                        return Ok(false);
                    }
                    warn!(owner = %lock.owner, age_ms = age, "clearing stale migration lock");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "replacing unreadable migration lock"),
            }
        }
        let lock = MigrationLock {
            owner: self.instance_id.clone(),
            acquired_at: now,
        };
        self.kv
            .set_one(MIGRATION_LOCK, serde_json::to_value(&lock)?)
            .await
            .context("failed to write migration lock")?;
        Ok(true)
    }

    async fn release_lock(&self) -> Result<()> {
        self.kv.remove(&[MIGRATION_LOCK]).await?;
        Ok(())
    }

    async fn run_steps(
        &self,
        from: SchemaVersion,
        steps: &[MigrationStep],
        data: Map<String, Value>,
    ) -> MigrationOutcome {
        let names: Vec<String> = steps.iter().map(|s| s.name().to_string()).collect();
        let mut outcome = MigrationOutcome {
            from_version: Some(from.to_string()),
            ..Default::default()
        };

        let chain_id = match self
            .backups
            .create_rollback_chain(&format!("migrate_from_{}", from), &names)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                outcome.error = Some(format!("{:#}", e));
                return outcome;
            }
        };
        outcome.chain_id = Some(chain_id.clone());
        info!(from = %from, steps = ?names, chain = %chain_id, "starting migration");

        let mut working = data;
        let mut last_backup: Option<BackupRef> = None;
        for (index, step) in steps.iter().enumerate() {
            match self
                .run_step(&chain_id, index, *step, &mut working, &mut last_backup)
                .await
            {
                Ok(()) => outcome.steps_completed.push(step.name().to_string()),
                Err(e) => {
                    let message = format!("{:#}", e);
                    error!(step = step.name(), error = %message, "migration step failed; rolling back");
                    let rolled_back = match self.backups.execute_rollback(&chain_id, RollbackTarget::Earliest).await {
                        Ok(restored) => restored,
                        Err(rollback_err) => {
                            error!(error = %format!("{:#}", rollback_err), "rollback failed");
                            false
                        }
                    };
                    outcome.error = Some(message);
                    outcome.rollback_success = Some(rolled_back);
                    return outcome;
                }
            }
        }

        if let Err(e) = self.finish(&chain_id, from, &names, working).await {
            // The data is migrated but unmarked; the next run re-detects it from shape.
            warn!(error = %format!("{:#}", e), "failed to record migration completion");
        }
        if let Err(e) = self.backups.cleanup_for_current_usage().await {
            warn!(error = %format!("{:#}", e), "backup cleanup after migration failed");
        }

        info!(from = %from, to = CURRENT_VERSION, "migration complete");
        outcome.success = true;
        outcome.to_version = Some(CURRENT_VERSION.to_string());
        outcome
    }

    async fn run_step(
        &self,
        chain_id: &str,
        index: usize,
        step: MigrationStep,
        working: &mut Map<String, Value>,
        last_backup: &mut Option<BackupRef>,
    ) -> Result<()> {
        let backup = match last_backup.as_ref() {
            Some(previous) if index > 0 && step.is_side_effect_safe() => previous.reuse(),
            _ => {
                let (kind, reason) = if index == 0 {
                    ("pre_migration", format!("before {}", step))
                } else {
                    ("migration_step", format!("before step {} ({})", index, step))
                };
                let timestamp = now_ms();
                let created = self.backups.create_backup(kind, &reason, Some(working.clone())).await?;
                BackupRef::from_outcome(&created, timestamp)
            }
        };
        if !backup.is_usable() {
            warn!(step = step.name(), "no usable backup for this step; storage is under pressure");
        }
        self.backups.add_to_rollback_chain(chain_id, index, backup.clone()).await?;
        *last_backup = Some(backup);

        let now = now_ms();
        let previous: &Map<String, Value> = working;
        let mut next = previous.clone();
        let next_ref = &mut next;
        atomic_storage_transaction(step.name(), || async move {
            match self.overrides.get(&step) {
                Some(f) => f(&mut *next_ref)?,
                None => {
                    let changed = step.apply(&mut *next_ref, now)?;
                    info!(step = step.name(), changed, "step applied");
                }
            }
            detect_and_validate_format(next_ref)
                .ensure_valid()
                .with_context(|| format!("data failed validation after {}", step))?;
            let removed: Vec<&str> = previous
                .keys()
                .filter(|k| !next_ref.contains_key(*k))
                .map(String::as_str)
                .collect();
            self.kv
                .replace(next_ref.clone(), &removed)
                .await
                .with_context(|| format!("failed to persist {}", step))?;
            Ok(())
        })
        .await?;

        *working = next;
        Ok(())
    }

    async fn finish(
        &self,
        chain_id: &str,
        from: SchemaVersion,
        names: &[String],
        working: Map<String, Value>,
    ) -> Result<()> {
        let now = now_ms();
        let mut history = match working.get(MIGRATION_HISTORY) {
            Some(Value::Object(h)) => h.clone(),
            _ => Map::new(),
        };
        let record = MigrationRecord {
            completed: true,
            timestamp: now,
            from_version: from.to_string(),
            steps: names.to_vec(),
        };
        history.insert(self.config.app_version.clone(), serde_json::to_value(&record)?);

        let mut items = Map::new();
        items.insert(SCHEMA_VERSION.to_string(), json!(CURRENT_VERSION));
        items.insert(SCHEMA_VERSION_UPDATED.to_string(), json!(now));
        items.insert(MIGRATION_HISTORY.to_string(), Value::Object(history));
        self.kv.set(items).await?;
        self.backups.mark_chain_completed(chain_id).await
    }
}
