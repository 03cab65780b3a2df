//! Thresholds and policies for backups and migration.
//!
//! Every field has a default, so an absent or partial `[backup]` / `[migration]`
//! table in `config.toml` is valid.

use serde::{Deserialize, Serialize};

const MB: usize = 1024 * 1024;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// How many backups of one type to keep, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupPolicy {
    pub max_backups: usize,
    pub max_age_days: i64,
}

impl CleanupPolicy {
    pub fn max_age_ms(&self) -> i64 {
        self.max_age_days * DAY_MS
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Payloads larger than this are backed up minimally
    pub max_full_backup_bytes: usize,
    /// Above this much total usage, backups are skipped and cleanup gets aggressive
    pub storage_pressure_bytes: usize,
    pub cleanup: CleanupPolicy,
    pub pressure_cleanup: CleanupPolicy,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            max_full_backup_bytes: 5 * MB,
            storage_pressure_bytes: 8 * MB,
            cleanup: CleanupPolicy {
                max_backups: 5,
                max_age_days: 7,
            },
            pressure_cleanup: CleanupPolicy {
                max_backups: 2,
                max_age_days: 1,
            },
        }
    }
}

impl BackupConfig {
    /// The cleanup policy to use at the given total storage usage.
    pub fn cleanup_for_usage(&self, bytes_in_use: usize) -> CleanupPolicy {
        if bytes_in_use > self.storage_pressure_bytes {
            self.pressure_cleanup
        } else {
            self.cleanup
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Version recorded in `migration_history` when a run completes
    pub app_version: String,
    /// A lock older than this is treated as left behind by a crashed run
    pub lock_stale_after_minutes: i64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            lock_stale_after_minutes: 30,
        }
    }
}

impl MigrationConfig {
    pub fn lock_stale_after_ms(&self) -> i64 {
        self.lock_stale_after_minutes * 60 * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_for_usage() {
        let config = BackupConfig::default();
        assert_eq!(config.cleanup_for_usage(MB).max_backups, 5);
        assert_eq!(config.cleanup_for_usage(9 * MB).max_backups, 2);
        assert_eq!(config.cleanup_for_usage(9 * MB).max_age_ms(), DAY_MS);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: MigrationConfig = serde_json::from_str(r#"{"app_version": "9.9"}"#).unwrap();
        assert_eq!(config.app_version, "9.9");
        assert_eq!(config.lock_stale_after_ms(), 30 * 60 * 1000);
    }
}
