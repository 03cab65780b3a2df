//! Validation, backups and schema migration for tabox storage.
//!
//! The [`MigrationCoordinator`] runs once at startup, before anything reads
//! collections through the indexed store. It detects the stored schema,
//! backs the data up and walks the named [`MigrationStep`]s to the current
//! version, rolling back to the earliest backup if any step fails.

pub mod backup;
pub mod config;
pub mod coordinator;
pub mod steps;
pub mod validate;
pub mod version;

pub use backup::{
    atomic_storage_transaction, BackupEngine, BackupMeta, BackupOutcome, BackupRecord, BackupRef, BackupSummary,
    RollbackChain, RollbackTarget,
};
pub use config::{BackupConfig, CleanupPolicy, MigrationConfig};
pub use coordinator::{MigrationAssessment, MigrationCoordinator, MigrationOutcome, MigrationRecord};
pub use steps::MigrationStep;
pub use validate::{detect_and_validate_format, is_data_safe, DataFormat, FormatDetection, ValidationReport};
pub use version::{calculate_migration_path, detect_current_version_from_data, SchemaVersion, CURRENT_VERSION};
