use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tabox_migrate::{BackupConfig, MigrationConfig};

const CONFIG_FILENAME: &str = "config.toml";
const DB_FILENAME: &str = "tabox.db";

/// Configuration for tabox, stored in `<config dir>/tabox/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TaboxConfig {
    /// Overrides the platform data directory
    pub data_dir: Option<PathBuf>,
    /// Filter used when `RUST_LOG` is unset
    pub log_level: String,
    pub backup: BackupConfig,
    pub migration: MigrationConfig,
}

impl Default for TaboxConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_level: "warn".to_string(),
            backup: BackupConfig::default(),
            migration: MigrationConfig::default(),
        }
    }
}

impl TaboxConfig {
    pub fn config_dir() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("cannot find config dir"))?
            .join("tabox"))
    }

    /// Loads `config.toml` from `config_dir`, or defaults if there is none.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(CONFIG_FILENAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Writes `config.toml` into `config_dir`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(config_dir)
            .with_context(|| format!("failed to create config directory: {}", config_dir.display()))?;
        let path = config_dir.join(CONFIG_FILENAME);
        fs::write(&path, toml::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create data directory: {}", dir.display()))?;
                Ok(dir.clone())
            }
            None => tabox_store::default_data_dir(),
        }
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(DB_FILENAME))
    }
}
