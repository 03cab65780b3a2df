//! Storage for tabox.
//!
//! This crate owns everything that touches persisted state: the [`KeyValueStore`]
//! boundary with its in-memory and libSQL adapters, the indexed collection/folder
//! store, folder operations, the host collaborator traits used to capture and
//! open tabs, and the import/export dispatcher.

use std::path::PathBuf;

use anyhow::Context;

pub mod folders;
pub mod host;
pub mod indexed;
pub mod kv;
pub mod libsql_store;
pub mod transfer;

pub use folders::{FolderCopy, FolderDeletion, FolderError};
pub use host::{capture_current_tabs, open_collection, TabQuery, TabSource, WindowHint, WindowOpener};
pub use indexed::{CollectionPatch, CollectionStore, LoadOptions, SortBy, SortOrder};
pub use kv::{KeyValueStore, MemoryStore, StorageError};
pub use libsql_store::LibsqlStore;
pub use transfer::{ExportPayload, ImportReport};

/// Returns the default data directory for tabox.
///
/// On Linux: `~/.local/share/tabox`
/// On macOS: `~/Library/Application Support/tabox`
/// On Windows: `%LOCALAPPDATA%\tabox`
pub fn default_data_dir() -> anyhow::Result<PathBuf> {
    let dir = dirs::data_local_dir()
        .ok_or_else(|| anyhow::anyhow!("cannot find data dir"))?
        .join("tabox");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create data directory: {}", dir.display()))?;
    Ok(dir)
}

/// Statistics about the store.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total_collections: usize,
    pub total_folders: usize,
    pub total_tabs: usize,
    pub root_collections: usize,
    pub bytes_in_use: usize,
    /// Most recent `lastUpdated` across collections, in Unix milliseconds
    pub newest_update: Option<i64>,
}

impl CollectionStore {
    /// Get statistics from the indexes alone.
    pub async fn get_stats(&self) -> anyhow::Result<StoreStats> {
        let collections = self.load_collections_index().await?;
        let folders = self.load_folders_index().await?;
        let bytes_in_use = self.kv().bytes_in_use().await?;

        Ok(StoreStats {
            total_collections: collections.len(),
            total_folders: folders.len(),
            total_tabs: collections.values().map(|e| e.tab_count).sum(),
            root_collections: collections.values().filter(|e| e.parent_id.is_none()).count(),
            bytes_in_use,
            newest_update: collections.values().map(|e| e.last_updated).max(),
        })
    }
}
