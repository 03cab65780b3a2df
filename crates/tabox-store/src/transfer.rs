//! JSON export and the import dispatcher.
//!
//! Four payload shapes are recognized:
//!
//! - `{"type": "full_export", "collections": [...], "folders": [...]}`
//! - `{"type": "folder", "folder": {...}, "collections": [...]}`
//! - a plain array of collections
//! - a single collection object
//!
//! Importing never reuses uids from the payload and never overwrites an existing
//! entity: every imported folder, collection, tab and group gets a fresh uid, and
//! names that clash with stored ones get a copy name.

use std::collections::{BTreeSet, HashMap};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabox_core::{disambiguate_name, migrate_all_collection_colors, migrate_color, now_ms, uid, Collection, Folder};
use tracing::info;

use crate::indexed::{CollectionStore, LoadOptions};

/// Format version written into full exports.
pub const EXPORT_VERSION: &str = "4.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullExport {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub exported_at: i64,
    #[serde(default)]
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub folders: Vec<Folder>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderExport {
    pub folder: Folder,
    #[serde(default)]
    pub collections: Vec<Collection>,
}

/// A decoded export payload.
#[derive(Debug, Clone)]
pub enum ExportPayload {
    Full(FullExport),
    Folder(FolderExport),
    Collections(Vec<Collection>),
    Single(Collection),
}

impl ExportPayload {
    /// Serializes with the `type` discriminator the import dispatcher expects.
    pub fn to_json(&self) -> anyhow::Result<Value> {
        let tagged = |kind: &str, body: Value| -> Value {
            let mut obj = match body {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            };
            obj.insert("type".to_string(), Value::String(kind.to_string()));
            Value::Object(obj)
        };
        Ok(match self {
            ExportPayload::Full(full) => tagged("full_export", serde_json::to_value(full)?),
            ExportPayload::Folder(folder) => tagged("folder", serde_json::to_value(folder)?),
            ExportPayload::Collections(list) => serde_json::to_value(list)?,
            ExportPayload::Single(collection) => serde_json::to_value(collection)?,
        })
    }

    /// Classifies a parsed JSON document.
    pub fn parse(value: Value) -> anyhow::Result<Self> {
        if value.is_array() {
            let list = serde_json::from_value(value).context("invalid collection array")?;
            return Ok(ExportPayload::Collections(list));
        }
        let (kind, has_tabs, has_folder) = match &value {
            Value::Object(obj) => (
                obj.get("type").and_then(Value::as_str).map(str::to_string),
                obj.contains_key("tabs"),
                obj.contains_key("folder"),
            ),
            _ => bail!("export payload must be a JSON object or array"),
        };

        match kind.as_deref() {
            Some("full_export") => Ok(ExportPayload::Full(
                serde_json::from_value(value).context("invalid full export")?,
            )),
            Some("folder") if has_folder => Ok(ExportPayload::Folder(
                serde_json::from_value(value).context("invalid folder export")?,
            )),
            Some("collection") | None if has_tabs => Ok(ExportPayload::Single(
                serde_json::from_value(value).context("invalid collection")?,
            )),
            Some(other) => bail!("unrecognized export type: {}", other),
            None => bail!("unrecognized export payload: no type and no tabs"),
        }
    }

    pub fn collection_count(&self) -> usize {
        match self {
            ExportPayload::Full(full) => full.collections.len(),
            ExportPayload::Folder(folder) => folder.collections.len(),
            ExportPayload::Collections(list) => list.len(),
            ExportPayload::Single(_) => 1,
        }
    }
}

/// Counts from one import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub collections_imported: usize,
    pub folders_imported: usize,
    /// Imported entities whose name had to be changed
    pub renamed: usize,
}

impl CollectionStore {
    /// Exports every folder and collection.
    pub async fn export_all(&self) -> anyhow::Result<ExportPayload> {
        let collections = self.load_all_collections(&LoadOptions::default()).await?;
        let folders = self.load_all_folders(None).await?;
        Ok(ExportPayload::Full(FullExport {
            version: Some(EXPORT_VERSION.to_string()),
            exported_at: now_ms(),
            collections,
            folders,
        }))
    }

    /// Exports one folder with its collections, or `None` if it does not exist.
    pub async fn export_folder(&self, folder_uid: &str) -> anyhow::Result<Option<ExportPayload>> {
        let Some(folder) = self.load_single_folder(folder_uid).await? else {
            return Ok(None);
        };
        let collections = self.get_folder_collections(folder_uid).await?;
        Ok(Some(ExportPayload::Folder(FolderExport { folder, collections })))
    }

    pub async fn export_collection(&self, collection_uid: &str) -> anyhow::Result<Option<ExportPayload>> {
        Ok(self
            .load_single_collection(collection_uid)
            .await?
            .map(ExportPayload::Single))
    }

    /// Imports a payload under fresh uids.
    ///
    /// Folder links inside the payload are remapped to the new folder uids;
    /// links to folders outside the payload are dropped, so those collections
    /// land at the root.
    pub async fn import(&self, payload: ExportPayload) -> anyhow::Result<ImportReport> {
        let (folders, collections) = match payload {
            ExportPayload::Full(full) => (full.folders, full.collections),
            ExportPayload::Folder(export) => (vec![export.folder], export.collections),
            ExportPayload::Collections(list) => (Vec::new(), list),
            ExportPayload::Single(collection) => (Vec::new(), vec![collection]),
        };

        let _guard = self.lock_writes().await;
        let mut folders_index = self.load_folders_index().await?;
        let mut collections_index = self.load_collections_index().await?;
        let now = now_ms();
        let mut report = ImportReport::default();

        let mut folder_names: Vec<String> = folders_index.values().map(|e| e.name.clone()).collect();
        let mut remapped = HashMap::new();
        let mut new_folders = Vec::with_capacity(folders.len());
        for mut folder in folders {
            let fresh = uid::new_uid();
            remapped.insert(std::mem::replace(&mut folder.uid, fresh), folder.uid.clone());
            let name = disambiguate_name(&folder.name, folder_names.iter().map(String::as_str));
            if name != folder.name {
                report.renamed += 1;
            }
            folder.name = name;
            folder.color = migrate_color(&folder.color).to_string();
            folder.last_updated = now;
            folder.collection_count = 0;
            folder_names.push(folder.name.clone());
            new_folders.push(folder);
        }

        let mut collection_names: Vec<String> = collections_index.values().map(|e| e.name.clone()).collect();
        let mut new_collections = Vec::with_capacity(collections.len());
        for source in collections {
            let mut collection = source.clone_with_fresh_uids();
            collection.parent_id = source
                .parent_id
                .as_ref()
                .and_then(|old| remapped.get(old).cloned());
            let name = disambiguate_name(&source.name, collection_names.iter().map(String::as_str));
            if name != source.name {
                report.renamed += 1;
            }
            collection.name = name;
            if collection.created_on == 0 {
                collection.created_on = now;
            }
            collection.last_updated = now;
            collection_names.push(collection.name.clone());
            new_collections.push(collection);
        }
        migrate_all_collection_colors(&mut new_collections);

        for folder in new_folders.iter_mut() {
            folder.collection_count = new_collections
                .iter()
                .filter(|c| c.parent_id.as_deref() == Some(folder.uid.as_str()))
                .count();
        }

        self.write_collections(&new_collections, &mut collections_index)
            .await?;
        self.write_folders(&new_folders, &mut folders_index).await?;

        let touched: BTreeSet<String> = new_folders.iter().map(|f| f.uid.clone()).collect();
        self.recount_folders(&touched, &collections_index).await?;

        report.collections_imported = new_collections.len();
        report.folders_imported = new_folders.len();
        info!(
            collections = report.collections_imported,
            folders = report.folders_imported,
            renamed = report.renamed,
            "import complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> CollectionStore {
        CollectionStore::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_parse_dispatch() {
        let single = json!({"uid": "c1", "name": "A", "tabs": []});
        assert!(matches!(ExportPayload::parse(single).unwrap(), ExportPayload::Single(_)));

        let typed = json!({"type": "collection", "uid": "c1", "name": "A", "tabs": []});
        assert!(matches!(ExportPayload::parse(typed).unwrap(), ExportPayload::Single(_)));

        let list = json!([{"uid": "c1", "name": "A", "tabs": []}]);
        assert_eq!(ExportPayload::parse(list).unwrap().collection_count(), 1);

        let folder = json!({"type": "folder", "folder": {"uid": "f1", "name": "F"}, "collections": []});
        assert!(matches!(ExportPayload::parse(folder).unwrap(), ExportPayload::Folder(_)));

        let full = json!({"type": "full_export", "collections": [], "folders": []});
        assert!(matches!(ExportPayload::parse(full).unwrap(), ExportPayload::Full(_)));

        assert!(ExportPayload::parse(json!({"type": "mystery"})).is_err());
        assert!(ExportPayload::parse(json!({"name": "no tabs"})).is_err());
        assert!(ExportPayload::parse(json!("text")).is_err());
    }

    #[tokio::test]
    async fn test_export_import_roundtrip_regenerates_uids() {
        let store = store();
        let folder = store.create_folder("Work", None).await.unwrap();
        let mut c = Collection::new("c1", "Reading");
        c.tabs.push(tabox_core::Tab::new("t1", "https://a.dev", "A"));
        store.save_single_collection(&c).await.unwrap();
        store.move_collection_to_folder("c1", &folder.uid).await.unwrap();

        let exported = store.export_all().await.unwrap().to_json().unwrap();
        assert_eq!(exported["type"], json!("full_export"));

        let report = store
            .import(ExportPayload::parse(exported).unwrap())
            .await
            .unwrap();
        assert_eq!(report.collections_imported, 1);
        assert_eq!(report.folders_imported, 1);
        assert_eq!(report.renamed, 2);

        let collections = store.load_collections_index().await.unwrap();
        assert_eq!(collections.len(), 2);
        let imported = collections
            .iter()
            .find(|(uid, _)| uid.as_str() != "c1")
            .map(|(uid, _)| uid.clone())
            .unwrap();
        let body = store.load_single_collection(&imported).await.unwrap().unwrap();
        assert_eq!(body.name, "Reading (copy)");
        assert_ne!(body.tabs[0].uid, "t1");

        let new_folder_uid = body.parent_id.clone().unwrap();
        assert_ne!(new_folder_uid, folder.uid);
        let new_folder = store.load_single_folder(&new_folder_uid).await.unwrap().unwrap();
        assert_eq!(new_folder.name, "Work (copy)");
        assert_eq!(new_folder.collection_count, 1);
        let old_folder = store.load_single_folder(&folder.uid).await.unwrap().unwrap();
        assert_eq!(old_folder.collection_count, 1);
    }

    #[tokio::test]
    async fn test_import_single_drops_foreign_parent() {
        let store = store();
        let mut c = Collection::new("c1", "Loose");
        c.parent_id = Some("elsewhere".to_string());
        c.color = "#d93025".to_string();

        let report = store.import(ExportPayload::Single(c)).await.unwrap();
        assert_eq!(report.renamed, 0);

        let all = store.load_all_collections(&LoadOptions::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].parent_id.is_none());
        assert_eq!(all[0].color, "red");
        assert_ne!(all[0].uid, "c1");
    }

    #[tokio::test]
    async fn test_export_missing() {
        let store = store();
        assert!(store.export_folder("nope").await.unwrap().is_none());
        assert!(store.export_collection("nope").await.unwrap().is_none());
    }
}
