//! Indexed storage for collections and folders.
//!
//! Full bodies live under `collection_<uid>` / `folder_<uid>`; a lightweight
//! uid → metadata projection lives under `collections_index` / `folders_index`
//! so listings never have to load tab arrays. A body and its index entry are
//! always written in the same store call, so a failed write leaves both as they
//! were.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tabox_core::keys::{self, COLLECTIONS_INDEX, FOLDERS_INDEX};
use tabox_core::{Collection, CollectionsIndex, Folder, FoldersIndex, Group, Tab};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::kv::KeyValueStore;

/// Field used to order listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    LastUpdated,
    Name,
    Color,
    /// The persisted manual `order`; unordered entries come last
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Options for [`CollectionStore::load_all_collections`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Build shells from the index instead of loading full bodies
    pub metadata_only: bool,
    /// `None` keeps index (insertion) order
    pub sort_by: Option<SortBy>,
    pub sort_order: SortOrder,
}

/// Anything listed with a [`SortBy`].
pub trait Sortable {
    fn sort_name(&self) -> &str;
    fn sort_last_updated(&self) -> i64;
    fn sort_color(&self) -> &str;
    fn sort_order_key(&self) -> Option<i64>;
}

impl Sortable for Collection {
    fn sort_name(&self) -> &str {
        &self.name
    }
    fn sort_last_updated(&self) -> i64 {
        self.last_updated
    }
    fn sort_color(&self) -> &str {
        &self.color
    }
    fn sort_order_key(&self) -> Option<i64> {
        self.order
    }
}

impl Sortable for Folder {
    fn sort_name(&self) -> &str {
        &self.name
    }
    fn sort_last_updated(&self) -> i64 {
        self.last_updated
    }
    fn sort_color(&self) -> &str {
        &self.color
    }
    fn sort_order_key(&self) -> Option<i64> {
        self.order
    }
}

/// Stable sort; ties keep their incoming order in both directions.
pub fn sort_entities<T: Sortable>(items: &mut [T], by: SortBy, order: SortOrder) {
    use std::cmp::Ordering;

    let compare = |a: &T, b: &T| -> Ordering {
        match by {
            SortBy::LastUpdated => a.sort_last_updated().cmp(&b.sort_last_updated()),
            SortBy::Name => a
                .sort_name()
                .to_lowercase()
                .cmp(&b.sort_name().to_lowercase()),
            SortBy::Color => a.sort_color().cmp(b.sort_color()),
            SortBy::Manual => match (a.sort_order_key(), b.sort_order_key()) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        }
    };

    match order {
        SortOrder::Asc => items.sort_by(compare),
        SortOrder::Desc => items.sort_by(|a, b| compare(b, a)),
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A partial update applied by [`CollectionStore::batch_update_collections`].
///
/// Fields left as `None` are untouched. For the nullable fields, `Some(None)`
/// is an explicit clear: `order: Some(None)` removes the manual ordering of that
/// one collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPatch {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tabs: Option<Vec<Tab>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_groups: Option<Vec<Group>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub order: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub last_opened: Option<Option<i64>>,
    /// Callers stamp mutations explicitly; reorders leave this empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<i64>,
}

impl CollectionPatch {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            ..Default::default()
        }
    }

    fn apply(&self, c: &mut Collection) {
        if let Some(name) = &self.name {
            c.name = name.clone();
        }
        if let Some(color) = &self.color {
            c.color = color.clone();
        }
        if let Some(tabs) = &self.tabs {
            c.tabs = tabs.clone();
        }
        if let Some(groups) = &self.chrome_groups {
            c.chrome_groups = groups.clone();
        }
        if let Some(parent_id) = &self.parent_id {
            c.parent_id = parent_id.clone();
        }
        if let Some(order) = self.order {
            c.order = order;
        }
        if let Some(last_opened) = self.last_opened {
            c.last_opened = last_opened;
        }
        if let Some(last_updated) = self.last_updated {
            c.last_updated = last_updated;
        }
    }
}

/// The single writer of persisted collections, folders and their indexes.
pub struct CollectionStore {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl CollectionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    /// The underlying key-value store.
    pub fn kv(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    pub(crate) async fn lock_writes(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    // ─── Collections index ─────────────────────────────────────────────────

    /// Loads the collections index, or an empty index if none is stored.
    ///
    /// An index that does not decode as a uid → metadata map is an error, so no
    /// write can replace it with a partial one; [`CollectionStore::rebuild_indexes`]
    /// repairs it from the bodies.
    pub async fn load_collections_index(&self) -> anyhow::Result<CollectionsIndex> {
        let raw = self.kv.get_one(COLLECTIONS_INDEX).await?;
        decode_index(raw, COLLECTIONS_INDEX)
    }

    pub async fn load_folders_index(&self) -> anyhow::Result<FoldersIndex> {
        let raw = self.kv.get_one(FOLDERS_INDEX).await?;
        decode_index(raw, FOLDERS_INDEX)
    }

    // ─── Collections ───────────────────────────────────────────────────────

    /// Loads every indexed collection.
    ///
    /// With `metadata_only` the result is built from the index alone and the
    /// shells carry no tabs or groups. Bodies that are missing or fail to decode
    /// are logged and skipped.
    pub async fn load_all_collections(&self, opts: &LoadOptions) -> anyhow::Result<Vec<Collection>> {
        let index = self.load_collections_index().await?;

        let mut collections: Vec<Collection> = if opts.metadata_only {
            index
                .iter()
                .map(|(uid, entry)| Collection::from_index_entry(uid, entry))
                .collect()
        } else {
            let body_keys: Vec<String> = index.keys().map(|uid| keys::collection_key(uid)).collect();
            let refs: Vec<&str> = body_keys.iter().map(String::as_str).collect();
            let mut bodies = self.kv.get(&refs).await.context("failed to load collection bodies")?;

            index
                .keys()
                .filter_map(|uid| {
                    let key = keys::collection_key(uid);
                    let Some(raw) = bodies.remove(&key) else {
                        warn!(uid = %uid, "indexed collection has no body");
                        return None;
                    };
                    match serde_json::from_value::<Collection>(raw) {
                        Ok(c) => Some(c),
                        Err(e) => {
                            warn!(uid = %uid, error = %e, "skipping undecodable collection body");
                            None
                        }
                    }
                })
                .collect()
        };

        if let Some(by) = opts.sort_by {
            sort_entities(&mut collections, by, opts.sort_order);
        }
        Ok(collections)
    }

    pub async fn load_single_collection(&self, uid: &str) -> anyhow::Result<Option<Collection>> {
        let Some(raw) = self.kv.get_one(&keys::collection_key(uid)).await? else {
            return Ok(None);
        };
        let collection = serde_json::from_value(raw)
            .with_context(|| format!("failed to decode collection {}", uid))?;
        Ok(Some(collection))
    }

    /// Writes the full body and its index entry in one store call.
    ///
    /// If the collection's folder changed, both the old and the new folder's
    /// `collectionCount` are recomputed.
    pub async fn save_single_collection(&self, collection: &Collection) -> anyhow::Result<()> {
        let _guard = self.lock_writes().await;
        self.save_collection_locked(collection).await
    }

    pub(crate) async fn save_collection_locked(&self, collection: &Collection) -> anyhow::Result<()> {
        let mut index = self.load_collections_index().await?;
        let old_parent = index
            .get(&collection.uid)
            .and_then(|e| e.parent_id.clone());

        self.write_collections(std::slice::from_ref(collection), &mut index)
            .await?;
        debug!(uid = %collection.uid, tabs = collection.tabs.len(), "saved collection");

        let mut affected = BTreeSet::new();
        affected.extend(old_parent);
        affected.extend(collection.parent_id.clone());
        self.recount_folders(&affected, &index).await?;
        Ok(())
    }

    /// Removes the body and the index entry.
    ///
    /// Folder counts are left alone: the caller knows the old `parentId` and
    /// recounts it (see [`CollectionStore::delete_collection`]).
    pub async fn delete_single_collection(&self, uid: &str) -> anyhow::Result<bool> {
        let _guard = self.lock_writes().await;
        self.delete_collection_locked(uid).await
    }

    pub(crate) async fn delete_collection_locked(&self, uid: &str) -> anyhow::Result<bool> {
        let mut index = self.load_collections_index().await?;
        let body_key = keys::collection_key(uid);
        let existed = index.shift_remove(uid).is_some() | self.kv.get_one(&body_key).await?.is_some();
        if !existed {
            return Ok(false);
        }

        let mut items = Map::new();
        items.insert(COLLECTIONS_INDEX.to_string(), serde_json::to_value(&index)?);
        self.kv
            .replace(items, &[body_key.as_str()])
            .await
            .with_context(|| format!("failed to delete collection {}", uid))?;
        debug!(uid = %uid, "deleted collection");
        Ok(true)
    }

    /// Applies many partial updates as one write. Unknown uids are skipped.
    ///
    /// Returns the number of collections updated.
    pub async fn batch_update_collections(&self, patches: &[CollectionPatch]) -> anyhow::Result<usize> {
        let _guard = self.lock_writes().await;
        self.batch_update_locked(patches).await
    }

    pub(crate) async fn batch_update_locked(&self, patches: &[CollectionPatch]) -> anyhow::Result<usize> {
        if patches.is_empty() {
            return Ok(0);
        }
        let mut index = self.load_collections_index().await?;

        let body_keys: Vec<String> = patches.iter().map(|p| keys::collection_key(&p.uid)).collect();
        let refs: Vec<&str> = body_keys.iter().map(String::as_str).collect();
        let mut bodies = self.kv.get(&refs).await?;

        let mut updated = Vec::with_capacity(patches.len());
        let mut affected = BTreeSet::new();
        for patch in patches {
            let Some(raw) = bodies.remove(&keys::collection_key(&patch.uid)) else {
                warn!(uid = %patch.uid, "batch update skipped unknown collection");
                continue;
            };
            let mut collection: Collection = serde_json::from_value(raw)
                .with_context(|| format!("failed to decode collection {}", patch.uid))?;
            let old_parent = collection.parent_id.clone();
            patch.apply(&mut collection);
            if old_parent != collection.parent_id {
                affected.extend(old_parent);
                affected.extend(collection.parent_id.clone());
            }
            updated.push(collection);
        }

        self.write_collections(&updated, &mut index).await?;
        self.recount_folders(&affected, &index).await?;
        Ok(updated.len())
    }

    /// Persists manual ordering: each uid gets its position as `order`.
    pub async fn update_collections_order(&self, uids: &[String]) -> anyhow::Result<usize> {
        let patches: Vec<CollectionPatch> = uids
            .iter()
            .enumerate()
            .map(|(position, uid)| CollectionPatch {
                order: Some(Some(position as i64)),
                ..CollectionPatch::new(uid.clone())
            })
            .collect();
        self.batch_update_collections(&patches).await
    }

    /// Writes bodies plus the updated index in a single store call.
    pub(crate) async fn write_collections(
        &self,
        collections: &[Collection],
        index: &mut CollectionsIndex,
    ) -> anyhow::Result<()> {
        if collections.is_empty() {
            return Ok(());
        }
        let mut items = Map::new();
        for collection in collections {
            items.insert(keys::collection_key(&collection.uid), serde_json::to_value(collection)?);
            index.insert(collection.uid.clone(), collection.index_entry());
        }
        items.insert(COLLECTIONS_INDEX.to_string(), serde_json::to_value(&*index)?);
        self.kv
            .set(items)
            .await
            .context("failed to write collections")?;
        Ok(())
    }

    // ─── Folders ───────────────────────────────────────────────────────────

    pub async fn load_single_folder(&self, uid: &str) -> anyhow::Result<Option<Folder>> {
        let Some(raw) = self.kv.get_one(&keys::folder_key(uid)).await? else {
            return Ok(None);
        };
        let folder = serde_json::from_value(raw)
            .with_context(|| format!("failed to decode folder {}", uid))?;
        Ok(Some(folder))
    }

    /// Writes the folder body and its index entry. Does not recount collections.
    pub async fn save_single_folder(&self, folder: &Folder) -> anyhow::Result<()> {
        let _guard = self.lock_writes().await;
        self.save_folder_locked(folder).await
    }

    pub(crate) async fn save_folder_locked(&self, folder: &Folder) -> anyhow::Result<()> {
        let mut index = self.load_folders_index().await?;
        self.write_folders(std::slice::from_ref(folder), &mut index).await
    }

    /// Removes the folder body and index entry. Contained collections are untouched.
    pub async fn delete_single_folder(&self, uid: &str) -> anyhow::Result<bool> {
        let _guard = self.lock_writes().await;
        self.delete_folder_locked(uid).await
    }

    pub(crate) async fn delete_folder_locked(&self, uid: &str) -> anyhow::Result<bool> {
        let mut index = self.load_folders_index().await?;
        let body_key = keys::folder_key(uid);
        let existed = index.shift_remove(uid).is_some() | self.kv.get_one(&body_key).await?.is_some();
        if !existed {
            return Ok(false);
        }
        let mut items = Map::new();
        items.insert(FOLDERS_INDEX.to_string(), serde_json::to_value(&index)?);
        self.kv
            .replace(items, &[body_key.as_str()])
            .await
            .with_context(|| format!("failed to delete folder {}", uid))?;
        Ok(true)
    }

    /// Loads every indexed folder, optionally sorted.
    pub async fn load_all_folders(&self, sort: Option<(SortBy, SortOrder)>) -> anyhow::Result<Vec<Folder>> {
        let index = self.load_folders_index().await?;
        let body_keys: Vec<String> = index.keys().map(|uid| keys::folder_key(uid)).collect();
        let refs: Vec<&str> = body_keys.iter().map(String::as_str).collect();
        let mut bodies = self.kv.get(&refs).await.context("failed to load folder bodies")?;

        let mut folders: Vec<Folder> = index
            .keys()
            .filter_map(|uid| {
                let raw = bodies.remove(&keys::folder_key(uid))?;
                serde_json::from_value(raw)
                    .map_err(|e| warn!(uid = %uid, error = %e, "skipping undecodable folder body"))
                    .ok()
            })
            .collect();

        if let Some((by, order)) = sort {
            sort_entities(&mut folders, by, order);
        }
        Ok(folders)
    }

    /// Recounts a folder's collections from the collections index and persists it.
    ///
    /// Returns the new count, or `None` if the folder does not exist.
    pub async fn update_folder_collection_count(&self, folder_uid: &str) -> anyhow::Result<Option<usize>> {
        let _guard = self.lock_writes().await;
        let index = self.load_collections_index().await?;
        self.recount_folder(folder_uid, &index).await
    }

    /// Persists manual folder ordering.
    pub async fn update_folders_order(&self, uids: &[String]) -> anyhow::Result<usize> {
        let _guard = self.lock_writes().await;
        let mut index = self.load_folders_index().await?;
        let mut folders = Vec::new();
        for (position, uid) in uids.iter().enumerate() {
            match self.load_single_folder(uid).await? {
                Some(mut folder) => {
                    folder.order = Some(position as i64);
                    folders.push(folder);
                }
                None => warn!(uid = %uid, "folder order skipped unknown folder"),
            }
        }
        self.write_folders(&folders, &mut index).await?;
        Ok(folders.len())
    }

    pub(crate) async fn write_folders(&self, folders: &[Folder], index: &mut FoldersIndex) -> anyhow::Result<()> {
        if folders.is_empty() {
            return Ok(());
        }
        let mut items = Map::new();
        for folder in folders {
            items.insert(keys::folder_key(&folder.uid), serde_json::to_value(folder)?);
            index.insert(folder.uid.clone(), folder.index_entry());
        }
        items.insert(FOLDERS_INDEX.to_string(), serde_json::to_value(&*index)?);
        self.kv.set(items).await.context("failed to write folders")?;
        Ok(())
    }

    pub(crate) async fn recount_folder(
        &self,
        folder_uid: &str,
        collections: &CollectionsIndex,
    ) -> anyhow::Result<Option<usize>> {
        let Some(mut folder) = self.load_single_folder(folder_uid).await? else {
            return Ok(None);
        };
        let count = collections
            .values()
            .filter(|e| e.parent_id.as_deref() == Some(folder_uid))
            .count();
        if folder.collection_count != count {
            debug!(folder = %folder_uid, from = folder.collection_count, to = count, "recounted folder");
        }
        folder.collection_count = count;
        let mut index = self.load_folders_index().await?;
        self.write_folders(std::slice::from_ref(&folder), &mut index).await?;
        Ok(Some(count))
    }

    pub(crate) async fn recount_folders(
        &self,
        folder_uids: &BTreeSet<String>,
        collections: &CollectionsIndex,
    ) -> anyhow::Result<()> {
        for uid in folder_uids {
            self.recount_folder(uid, collections).await?;
        }
        Ok(())
    }

    // ─── Repair ────────────────────────────────────────────────────────────

    /// Rebuilds both indexes from the stored bodies and recounts every folder.
    ///
    /// Returns `(collections, folders)` indexed.
    pub async fn rebuild_indexes(&self) -> anyhow::Result<(usize, usize)> {
        let _guard = self.lock_writes().await;
        let all = self.kv.get_all().await?;

        let mut collections = Vec::new();
        let mut folders = Vec::new();
        for (key, raw) in all {
            if keys::collection_uid(&key).is_some() {
                match serde_json::from_value::<Collection>(raw) {
                    Ok(c) => collections.push(c),
                    Err(e) => warn!(key = %key, error = %e, "rebuild skipped undecodable collection"),
                }
            } else if keys::folder_uid(&key).is_some() {
                match serde_json::from_value::<Folder>(raw) {
                    Ok(f) => folders.push(f),
                    Err(e) => warn!(key = %key, error = %e, "rebuild skipped undecodable folder"),
                }
            }
        }

        let mut collections_index = CollectionsIndex::new();
        for c in &collections {
            collections_index.insert(c.uid.clone(), c.index_entry());
        }
        for folder in folders.iter_mut() {
            folder.collection_count = collections_index
                .values()
                .filter(|e| e.parent_id.as_deref() == Some(folder.uid.as_str()))
                .count();
        }
        let mut folders_index = FoldersIndex::new();
        self.write_folders(&folders, &mut folders_index).await?;

        let mut items = Map::new();
        items.insert(COLLECTIONS_INDEX.to_string(), serde_json::to_value(&collections_index)?);
        items.insert(FOLDERS_INDEX.to_string(), serde_json::to_value(&folders_index)?);
        self.kv.set(items).await.context("failed to write rebuilt indexes")?;
        Ok((collections.len(), folders.len()))
    }
}

fn decode_index<T>(raw: Option<Value>, key: &str) -> anyhow::Result<indexmap::IndexMap<String, T>>
where
    T: serde::de::DeserializeOwned,
{
    match raw {
        None | Some(Value::Null) => Ok(indexmap::IndexMap::new()),
        Some(value) => serde_json::from_value(value)
            .with_context(|| format!("stored {} is corrupt; rebuild the indexes", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use serde_json::json;

    fn store() -> CollectionStore {
        CollectionStore::new(Arc::new(MemoryStore::new()))
    }

    fn collection(uid: &str, name: &str, last_updated: i64) -> Collection {
        let mut c = Collection::new(uid, name);
        c.last_updated = last_updated;
        c.tabs.push(Tab::new(format!("{}-t1", uid), "https://example.com", "Example"));
        c
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let store = store();
        let c = collection("c1", "Reading", 10);
        store.save_single_collection(&c).await.unwrap();

        let loaded = store.load_single_collection("c1").await.unwrap().unwrap();
        assert_eq!(loaded, c);

        let index = store.load_collections_index().await.unwrap();
        assert_eq!(index["c1"].tab_count, 1);
        assert_eq!(index["c1"].name, "Reading");
        assert!(index["c1"].size > 0);
    }

    #[tokio::test]
    async fn test_missing_index_is_empty() {
        let store = store();
        assert!(store.load_collections_index().await.unwrap().is_empty());
        assert!(store.load_single_collection("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_uid_list_index_is_not_indexed_format() {
        let kv = Arc::new(MemoryStore::new());
        kv.set_one(COLLECTIONS_INDEX, json!(["c1", "c2"])).await.unwrap();
        let store = CollectionStore::new(kv);
        assert!(store.load_collections_index().await.is_err());
        assert!(store.load_folders_index().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sorting_is_stable() {
        let store = store();
        store.save_single_collection(&collection("a", "beta", 5)).await.unwrap();
        store.save_single_collection(&collection("b", "Alpha", 5)).await.unwrap();
        store.save_single_collection(&collection("c", "gamma", 9)).await.unwrap();

        let by_time = store
            .load_all_collections(&LoadOptions {
                sort_by: Some(SortBy::LastUpdated),
                sort_order: SortOrder::Desc,
                ..Default::default()
            })
            .await
            .unwrap();
        let uids: Vec<_> = by_time.iter().map(|c| c.uid.as_str()).collect();
        assert_eq!(uids, vec!["c", "a", "b"]);

        let by_name = store
            .load_all_collections(&LoadOptions {
                metadata_only: true,
                sort_by: Some(SortBy::Name),
                sort_order: SortOrder::Asc,
            })
            .await
            .unwrap();
        let names: Vec<_> = by_name.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "beta", "gamma"]);
        assert!(by_name.iter().all(|c| c.tabs.is_empty()));
    }

    #[tokio::test]
    async fn test_delete_removes_body_and_index() {
        let store = store();
        store.save_single_collection(&collection("c1", "A", 1)).await.unwrap();
        assert!(store.delete_single_collection("c1").await.unwrap());
        assert!(!store.delete_single_collection("c1").await.unwrap());
        assert!(store.load_collections_index().await.unwrap().is_empty());
        assert!(store.kv().get_one("collection_c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_update_null_order_clears_only_that_item() {
        let store = store();
        store.save_single_collection(&collection("a", "A", 1)).await.unwrap();
        store.save_single_collection(&collection("b", "B", 1)).await.unwrap();
        store
            .update_collections_order(&["b".to_string(), "a".to_string()])
            .await
            .unwrap();

        let patch: CollectionPatch = serde_json::from_value(json!({"uid": "a", "order": null})).unwrap();
        assert_eq!(patch.order, Some(None));
        let untouched: CollectionPatch = serde_json::from_value(json!({"uid": "b", "name": "B2"})).unwrap();
        assert_eq!(untouched.order, None);

        assert_eq!(store.batch_update_collections(&[patch, untouched]).await.unwrap(), 2);

        let a = store.load_single_collection("a").await.unwrap().unwrap();
        let b = store.load_single_collection("b").await.unwrap().unwrap();
        assert_eq!(a.order, None);
        assert_eq!(b.order, Some(0));
        assert_eq!(b.name, "B2");
        assert_eq!(store.load_collections_index().await.unwrap()["b"].name, "B2");
    }

    #[tokio::test]
    async fn test_failed_write_leaves_index_untouched() {
        let kv = Arc::new(MemoryStore::with_quota(2_000));
        let store = CollectionStore::new(kv);
        store.save_single_collection(&collection("small", "S", 1)).await.unwrap();

        let mut huge = collection("huge", "H", 1);
        huge.tabs.push(Tab::new("big", "https://example.com", "x".repeat(5_000)));
        assert!(store.save_single_collection(&huge).await.is_err());

        let index = store.load_collections_index().await.unwrap();
        assert_eq!(index.len(), 1);
        assert!(store.load_single_collection("huge").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rebuild_indexes() {
        let kv = Arc::new(MemoryStore::new());
        let mut c = collection("c1", "A", 1);
        c.parent_id = Some("f1".to_string());
        kv.set_one("collection_c1", serde_json::to_value(&c).unwrap()).await.unwrap();
        kv.set_one("folder_f1", serde_json::to_value(Folder::new("f1", "F")).unwrap())
            .await
            .unwrap();

        let store = CollectionStore::new(kv);
        assert_eq!(store.rebuild_indexes().await.unwrap(), (1, 1));
        let folder = store.load_single_folder("f1").await.unwrap().unwrap();
        assert_eq!(folder.collection_count, 1);
        assert_eq!(store.load_folders_index().await.unwrap()["f1"].collection_count, 1);
    }

    #[tokio::test]
    async fn test_corrupt_index_blocks_writes_until_rebuilt() {
        let kv = Arc::new(MemoryStore::new());
        for c in [collection("c1", "A", 1), collection("c2", "B", 2)] {
            kv.set_one(&keys::collection_key(&c.uid), serde_json::to_value(&c).unwrap())
                .await
                .unwrap();
        }
        kv.set_one(COLLECTIONS_INDEX, json!("not an index")).await.unwrap();
        let store = CollectionStore::new(kv.clone());

        let err = store.load_collections_index().await.unwrap_err();
        assert!(format!("{:#}", err).contains("collections_index"));
        assert!(store.save_single_collection(&collection("c3", "C", 3)).await.is_err());
        assert_eq!(kv.get_one(COLLECTIONS_INDEX).await.unwrap(), Some(json!("not an index")));
        assert!(kv.get_one("collection_c3").await.unwrap().is_none());

        assert_eq!(store.rebuild_indexes().await.unwrap(), (2, 0));
        store.save_single_collection(&collection("c3", "C", 3)).await.unwrap();
        let index = store.load_collections_index().await.unwrap();
        assert_eq!(index.len(), 3);
    }
}
