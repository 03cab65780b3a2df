//! Named migration steps.
//!
//! Each step is a transformation of the full storage payload held in memory.
//! Steps only see raw JSON: they run before the data is guaranteed to decode
//! into the typed model. The coordinator validates and persists the result.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use tabox_core::color::{migrate_value_colors, CURRENT_COLOR_SYSTEM};
use tabox_core::keys::{
    self, APP_METADATA, COLLECTIONS_INDEX, COLOR_SYSTEM_VERSION, FOLDERS_INDEX, LEGACY_BACKUP, TABS_ARRAY,
    USER_SETTINGS,
};
use tabox_core::uid::derived_uid;
use tabox_core::{Collection, CollectionsIndex, FoldersIndex};
use tracing::{debug, warn};

use crate::version::CURRENT_VERSION;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MigrationStep {
    EnhancedToCurrent,
    ColorMigration,
    FoldersInitialization,
    TimestampMigration,
    IndexedStorage,
    CurrentToDocument,
}

impl MigrationStep {
    pub const ALL: [MigrationStep; 6] = [
        MigrationStep::EnhancedToCurrent,
        MigrationStep::ColorMigration,
        MigrationStep::FoldersInitialization,
        MigrationStep::TimestampMigration,
        MigrationStep::IndexedStorage,
        MigrationStep::CurrentToDocument,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MigrationStep::EnhancedToCurrent => "enhanced_to_current",
            MigrationStep::ColorMigration => "color_migration",
            MigrationStep::FoldersInitialization => "folders_initialization",
            MigrationStep::TimestampMigration => "timestamp_migration",
            MigrationStep::IndexedStorage => "indexed_storage",
            MigrationStep::CurrentToDocument => "current_to_document",
        }
    }

    /// Steps that only add or rename fields and never delete user data.
    ///
    /// These run without a backup of their own.
    pub fn is_side_effect_safe(&self) -> bool {
        matches!(
            self,
            MigrationStep::ColorMigration | MigrationStep::FoldersInitialization | MigrationStep::TimestampMigration
        )
    }

    /// Applies the step in place. Returns how many entities it changed.
    pub fn apply(&self, data: &mut Map<String, Value>, now: i64) -> Result<usize> {
        match self {
            MigrationStep::EnhancedToCurrent => enhanced_to_current(data, now),
            MigrationStep::ColorMigration => color_migration(data),
            MigrationStep::FoldersInitialization => folders_initialization(data),
            MigrationStep::TimestampMigration => timestamp_migration(data, now),
            MigrationStep::IndexedStorage => indexed_storage(data, now),
            MigrationStep::CurrentToDocument => current_to_document(data, now),
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for MigrationStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl FromStr for MigrationStep {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        MigrationStep::ALL
            .into_iter()
            .find(|step| step.name() == s)
            .with_context(|| format!("unknown migration step: {}", s))
    }
}

/// True if `key` is absent or explicitly `null`. `0`, `false` and `""` are values.
fn is_absent(obj: &Map<String, Value>, key: &str) -> bool {
    matches!(obj.get(key), None | Some(Value::Null))
}

fn timestamp(obj: &Map<String, Value>, key: &str) -> Option<i64> {
    obj.get(key).and_then(Value::as_i64)
}

/// Mutable access to every stored collection object, array or indexed.
fn for_each_collection(data: &mut Map<String, Value>, mut f: impl FnMut(&mut Map<String, Value>)) {
    if let Some(Value::Array(list)) = data.get_mut(TABS_ARRAY) {
        for item in list.iter_mut().filter_map(Value::as_object_mut) {
            f(item);
        }
    }
    for (key, value) in data.iter_mut() {
        if keys::collection_uid(key).is_some() {
            if let Some(obj) = value.as_object_mut() {
                f(obj);
            }
        }
    }
}

fn for_each_folder(data: &mut Map<String, Value>, mut f: impl FnMut(&mut Map<String, Value>)) {
    for (key, value) in data.iter_mut() {
        if keys::folder_uid(key).is_some() {
            if let Some(obj) = value.as_object_mut() {
                f(obj);
            }
        }
    }
}

fn tabs_array_mut(data: &mut Map<String, Value>) -> Result<Option<&mut Vec<Value>>> {
    match data.get_mut(TABS_ARRAY) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(list)) => Ok(Some(list)),
        Some(_) => bail!("{} is not an array", TABS_ARRAY),
    }
}

/// Normalizes the legacy collection array.
///
/// Drops entries that are not objects or are folder-typed, assigns derived uids
/// to collections, tabs and groups that lack one (or carry a duplicate),
/// clears tab links to missing groups, backfills `createdOn`, `lastUpdated` and
/// `lastOpened`, and migrates colors.
pub fn enhanced_to_current(data: &mut Map<String, Value>, now: i64) -> Result<usize> {
    let Some(list) = tabs_array_mut(data)? else {
        return Ok(0);
    };

    let before = list.len();
    list.retain(|item| match item.as_object() {
        None => false,
        Some(obj) => obj.get("type").and_then(Value::as_str) != Some("folder"),
    });
    let mut changed = before - list.len();
    if changed > 0 {
        warn!(dropped = changed, "removed non-collection entries from the collection array");
    }

    let mut seen = HashSet::new();
    for (index, item) in list.iter_mut().enumerate() {
        let Some(obj) = item.as_object_mut() else {
            continue;
        };
        let mut touched = false;
        let name = obj.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
        // Timestamp source for derived uids must not depend on the clock.
        let seed = timestamp(obj, "createdOn")
            .or_else(|| timestamp(obj, "lastUpdated"))
            .unwrap_or(0);

        let current_uid = obj
            .get("uid")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        let uid = match current_uid {
            Some(uid) if !seen.contains(&uid) => uid,
            _ => {
                let fresh = derived_uid(&name, index, seed);
                obj.insert("uid".to_string(), Value::String(fresh.clone()));
                touched = true;
                fresh
            }
        };
        seen.insert(uid.clone());

        if !obj.get("name").is_some_and(Value::is_string) {
            obj.insert("name".to_string(), Value::String(String::new()));
            touched = true;
        }
        if !obj.get("tabs").is_some_and(Value::is_array) {
            obj.insert("tabs".to_string(), json!([]));
            touched = true;
        }
        if !obj.get("chromeGroups").is_some_and(Value::is_array) {
            obj.insert("chromeGroups".to_string(), json!([]));
            touched = true;
        }

        touched |= normalize_groups_and_tabs(obj, &uid, seed);

        if is_absent(obj, "createdOn") {
            let created = timestamp(obj, "lastUpdated").unwrap_or(now);
            obj.insert("createdOn".to_string(), json!(created));
            touched = true;
        }
        if is_absent(obj, "lastUpdated") {
            let created = timestamp(obj, "createdOn").unwrap_or(now);
            obj.insert("lastUpdated".to_string(), json!(created));
            touched = true;
        }
        if !obj.contains_key("lastOpened") {
            obj.insert("lastOpened".to_string(), Value::Null);
            touched = true;
        }

        let mut as_value = Value::Object(std::mem::take(obj));
        if migrate_value_colors(&mut as_value) > 0 {
            touched = true;
        }
        if let Value::Object(restored) = as_value {
            *obj = restored;
        }

        if touched {
            changed += 1;
        }
    }
    debug!(changed, "enhanced_to_current done");
    Ok(changed)
}

fn normalize_groups_and_tabs(obj: &mut Map<String, Value>, collection_uid: &str, seed: i64) -> bool {
    let mut touched = false;
    let mut group_uids = HashSet::new();

    if let Some(Value::Array(groups)) = obj.get_mut("chromeGroups") {
        groups.retain(Value::is_object);
        for (i, group) in groups.iter_mut().filter_map(Value::as_object_mut).enumerate() {
            let has_uid = group
                .get("uid")
                .and_then(Value::as_str)
                .is_some_and(|u| !u.is_empty() && !group_uids.contains(u));
            if !has_uid {
                let fresh = derived_uid(&format!("{} group", collection_uid), i, seed);
                group.insert("uid".to_string(), Value::String(fresh));
                touched = true;
            }
            if let Some(uid) = group.get("uid").and_then(Value::as_str) {
                group_uids.insert(uid.to_string());
            }
        }
    }

    if let Some(Value::Array(tabs)) = obj.get_mut("tabs") {
        let mut tab_uids = HashSet::new();
        for (i, tab) in tabs.iter_mut().filter_map(Value::as_object_mut).enumerate() {
            let has_uid = tab
                .get("uid")
                .and_then(Value::as_str)
                .is_some_and(|u| !u.is_empty() && !tab_uids.contains(u));
            if !has_uid {
                let fresh = derived_uid(&format!("{} tab", collection_uid), i, seed);
                tab.insert("uid".to_string(), Value::String(fresh));
                touched = true;
            }
            if let Some(uid) = tab.get("uid").and_then(Value::as_str) {
                tab_uids.insert(uid.to_string());
            }

            let dangling = tab
                .get("groupUid")
                .and_then(Value::as_str)
                .is_some_and(|g| !group_uids.contains(g));
            if dangling {
                tab.remove("groupUid");
                tab.insert("groupId".to_string(), json!(tabox_core::UNGROUPED_ID));
                touched = true;
            }
        }
    }
    touched
}

/// Maps every collection, group and folder color onto the palette and stamps
/// the color system version.
pub fn color_migration(data: &mut Map<String, Value>) -> Result<usize> {
    let mut changed = 0;
    for_each_collection(data, |obj| {
        let mut as_value = Value::Object(std::mem::take(obj));
        changed += migrate_value_colors(&mut as_value);
        if let Value::Object(restored) = as_value {
            *obj = restored;
        }
    });
    for_each_folder(data, |obj| {
        if let Some(Value::String(color)) = obj.get_mut("color") {
            let migrated = tabox_core::migrate_color(color);
            if color.as_str() != migrated {
                *color = migrated.to_string();
                changed += 1;
            }
        }
    });
    for index_key in [COLLECTIONS_INDEX, FOLDERS_INDEX] {
        if let Some(Value::Object(entries)) = data.get_mut(index_key) {
            for entry in entries.values_mut() {
                changed += migrate_value_colors(entry);
            }
        }
    }
    data.insert(COLOR_SYSTEM_VERSION.to_string(), json!(CURRENT_COLOR_SYSTEM));
    debug!(changed, "color_migration done");
    Ok(changed)
}

/// Adds an empty folders index if there is none and gives every collection an
/// explicit `parentId`, keeping existing values.
pub fn folders_initialization(data: &mut Map<String, Value>) -> Result<usize> {
    let mut changed = 0;
    if !data.contains_key(FOLDERS_INDEX) {
        data.insert(FOLDERS_INDEX.to_string(), json!({}));
        changed += 1;
    }
    for_each_collection(data, |obj| {
        if !obj.contains_key("parentId") {
            obj.insert("parentId".to_string(), Value::Null);
            changed += 1;
        }
    });
    debug!(changed, "folders_initialization done");
    Ok(changed)
}

/// Backfills a missing `lastUpdated` from `createdOn`, or `now`.
///
/// An existing `lastUpdated` is never overwritten, including `0`.
pub fn timestamp_migration(data: &mut Map<String, Value>, now: i64) -> Result<usize> {
    let mut changed = 0;
    let mut backfill = |obj: &mut Map<String, Value>| {
        if is_absent(obj, "lastUpdated") {
            let value = timestamp(obj, "createdOn").unwrap_or(now);
            obj.insert("lastUpdated".to_string(), json!(value));
            changed += 1;
        }
    };
    for_each_collection(data, &mut backfill);
    for_each_folder(data, &mut backfill);
    debug!(changed, "timestamp_migration done");
    Ok(changed)
}

fn app_metadata(now: i64) -> Value {
    json!({"version": CURRENT_VERSION, "lastUpdated": now})
}

/// Splits the collection array into `collection_<uid>` bodies plus a
/// uid → metadata `collections_index`, and removes `tabsArray`.
///
/// Entries already in the index are kept. Folder counts are recomputed.
pub fn indexed_storage(data: &mut Map<String, Value>, now: i64) -> Result<usize> {
    let mut index: CollectionsIndex = match data.get(COLLECTIONS_INDEX) {
        None | Some(Value::Null) => CollectionsIndex::new(),
        Some(existing @ Value::Object(_)) => serde_json::from_value(existing.clone())
            .context("existing collections_index does not decode")?,
        Some(Value::Array(uids)) => {
            // A uid list: rebuild metadata from the bodies it names.
            let mut rebuilt = CollectionsIndex::new();
            for uid in uids.iter().filter_map(Value::as_str) {
                if let Some(body) = data.get(&keys::collection_key(uid)) {
                    let collection: Collection = serde_json::from_value(body.clone())
                        .with_context(|| format!("collection {} does not decode", uid))?;
                    rebuilt.insert(uid.to_string(), collection.index_entry());
                }
            }
            rebuilt
        }
        Some(_) => bail!("collections_index has an unexpected shape"),
    };

    let list = match data.remove(TABS_ARRAY) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(list)) => list,
        Some(_) => bail!("{} is not an array", TABS_ARRAY),
    };

    let moved = list.len();
    for mut raw in list {
        if let Some(obj) = raw.as_object_mut() {
            obj.entry("type").or_insert_with(|| json!("collection"));
        }
        let collection: Collection = serde_json::from_value(raw.clone())
            .context("collection in the array does not decode")?;
        if collection.uid.is_empty() {
            bail!("collection {:?} has no uid", collection.name);
        }
        index.insert(collection.uid.clone(), collection.index_entry());
        data.insert(keys::collection_key(&collection.uid), raw);
    }

    recount_folders(data, &index)?;
    data.insert(COLLECTIONS_INDEX.to_string(), serde_json::to_value(&index)?);
    data.insert(APP_METADATA.to_string(), app_metadata(now));
    data.entry(FOLDERS_INDEX).or_insert_with(|| json!({}));
    debug!(moved, indexed = index.len(), "indexed_storage done");
    Ok(moved)
}

fn recount_folders(data: &mut Map<String, Value>, index: &CollectionsIndex) -> Result<()> {
    let mut folders: FoldersIndex = match data.get(FOLDERS_INDEX) {
        Some(existing @ Value::Object(_)) => serde_json::from_value(existing.clone()).unwrap_or_default(),
        _ => return Ok(()),
    };
    for (uid, entry) in folders.iter_mut() {
        let count = index
            .values()
            .filter(|e| e.parent_id.as_deref() == Some(uid.as_str()))
            .count();
        entry.collection_count = count;
        if let Some(Value::Object(body)) = data.get_mut(&keys::folder_key(uid)) {
            body.insert("collectionCount".to_string(), json!(count));
        }
    }
    data.insert(FOLDERS_INDEX.to_string(), serde_json::to_value(&folders)?);
    Ok(())
}

/// Restructures the collection array into the document format: a uid list
/// index, `collection_<uid>` bodies, `app_metadata` and `user_settings`, with
/// the original array kept inline under `_legacy_backup`.
pub fn current_to_document(data: &mut Map<String, Value>, now: i64) -> Result<usize> {
    let list = match data.get(TABS_ARRAY) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(list)) => list.clone(),
        Some(_) => bail!("{} is not an array", TABS_ARRAY),
    };

    let mut uids = Vec::with_capacity(list.len());
    for raw in &list {
        let Some(uid) = raw.get("uid").and_then(Value::as_str) else {
            bail!("collection without uid cannot be keyed");
        };
        let mut body = raw.clone();
        if let Some(obj) = body.as_object_mut() {
            obj.entry("type").or_insert_with(|| json!("collection"));
        }
        data.insert(keys::collection_key(uid), body);
        uids.push(Value::String(uid.to_string()));
    }

    data.insert(
        LEGACY_BACKUP.to_string(),
        json!({"tabsArray": list, "timestamp": now}),
    );
    data.remove(TABS_ARRAY);
    data.insert(COLLECTIONS_INDEX.to_string(), Value::Array(uids));
    data.insert(APP_METADATA.to_string(), app_metadata(now));
    data.entry(USER_SETTINGS).or_insert_with(|| json!({}));
    Ok(list.len())
}
