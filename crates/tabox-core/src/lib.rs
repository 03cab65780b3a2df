//! Core data models and types for tabox.
//!
//! This crate provides the foundational types used throughout the tabox workspace
//! for representing saved tabs, tab groups, collections and folders, together with
//! the pure rules that every other crate shares: the named color palette and its
//! legacy migration, copy naming, uid helpers and the persisted key layout.
//! It contains no I/O.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

pub mod color;
pub mod keys;
pub mod naming;
pub mod uid;

pub use color::{migrate_all_collection_colors, migrate_color, DEFAULT_COLOR, PALETTE};
pub use naming::{disambiguate_name, generate_copy_name};

/// Legacy numeric group id meaning "not in any group".
pub const UNGROUPED_ID: i64 = -1;

/// Returns the current time as Unix milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Converts a Unix millisecond timestamp to a DateTime<Utc>.
///
/// Every timestamp tabox persists (`createdOn`, `lastUpdated`, backup timestamps)
/// is stored as milliseconds since epoch.
pub fn ms_timestamp_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Discriminator stored in the `type` field of collection and folder bodies.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    #[default]
    Collection,
    Folder,
}

fn folder_type() -> EntityType {
    EntityType::Folder
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

/// The legacy link from a tab to its group.
///
/// Older data stores the browser's numeric group id (`-1` when ungrouped);
/// groups moved between collections are tagged with the group's id, or its uid
/// when it never had a numeric one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum GroupId {
    Numeric(i64),
    Uid(String),
}

impl GroupId {
    pub fn ungrouped() -> Self {
        GroupId::Numeric(UNGROUPED_ID)
    }

    pub fn is_ungrouped(&self) -> bool {
        matches!(self, GroupId::Numeric(UNGROUPED_ID))
    }
}

impl Default for GroupId {
    fn default() -> Self {
        GroupId::ungrouped()
    }
}

fn nullable_group_id<'de, D>(deserializer: D) -> std::result::Result<GroupId, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<GroupId>::deserialize(deserializer)?.unwrap_or_default())
}

/// Audio state captured from the browser.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MutedInfo {
    pub muted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_id: Option<String>,
}

/// A single saved browser tab.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    /// Stable identifier, never reassigned once set
    pub uid: String,
    /// The URL of the tab
    pub url: String,
    /// The title of the tab
    #[serde(default)]
    pub title: String,
    /// Optional favicon URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fav_icon_url: Option<String>,
    /// Pinned tabs stay clustered at the front and are never dragged
    #[serde(default)]
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted_info: Option<MutedInfo>,
    /// Uid of a group in the same collection's `chromeGroups`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_uid: Option<String>,
    #[serde(default, deserialize_with = "nullable_group_id")]
    pub group_id: GroupId,
    /// Fields written by other versions are carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Tab {
    pub fn new(uid: impl Into<String>, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            url: url.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// Extracts the domain from the tab's URL.
    ///
    /// Returns `None` if the URL does not parse or cannot have a domain (e.g., `about:blank`).
    pub fn domain(&self) -> Option<String> {
        Url::parse(&self.url).ok()?.domain().map(str::to_string)
    }

    /// Clears both group links.
    pub fn ungroup(&mut self) {
        self.group_uid = None;
        self.group_id = GroupId::ungrouped();
    }

    pub fn is_grouped(&self) -> bool {
        self.group_uid.is_some()
    }
}

/// A named, colored cluster of tabs inside one collection (a browser tab group).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub uid: String,
    /// Browser-assigned numeric id, when the group was captured from a live window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Group {
    pub fn new(uid: impl Into<String>, title: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            id: None,
            title: title.into(),
            color: color.into(),
            collapsed: false,
            extra: Map::new(),
        }
    }

    /// The value member tabs carry in `groupId` for this group.
    pub fn group_id(&self) -> GroupId {
        match self.id {
            Some(id) => GroupId::Numeric(id),
            None => GroupId::Uid(self.uid.clone()),
        }
    }
}

/// Window geometry captured alongside a collection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WindowSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// A saved set of tabs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub uid: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub entity_type: EntityType,
    #[serde(default)]
    pub tabs: Vec<Tab>,
    #[serde(default)]
    pub chrome_groups: Vec<Group>,
    #[serde(default = "default_color")]
    pub color: String,
    /// Set once, when the collection is first created
    #[serde(default)]
    pub created_on: i64,
    /// Bumped on every mutation
    #[serde(default)]
    pub last_updated: i64,
    #[serde(default)]
    pub last_opened: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowSnapshot>,
    /// Uid of the containing folder; `None` means root level
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Manual sort key; `None` means no manual ordering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Collection {
    /// Creates a root-level collection stamped with the current time.
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            uid: uid.into(),
            name: name.into(),
            color: default_color(),
            created_on: now,
            last_updated: now,
            ..Default::default()
        }
    }

    /// Returns the number of tabs in this collection.
    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn group(&self, uid: &str) -> Option<&Group> {
        self.chrome_groups.iter().find(|g| g.uid == uid)
    }

    pub fn tab_position(&self, uid: &str) -> Option<usize> {
        self.tabs.iter().position(|t| t.uid == uid)
    }

    /// Number of tabs currently tagged with the given group uid.
    pub fn group_tab_count(&self, group_uid: &str) -> usize {
        self.tabs
            .iter()
            .filter(|t| t.group_uid.as_deref() == Some(group_uid))
            .count()
    }

    /// Deletes the group if no tab references it any more. Returns true when removed.
    pub fn remove_group_if_empty(&mut self, group_uid: &str) -> bool {
        if self.group_tab_count(group_uid) > 0 {
            return false;
        }
        let before = self.chrome_groups.len();
        self.chrome_groups.retain(|g| g.uid != group_uid);
        self.chrome_groups.len() != before
    }

    /// Index of the first non-pinned tab; nothing may be inserted above it.
    pub fn pinned_floor(&self) -> usize {
        self.tabs.iter().take_while(|t| t.pinned).count()
    }

    pub fn touch(&mut self, now: i64) {
        self.last_updated = now;
    }

    /// Serialized size in bytes, used for the index size estimate.
    pub fn estimate_size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }

    /// Projects this collection into its index entry.
    pub fn index_entry(&self) -> CollectionIndexEntry {
        CollectionIndexEntry {
            name: self.name.clone(),
            entity_type: EntityType::Collection,
            tab_count: self.tabs.len(),
            last_updated: self.last_updated,
            last_opened: self.last_opened,
            created_on: self.created_on,
            color: self.color.clone(),
            size: self.estimate_size(),
            parent_id: self.parent_id.clone(),
            order: self.order,
        }
    }

    /// Deep copy with fresh uids for the collection, every tab and every group.
    ///
    /// Group links on tabs are rewritten to the new group uids; `groupId` values
    /// that referred to an old group uid follow the rename.
    pub fn clone_with_fresh_uids(&self) -> Self {
        let mut copy = self.clone();
        copy.uid = uid::new_uid();

        let mut renamed = std::collections::HashMap::new();
        for group in copy.chrome_groups.iter_mut() {
            let fresh = uid::new_uid();
            renamed.insert(std::mem::replace(&mut group.uid, fresh.clone()), fresh);
        }
        for tab in copy.tabs.iter_mut() {
            tab.uid = uid::new_uid();
            if let Some(old) = tab.group_uid.take() {
                match renamed.get(&old) {
                    Some(fresh) => {
                        if tab.group_id == GroupId::Uid(old.clone()) {
                            tab.group_id = GroupId::Uid(fresh.clone());
                        }
                        tab.group_uid = Some(fresh.clone());
                    }
                    None => tab.ungroup(),
                }
            }
        }
        copy
    }

    /// Builds a body-less shell from an index entry (used for metadata-only listings).
    pub fn from_index_entry(uid: &str, entry: &CollectionIndexEntry) -> Self {
        Self {
            uid: uid.to_string(),
            name: entry.name.clone(),
            color: entry.color.clone(),
            created_on: entry.created_on,
            last_updated: entry.last_updated,
            last_opened: entry.last_opened,
            parent_id: entry.parent_id.clone(),
            order: entry.order,
            ..Default::default()
        }
    }
}

/// A named container for collections.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub uid: String,
    pub name: String,
    #[serde(rename = "type", default = "folder_type")]
    pub entity_type: EntityType,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(default)]
    pub created_on: i64,
    #[serde(default)]
    pub last_updated: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    /// Derived from live collection `parentId` links; recomputed after every move
    #[serde(default)]
    pub collection_count: usize,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Folder {
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            uid: uid.into(),
            name: name.into(),
            entity_type: EntityType::Folder,
            color: default_color(),
            collapsed: false,
            created_on: now,
            last_updated: now,
            order: None,
            collection_count: 0,
            extra: Map::new(),
        }
    }

    pub fn index_entry(&self) -> FolderIndexEntry {
        FolderIndexEntry {
            name: self.name.clone(),
            entity_type: EntityType::Folder,
            color: self.color.clone(),
            collapsed: self.collapsed,
            created_on: self.created_on,
            last_updated: self.last_updated,
            order: self.order,
            collection_count: self.collection_count,
        }
    }
}

/// Lightweight projection of a collection kept in `collections_index`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionIndexEntry {
    pub name: String,
    #[serde(rename = "type", default)]
    pub entity_type: EntityType,
    #[serde(default)]
    pub tab_count: usize,
    #[serde(default)]
    pub last_updated: i64,
    #[serde(default)]
    pub last_opened: Option<i64>,
    #[serde(default)]
    pub created_on: i64,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub size: usize,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

/// Lightweight projection of a folder kept in `folders_index`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FolderIndexEntry {
    pub name: String,
    #[serde(rename = "type", default = "folder_type")]
    pub entity_type: EntityType,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(default)]
    pub created_on: i64,
    #[serde(default)]
    pub last_updated: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default)]
    pub collection_count: usize,
}

/// uid → metadata, in insertion order.
pub type CollectionsIndex = IndexMap<String, CollectionIndexEntry>;

/// uid → metadata, in insertion order.
pub type FoldersIndex = IndexMap<String, FolderIndexEntry>;

/// Error types for tabox core operations.
#[derive(Error, Debug)]
pub enum TaboxError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data failed a structural check
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A uid did not resolve to an entity
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other error
    #[error("Error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TaboxError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ms_timestamp_to_datetime() {
        let ms = 1760074389851;
        let dt = ms_timestamp_to_datetime(ms);
        assert_eq!(dt.timestamp_millis(), ms);
    }

    #[test]
    fn test_tab_domain() {
        let tab = Tab::new("t1", "https://example.com/path", "Test");
        assert_eq!(tab.domain(), Some("example.com".to_string()));
        assert_eq!(Tab::new("t2", "about:blank", "").domain(), None);
    }

    #[test]
    fn test_collection_deserializes_legacy_shape() {
        let raw = json!({
            "uid": "c1",
            "name": "Research",
            "tabs": [
                {"uid": "t1", "url": "https://a.dev", "title": "A", "groupId": 7, "groupUid": "g1"},
                {"uid": "t2", "url": "https://b.dev", "title": "B", "groupId": -1, "active": true}
            ],
            "chromeGroups": [{"uid": "g1", "title": "Docs", "color": "blue"}],
            "createdOn": 10,
            "customField": "kept"
        });
        let c: Collection = serde_json::from_value(raw).unwrap();
        assert_eq!(c.tabs.len(), 2);
        assert_eq!(c.tabs[0].group_id, GroupId::Numeric(7));
        assert!(c.tabs[1].group_id.is_ungrouped());
        assert_eq!(c.tabs[1].extra.get("active"), Some(&json!(true)));
        assert_eq!(c.extra.get("customField"), Some(&json!("kept")));
        assert_eq!(c.color, DEFAULT_COLOR);
        assert!(c.parent_id.is_none());

        let back = serde_json::to_value(&c).unwrap();
        assert_eq!(back["customField"], json!("kept"));
        assert_eq!(back["type"], json!("collection"));
        assert_eq!(back["parentId"], Value::Null);
    }

    #[test]
    fn test_group_id_prefers_numeric_id() {
        let mut g = Group::new("g1", "Docs", "blue");
        assert_eq!(g.group_id(), GroupId::Uid("g1".to_string()));
        g.id = Some(42);
        assert_eq!(g.group_id(), GroupId::Numeric(42));
    }

    #[test]
    fn test_remove_group_if_empty() {
        let mut c = Collection::new("c1", "C");
        c.chrome_groups.push(Group::new("g1", "G", "red"));
        let mut t = Tab::new("t1", "https://a.dev", "A");
        t.group_uid = Some("g1".to_string());
        c.tabs.push(t);

        assert!(!c.remove_group_if_empty("g1"));
        c.tabs.clear();
        assert!(c.remove_group_if_empty("g1"));
        assert!(c.chrome_groups.is_empty());
    }

    #[test]
    fn test_pinned_floor() {
        let mut c = Collection::new("c1", "C");
        let mut p = Tab::new("p", "https://p.dev", "P");
        p.pinned = true;
        c.tabs = vec![p.clone(), p, Tab::new("t", "https://t.dev", "T")];
        assert_eq!(c.pinned_floor(), 2);
    }

    #[test]
    fn test_index_entry_projection() {
        let mut c = Collection::new("c1", "C");
        c.tabs.push(Tab::new("t1", "https://a.dev", "A"));
        c.parent_id = Some("f1".to_string());
        let entry = c.index_entry();
        assert_eq!(entry.tab_count, 1);
        assert_eq!(entry.parent_id.as_deref(), Some("f1"));
        assert!(entry.size > 0);

        let shell = Collection::from_index_entry("c1", &entry);
        assert_eq!(shell.name, "C");
        assert!(shell.tabs.is_empty());
    }

    #[test]
    fn test_clone_with_fresh_uids_relinks_groups() {
        let mut c = Collection::new("c1", "C");
        c.chrome_groups.push(Group::new("g1", "G", "red"));
        let mut grouped = Tab::new("t1", "https://a.dev", "A");
        grouped.group_uid = Some("g1".to_string());
        grouped.group_id = GroupId::Uid("g1".to_string());
        let mut dangling = Tab::new("t2", "https://b.dev", "B");
        dangling.group_uid = Some("missing".to_string());
        c.tabs = vec![grouped, dangling];

        let copy = c.clone_with_fresh_uids();
        assert_ne!(copy.uid, c.uid);
        assert_ne!(copy.tabs[0].uid, "t1");
        let new_group = &copy.chrome_groups[0].uid;
        assert_ne!(new_group, "g1");
        assert_eq!(copy.tabs[0].group_uid.as_ref(), Some(new_group));
        assert_eq!(copy.tabs[0].group_id, GroupId::Uid(new_group.clone()));
        assert!(copy.tabs[1].group_uid.is_none());
        assert!(copy.tabs[1].group_id.is_ungrouped());
        assert_eq!(c.tabs[0].uid, "t1");
    }

    #[test]
    fn test_folder_type_defaults_to_folder() {
        let f: Folder = serde_json::from_value(json!({"uid": "f1", "name": "Work"})).unwrap();
        assert_eq!(f.entity_type, EntityType::Folder);
        assert_eq!(f.collection_count, 0);
    }
}
