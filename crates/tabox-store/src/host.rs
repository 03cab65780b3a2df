//! Collaborator traits for the browser host.
//!
//! The core never talks to a browser directly. Capturing "current tabs" goes
//! through [`TabSource`]; opening a saved collection goes through
//! [`WindowOpener`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tabox_core::{migrate_color, now_ms, uid, Collection, Group, GroupId, MutedInfo, Tab, UNGROUPED_ID};
use tracing::debug;

use crate::indexed::{CollectionPatch, CollectionStore};

/// Which live tabs to capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabQuery {
    /// Restrict to one window; `None` means the current window
    pub window_id: Option<i64>,
    pub include_pinned: bool,
}

/// One live tab as reported by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSnapshot {
    pub id: i64,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fav_icon_url: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub muted_info: Option<MutedInfo>,
    /// Host group id, `-1` when ungrouped
    #[serde(default = "ungrouped_id")]
    pub group_id: i64,
}

fn ungrouped_id() -> i64 {
    UNGROUPED_ID
}

/// One live tab group as reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSnapshot {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    pub color: String,
    #[serde(default)]
    pub collapsed: bool,
}

/// Where to open a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowHint {
    #[default]
    NewWindow,
    CurrentWindow,
}

#[async_trait]
pub trait TabSource: Send + Sync {
    async fn query_current_tabs(&self, query: &TabQuery) -> anyhow::Result<Vec<TabSnapshot>>;

    async fn query_groups(&self, query: &TabQuery) -> anyhow::Result<Vec<GroupSnapshot>>;
}

#[async_trait]
pub trait WindowOpener: Send + Sync {
    async fn open_tabs(&self, collection: &Collection, hint: WindowHint) -> anyhow::Result<()>;
}

/// Builds a new root-level collection from the host's live tabs and groups.
///
/// Every tab and group gets a fresh uid. Host group ids are kept in `groupId`
/// and resolved into `groupUid`; tabs pointing at a group the host did not
/// report are stored ungrouped. Groups left without tabs are dropped.
pub async fn capture_current_tabs(
    source: &dyn TabSource,
    name: &str,
    query: &TabQuery,
) -> anyhow::Result<Collection> {
    let snapshots = source.query_current_tabs(query).await?;
    let group_snapshots = source.query_groups(query).await?;

    let mut collection = Collection::new(uid::new_uid(), name);
    let mut by_host_id = HashMap::new();
    for g in group_snapshots {
        let mut group = Group::new(uid::new_uid(), g.title, migrate_color(&g.color));
        group.id = Some(g.id);
        group.collapsed = g.collapsed;
        by_host_id.insert(g.id, group.uid.clone());
        collection.chrome_groups.push(group);
    }

    for snap in snapshots {
        if snap.pinned && !query.include_pinned {
            continue;
        }
        let mut tab = Tab::new(uid::new_uid(), snap.url, snap.title);
        tab.fav_icon_url = snap.fav_icon_url;
        tab.pinned = snap.pinned;
        tab.muted_info = snap.muted_info;
        match by_host_id.get(&snap.group_id) {
            Some(group_uid) => {
                tab.group_uid = Some(group_uid.clone());
                tab.group_id = GroupId::Numeric(snap.group_id);
            }
            None => tab.ungroup(),
        }
        collection.tabs.push(tab);
    }

    let group_uids: Vec<String> = collection.chrome_groups.iter().map(|g| g.uid.clone()).collect();
    for group_uid in group_uids {
        collection.remove_group_if_empty(&group_uid);
    }

    debug!(
        tabs = collection.tabs.len(),
        groups = collection.chrome_groups.len(),
        "captured current tabs"
    );
    Ok(collection)
}

/// Opens a stored collection through the host and records `lastOpened`.
///
/// Opening is not an edit, so `lastUpdated` is left alone. Returns false if the
/// collection does not exist.
pub async fn open_collection(
    store: &CollectionStore,
    opener: &dyn WindowOpener,
    collection_uid: &str,
    hint: WindowHint,
) -> anyhow::Result<bool> {
    let Some(collection) = store.load_single_collection(collection_uid).await? else {
        return Ok(false);
    };
    opener.open_tabs(&collection, hint).await?;

    let patch = CollectionPatch {
        last_opened: Some(Some(now_ms())),
        ..CollectionPatch::new(collection_uid)
    };
    store.batch_update_collections(&[patch]).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use std::sync::{Arc, Mutex};

    struct FakeHost {
        tabs: Vec<TabSnapshot>,
        groups: Vec<GroupSnapshot>,
    }

    #[async_trait]
    impl TabSource for FakeHost {
        async fn query_current_tabs(&self, _query: &TabQuery) -> anyhow::Result<Vec<TabSnapshot>> {
            Ok(self.tabs.clone())
        }

        async fn query_groups(&self, _query: &TabQuery) -> anyhow::Result<Vec<GroupSnapshot>> {
            Ok(self.groups.clone())
        }
    }

    #[derive(Default)]
    struct RecordingOpener {
        opened: Mutex<Vec<(String, WindowHint)>>,
    }

    #[async_trait]
    impl WindowOpener for RecordingOpener {
        async fn open_tabs(&self, collection: &Collection, hint: WindowHint) -> anyhow::Result<()> {
            self.opened.lock().unwrap().push((collection.uid.clone(), hint));
            Ok(())
        }
    }

    fn snap(id: i64, url: &str, group_id: i64, pinned: bool) -> TabSnapshot {
        TabSnapshot {
            id,
            url: url.to_string(),
            title: url.to_string(),
            pinned,
            group_id,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_capture_links_groups() {
        let host = FakeHost {
            tabs: vec![
                snap(1, "https://pinned.dev", -1, true),
                snap(2, "https://a.dev", 7, false),
                snap(3, "https://b.dev", 99, false),
            ],
            groups: vec![
                GroupSnapshot {
                    id: 7,
                    title: "Docs".to_string(),
                    color: "#1a73e8".to_string(),
                    collapsed: true,
                },
                GroupSnapshot {
                    id: 8,
                    title: "Empty".to_string(),
                    color: "red".to_string(),
                    collapsed: false,
                },
            ],
        };

        let c = capture_current_tabs(&host, "Now", &TabQuery::default()).await.unwrap();
        assert_eq!(c.tabs.len(), 2, "pinned tab excluded by default");
        assert_eq!(c.chrome_groups.len(), 1, "group without tabs dropped");
        assert_eq!(c.chrome_groups[0].color, "blue");
        assert_eq!(c.tabs[0].group_uid.as_ref(), Some(&c.chrome_groups[0].uid));
        assert_eq!(c.tabs[0].group_id, GroupId::Numeric(7));
        assert!(c.tabs[1].group_uid.is_none());
        assert!(c.tabs[1].group_id.is_ungrouped());

        let with_pinned = TabQuery {
            include_pinned: true,
            ..Default::default()
        };
        let c = capture_current_tabs(&host, "Now", &with_pinned).await.unwrap();
        assert_eq!(c.tabs.len(), 3);
        assert!(c.tabs[0].pinned);
    }

    #[tokio::test]
    async fn test_open_collection_records_last_opened() {
        let store = CollectionStore::new(Arc::new(MemoryStore::new()));
        let mut c = Collection::new("c1", "A");
        c.last_updated = 5;
        store.save_single_collection(&c).await.unwrap();

        let opener = RecordingOpener::default();
        assert!(open_collection(&store, &opener, "c1", WindowHint::NewWindow).await.unwrap());
        assert!(!open_collection(&store, &opener, "nope", WindowHint::NewWindow).await.unwrap());

        assert_eq!(opener.opened.lock().unwrap().len(), 1);
        let loaded = store.load_single_collection("c1").await.unwrap().unwrap();
        assert!(loaded.last_opened.is_some());
        assert_eq!(loaded.last_updated, 5);
    }
}
