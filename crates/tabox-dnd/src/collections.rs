//! Collection drops across the root list and folders.
//!
//! Drops are planned against a [`CollectionLayout`], the order the user sees,
//! and then applied through the indexed store. Planning is pure; applying is
//! the only part that touches storage.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tabox_store::{CollectionStore, LoadOptions, SortBy, SortOrder};
use tracing::{debug, warn};

use crate::{array_move, DragError};

/// Root-level collections and each folder's collections, in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionLayout {
    pub root: Vec<String>,
    /// Folder uid → collection uids, folders in display order
    pub folders: IndexMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "uid", rename_all = "snake_case")]
pub enum CollectionDropTarget {
    /// Another collection's row, at root or inside a folder
    Collection(String),
    /// A folder's drop zone
    Folder(String),
    /// The root list's empty area
    RootZone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectionMove {
    /// Array-move inside one list; `folder` is `None` for the root list
    Reorder { folder: Option<String>, order: Vec<String> },
    IntoFolder { collection: String, folder: String },
    /// Out of a folder, then positioned in the root list as `order`
    ToRoot { collection: String, order: Vec<String> },
    Unchanged,
}

/// What applying a move did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveResult {
    pub changed: bool,
    /// Positioning failed after the move; reload everything from the store
    pub refresh_required: bool,
}

impl CollectionLayout {
    /// Builds the layout from the store, ordering by manual position.
    pub async fn load(store: &CollectionStore) -> anyhow::Result<Self> {
        let options = LoadOptions {
            metadata_only: true,
            sort_by: Some(SortBy::Manual),
            sort_order: SortOrder::Asc,
        };
        let collections = store.load_all_collections(&options).await?;
        let folders = store.load_all_folders(Some((SortBy::Manual, SortOrder::Asc))).await?;

        let mut layout = CollectionLayout {
            root: Vec::new(),
            folders: folders.into_iter().map(|f| (f.uid, Vec::new())).collect(),
        };
        for collection in collections {
            match collection.parent_id.and_then(|p| layout.folders.get_mut(&p)) {
                Some(list) => list.push(collection.uid),
                None => layout.root.push(collection.uid),
            }
        }
        Ok(layout)
    }

    /// `Some(None)` for a root collection, `Some(Some(folder))` for a nested one.
    pub fn parent_of(&self, collection_uid: &str) -> Option<Option<&str>> {
        if self.root.iter().any(|u| u == collection_uid) {
            return Some(None);
        }
        self.folders
            .iter()
            .find(|(_, list)| list.iter().any(|u| u == collection_uid))
            .map(|(folder, _)| Some(folder.as_str()))
    }

    fn list(&self, folder: Option<&str>) -> &[String] {
        match folder {
            None => &self.root,
            Some(f) => self.folders.get(f).map(Vec::as_slice).unwrap_or(&[]),
        }
    }

    fn detach(&mut self, collection_uid: &str) {
        self.root.retain(|u| u != collection_uid);
        for list in self.folders.values_mut() {
            list.retain(|u| u != collection_uid);
        }
    }

    /// Mirrors a planned move in memory.
    pub fn apply(&mut self, mv: &CollectionMove) {
        match mv {
            CollectionMove::Reorder { folder: None, order } => self.root = order.clone(),
            CollectionMove::Reorder {
                folder: Some(folder),
                order,
            } => {
                if let Some(list) = self.folders.get_mut(folder) {
                    *list = order.clone();
                }
            }
            CollectionMove::IntoFolder { collection, folder } => {
                self.detach(collection);
                if let Some(list) = self.folders.get_mut(folder) {
                    list.push(collection.clone());
                }
            }
            CollectionMove::ToRoot { collection, order } => {
                self.detach(collection);
                self.root = order.clone();
            }
            CollectionMove::Unchanged => {}
        }
    }
}

fn reorder(list: &[String], dragged: &str, target_index: usize) -> Vec<String> {
    let mut order = list.to_vec();
    if let Some(from) = order.iter().position(|u| u == dragged) {
        array_move(&mut order, from, target_index);
    }
    order
}

fn insert_at(list: &[String], dragged: &str, index: usize) -> Vec<String> {
    let mut order: Vec<String> = list.iter().filter(|u| *u != dragged).cloned().collect();
    let index = index.min(order.len());
    order.insert(index, dragged.to_string());
    order
}

/// Plans a collection drop.
///
/// Same list: array-move. Root onto a nested collection or a folder zone:
/// into that folder. Folder onto a root collection: out to root at that
/// collection's position; onto the root zone: out to the end of root. Folder
/// onto another folder's collection or zone: into that folder. A collection
/// target that vanished sends the dragged collection to the end of its list.
///
/// # Errors
///
/// Fails if the dragged collection or a folder target is not in the layout.
pub fn plan_collection_drop(
    layout: &CollectionLayout,
    dragged: &str,
    target: &CollectionDropTarget,
) -> Result<CollectionMove, DragError> {
    let source = layout
        .parent_of(dragged)
        .ok_or_else(|| DragError::not_found("collection", dragged))?;

    let mv = match target {
        CollectionDropTarget::Collection(t) if t == dragged => CollectionMove::Unchanged,
        CollectionDropTarget::Collection(t) => match layout.parent_of(t) {
            None => {
                warn!(target = %t, collection = %dragged, "drop collection vanished; moving to end");
                let list = layout.list(source);
                CollectionMove::Reorder {
                    folder: source.map(str::to_string),
                    order: reorder(list, dragged, list.len()),
                }
            }
            Some(target_parent) if target_parent == source => {
                let list = layout.list(source);
                let index = list.iter().position(|u| u == t).unwrap_or(list.len());
                CollectionMove::Reorder {
                    folder: source.map(str::to_string),
                    order: reorder(list, dragged, index),
                }
            }
            Some(Some(folder)) => CollectionMove::IntoFolder {
                collection: dragged.to_string(),
                folder: folder.to_string(),
            },
            Some(None) => {
                let index = layout.root.iter().position(|u| u == t).unwrap_or(layout.root.len());
                CollectionMove::ToRoot {
                    collection: dragged.to_string(),
                    order: insert_at(&layout.root, dragged, index),
                }
            }
        },
        CollectionDropTarget::Folder(folder) => {
            if !layout.folders.contains_key(folder) {
                return Err(DragError::not_found("folder", folder));
            }
            if source == Some(folder.as_str()) {
                CollectionMove::Unchanged
            } else {
                CollectionMove::IntoFolder {
                    collection: dragged.to_string(),
                    folder: folder.clone(),
                }
            }
        }
        CollectionDropTarget::RootZone => match source {
            None => CollectionMove::Unchanged,
            Some(_) => CollectionMove::ToRoot {
                collection: dragged.to_string(),
                order: insert_at(&layout.root, dragged, layout.root.len()),
            },
        },
    };
    debug!(collection = %dragged, ?mv, "planned collection drop");
    Ok(mv)
}

/// Persists a planned move.
///
/// A `ToRoot` move whose repositioning fails is still a completed move; the
/// result asks the caller to reload instead of trusting its local order.
pub async fn apply_collection_move(store: &CollectionStore, mv: &CollectionMove) -> anyhow::Result<MoveResult> {
    let result = match mv {
        CollectionMove::Reorder { order, .. } => {
            store.update_collections_order(order).await?;
            MoveResult {
                changed: true,
                refresh_required: false,
            }
        }
        CollectionMove::IntoFolder { collection, folder } => MoveResult {
            changed: store.move_collection_to_folder(collection, folder).await?,
            refresh_required: false,
        },
        CollectionMove::ToRoot { collection, order } => {
            if !store.remove_collection_from_folder(collection).await? {
                return Ok(MoveResult::default());
            }
            match store.update_collections_order(order).await {
                Ok(_) => MoveResult {
                    changed: true,
                    refresh_required: false,
                },
                Err(e) => {
                    warn!(collection = %collection, error = %format!("{:#}", e), "repositioning at root failed");
                    MoveResult {
                        changed: true,
                        refresh_required: true,
                    }
                }
            }
        }
        CollectionMove::Unchanged => MoveResult::default(),
    };
    Ok(result)
}
