//! Drag-and-drop reconciliation for tabox.
//!
//! Every drag gesture has exactly one [`DragContext`]: a tab, a group, a
//! collection or a folder, identified by uid and by the container it was
//! lifted from. The rule modules take the current entities plus a resolved
//! drop target and compute the next state:
//!
//! - [`tabs`] and [`groups`] rewrite one or two in-memory [`Collection`]s.
//! - [`collections`] and [`folders`] plan moves over the root/folder layout and
//!   apply them through the indexed store.
//! - [`collision`] picks the drop target when several candidates overlap.
//! - [`coordinator`] tracks drags that leave their own list and land on a
//!   different collection.
//! - [`commands`] applies drags to an in-memory [`Workspace`] and persists
//!   them later, reporting failures through a callback.
//!
//! [`Collection`]: tabox_core::Collection
//! [`Workspace`]: commands::Workspace

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod collections;
pub mod collision;
pub mod commands;
pub mod coordinator;
pub mod folders;
pub mod groups;
pub mod tabs;

pub use collections::{CollectionDropTarget, CollectionLayout, CollectionMove};
pub use collision::{resolve_drop_target, Collision, DropCandidate};
pub use commands::{CommandQueue, DragCommand, FlushReport, Workspace};
pub use coordinator::{CrossDrop, DragCoordinator, DropZone, ExternalDrag, Point, Rect};
pub use folders::FolderDropTarget;
pub use groups::GroupDropTarget;
pub use tabs::{TabDropTarget, TabMove};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DragError {
    #[error("{kind} {uid} not found")]
    NotFound { kind: &'static str, uid: String },

    #[error("pinned tab {0} cannot be dragged")]
    PinnedTab(String),

    #[error("groups cannot be nested inside other groups")]
    NestedGroup,

    #[error("invalid drop target: {0}")]
    InvalidTarget(String),
}

impl DragError {
    pub(crate) fn not_found(kind: &'static str, uid: &str) -> Self {
        DragError::NotFound {
            kind,
            uid: uid.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragKind {
    Tab,
    Group,
    Collection,
    Folder,
}

/// Where a dragged entity was lifted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "uid", rename_all = "snake_case")]
pub enum SourceContainer {
    /// A collection's expanded tab/group list
    Collection(String),
    /// Root-level collection list
    Root,
    /// A folder's collection list
    Folder(String),
    /// The folder list itself
    FolderList,
}

/// The one entity a drag gesture is carrying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragContext {
    pub kind: DragKind,
    pub uid: String,
    pub source: SourceContainer,
}

impl DragContext {
    pub fn tab(uid: impl Into<String>, collection_uid: impl Into<String>) -> Self {
        Self {
            kind: DragKind::Tab,
            uid: uid.into(),
            source: SourceContainer::Collection(collection_uid.into()),
        }
    }

    pub fn group(uid: impl Into<String>, collection_uid: impl Into<String>) -> Self {
        Self {
            kind: DragKind::Group,
            uid: uid.into(),
            source: SourceContainer::Collection(collection_uid.into()),
        }
    }

    pub fn collection(uid: impl Into<String>, parent: Option<&str>) -> Self {
        Self {
            kind: DragKind::Collection,
            uid: uid.into(),
            source: match parent {
                Some(folder) => SourceContainer::Folder(folder.to_string()),
                None => SourceContainer::Root,
            },
        }
    }

    pub fn folder(uid: impl Into<String>) -> Self {
        Self {
            kind: DragKind::Folder,
            uid: uid.into(),
            source: SourceContainer::FolderList,
        }
    }
}

/// Removes the item at `from` and reinserts it at `to`, clamped to the list.
pub fn array_move<T>(items: &mut Vec<T>, from: usize, to: usize) {
    if from >= items.len() {
        return;
    }
    let item = items.remove(from);
    let to = to.min(items.len());
    items.insert(to, item);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_move() {
        let mut v = vec!['a', 'b', 'c', 'd'];
        array_move(&mut v, 0, 2);
        assert_eq!(v, vec!['b', 'c', 'a', 'd']);
        array_move(&mut v, 3, 0);
        assert_eq!(v, vec!['d', 'b', 'c', 'a']);
        array_move(&mut v, 1, 99);
        assert_eq!(v, vec!['d', 'c', 'a', 'b']);
        array_move(&mut v, 9, 0);
        assert_eq!(v.len(), 4);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(DragError::not_found("tab", "t1").to_string(), "tab t1 not found");
        assert_eq!(
            DragError::PinnedTab("t2".into()).to_string(),
            "pinned tab t2 cannot be dragged"
        );
    }
}
