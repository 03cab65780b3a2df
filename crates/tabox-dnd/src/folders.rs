//! Folder reordering. Folders only ever move among themselves.

use serde::{Deserialize, Serialize};
use tabox_store::CollectionStore;
use tracing::{debug, warn};

use crate::{array_move, DragError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "uid", rename_all = "snake_case")]
pub enum FolderDropTarget {
    Folder(String),
    /// Collections are not valid folder targets; the drop is ignored
    Collection(String),
}

/// Plans the folder order after a drop.
///
/// Returns `None` when nothing changes: a drop on itself, on a collection, or
/// on a folder that no longer exists.
///
/// # Errors
///
/// Fails if the dragged folder is not in `order`.
pub fn plan_folder_drop(
    order: &[String],
    dragged: &str,
    target: &FolderDropTarget,
) -> Result<Option<Vec<String>>, DragError> {
    let from = order
        .iter()
        .position(|u| u == dragged)
        .ok_or_else(|| DragError::not_found("folder", dragged))?;

    let target_uid = match target {
        FolderDropTarget::Collection(uid) => {
            debug!(folder = %dragged, collection = %uid, "ignoring folder drop on a collection");
            return Ok(None);
        }
        FolderDropTarget::Folder(uid) if uid == dragged => return Ok(None),
        FolderDropTarget::Folder(uid) => uid,
    };
    let Some(to) = order.iter().position(|u| u == target_uid) else {
        warn!(folder = %dragged, target = %target_uid, "folder drop target vanished");
        return Ok(None);
    };

    let mut next = order.to_vec();
    array_move(&mut next, from, to);
    Ok(Some(next))
}

/// Persists a folder order computed by [`plan_folder_drop`].
pub async fn apply_folder_order(store: &CollectionStore, order: &[String]) -> anyhow::Result<usize> {
    store.update_folders_order(order).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tabox_store::{MemoryStore, SortBy, SortOrder};

    fn order() -> Vec<String> {
        vec!["a".into(), "b".into(), "c".into()]
    }

    #[test]
    fn test_reorder() {
        let next = plan_folder_drop(&order(), "a", &FolderDropTarget::Folder("c".into())).unwrap();
        assert_eq!(next.unwrap(), vec!["b", "c", "a"]);
        let next = plan_folder_drop(&order(), "c", &FolderDropTarget::Folder("a".into())).unwrap();
        assert_eq!(next.unwrap(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_ignored_drops() {
        assert_eq!(
            plan_folder_drop(&order(), "a", &FolderDropTarget::Collection("x".into())).unwrap(),
            None
        );
        assert_eq!(plan_folder_drop(&order(), "a", &FolderDropTarget::Folder("a".into())).unwrap(), None);
        assert_eq!(plan_folder_drop(&order(), "a", &FolderDropTarget::Folder("z".into())).unwrap(), None);
        assert!(plan_folder_drop(&order(), "z", &FolderDropTarget::Folder("a".into())).is_err());
    }

    #[tokio::test]
    async fn test_order_persists() {
        let store = CollectionStore::new(Arc::new(MemoryStore::new()));
        let mut uids = Vec::new();
        for name in ["One", "Two", "Three"] {
            uids.push(store.create_folder(name, None).await.unwrap().uid);
        }
        let next = plan_folder_drop(&uids, &uids[2], &FolderDropTarget::Folder(uids[0].clone()))
            .unwrap()
            .unwrap();
        assert_eq!(apply_folder_order(&store, &next).await.unwrap(), 3);

        let folders = store.load_all_folders(Some((SortBy::Manual, SortOrder::Asc))).await.unwrap();
        let names: Vec<&str> = folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Three", "One", "Two"]);
    }
}
