//! Folder operations: creation, moves between folders and root, duplication and
//! deletion.
//!
//! Every operation that changes a collection's `parentId` recounts the
//! `collectionCount` of each folder it touched, so the stored count always equals
//! the number of collections whose `parentId` names that folder.

use std::collections::BTreeSet;

use tabox_core::{generate_copy_name, now_ms, uid, Collection, Folder};
use thiserror::Error;
use tracing::{debug, info};

use crate::indexed::{CollectionPatch, CollectionStore};

/// Errors callers branch on; they travel inside `anyhow::Error`.
#[derive(Error, Debug, PartialEq)]
pub enum FolderError {
    /// Deleting a folder that still holds collections needs an explicit choice
    #[error("folder {uid} still contains {count} collection(s)")]
    FolderNotEmpty { uid: String, count: usize },
}

/// What to do with a folder's collections when it is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FolderDeletion {
    /// Refuse unless the folder is empty
    #[default]
    RequireEmpty,
    MoveContentsToRoot,
    DeleteContents,
}

/// Result of [`CollectionStore::duplicate_folder`].
#[derive(Debug, Clone)]
pub struct FolderCopy {
    pub folder: Folder,
    pub collections: Vec<Collection>,
}

impl CollectionStore {
    /// Creates and persists an empty folder.
    pub async fn create_folder(&self, name: &str, color: Option<&str>) -> anyhow::Result<Folder> {
        let mut folder = Folder::new(uid::new_uid(), name);
        if let Some(color) = color {
            folder.color = tabox_core::migrate_color(color).to_string();
        }
        self.save_single_folder(&folder).await?;
        info!(uid = %folder.uid, name = %folder.name, "created folder");
        Ok(folder)
    }

    /// Renames a folder. Returns false if it does not exist.
    pub async fn rename_folder(&self, folder_uid: &str, name: &str) -> anyhow::Result<bool> {
        let _guard = self.lock_writes().await;
        let Some(mut folder) = self.load_single_folder(folder_uid).await? else {
            return Ok(false);
        };
        folder.name = name.to_string();
        folder.last_updated = now_ms();
        self.save_folder_locked(&folder).await?;
        Ok(true)
    }

    /// Moves a collection into a folder, recounting the old and the new folder.
    ///
    /// Returns false if either uid does not resolve.
    pub async fn move_collection_to_folder(&self, collection_uid: &str, folder_uid: &str) -> anyhow::Result<bool> {
        let _guard = self.lock_writes().await;
        let Some(mut collection) = self.load_single_collection(collection_uid).await? else {
            return Ok(false);
        };
        if self.load_single_folder(folder_uid).await?.is_none() {
            return Ok(false);
        }

        collection.parent_id = Some(folder_uid.to_string());
        collection.touch(now_ms());
        self.save_collection_locked(&collection).await?;
        debug!(collection = %collection_uid, folder = %folder_uid, "moved collection into folder");
        Ok(true)
    }

    /// Moves a collection back to the root level, recounting its former folder.
    ///
    /// Returns false if the collection does not exist.
    pub async fn remove_collection_from_folder(&self, collection_uid: &str) -> anyhow::Result<bool> {
        let _guard = self.lock_writes().await;
        let Some(mut collection) = self.load_single_collection(collection_uid).await? else {
            return Ok(false);
        };
        collection.parent_id = None;
        collection.touch(now_ms());
        self.save_collection_locked(&collection).await?;
        Ok(true)
    }

    /// Full bodies of every collection whose `parentId` is `folder_uid`, in index order.
    pub async fn get_folder_collections(&self, folder_uid: &str) -> anyhow::Result<Vec<Collection>> {
        let index = self.load_collections_index().await?;
        let mut out = Vec::new();
        for (uid, entry) in &index {
            if entry.parent_id.as_deref() != Some(folder_uid) {
                continue;
            }
            if let Some(collection) = self.load_single_collection(uid).await? {
                out.push(collection);
            }
        }
        Ok(out)
    }

    /// Copies a collection with fresh uids and a copy name next to the original.
    pub async fn duplicate_collection(&self, collection_uid: &str) -> anyhow::Result<Option<Collection>> {
        let _guard = self.lock_writes().await;
        let Some(original) = self.load_single_collection(collection_uid).await? else {
            return Ok(None);
        };
        let mut index = self.load_collections_index().await?;

        let now = now_ms();
        let mut copy = original.clone_with_fresh_uids();
        copy.name = generate_copy_name(&original.name, index.values().map(|e| e.name.as_str()));
        copy.created_on = now;
        copy.last_updated = now;
        copy.last_opened = None;
        copy.order = None;

        self.write_collections(std::slice::from_ref(&copy), &mut index).await?;
        if let Some(parent) = &copy.parent_id {
            self.recount_folder(parent, &index).await?;
        }
        Ok(Some(copy))
    }

    /// Deep-copies a folder and every collection in it.
    ///
    /// The new folder and each copied collection get fresh uids and copy names.
    pub async fn duplicate_folder(&self, folder_uid: &str) -> anyhow::Result<Option<FolderCopy>> {
        let _guard = self.lock_writes().await;
        let Some(original) = self.load_single_folder(folder_uid).await? else {
            return Ok(None);
        };
        let mut folders_index = self.load_folders_index().await?;
        let mut collections_index = self.load_collections_index().await?;
        let now = now_ms();

        let mut folder = original.clone();
        folder.uid = uid::new_uid();
        folder.name = generate_copy_name(&original.name, folders_index.values().map(|e| e.name.as_str()));
        folder.created_on = now;
        folder.last_updated = now;
        folder.order = None;

        let mut names: Vec<String> = collections_index.values().map(|e| e.name.clone()).collect();
        let mut copies = Vec::new();
        for (uid, entry) in &collections_index {
            if entry.parent_id.as_deref() != Some(folder_uid) {
                continue;
            }
            let Some(source) = self.load_single_collection(uid).await? else {
                continue;
            };
            let mut copy = source.clone_with_fresh_uids();
            copy.name = generate_copy_name(&source.name, names.iter().map(String::as_str));
            copy.parent_id = Some(folder.uid.clone());
            copy.created_on = now;
            copy.last_updated = now;
            copy.last_opened = None;
            names.push(copy.name.clone());
            copies.push(copy);
        }
        folder.collection_count = copies.len();

        self.write_collections(&copies, &mut collections_index).await?;
        self.write_folders(std::slice::from_ref(&folder), &mut folders_index)
            .await?;
        info!(source = %folder_uid, copy = %folder.uid, collections = copies.len(), "duplicated folder");

        Ok(Some(FolderCopy {
            folder,
            collections: copies,
        }))
    }

    /// Deletes a folder.
    ///
    /// With [`FolderDeletion::RequireEmpty`] a folder that still holds collections
    /// is refused with [`FolderError::FolderNotEmpty`]. Returns false if the folder
    /// does not exist.
    pub async fn delete_folder(&self, folder_uid: &str, mode: FolderDeletion) -> anyhow::Result<bool> {
        let _guard = self.lock_writes().await;
        if self.load_single_folder(folder_uid).await?.is_none() {
            return Ok(false);
        }
        let index = self.load_collections_index().await?;
        let contained: Vec<String> = index
            .iter()
            .filter(|(_, e)| e.parent_id.as_deref() == Some(folder_uid))
            .map(|(uid, _)| uid.clone())
            .collect();

        match mode {
            FolderDeletion::RequireEmpty if !contained.is_empty() => {
                return Err(FolderError::FolderNotEmpty {
                    uid: folder_uid.to_string(),
                    count: contained.len(),
                }
                .into());
            }
            FolderDeletion::RequireEmpty => {}
            FolderDeletion::MoveContentsToRoot => {
                let now = now_ms();
                let patches: Vec<CollectionPatch> = contained
                    .iter()
                    .map(|uid| CollectionPatch {
                        parent_id: Some(None),
                        last_updated: Some(now),
                        ..CollectionPatch::new(uid.clone())
                    })
                    .collect();
                self.batch_update_locked(&patches).await?;
            }
            FolderDeletion::DeleteContents => {
                for uid in &contained {
                    self.delete_collection_locked(uid).await?;
                }
            }
        }

        self.delete_folder_locked(folder_uid).await?;
        info!(uid = %folder_uid, collections = contained.len(), ?mode, "deleted folder");
        Ok(true)
    }

    /// Deletes a collection and recounts the folder it lived in.
    pub async fn delete_collection(&self, collection_uid: &str) -> anyhow::Result<bool> {
        let _guard = self.lock_writes().await;
        let parent = self
            .load_collections_index()
            .await?
            .get(collection_uid)
            .and_then(|e| e.parent_id.clone());

        if !self.delete_collection_locked(collection_uid).await? {
            return Ok(false);
        }
        if let Some(parent) = parent {
            let index = self.load_collections_index().await?;
            self.recount_folders(&BTreeSet::from([parent]), &index).await?;
        }
        Ok(true)
    }
}
