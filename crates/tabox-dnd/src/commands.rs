//! Drags as commands.
//!
//! A [`DragCommand`] is applied to the in-memory [`Workspace`] immediately so
//! the UI can re-render, and queued for persistence. [`CommandQueue::flush`]
//! writes the queued effects through the store; a command whose write fails
//! is handed to a reconciliation callback instead of being dropped silently.

use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tabox_core::Collection;
use tabox_store::{CollectionStore, LoadOptions, SortBy, SortOrder};
use tracing::{debug, info, warn};

use crate::collections::{self, CollectionDropTarget, CollectionLayout, CollectionMove};
use crate::folders::{self, FolderDropTarget};
use crate::groups::{self, GroupDropTarget};
use crate::tabs::{self, TabDropTarget};
use crate::DragError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DragCommand {
    MoveTab {
        collection: String,
        tab: String,
        target: TabDropTarget,
    },
    MoveTabAcross {
        source: String,
        target: String,
        tab: String,
    },
    MoveGroup {
        collection: String,
        group: String,
        target: GroupDropTarget,
    },
    MoveGroupAcross {
        source: String,
        target: String,
        group: String,
    },
    MoveCollection {
        collection: String,
        target: CollectionDropTarget,
    },
    MoveFolder {
        folder: String,
        target: FolderDropTarget,
    },
}

/// What a command needs written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Full bodies of these collections, as they are in the workspace at flush time
    SaveCollections(Vec<String>),
    Collection(CollectionMove),
    FolderOrder(Vec<String>),
    Nothing,
}

/// The in-memory model the UI renders from.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    pub collections: IndexMap<String, Collection>,
    pub layout: CollectionLayout,
    pub folder_order: Vec<String>,
}

impl Workspace {
    pub async fn load(store: &CollectionStore) -> anyhow::Result<Self> {
        let options = LoadOptions {
            metadata_only: false,
            sort_by: Some(SortBy::Manual),
            sort_order: SortOrder::Asc,
        };
        let collections = store
            .load_all_collections(&options)
            .await
            .context("failed to load collections into workspace")?;
        let folders = store.load_all_folders(Some((SortBy::Manual, SortOrder::Asc))).await?;
        Ok(Self {
            collections: collections.into_iter().map(|c| (c.uid.clone(), c)).collect(),
            layout: CollectionLayout::load(store).await?,
            folder_order: folders.into_iter().map(|f| f.uid).collect(),
        })
    }

    fn collection_mut(&mut self, uid: &str) -> Result<&mut Collection, DragError> {
        self.collections
            .get_mut(uid)
            .ok_or_else(|| DragError::not_found("collection", uid))
    }

    /// Runs `f` on copies of two collections and keeps both only if it succeeds.
    fn with_pair<T>(
        &mut self,
        source: &str,
        target: &str,
        f: impl FnOnce(&mut Collection, &mut Collection) -> Result<T, DragError>,
    ) -> Result<T, DragError> {
        let mut s = self
            .collections
            .get(source)
            .cloned()
            .ok_or_else(|| DragError::not_found("collection", source))?;
        let mut t = self
            .collections
            .get(target)
            .cloned()
            .ok_or_else(|| DragError::not_found("collection", target))?;
        let out = f(&mut s, &mut t)?;
        self.collections.insert(source.to_string(), s);
        self.collections.insert(target.to_string(), t);
        Ok(out)
    }

    /// Applies a command to the model. On error the model is unchanged.
    pub fn apply(&mut self, command: &DragCommand, now: i64) -> Result<Effect, DragError> {
        let effect = match command {
            DragCommand::MoveTab {
                collection,
                tab,
                target,
            } => {
                let mut next = self.collection_mut(collection)?.clone();
                let mv = tabs::move_tab_within(&mut next, tab, target, now)?;
                if mv.from == mv.to && !mv.regrouped {
                    Effect::Nothing
                } else {
                    self.collections.insert(collection.clone(), next);
                    Effect::SaveCollections(vec![collection.clone()])
                }
            }
            DragCommand::MoveTabAcross { source, target, tab } => {
                self.with_pair(source, target, |s, t| tabs::move_tab_across(s, t, tab, now))?;
                Effect::SaveCollections(vec![source.clone(), target.clone()])
            }
            DragCommand::MoveGroup {
                collection,
                group,
                target,
            } => {
                let mut next = self.collection_mut(collection)?.clone();
                if groups::move_group_within(&mut next, group, target, now)?.moved {
                    self.collections.insert(collection.clone(), next);
                    Effect::SaveCollections(vec![collection.clone()])
                } else {
                    Effect::Nothing
                }
            }
            DragCommand::MoveGroupAcross { source, target, group } => {
                self.with_pair(source, target, |s, t| groups::move_group_across(s, t, group, now))?;
                Effect::SaveCollections(vec![source.clone(), target.clone()])
            }
            DragCommand::MoveCollection { collection, target } => {
                let mv = collections::plan_collection_drop(&self.layout, collection, target)?;
                self.layout.apply(&mv);
                let parent = match &mv {
                    CollectionMove::IntoFolder { folder, .. } => Some(Some(folder.clone())),
                    CollectionMove::ToRoot { .. } => Some(None),
                    _ => None,
                };
                if let (Some(parent), Some(c)) = (parent, self.collections.get_mut(collection)) {
                    c.parent_id = parent;
                }
                match mv {
                    CollectionMove::Unchanged => Effect::Nothing,
                    mv => Effect::Collection(mv),
                }
            }
            DragCommand::MoveFolder { folder, target } => {
                match folders::plan_folder_drop(&self.folder_order, folder, target)? {
                    Some(order) => {
                        self.folder_order = order.clone();
                        Effect::FolderOrder(order)
                    }
                    None => Effect::Nothing,
                }
            }
        };
        Ok(effect)
    }
}

/// Result of one [`CommandQueue::flush`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub persisted: usize,
    pub failed: usize,
    /// Some write landed but left order unknown; reload the workspace
    pub refresh_required: bool,
}

#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: Vec<(DragCommand, Effect)>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Applies `command` to `workspace` and queues its effect.
    ///
    /// Rejected commands are not queued. Returns whether anything changed.
    pub fn submit(&mut self, workspace: &mut Workspace, command: DragCommand, now: i64) -> Result<bool, DragError> {
        let effect = workspace.apply(&command, now)?;
        if effect == Effect::Nothing {
            debug!(?command, "drag produced no change");
            return Ok(false);
        }
        self.pending.push((command, effect));
        Ok(true)
    }

    /// Persists every queued effect in submission order.
    ///
    /// Collection bodies are written as they stand in `workspace` now, so a
    /// later command's state wins over an earlier one's. Each failure is
    /// reported through `on_failure` and does not stop the flush.
    pub async fn flush<F>(&mut self, store: &CollectionStore, workspace: &Workspace, mut on_failure: F) -> FlushReport
    where
        F: FnMut(&DragCommand, &anyhow::Error),
    {
        let mut report = FlushReport::default();
        for (command, effect) in std::mem::take(&mut self.pending) {
            match persist(store, workspace, &effect).await {
                Ok(refresh) => {
                    report.persisted += 1;
                    report.refresh_required |= refresh;
                }
                Err(e) => {
                    warn!(?command, error = %format!("{:#}", e), "drag could not be persisted");
                    report.failed += 1;
                    on_failure(&command, &e);
                }
            }
        }
        info!(
            persisted = report.persisted,
            failed = report.failed,
            refresh = report.refresh_required,
            "flushed drag commands"
        );
        report
    }
}

async fn persist(store: &CollectionStore, workspace: &Workspace, effect: &Effect) -> anyhow::Result<bool> {
    match effect {
        Effect::SaveCollections(uids) => {
            for uid in uids {
                let collection = workspace
                    .collections
                    .get(uid)
                    .with_context(|| format!("collection {} left the workspace", uid))?;
                store.save_single_collection(collection).await?;
            }
            Ok(false)
        }
        Effect::Collection(mv) => {
            let result = collections::apply_collection_move(store, mv).await?;
            if !result.changed {
                anyhow::bail!("collection move had no effect in the store");
            }
            Ok(result.refresh_required)
        }
        Effect::FolderOrder(order) => {
            folders::apply_folder_order(store, order).await?;
            Ok(false)
        }
        Effect::Nothing => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabox_core::{Group, Tab};

    fn workspace() -> Workspace {
        let mut a = Collection::new("a", "A");
        let mut t1 = Tab::new("t1", "https://one.dev", "One");
        t1.group_uid = Some("g1".into());
        a.tabs = vec![t1, Tab::new("t2", "https://two.dev", "Two")];
        a.chrome_groups = vec![Group::new("g1", "G", "red")];
        let b = Collection::new("b", "B");

        let mut ws = Workspace::default();
        ws.collections.insert("a".into(), a);
        ws.collections.insert("b".into(), b);
        ws.layout.root = vec!["a".into(), "b".into()];
        ws.layout.folders.insert("f".into(), Vec::new());
        ws.folder_order = vec!["f".into()];
        ws
    }

    #[test]
    fn test_cross_move_updates_both() {
        let mut ws = workspace();
        let mut queue = CommandQueue::new();
        let cmd = DragCommand::MoveTabAcross {
            source: "a".into(),
            target: "b".into(),
            tab: "t1".into(),
        };
        assert!(queue.submit(&mut ws, cmd, 5).unwrap());
        assert_eq!(ws.collections["a"].tabs.len(), 1);
        assert!(ws.collections["a"].chrome_groups.is_empty());
        assert_eq!(ws.collections["b"].tabs[0].uid, "t1");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_rejected_command_leaves_model() {
        let mut ws = workspace();
        let before = ws.collections.clone();
        let mut queue = CommandQueue::new();
        let cmd = DragCommand::MoveTabAcross {
            source: "a".into(),
            target: "missing".into(),
            tab: "t1".into(),
        };
        assert!(queue.submit(&mut ws, cmd, 5).is_err());
        assert_eq!(ws.collections, before);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_collection_move_updates_parent() {
        let mut ws = workspace();
        let effect = ws
            .apply(
                &DragCommand::MoveCollection {
                    collection: "b".into(),
                    target: CollectionDropTarget::Folder("f".into()),
                },
                5,
            )
            .unwrap();
        assert!(matches!(effect, Effect::Collection(CollectionMove::IntoFolder { .. })));
        assert_eq!(ws.collections["b"].parent_id.as_deref(), Some("f"));
        assert_eq!(ws.layout.root, vec!["a"]);
    }

    #[test]
    fn test_noop_not_queued() {
        let mut ws = workspace();
        let mut queue = CommandQueue::new();
        let cmd = DragCommand::MoveFolder {
            folder: "f".into(),
            target: FolderDropTarget::Collection("a".into()),
        };
        assert!(!queue.submit(&mut ws, cmd, 5).unwrap());
        assert!(queue.is_empty());
    }
}
