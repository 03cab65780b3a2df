//! Tab drops, inside one collection and across collections.

use serde::{Deserialize, Serialize};
use tabox_core::{Collection, Group, Tab};
use tracing::{debug, warn};

use crate::DragError;

/// What a dragged tab was released over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "uid", rename_all = "snake_case")]
pub enum TabDropTarget {
    /// A group container: join the group as its last member
    Group(String),
    /// The ungrouped zone
    Ungrouped,
    /// Another tab
    Tab(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabMove {
    pub from: usize,
    pub to: usize,
    /// The tab's group link changed
    pub regrouped: bool,
    /// The tab's original group, if the move left it empty and it was deleted
    pub removed_group: Option<String>,
}

fn last_member(tabs: &[Tab], group_uid: &str) -> Option<usize> {
    tabs.iter().rposition(|t| t.group_uid.as_deref() == Some(group_uid))
}

/// Whether a grouped tab at `index` was dragged out of its group's region.
///
/// True when both neighbors are ungrouped tabs, or one is ungrouped and the
/// other is the list boundary, and the tab is not strictly between two other
/// members of its own group.
pub fn should_ungroup(tabs: &[Tab], index: usize) -> bool {
    let Some(group_uid) = tabs.get(index).and_then(|t| t.group_uid.as_deref()) else {
        return false;
    };
    let prev = index.checked_sub(1);
    let next = Some(index + 1).filter(|i| *i < tabs.len());
    if prev.is_none() && next.is_none() {
        return false;
    }
    let free = |i: Option<usize>| i.map_or(true, |i| !tabs[i].is_grouped());
    if !(free(prev) && free(next)) {
        return false;
    }

    let mut others = tabs
        .iter()
        .enumerate()
        .filter(|(i, t)| *i != index && t.group_uid.as_deref() == Some(group_uid))
        .map(|(i, _)| i);
    let first = others.next();
    let last = others.last().or(first);
    !matches!((first, last), (Some(first), Some(last)) if first < index && index < last)
}

/// Moves a tab inside its own collection.
///
/// Group drops append the tab to the group (at the pinned floor if the group
/// is empty). Ungrouped drops clear the group link in place. Tab drops
/// re-parent into the target's group when it differs, inserting after the
/// target; otherwise the tab is array-moved to the target's slot and may be
/// ungrouped by [`should_ungroup`]. A target that no longer exists sends the
/// tab to the end of the list. The insertion index never goes above the
/// first unpinned tab, and an emptied original group is deleted.
///
/// # Errors
///
/// Fails if the tab is missing or pinned.
pub fn move_tab_within(
    collection: &mut Collection,
    tab_uid: &str,
    target: &TabDropTarget,
    now: i64,
) -> Result<TabMove, DragError> {
    let from = collection
        .tab_position(tab_uid)
        .ok_or_else(|| DragError::not_found("tab", tab_uid))?;
    if collection.tabs[from].pinned {
        return Err(DragError::PinnedTab(tab_uid.to_string()));
    }
    if matches!(target, TabDropTarget::Tab(t) if t == tab_uid) {
        return Ok(TabMove {
            from,
            to: from,
            regrouped: false,
            removed_group: None,
        });
    }

    let original_group = collection.tabs[from].group_uid.clone();
    let mut tab = collection.tabs.remove(from);
    let floor = collection.pinned_floor();
    let end = collection.tabs.len();
    let mut plain_move = false;

    let (to, mut regrouped) = match target {
        TabDropTarget::Group(group_uid) => match collection.group(group_uid).map(Group::group_id) {
            Some(group_id) => {
                let to = last_member(&collection.tabs, group_uid).map_or(floor, |i| i + 1);
                let changed = tab.group_uid.as_deref() != Some(group_uid.as_str());
                tab.group_uid = Some(group_uid.clone());
                tab.group_id = group_id;
                (to, changed)
            }
            None => {
                warn!(group = %group_uid, tab = %tab_uid, "drop group vanished; moving tab to end");
                (end, false)
            }
        },
        TabDropTarget::Ungrouped => {
            let changed = tab.is_grouped();
            tab.ungroup();
            (from, changed)
        }
        TabDropTarget::Tab(target_uid) => match collection.tab_position(target_uid) {
            None => {
                warn!(target = %target_uid, tab = %tab_uid, "drop tab vanished; moving tab to end");
                (end, false)
            }
            Some(target_idx) => {
                let target_tab = &collection.tabs[target_idx];
                match target_tab.group_uid.clone() {
                    Some(group_uid) if original_group.as_deref() != Some(group_uid.as_str()) => {
                        let group_id = collection
                            .group(&group_uid)
                            .map(Group::group_id)
                            .unwrap_or_else(|| target_tab.group_id.clone());
                        tab.group_uid = Some(group_uid);
                        tab.group_id = group_id;
                        (target_idx + 1, true)
                    }
                    _ => {
                        plain_move = true;
                        // The target's index before the dragged tab was lifted.
                        let to = if target_idx >= from { target_idx + 1 } else { target_idx };
                        (to, false)
                    }
                }
            }
        },
    };

    let to = to.max(floor).min(collection.tabs.len());
    collection.tabs.insert(to, tab);

    if plain_move && should_ungroup(&collection.tabs, to) {
        debug!(tab = %tab_uid, "tab dragged out of its group region");
        collection.tabs[to].ungroup();
        regrouped = true;
    }

    let removed_group = original_group.filter(|g| collection.remove_group_if_empty(g));
    collection.touch(now);
    Ok(TabMove {
        from,
        to,
        regrouped,
        removed_group,
    })
}

/// Moves a tab to the end of a different collection.
///
/// The tab leaves its group (groups do not follow a single tab across
/// collections); the source group is deleted if emptied. Both collections are
/// touched. Returns the tab's index in `target`.
pub fn move_tab_across(
    source: &mut Collection,
    target: &mut Collection,
    tab_uid: &str,
    now: i64,
) -> Result<usize, DragError> {
    if source.uid == target.uid {
        return Err(DragError::InvalidTarget(format!(
            "tab {} is already in collection {}",
            tab_uid, target.uid
        )));
    }
    let from = source
        .tab_position(tab_uid)
        .ok_or_else(|| DragError::not_found("tab", tab_uid))?;
    if source.tabs[from].pinned {
        return Err(DragError::PinnedTab(tab_uid.to_string()));
    }

    let mut tab = source.tabs.remove(from);
    if let Some(group_uid) = tab.group_uid.clone() {
        if source.remove_group_if_empty(&group_uid) {
            debug!(group = %group_uid, collection = %source.uid, "removed emptied group");
        }
    }
    tab.ungroup();
    target.tabs.push(tab);

    source.touch(now);
    target.touch(now);
    Ok(target.tabs.len() - 1)
}
