//! Group drops.
//!
//! Inside a collection, groups are ordered as blocks among the ungrouped tabs:
//! the list `[pinned.., tab, GROUP, tab, GROUP ..]` is what a group drag
//! reorders.

use serde::{Deserialize, Serialize};
use tabox_core::{uid, Collection, Tab};
use tracing::{debug, warn};

use crate::{array_move, DragError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "uid", rename_all = "snake_case")]
pub enum GroupDropTarget {
    /// Another group's row
    Group(String),
    /// A group's header drop zone, i.e. "into" the group
    GroupHeader(String),
    /// A tab; grouped tabs stand for their group
    Tab(String),
    /// Released with no resolved target
    Nothing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Tab(String),
    Group(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMove {
    pub from: usize,
    pub to: usize,
    pub moved: bool,
}

/// The collection as a sequence of ungrouped tabs and group blocks.
fn sequence(collection: &Collection) -> Vec<Item> {
    let mut items = Vec::new();
    for tab in &collection.tabs {
        match tab.group_uid.as_deref() {
            Some(g) if collection.group(g).is_some() => {
                let item = Item::Group(g.to_string());
                if !items.contains(&item) {
                    items.push(item);
                }
            }
            _ => items.push(Item::Tab(tab.uid.clone())),
        }
    }
    for group in &collection.chrome_groups {
        let item = Item::Group(group.uid.clone());
        if !items.contains(&item) {
            items.push(item);
        }
    }
    items
}

/// Rewrites `tabs` and `chrome_groups` to follow `items`.
fn apply_sequence(collection: &mut Collection, items: &[Item]) {
    let mut remaining: Vec<Option<Tab>> = std::mem::take(&mut collection.tabs).into_iter().map(Some).collect();
    let mut take = |pred: &dyn Fn(&Tab) -> bool| -> Vec<Tab> {
        remaining
            .iter_mut()
            .filter(|slot| slot.as_ref().is_some_and(|t| pred(t)))
            .filter_map(Option::take)
            .collect()
    };

    let mut tabs = Vec::new();
    let mut group_order = Vec::new();
    for item in items {
        match item {
            Item::Tab(uid) => tabs.extend(take(&|t: &Tab| t.uid == *uid)),
            Item::Group(g) => {
                tabs.extend(take(&|t: &Tab| t.group_uid.as_deref() == Some(g.as_str())));
                group_order.push(g.clone());
            }
        }
    }
    tabs.extend(remaining.into_iter().flatten());
    collection.tabs = tabs;
    collection
        .chrome_groups
        .sort_by_key(|g| group_order.iter().position(|u| *u == g.uid).unwrap_or(usize::MAX));
}

fn pinned_items(collection: &Collection, items: &[Item]) -> usize {
    items
        .iter()
        .take_while(|item| match item {
            Item::Tab(uid) => collection.tabs.iter().any(|t| t.uid == *uid && t.pinned),
            Item::Group(_) => false,
        })
        .count()
}

/// Reorders a group inside its collection.
///
/// The group is array-moved to the target's slot, which lands it after the
/// target when moving down and at the target when moving up. A grouped tab
/// target stands for its group. With no resolvable target the group goes to
/// the end. Dropping onto its own row or one of its own tabs is a no-op.
///
/// # Errors
///
/// [`DragError::NestedGroup`] for a header drop; the collection is unchanged.
pub fn move_group_within(
    collection: &mut Collection,
    group_uid: &str,
    target: &GroupDropTarget,
    now: i64,
) -> Result<GroupMove, DragError> {
    if collection.group(group_uid).is_none() {
        return Err(DragError::not_found("group", group_uid));
    }
    let mut items = sequence(collection);
    let own = Item::Group(group_uid.to_string());
    let from = items
        .iter()
        .position(|i| *i == own)
        .ok_or_else(|| DragError::not_found("group", group_uid))?;
    let no_op = GroupMove {
        from,
        to: from,
        moved: false,
    };

    let target_item = match target {
        GroupDropTarget::GroupHeader(_) => return Err(DragError::NestedGroup),
        GroupDropTarget::Group(g) if g == group_uid => return Ok(no_op),
        GroupDropTarget::Group(g) => Some(Item::Group(g.clone())),
        GroupDropTarget::Tab(t) => match collection.tabs.iter().find(|tab| tab.uid == *t) {
            Some(tab) => match tab.group_uid.as_deref() {
                Some(g) if g == group_uid => return Ok(no_op),
                Some(g) if collection.group(g).is_some() => Some(Item::Group(g.to_string())),
                _ => Some(Item::Tab(t.clone())),
            },
            None => None,
        },
        GroupDropTarget::Nothing => None,
    };

    let to = match target_item.and_then(|item| items.iter().position(|i| *i == item)) {
        Some(index) => index,
        None => {
            if !matches!(target, GroupDropTarget::Nothing) {
                warn!(group = %group_uid, ?target, "group drop target vanished; snapping to end");
            }
            items.len()
        }
    };
    let to = to.max(pinned_items(collection, &items)).min(items.len() - 1);

    array_move(&mut items, from, to);
    apply_sequence(collection, &items);
    collection.touch(now);
    debug!(group = %group_uid, from, to, "group reordered");
    Ok(GroupMove { from, to, moved: from != to })
}

/// Moves a group and all its tabs to the end of a different collection.
///
/// Member tabs keep their `groupUid` and get the group's `groupId`. If the
/// target already has a group with the same uid, the moved group gets a
/// fresh one. Returns the number of tabs moved.
pub fn move_group_across(
    source: &mut Collection,
    target: &mut Collection,
    group_uid: &str,
    now: i64,
) -> Result<usize, DragError> {
    if source.uid == target.uid {
        return Err(DragError::InvalidTarget(format!(
            "group {} is already in collection {}",
            group_uid, target.uid
        )));
    }
    let index = source
        .chrome_groups
        .iter()
        .position(|g| g.uid == group_uid)
        .ok_or_else(|| DragError::not_found("group", group_uid))?;

    let mut group = source.chrome_groups.remove(index);
    let (mut members, kept): (Vec<Tab>, Vec<Tab>) = std::mem::take(&mut source.tabs)
        .into_iter()
        .partition(|t| t.group_uid.as_deref() == Some(group_uid));
    source.tabs = kept;

    if target.group(&group.uid).is_some() {
        group.uid = uid::new_uid();
    }
    let group_id = group.group_id();
    for tab in &mut members {
        tab.group_uid = Some(group.uid.clone());
        tab.group_id = group_id.clone();
        tab.pinned = false;
    }

    let moved = members.len();
    target.chrome_groups.push(group);
    target.tabs.extend(members);
    source.touch(now);
    target.touch(now);
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabox_core::{Group, GroupId};

    fn tab(uid: &str, group: Option<&str>) -> Tab {
        let mut t = Tab::new(uid, format!("https://{}.dev", uid), uid);
        t.group_uid = group.map(str::to_string);
        t
    }

    fn sample() -> Collection {
        let mut c = Collection::new("c", "C");
        let mut p = tab("p", None);
        p.pinned = true;
        c.tabs = vec![
            p,
            tab("a1", Some("A")),
            tab("a2", Some("A")),
            tab("x", None),
            tab("b1", Some("B")),
            tab("y", None),
        ];
        c.chrome_groups = vec![Group::new("A", "A", "red"), Group::new("B", "B", "blue")];
        c
    }

    fn order(c: &Collection) -> Vec<&str> {
        c.tabs.iter().map(|t| t.uid.as_str()).collect()
    }

    #[test]
    fn test_move_down_lands_after_target() {
        let mut c = sample();
        let mv = move_group_within(&mut c, "A", &GroupDropTarget::Group("B".into()), 1).unwrap();
        assert!(mv.moved);
        assert_eq!(order(&c), vec!["p", "x", "b1", "a1", "a2", "y"]);
        assert_eq!(c.chrome_groups[0].uid, "B");
    }

    #[test]
    fn test_move_up_lands_at_target() {
        let mut c = sample();
        move_group_within(&mut c, "B", &GroupDropTarget::Tab("x".into()), 1).unwrap();
        assert_eq!(order(&c), vec!["p", "a1", "a2", "b1", "x", "y"]);
    }

    #[test]
    fn test_grouped_tab_target_stands_for_group() {
        let mut c = sample();
        move_group_within(&mut c, "B", &GroupDropTarget::Tab("a2".into()), 1).unwrap();
        assert_eq!(order(&c), vec!["p", "b1", "a1", "a2", "x", "y"]);
        assert_eq!(c.chrome_groups[0].uid, "B");
    }

    #[test]
    fn test_header_drop_rejected() {
        let mut c = sample();
        let before = c.clone();
        assert_eq!(
            move_group_within(&mut c, "A", &GroupDropTarget::GroupHeader("B".into()), 1),
            Err(DragError::NestedGroup)
        );
        assert_eq!(c, before);
    }

    #[test]
    fn test_no_target_snaps_to_end() {
        let mut c = sample();
        move_group_within(&mut c, "A", &GroupDropTarget::Nothing, 1).unwrap();
        assert_eq!(order(&c), vec!["p", "x", "b1", "y", "a1", "a2"]);

        move_group_within(&mut c, "B", &GroupDropTarget::Group("gone".into()), 1).unwrap();
        assert_eq!(order(&c), vec!["p", "x", "y", "a1", "a2", "b1"]);
    }

    #[test]
    fn test_never_above_pinned() {
        let mut c = sample();
        move_group_within(&mut c, "B", &GroupDropTarget::Tab("p".into()), 1).unwrap();
        assert_eq!(order(&c), vec!["p", "b1", "a1", "a2", "x", "y"]);
    }

    #[test]
    fn test_own_row_is_noop() {
        let mut c = sample();
        let mv = move_group_within(&mut c, "A", &GroupDropTarget::Tab("a1".into()), 1).unwrap();
        assert!(!mv.moved);
        assert_eq!(order(&c), order(&sample()));
    }

    #[test]
    fn test_cross_collection_group_move() {
        let mut source = sample();
        let mut target = Collection::new("t", "T");
        target.tabs = vec![tab("z", None)];

        let moved = move_group_across(&mut source, &mut target, "A", 3).unwrap();
        assert_eq!(moved, 2);
        assert!(source.group("A").is_none());
        assert_eq!(order(&source), vec!["p", "x", "b1", "y"]);
        assert_eq!(order(&target), vec!["z", "a1", "a2"]);
        assert!(target.tabs[1..]
            .iter()
            .all(|t| t.group_uid.as_deref() == Some("A") && t.group_id == GroupId::Uid("A".into())));
        assert_eq!(target.last_updated, 3);
    }

    #[test]
    fn test_cross_collection_group_uid_collision() {
        let mut source = sample();
        let mut target = Collection::new("t", "T");
        target.chrome_groups.push(Group::new("B", "Existing", "green"));
        target.tabs.push(tab("z", Some("B")));

        move_group_across(&mut source, &mut target, "B", 3).unwrap();
        assert_eq!(target.chrome_groups.len(), 2);
        let fresh = &target.chrome_groups[1].uid;
        assert_ne!(fresh, "B");
        assert_eq!(target.tabs[1].group_uid.as_ref(), Some(fresh));
    }
}
