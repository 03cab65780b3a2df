//! Choosing one drop target out of overlapping candidates.
//!
//! A pointer hovering between rows usually overlaps several droppables. The
//! caller measures them (higher `score` means a better overlap) and
//! [`resolve_drop_target`] applies the priority rules for the dragged kind.

use serde::{Deserialize, Serialize};

use crate::{DragContext, DragKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DropCandidate {
    Collection { uid: String },
    /// A folder's "drop into" zone
    FolderZone { uid: String },
    /// A folder row in the folder list
    Folder { uid: String },
    Group { uid: String, collection: String },
    GroupHeader { uid: String, collection: String },
    Tab {
        uid: String,
        group_uid: Option<String>,
        collection: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collision {
    pub candidate: DropCandidate,
    pub score: f64,
}

impl Collision {
    pub fn new(candidate: DropCandidate, score: f64) -> Self {
        Self { candidate, score }
    }
}

fn best(collisions: impl Iterator<Item = Collision>) -> Option<Collision> {
    collisions.fold(None, |best: Option<Collision>, c| match best {
        Some(b) if b.score >= c.score => Some(b),
        _ => Some(c),
    })
}

/// Picks the drop target for the current drag.
///
/// Collection drags prefer collection rows over folder zones, so aiming at
/// a neighbor never drops into a folder by accident. Folder drags only see
/// folder rows. Group drags never see tabs that belong to a group. Among the
/// remaining candidates the highest score wins, earlier ones on ties.
pub fn resolve_drop_target(context: &DragContext, collisions: Vec<Collision>) -> Option<DropCandidate> {
    let candidates = collisions.into_iter().filter(|c| match (&context.kind, &c.candidate) {
        (_, DropCandidate::Collection { uid }) | (_, DropCandidate::Folder { uid }) if *uid == context.uid => false,
        (DragKind::Folder, candidate) => matches!(candidate, DropCandidate::Folder { .. }),
        (DragKind::Collection, candidate) => {
            matches!(candidate, DropCandidate::Collection { .. } | DropCandidate::FolderZone { .. })
        }
        (DragKind::Group, DropCandidate::Tab { group_uid, .. }) => group_uid.is_none(),
        (DragKind::Group | DragKind::Tab, DropCandidate::Folder { .. } | DropCandidate::FolderZone { .. }) => false,
        _ => true,
    });

    let candidates: Vec<Collision> = candidates.collect();
    if context.kind == DragKind::Collection {
        let (collections, zones): (Vec<Collision>, Vec<Collision>) = candidates
            .into_iter()
            .partition(|c| matches!(c.candidate, DropCandidate::Collection { .. }));
        return best(collections.into_iter())
            .or_else(|| best(zones.into_iter()))
            .map(|c| c.candidate);
    }
    best(candidates.into_iter()).map(|c| c.candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(uid: &str) -> DropCandidate {
        DropCandidate::Collection { uid: uid.into() }
    }

    fn tab(uid: &str, group: Option<&str>) -> DropCandidate {
        DropCandidate::Tab {
            uid: uid.into(),
            group_uid: group.map(str::to_string),
            collection: "c".into(),
        }
    }

    #[test]
    fn test_collection_beats_folder_zone() {
        let ctx = DragContext::collection("a", None);
        let hits = vec![
            Collision::new(DropCandidate::FolderZone { uid: "f".into() }, 0.9),
            Collision::new(collection("b"), 0.2),
        ];
        assert_eq!(resolve_drop_target(&ctx, hits), Some(collection("b")));

        let hits = vec![Collision::new(DropCandidate::FolderZone { uid: "f".into() }, 0.4)];
        assert_eq!(
            resolve_drop_target(&ctx, hits),
            Some(DropCandidate::FolderZone { uid: "f".into() })
        );
    }

    #[test]
    fn test_collection_ignores_itself() {
        let ctx = DragContext::collection("a", None);
        let hits = vec![Collision::new(collection("a"), 1.0), Collision::new(collection("b"), 0.1)];
        assert_eq!(resolve_drop_target(&ctx, hits), Some(collection("b")));
    }

    #[test]
    fn test_folder_only_sees_folders() {
        let ctx = DragContext::folder("f1");
        let hits = vec![
            Collision::new(collection("a"), 1.0),
            Collision::new(DropCandidate::FolderZone { uid: "f2".into() }, 0.9),
        ];
        assert_eq!(resolve_drop_target(&ctx, hits), None);

        let hits = vec![
            Collision::new(DropCandidate::Folder { uid: "f2".into() }, 0.3),
            Collision::new(DropCandidate::Folder { uid: "f3".into() }, 0.6),
        ];
        assert_eq!(
            resolve_drop_target(&ctx, hits),
            Some(DropCandidate::Folder { uid: "f3".into() })
        );
    }

    #[test]
    fn test_group_skips_grouped_tabs() {
        let ctx = DragContext::group("g1", "c");
        let hits = vec![
            Collision::new(tab("t1", Some("g2")), 0.95),
            Collision::new(tab("t2", None), 0.5),
        ];
        assert_eq!(resolve_drop_target(&ctx, hits), Some(tab("t2", None)));

        let hits = vec![Collision::new(tab("t1", Some("g2")), 0.95)];
        assert_eq!(resolve_drop_target(&ctx, hits), None);
    }

    #[test]
    fn test_tab_takes_best_score() {
        let ctx = DragContext::tab("t0", "c");
        let hits = vec![
            Collision::new(tab("t1", Some("g2")), 0.4),
            Collision::new(tab("t2", None), 0.4),
            Collision::new(
                DropCandidate::Group {
                    uid: "g2".into(),
                    collection: "c".into(),
                },
                0.3,
            ),
        ];
        assert_eq!(resolve_drop_target(&ctx, hits), Some(tab("t1", Some("g2"))));
        assert_eq!(resolve_drop_target(&ctx, Vec::new()), None);
    }
}
