//! Drags that leave their own collection.
//!
//! A tab or group dragged out of its list is published as an
//! [`ExternalDrag`] on a watch channel. Every collection drop zone can
//! subscribe to highlight itself while hovered. Hit-testing is done
//! against the zones' registered rectangles.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::{DragContext, DragKind, SourceContainer};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Edges are inclusive.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
    }
}

/// A collection that accepts tabs and groups from elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropZone {
    pub collection_uid: String,
    pub rect: Rect,
}

/// The drag currently in flight, as observers see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalDrag {
    pub payload: DragContext,
    /// Collection zone under the pointer, never the source collection
    pub hovered: Option<String>,
}

/// A completed drag onto a different collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossDrop {
    pub payload: DragContext,
    pub target_collection: String,
}

#[derive(Debug)]
pub struct DragCoordinator {
    zones: IndexMap<String, Rect>,
    tx: watch::Sender<Option<ExternalDrag>>,
}

impl Default for DragCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl DragCoordinator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            zones: IndexMap::new(),
            tx,
        }
    }

    pub fn register_zone(&mut self, zone: DropZone) {
        self.zones.insert(zone.collection_uid, zone.rect);
    }

    pub fn unregister_zone(&mut self, collection_uid: &str) {
        self.zones.shift_remove(collection_uid);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ExternalDrag>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Option<ExternalDrag> {
        self.tx.borrow().clone()
    }

    /// First registered zone containing `point`.
    pub fn zone_at(&self, point: Point) -> Option<&str> {
        self.zones
            .iter()
            .find(|(_, rect)| rect.contains(point))
            .map(|(uid, _)| uid.as_str())
    }

    /// Starts publishing a drag. Only tabs and groups travel between
    /// collections; anything else is refused and nothing is published.
    pub fn begin(&self, payload: DragContext) -> bool {
        if !matches!(payload.kind, DragKind::Tab | DragKind::Group) {
            return false;
        }
        debug!(kind = ?payload.kind, uid = %payload.uid, "external drag started");
        self.tx.send_replace(Some(ExternalDrag { payload, hovered: None }));
        true
    }

    fn target_for(&self, drag: &ExternalDrag, point: Point) -> Option<String> {
        let uid = self.zone_at(point)?;
        match &drag.payload.source {
            SourceContainer::Collection(source) if source == uid => None,
            _ => Some(uid.to_string()),
        }
    }

    /// Updates the hovered zone. Observers are only woken when it changes.
    pub fn pointer_moved(&self, point: Point) {
        self.tx.send_if_modified(|state| {
            let Some(drag) = state.as_mut() else {
                return false;
            };
            let hovered = self.target_for(drag, point);
            if hovered == drag.hovered {
                return false;
            }
            drag.hovered = hovered;
            true
        });
    }

    /// Finishes the drag. Returns the cross-collection drop, if the pointer
    /// was released over a collection other than the source.
    pub fn end(&self, point: Point) -> Option<CrossDrop> {
        let drag = self.tx.send_replace(None)?;
        let target_collection = self.target_for(&drag, point)?;
        debug!(uid = %drag.payload.uid, target = %target_collection, "external drop");
        Some(CrossDrop {
            payload: drag.payload,
            target_collection,
        })
    }

    pub fn cancel(&self) {
        if self.tx.send_replace(None).is_some() {
            debug!("external drag cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> DragCoordinator {
        let mut c = DragCoordinator::new();
        c.register_zone(DropZone {
            collection_uid: "a".into(),
            rect: Rect::new(0.0, 0.0, 100.0, 50.0),
        });
        c.register_zone(DropZone {
            collection_uid: "b".into(),
            rect: Rect::new(0.0, 60.0, 100.0, 50.0),
        });
        c
    }

    #[test]
    fn test_hit_testing() {
        let c = coordinator();
        assert_eq!(c.zone_at(Point::new(10.0, 10.0)), Some("a"));
        assert_eq!(c.zone_at(Point::new(100.0, 110.0)), Some("b"));
        assert_eq!(c.zone_at(Point::new(10.0, 55.0)), None);
    }

    #[test]
    fn test_drop_on_other_collection() {
        let c = coordinator();
        assert!(c.begin(DragContext::tab("t1", "a")));
        let drop = c.end(Point::new(5.0, 70.0)).unwrap();
        assert_eq!(drop.target_collection, "b");
        assert_eq!(drop.payload.uid, "t1");
        assert!(c.current().is_none());
    }

    #[test]
    fn test_drop_on_source_or_nowhere() {
        let c = coordinator();
        c.begin(DragContext::group("g1", "a"));
        assert_eq!(c.end(Point::new(5.0, 5.0)), None);
        c.begin(DragContext::group("g1", "a"));
        assert_eq!(c.end(Point::new(500.0, 500.0)), None);
        assert_eq!(c.end(Point::new(5.0, 70.0)), None);
    }

    #[test]
    fn test_only_tabs_and_groups() {
        let c = coordinator();
        assert!(!c.begin(DragContext::collection("x", None)));
        assert!(!c.begin(DragContext::folder("f")));
        assert!(c.current().is_none());
    }

    #[tokio::test]
    async fn test_observers_see_hover_changes() {
        let mut c = coordinator();
        let mut rx = c.subscribe();
        c.begin(DragContext::tab("t1", "a"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().hovered, None);

        c.pointer_moved(Point::new(5.0, 5.0));
        assert!(!rx.has_changed().unwrap());

        c.pointer_moved(Point::new(5.0, 70.0));
        rx.changed().await.unwrap();
        assert_eq!(
            rx.borrow_and_update().as_ref().unwrap().hovered.as_deref(),
            Some("b")
        );

        c.unregister_zone("b");
        c.cancel();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
        assert_eq!(c.zone_at(Point::new(5.0, 70.0)), None);
    }
}
