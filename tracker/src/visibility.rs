//! Visibility monitor for feed item nodes.
//!
//! Computes viewport intersection transitions for registered items from the
//! layout the renderer reports. Two rules match the browser observer the feed
//! view was built around:
//!
//! - The threshold is zero: an item counts as intersecting while any part of
//!   it overlaps the observed area, and the "exit" transition fires the moment
//!   it fully leaves.
//! - The observed area is the container's viewport inset at the top edge only
//!   (100px by default), so items exit slightly before reaching the literal
//!   top of the visible area and sticky headers never hide a transition.
//!
//! Every registration reports the node's initial state, like a native
//! observer's first callback. After that only changes are reported.
//! [`visible`](VisibilityMonitor::visible) re-reports the nodes currently in
//! view, which is what a native observer does when it is re-attached.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::types::{Container, ItemId, NodeRect, VisibilityEvent};

/// Default top inset of the observed viewport, in pixels.
pub const DEFAULT_TOP_MARGIN_PX: f64 = 100.0;

#[derive(Debug)]
pub struct VisibilityMonitor {
    top_margin: f64,
    container: Container,
    observed: HashMap<ItemId, ObservedNode>,
}

/// Last known geometry and reported state of an observed node.
#[derive(Debug, Clone, Copy)]
struct ObservedNode {
    rect: NodeRect,
    intersecting: bool,
}

impl VisibilityMonitor {
    #[must_use]
    pub fn new(top_margin: f64) -> Self {
        Self {
            top_margin,
            container: Container::default(),
            observed: HashMap::new(),
        }
    }

    /// Updates the container geometry used for intersection checks.
    ///
    /// Transitions caused by the new geometry are reported on the next
    /// [`reposition`](Self::reposition) of each item.
    pub fn set_container(&mut self, container: Container) {
        self.container = container;
    }

    /// Registers a node for observation.
    ///
    /// A missing node is a no-op: the item simply never gets tracked.
    /// Re-registering an observed item behaves like a reposition.
    pub fn observe(&mut self, id: ItemId, node: Option<NodeRect>) -> Option<VisibilityEvent> {
        let Some(rect) = node else {
            debug!(id = %id, "No node for item, skipping registration");
            return None;
        };

        if self.observed.contains_key(&id) {
            return self.reposition(&id, rect);
        }

        let intersecting = self.intersects(&rect);
        trace!(id = %id, intersecting, "Observing item");
        self.observed.insert(id.clone(), ObservedNode { rect, intersecting });

        Some(VisibilityEvent {
            id,
            is_intersecting: intersecting,
            bounding_top: rect.top,
        })
    }

    /// Reports a new position for an observed item.
    ///
    /// Returns an event only if the intersection state changed.
    pub fn reposition(&mut self, id: &ItemId, rect: NodeRect) -> Option<VisibilityEvent> {
        let intersecting = self.intersects(&rect);
        let node = self.observed.get_mut(id)?;
        node.rect = rect;

        if node.intersecting == intersecting {
            return None;
        }
        node.intersecting = intersecting;

        Some(VisibilityEvent {
            id: id.clone(),
            is_intersecting: intersecting,
            bounding_top: rect.top,
        })
    }

    /// Stops observing an item. Returns true if it was observed.
    pub fn unobserve(&mut self, id: &ItemId) -> bool {
        self.observed.remove(id).is_some()
    }

    /// Stops observing everything.
    pub fn disconnect(&mut self) {
        if !self.observed.is_empty() {
            debug!(observed = self.observed.len(), "Disconnecting visibility monitor");
        }
        self.observed.clear();
    }

    /// Entry events for every observed node currently in view, ordered top
    /// to bottom.
    #[must_use]
    pub fn visible(&self) -> Vec<VisibilityEvent> {
        let mut visible: Vec<VisibilityEvent> = self
            .observed
            .iter()
            .filter(|(_, node)| node.intersecting)
            .map(|(id, node)| VisibilityEvent::entered(id.clone(), node.rect.top))
            .collect();
        visible.sort_by(|a, b| a.bounding_top.total_cmp(&b.bounding_top));
        visible
    }

    #[must_use]
    pub fn is_observed(&self, id: &ItemId) -> bool {
        self.observed.contains_key(id)
    }

    #[must_use]
    pub fn observed_count(&self) -> usize {
        self.observed.len()
    }

    fn intersects(&self, rect: &NodeRect) -> bool {
        let area_top = self.container.viewport_top + self.top_margin;
        let area_bottom = self.container.viewport_bottom();
        rect.bottom() > area_top && rect.top < area_bottom
    }
}

impl Default for VisibilityMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_MARGIN_PX)
    }
}
