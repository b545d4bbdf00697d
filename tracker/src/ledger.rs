//! Position ledger: last known top offset of each visible, unread item.
//!
//! An entry exists only between an item's "entered" and "exited" transitions
//! while tracking is active. Entries are removed on exit (either direction)
//! and whenever the item turns out to be read already.

use std::collections::HashMap;

use crate::types::ItemId;

#[derive(Debug, Default)]
pub struct PositionLedger {
    entries: HashMap<ItemId, f64>,
}

impl PositionLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the top offset for `id`, overwriting any previous value.
    pub fn record(&mut self, id: ItemId, top: f64) {
        self.entries.insert(id, top);
    }

    /// Removes and returns the last recorded offset for `id`.
    pub fn take(&mut self, id: &ItemId) -> Option<f64> {
        self.entries.remove(id)
    }

    pub fn remove(&mut self, id: &ItemId) {
        self.entries.remove(id);
    }

    #[must_use]
    pub fn get(&self, id: &ItemId) -> Option<f64> {
        self.entries.get(id).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
