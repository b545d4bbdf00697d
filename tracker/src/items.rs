//! The feed's item list as seen by the engine.
//!
//! The list renderer owns pagination and filtering; the engine keeps its own
//! copy so it can check read state and apply confirmed commits. Insertion
//! order is preserved.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::{Item, ItemId};

#[derive(Debug, Default)]
pub struct FeedItems {
    items: Vec<Item>,
    index: HashMap<ItemId, usize>,
}

impl FeedItems {
    #[must_use]
    pub fn new(items: Vec<Item>) -> Self {
        let mut feed = Self::default();
        feed.append(items);
        feed
    }

    /// Appends items, e.g. the next page of an infinite scroll.
    ///
    /// An id that is already present replaces the existing entry in place.
    /// Returns the ids that were not present before.
    pub fn append(&mut self, items: Vec<Item>) -> Vec<ItemId> {
        let mut added = Vec::new();
        for item in items {
            match self.index.get(&item.id) {
                Some(&pos) => self.items[pos] = item,
                None => {
                    self.index.insert(item.id.clone(), self.items.len());
                    added.push(item.id.clone());
                    self.items.push(item);
                }
            }
        }
        added
    }

    #[must_use]
    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.index.get(id).map(|&pos| &self.items[pos])
    }

    /// Applies a confirmed commit to `id`. Returns false if the id is unknown.
    pub fn mark_viewed(&mut self, id: &ItemId, at: DateTime<Utc>) -> bool {
        match self.index.get(id) {
            Some(&pos) => {
                self.items[pos].mark_viewed(at);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Item] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|item| !item.is_read()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_reports_only_new_ids() {
        let mut feed = FeedItems::new(vec![Item::unread("a")]);
        let added = feed.append(vec![Item::unread("a"), Item::unread("b")]);
        assert_eq!(added, vec![ItemId::new("b")]);
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.as_slice()[1].id.as_str(), "b");
    }

    #[test]
    fn duplicate_append_replaces_in_place() {
        let mut feed = FeedItems::new(vec![Item::unread("a"), Item::unread("b")]);
        let mut read = Item::unread("a");
        read.view_count = 3;
        feed.append(vec![read]);
        assert_eq!(feed.as_slice()[0].view_count, 3);
        assert_eq!(feed.unread_count(), 1);
    }

    #[test]
    fn mark_viewed_unknown_id() {
        let mut feed = FeedItems::new(vec![Item::unread("a")]);
        assert!(!feed.mark_viewed(&ItemId::new("zzz"), Utc::now()));
        assert!(feed.mark_viewed(&ItemId::new("a"), Utc::now()));
        assert!(feed.get(&ItemId::new("a")).is_some_and(Item::is_read));
    }
}
