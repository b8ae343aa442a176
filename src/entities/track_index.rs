//! Timeline interval index: track frame -> owning placement.
//!
//! Items are keyed by start frame with a parallel sorted key list, so a lookup
//! is one hash lookup plus one binary search. Items on one track do not
//! overlap, which makes the largest start <= frame the only candidate.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

use super::timeline_item::TimelineItem;

#[derive(Debug, Default)]
pub struct TrackItemIndex {
    items: HashMap<i32, Arc<TimelineItem>>,
    /// Sorted start frames, same keys as `items`.
    starts: Vec<i32>,
}

impl TrackItemIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `item` under its start frame.
    ///
    /// A second item with the same start replaces the first (returned),
    /// the key list keeps one entry.
    pub fn add(&mut self, item: Arc<TimelineItem>) -> Option<Arc<TimelineItem>> {
        let key = item.start();
        match self.items.insert(key, item) {
            Some(previous) => {
                warn!(
                    "Track index: start {} already taken by {}, replaced",
                    key, previous.instance_uuid
                );
                Some(previous)
            }
            None => {
                let pos = self.starts.partition_point(|&s| s < key);
                self.starts.insert(pos, key);
                None
            }
        }
    }

    /// Remove `item` (matched by instance, not just start frame).
    pub fn remove(&mut self, item: &TimelineItem) -> bool {
        let key = item.start();
        match self.items.get(&key) {
            Some(stored) if stored.instance_uuid == item.instance_uuid => {}
            _ => return false,
        }
        self.items.remove(&key);
        if let Ok(pos) = self.starts.binary_search(&key) {
            self.starts.remove(pos);
        }
        debug!("Track index: removed {} at {}", item.instance_uuid, key);
        true
    }

    /// Item owning `frame`, `None` in gaps and outside every item.
    pub fn at(&self, frame: i32) -> Option<Arc<TimelineItem>> {
        if let Some(item) = self.items.get(&frame) {
            return item.contains(frame).then(|| Arc::clone(item));
        }
        let item = self.floor(frame)?;
        item.contains(frame).then(|| Arc::clone(item))
    }

    /// Item with the largest start <= `frame`.
    fn floor(&self, frame: i32) -> Option<&Arc<TimelineItem>> {
        let pos = self.starts.partition_point(|&s| s <= frame);
        if pos == 0 {
            return None;
        }
        self.items.get(&self.starts[pos - 1])
    }

    /// Item with the smallest start > `frame`.
    fn ceil(&self, frame: i32) -> Option<&Arc<TimelineItem>> {
        let pos = self.starts.partition_point(|&s| s <= frame);
        self.starts.get(pos).and_then(|key| self.items.get(key))
    }

    /// Closest covered track frame to `frame` (itself if covered). Ties prefer the earlier frame.
    pub fn nearest(&self, frame: i32) -> Option<i32> {
        let before = self.floor(frame).and_then(|item| item.nearest_contained(frame));
        let after = self.ceil(frame).and_then(|item| item.nearest_contained(item.start()));
        match (before, after) {
            (Some(b), Some(a)) => {
                if (frame - b).abs() <= (a - frame).abs() {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (b, a) => b.or(a),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    /// Items in start order.
    pub fn items(&self) -> impl Iterator<Item = &Arc<TimelineItem>> + '_ {
        self.starts.iter().filter_map(|key| self.items.get(key))
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.starts.clear();
    }
}
