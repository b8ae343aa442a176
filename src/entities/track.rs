//! Track: owning collection of timeline items.
//!
//! # Invariants
//!
//! - Items within a track MUST NOT overlap (checked by `can_place()`)
//! - The track holds the only strong reference to each item; the cache engine
//!   only ever sees the media weakly
//!
//! # Missing frames
//!
//! `resolve()` maps a track frame to a media frame. When nothing covers the
//! frame, [`MissingFramePolicy`] decides between a black frame, an error frame
//! or the nearest covered frame. The nearest lookup runs a bounded number of
//! hops and stops when it cannot move.

use std::sync::Arc;

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::media::FrameStore;
use super::timeline_item::TimelineItem;
use super::track_index::TrackItemIndex;

/// Hops for `MissingFramePolicy::Nearest` before giving up with a black frame.
const MAX_NEAREST_HOPS: usize = 4;

/// What to show for a track frame no item covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissingFramePolicy {
    #[default]
    Black,
    Error,
    Nearest,
}

/// Outcome of [`Track::resolve`].
#[derive(Debug, Clone)]
pub enum FrameResolution {
    /// `frame` is media-native for `item`'s media.
    Frame { item: Arc<TimelineItem>, frame: i32 },
    Black,
    Error,
}

#[derive(Debug)]
pub struct Track {
    pub name: String,
    index: TrackItemIndex,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: TrackItemIndex::new(),
        }
    }

    /// Check if `start..=end` is free
    pub fn can_place(&self, start: i32, end: i32) -> bool {
        !self.index.items().any(|item| start <= item.end() && end >= item.start())
    }

    /// Place media right after the last item (at 0 on an empty track).
    pub fn append(&mut self, media: Arc<dyn FrameStore>) -> Uuid {
        let start = self.range().map(|(_, end)| end + 1).unwrap_or(0);
        let item = Arc::new(TimelineItem::new(media, start));
        let id = item.instance_uuid;
        debug!("Track '{}': appended {:?}", self.name, item);
        self.index.add(item);
        id
    }

    /// Place media with its first frame at `start`. `None` if it would overlap an existing item.
    pub fn insert(&mut self, media: Arc<dyn FrameStore>, start: i32) -> Option<Uuid> {
        let item = TimelineItem::new(media, start);
        if !self.can_place(item.start(), item.end()) {
            debug!(
                "Track '{}': [{}..{}] overlaps, not inserted",
                self.name,
                item.start(),
                item.end()
            );
            return None;
        }
        let id = item.instance_uuid;
        self.index.add(Arc::new(item));
        Some(id)
    }

    /// Remove item by instance UUID
    pub fn remove(&mut self, instance_uuid: Uuid) -> Option<Arc<TimelineItem>> {
        let item = self.find(instance_uuid)?;
        self.index.remove(&item);
        Some(item)
    }

    pub fn find(&self, instance_uuid: Uuid) -> Option<Arc<TimelineItem>> {
        self.index
            .items()
            .find(|item| item.instance_uuid == instance_uuid)
            .cloned()
    }

    pub fn clear(&mut self) {
        self.index.clear();
    }

    pub fn item_at(&self, frame: i32) -> Option<Arc<TimelineItem>> {
        self.index.at(frame)
    }

    /// Media and media-native frame for a track frame.
    pub fn media_frame(&self, frame: i32) -> Option<(Arc<dyn FrameStore>, i32)> {
        let item = self.index.at(frame)?;
        let media_frame = item.media_frame(frame)?;
        Some((Arc::clone(item.media()), media_frame))
    }

    /// First start and last end over all items.
    pub fn range(&self) -> Option<(i32, i32)> {
        let start = self.index.items().next()?.start();
        let end = self.index.items().map(|item| item.end()).max()?;
        Some((start, end))
    }

    pub fn items(&self) -> impl Iterator<Item = &Arc<TimelineItem>> + '_ {
        self.index.items()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Resolve a track frame to displayable media, applying `policy` in gaps.
    pub fn resolve(&self, frame: i32, policy: MissingFramePolicy) -> FrameResolution {
        let mut target = frame;
        for _ in 0..MAX_NEAREST_HOPS {
            if let Some(item) = self.index.at(target) {
                if let Some(media_frame) = item.media_frame(target) {
                    return FrameResolution::Frame {
                        item,
                        frame: media_frame,
                    };
                }
            }
            match policy {
                MissingFramePolicy::Black => return FrameResolution::Black,
                MissingFramePolicy::Error => return FrameResolution::Error,
                MissingFramePolicy::Nearest => match self.index.nearest(target) {
                    Some(nearest) if nearest != target => {
                        trace!("Frame {} missing, trying nearest {}", target, nearest);
                        target = nearest;
                    }
                    _ => return FrameResolution::Black,
                },
            }
        }
        FrameResolution::Black
    }
}
