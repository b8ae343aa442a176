//! One placement of a media clip on a track.
//!
//! # Coordinate Systems
//!
//! - `start`/`end` - inclusive range in TRACK frames
//! - `offset` - added to a track frame to get the MEDIA-native frame
//!
//! The same media can be placed several times; every placement gets its own
//! `instance_uuid` and its own range/offset.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use super::media::FrameStore;

pub struct TimelineItem {
    /// Unique ID for this placement.
    pub instance_uuid: Uuid,
    media: Arc<dyn FrameStore>,
    start: i32,
    end: i32,
    offset: i32,
}

impl TimelineItem {
    /// Place the whole media with its first frame at track frame `start`.
    pub fn new(media: Arc<dyn FrameStore>, start: i32) -> Self {
        let duration = media.duration().max(1);
        let offset = media.first_frame() - start;
        Self::with_range(media, start, start + duration - 1, offset)
    }

    /// Place a trimmed part of the media: track frames `start..=end`,
    /// media frame = track frame + `offset`.
    pub fn with_range(media: Arc<dyn FrameStore>, start: i32, end: i32, offset: i32) -> Self {
        Self {
            instance_uuid: Uuid::new_v4(),
            media,
            start,
            end: end.max(start),
            offset,
        }
    }

    pub fn media(&self) -> &Arc<dyn FrameStore> {
        &self.media
    }

    pub fn start(&self) -> i32 {
        self.start
    }

    pub fn end(&self) -> i32 {
        self.end
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    pub fn duration(&self) -> i32 {
        self.end - self.start + 1
    }

    /// Track frame is inside this placement and maps to a frame the media has.
    pub fn contains(&self, frame: i32) -> bool {
        frame >= self.start && frame <= self.end && self.media.contains(frame + self.offset)
    }

    /// Media-native frame for a track frame.
    pub fn media_frame(&self, frame: i32) -> Option<i32> {
        self.contains(frame).then_some(frame + self.offset)
    }

    /// Closest covered track frame within this placement, searching outward from `frame`.
    /// Ties prefer the earlier frame.
    pub fn nearest_contained(&self, frame: i32) -> Option<i32> {
        let frame = frame.clamp(self.start, self.end);
        for dist in 0..self.duration() {
            let before = frame - dist;
            if before >= self.start && self.contains(before) {
                return Some(before);
            }
            let after = frame + dist;
            if after <= self.end && self.contains(after) {
                return Some(after);
            }
            if before < self.start && after > self.end {
                break;
            }
        }
        None
    }
}

impl fmt::Debug for TimelineItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimelineItem")
            .field("instance_uuid", &self.instance_uuid)
            .field("media", &self.media.name())
            .field("start", &self.start)
            .field("end", &self.end)
            .field("offset", &self.offset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::SyntheticMedia;

    fn clip(first: i32, last: i32) -> Arc<dyn FrameStore> {
        Arc::new(SyntheticMedia::with_frame_bytes("clip", first, last, 16))
    }

    #[test]
    fn test_placement_maps_to_media_frames() {
        let item = TimelineItem::new(clip(1001, 1050), 10);
        assert_eq!(item.start(), 10);
        assert_eq!(item.end(), 59); // 10 + 50 - 1
        assert_eq!(item.media_frame(10), Some(1001));
        assert_eq!(item.media_frame(59), Some(1050));
        assert_eq!(item.media_frame(60), None);
        assert_eq!(item.media_frame(9), None);
    }

    #[test]
    fn test_trimmed_range_checks_media() {
        // Offset pushes the tail past the media's last frame
        let item = TimelineItem::with_range(clip(0, 9), 100, 110, -95);
        assert!(item.contains(100));
        assert!(item.contains(104));
        assert!(!item.contains(105));
        assert_eq!(item.nearest_contained(108), Some(104));
        assert_eq!(item.nearest_contained(50), Some(100));
    }

    #[test]
    fn test_instances_are_unique() {
        let media = clip(0, 9);
        let a = TimelineItem::new(Arc::clone(&media), 0);
        let b = TimelineItem::new(media, 0);
        assert_ne!(a.instance_uuid, b.instance_uuid);
    }
}
