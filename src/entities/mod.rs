//! Entities module - media and timeline types the cache engine works with
//!
//! - `FrameStore` - decoded-frame storage of one media, the engine's only view of it
//! - `TimelineItem` / `Track` - clip placements on a track
//! - `TrackItemIndex` - track frame -> owning placement lookup

pub mod media;
pub mod timeline_item;
pub mod track;
pub mod track_index;

pub use media::{FrameStore, SyntheticMedia};
pub use timeline_item::TimelineItem;
pub use track::{FrameResolution, MissingFramePolicy, Track};
pub use track_index::TrackItemIndex;
