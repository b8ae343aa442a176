//! REELCACHE - playback frame cache for a media review player
//!
//! Re-exports all modules for use by the demo binary.

// Core engine (cache, budget, workers)
pub mod core;

// Media and timeline types
pub mod entities;

// App modules
pub mod cli;
pub mod config;

// Re-export commonly used types
pub use config::{CacheSettings, PathConfig};
pub use core::{CacheEvent, CacheState, Direction, FrameCache, FrameRange, MemorySnapshot};
pub use entities::{
    FrameResolution, FrameStore, MissingFramePolicy, SyntheticMedia, TimelineItem, Track,
    TrackItemIndex,
};
