//! Core engine modules - frame cache, memory budget, workers
//!
//! These modules form the playback cache, independent of UI and decoders.

pub mod budget;
mod decode_task;
pub mod engine;
pub mod frame_cache;
pub mod frame_set;
mod ticker;
pub mod workers;

// Re-exports for convenience
pub use budget::{MemoryBudget, MemorySnapshot};
pub use engine::{back_buffer_margin, CacheEvent, CacheState, Direction, FrameRange};
pub use frame_cache::FrameCache;
pub use frame_set::FrameSet;
pub use workers::Workers;
