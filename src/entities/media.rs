//! Frame store interface consumed by the cache engine.
//!
//! The engine never decodes. It asks the media to cache/uncache a frame and
//! reads the per-frame byte size after the first successful decode. Media is
//! owned elsewhere (`Arc`); the engine only keeps a `Weak`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use log::trace;

/// Decoded-frame storage for one media (image sequence or movie).
///
/// Implementations must tolerate concurrent `cache_frame`/`uncache_frame`
/// calls for distinct frames.
pub trait FrameStore: Send + Sync {
    /// First media-native frame number.
    fn first_frame(&self) -> i32;

    /// Last media-native frame number (inclusive).
    fn last_frame(&self) -> i32;

    /// Number of frames in the media.
    fn duration(&self) -> i32 {
        (self.last_frame() - self.first_frame() + 1).max(0)
    }

    /// Frame lies inside the media's range.
    fn contains(&self, frame: i32) -> bool {
        frame >= self.first_frame() && frame <= self.last_frame()
    }

    /// Decoded pixels for `frame` are currently held.
    fn has_frame(&self, frame: i32) -> bool;

    /// Decode `frame` and keep its pixels.
    fn cache_frame(&self, frame: i32);

    /// Release the pixels of `frame`.
    fn uncache_frame(&self, frame: i32);

    /// Bytes used by one decoded frame, 0 if unknown.
    fn frame_size(&self) -> usize;

    fn name(&self) -> &str {
        "media"
    }
}

/// In-memory frame store producing solid buffers of a fixed size.
///
/// Stands in for a real decoder in tests and in the demo binary; an optional
/// delay emulates decode cost.
#[derive(Debug)]
pub struct SyntheticMedia {
    name: String,
    first: i32,
    last: i32,
    frame_bytes: usize,
    decode_delay: Duration,
    frames: Mutex<HashMap<i32, Vec<u8>>>,
    decodes: AtomicUsize,
}

impl SyntheticMedia {
    /// Media covering `first..=last`, each frame `width * height` RGBA8.
    pub fn new(
        name: impl Into<String>,
        first: i32,
        last: i32,
        width: usize,
        height: usize,
    ) -> Self {
        Self::with_frame_bytes(name, first, last, width * height * 4)
    }

    pub fn with_frame_bytes(
        name: impl Into<String>,
        first: i32,
        last: i32,
        frame_bytes: usize,
    ) -> Self {
        Self {
            name: name.into(),
            first,
            last: last.max(first),
            frame_bytes,
            decode_delay: Duration::ZERO,
            frames: Mutex::new(HashMap::new()),
            decodes: AtomicUsize::new(0),
        }
    }

    pub fn with_decode_delay(mut self, delay: Duration) -> Self {
        self.decode_delay = delay;
        self
    }

    /// Total `cache_frame` calls that produced pixels.
    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::Relaxed)
    }

    /// Frames currently holding pixels, sorted.
    pub fn decoded_frames(&self) -> Vec<i32> {
        let frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<i32> = frames.keys().copied().collect();
        list.sort_unstable();
        list
    }

    pub fn decoded_bytes(&self) -> usize {
        let frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());
        frames.values().map(|buf| buf.len()).sum()
    }
}

impl FrameStore for SyntheticMedia {
    fn first_frame(&self) -> i32 {
        self.first
    }

    fn last_frame(&self) -> i32 {
        self.last
    }

    fn has_frame(&self, frame: i32) -> bool {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&frame)
    }

    fn cache_frame(&self, frame: i32) {
        if !self.contains(frame) || self.has_frame(frame) {
            return;
        }
        if !self.decode_delay.is_zero() {
            std::thread::sleep(self.decode_delay);
        }
        // Decode outside the lock, distinct frames may decode concurrently
        let buf = vec![(frame & 0xff) as u8; self.frame_bytes];
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(frame, buf);
        self.decodes.fetch_add(1, Ordering::Relaxed);
        trace!("{}: decoded frame {}", self.name, frame);
    }

    fn uncache_frame(&self, frame: i32) {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&frame);
    }

    fn frame_size(&self) -> usize {
        self.frame_bytes
    }

    fn name(&self) -> &str {
        &self.name
    }
}
