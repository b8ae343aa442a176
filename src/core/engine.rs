//! Admission, eviction and prefetch control for the frame cache.
//!
//! All mutable state lives in [`CacheInner`] behind one mutex: the resident
//! [`FrameSet`], the [`MemoryBudget`], the "last produced" cursor and the
//! playback head. Decode tasks take the lock only to claim a frame and to
//! publish the result; the decode itself runs unlocked.
//!
//! # Window model
//!
//! Frames are admitted on the side matching [`Direction`] (back when playing
//! forward, front when playing backward) and evicted from the opposite side.
//! During playback the window slides: once the trailing frame falls more than
//! the back-buffer margin behind the playhead, new frames are admitted ahead
//! and the trailing ones are evicted.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};

use crossbeam_channel::Sender;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use super::budget::MemoryBudget;
use super::decode_task;
use super::frame_set::FrameSet;
use super::workers::Workers;
use crate::entities::FrameStore;

/// Playback/prefetch direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Not playing. Admission and eviction behave as forward.
    None,
    #[default]
    Forward,
    Backward,
}

impl Direction {
    pub fn is_backward(self) -> bool {
        self == Direction::Backward
    }
}

/// Engine mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheState {
    #[default]
    Enabled,
    /// Re-enabled by the next `set_media`.
    Paused,
    /// Stays off until `resume_caching`.
    Disabled,
}

/// Notifications for the player (timeline markers, status bar).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    FrameCached(i32),
    FrameEvicted(i32),
    /// Resident set dropped in bulk (pause, disable, stop, clear, media change).
    Cleared,
}

/// Inclusive media frame range with wrap-around stepping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRange {
    pub start: i32,
    pub end: i32,
}

impl FrameRange {
    pub fn new(start: i32, end: i32) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn duration(&self) -> i32 {
        self.end - self.start + 1
    }

    pub fn contains(&self, frame: i32) -> bool {
        frame >= self.start && frame <= self.end
    }

    /// Next frame, wrapping from `end` to `start`.
    pub fn next(&self, frame: i32) -> i32 {
        if frame >= self.end || frame < self.start {
            self.start
        } else {
            frame + 1
        }
    }

    /// Previous frame, wrapping from `start` to `end`.
    pub fn prev(&self, frame: i32) -> i32 {
        if frame <= self.start || frame > self.end {
            self.end
        } else {
            frame - 1
        }
    }

    fn step(&self, frame: i32, forward: bool) -> i32 {
        if forward { self.next(frame) } else { self.prev(frame) }
    }
}

/// `max(min_frames, duration * ratio)`
pub fn back_buffer_margin(duration: i32, min_frames: i32, ratio: f64) -> i32 {
    ((duration as f64 * ratio) as i32).max(min_frames)
}

struct MediaBinding {
    media: Weak<dyn FrameStore>,
    range: FrameRange,
}

pub(crate) struct CacheInner {
    binding: Option<MediaBinding>,
    pub(crate) frames: FrameSet,
    pub(crate) budget: MemoryBudget,
    pub(crate) direction: Direction,
    pub(crate) state: CacheState,
    /// "Last produced" cursor shared by decode tasks.
    pub(crate) last_frame: i32,
    pub(crate) playhead: i32,
    pub(crate) back_buffer: i32,
    pub(crate) back_buffer_min: i32,
    pub(crate) back_buffer_ratio: f64,
    /// Playback-direction prefetch (the tick) is allowed to run.
    pub(crate) playback: bool,
    /// Claimed by a task or a synchronous seek, decode not finished.
    in_flight: HashSet<i32>,
    events: Sender<CacheEvent>,
}

impl CacheInner {
    pub(crate) fn new(max_bytes: usize, direction: Direction, events: Sender<CacheEvent>) -> Self {
        Self {
            binding: None,
            frames: FrameSet::new(),
            budget: MemoryBudget::new(max_bytes),
            direction,
            state: CacheState::Enabled,
            last_frame: 0,
            playhead: 0,
            back_buffer: 3,
            back_buffer_min: 3,
            back_buffer_ratio: 0.02,
            playback: false,
            in_flight: HashSet::new(),
            events,
        }
    }

    /// Resolve the bound media; `None` if unbound or already dropped.
    pub(crate) fn resolve(&self) -> Option<Arc<dyn FrameStore>> {
        self.binding.as_ref().and_then(|b| b.media.upgrade())
    }

    pub(crate) fn range(&self) -> Option<FrameRange> {
        self.binding.as_ref().map(|b| b.range)
    }

    fn is_bound_to(&self, media: &Arc<dyn FrameStore>) -> bool {
        self.binding
            .as_ref()
            .map(|b| Weak::ptr_eq(&b.media, &Arc::downgrade(media)))
            .unwrap_or(false)
    }

    pub(crate) fn notify(&self, event: CacheEvent) {
        // Player may have gone away; nothing to report to
        let _ = self.events.send(event);
    }

    pub(crate) fn bind(&mut self, media: &Arc<dyn FrameStore>) {
        let range = FrameRange::new(media.first_frame(), media.last_frame());
        self.back_buffer =
            back_buffer_margin(range.duration(), self.back_buffer_min, self.back_buffer_ratio);
        self.binding = Some(MediaBinding {
            media: Arc::downgrade(media),
            range,
        });
        self.last_frame = range.start;
        self.playhead = range.start;
        debug!(
            "Bound media '{}' [{}..{}] ({} frames, back buffer {})",
            media.name(),
            range.start,
            range.end,
            range.duration(),
            self.back_buffer
        );
    }

    pub(crate) fn is_full(&self) -> bool {
        self.range()
            .map(|r| self.frames.len() as i32 >= r.duration())
            .unwrap_or(false)
    }

    /// Admission control.
    ///
    /// Refused once the whole media is resident. Otherwise an already-resident
    /// frame counts as granted without touching the budget.
    pub(crate) fn request(&mut self, frame: i32, evict: bool) -> bool {
        let Some(range) = self.range() else {
            return false;
        };
        if !range.contains(frame) {
            return false;
        }

        // Bootstrap: size unknown until a decode reports it, hold one frame at a time
        if self.budget.frame_size().is_none() {
            if self.frames.contains(frame) {
                return true;
            }
            if !self.frames.is_empty() {
                if !evict {
                    return false;
                }
                while self.evict_trailing().is_some() {}
            }
            trace!("Bootstrap admit: {}", frame);
            self.admit(frame);
            return true;
        }

        if self.frames.len() as i32 >= range.duration() {
            if self.playback {
                debug!("All {} frames resident, playback prefetch off", range.duration());
            }
            self.playback = false;
            return false;
        }

        if self.frames.contains(frame) {
            return true;
        }

        if !self.budget.fits_one_more() {
            if !evict {
                return false;
            }
            while !self.budget.fits_one_more() {
                if self.evict_trailing().is_none() {
                    break;
                }
            }
        }

        self.admit(frame);
        true
    }

    fn admit(&mut self, frame: i32) {
        let added = if self.direction.is_backward() {
            self.frames.push_front(frame)
        } else {
            self.frames.push_back(frame)
        };
        if added {
            self.budget.add_frame();
            trace!("Admitted {} ({} resident)", frame, self.frames.len());
        }
    }

    /// Evict from the side opposite the current direction.
    pub(crate) fn evict_trailing(&mut self) -> Option<i32> {
        if self.direction.is_backward() {
            self.evict_back()
        } else {
            self.evict_front()
        }
    }

    pub(crate) fn evict_front(&mut self) -> Option<i32> {
        let frame = self.frames.pop_front()?;
        self.release(frame);
        Some(frame)
    }

    pub(crate) fn evict_back(&mut self) -> Option<i32> {
        let frame = self.frames.pop_back()?;
        self.release(frame);
        Some(frame)
    }

    pub(crate) fn evict(&mut self, frame: i32) -> bool {
        if !self.frames.remove(frame) {
            return false;
        }
        self.release(frame);
        true
    }

    fn release(&mut self, frame: i32) {
        self.budget.free_frame();
        if let Some(media) = self.resolve() {
            media.uncache_frame(frame);
        }
        trace!("Evicted {}", frame);
        self.notify(CacheEvent::FrameEvicted(frame));
    }

    /// Drop every resident frame. Returns how many were dropped.
    pub(crate) fn clear_resident(&mut self) -> usize {
        let dropped = self.frames.drain();
        self.budget.reset(false);
        if dropped.is_empty() {
            return 0;
        }
        if let Some(media) = self.resolve() {
            for &frame in &dropped {
                media.uncache_frame(frame);
            }
        }
        debug!("Cleared {} resident frames", dropped.len());
        self.notify(CacheEvent::Cleared);
        dropped.len()
    }

    /// Unbind media after dropping its frames; the next media starts in bootstrap mode.
    pub(crate) fn unbind(&mut self) {
        self.clear_resident();
        self.budget.reset(true);
        self.in_flight.clear();
        self.binding = None;
    }

    /// Advance the shared cursor to the next admitted frame nobody has produced or claimed.
    fn claim(&mut self, media: &Arc<dyn FrameStore>, forward: bool) -> Option<i32> {
        let range = self.range()?;
        let mut cursor = self.last_frame;
        for _ in 0..range.duration() {
            cursor = range.step(cursor, forward);
            if self.frames.contains(cursor)
                && !self.in_flight.contains(&cursor)
                && !media.has_frame(cursor)
            {
                self.last_frame = cursor;
                self.in_flight.insert(cursor);
                return Some(cursor);
            }
        }
        None
    }

    /// Back-buffer margin used by the window step, kept below half the frame capacity
    /// so a small budget still holds frames ahead of the playhead.
    pub(crate) fn effective_margin(&self) -> i32 {
        match self.budget.snapshot().frame_capacity() {
            Some(capacity) => self.back_buffer.min((capacity / 2) as i32),
            None => self.back_buffer,
        }
    }

    /// `(trailing, leading, playhead, duration)` with backward playback mirrored onto forward.
    fn window_in_play_order(&self, forward: bool) -> Option<(i32, i32, i32, i32)> {
        let range = self.range()?;
        let (front, back) = (self.frames.front()?, self.frames.back()?);
        let dur = range.duration();
        Some(if forward {
            (front, back, self.playhead, dur)
        } else {
            (-back, -front, -self.playhead, dur)
        })
    }

    /// Trailing frame has fallen further than the back-buffer margin behind the playhead.
    fn trailing_is_stale(&self, forward: bool) -> bool {
        let Some((trailing, leading, head, dur)) = self.window_in_play_order(forward) else {
            return false;
        };
        let span = (leading - trailing).rem_euclid(dur);
        let behind = (head - trailing).rem_euclid(dur);
        if behind <= span {
            return behind > self.effective_margin();
        }

        // Playhead outside the window: keep a window that lies ahead of it
        let gap_ahead = (trailing - head).rem_euclid(dur);
        let gap_behind = (head - leading).rem_euclid(dur);
        gap_behind < gap_ahead
    }

    /// Cursor for a playhead that ran past the leading end: the frame just before
    /// its back buffer. `None` while the playhead is inside or behind the window.
    fn jump_cursor(&self, forward: bool) -> Option<i32> {
        let range = self.range()?;
        let (trailing, leading, head, dur) = self.window_in_play_order(forward)?;
        let span = (leading - trailing).rem_euclid(dur);
        if (head - trailing).rem_euclid(dur) <= span {
            return None;
        }
        let gap_ahead = (trailing - head).rem_euclid(dur);
        let gap_behind = (head - leading).rem_euclid(dur);
        let margin = self.effective_margin();
        if gap_behind >= gap_ahead || gap_behind <= margin + 1 {
            return None;
        }
        let mut cursor = self.playhead;
        for _ in 0..=margin {
            cursor = range.step(cursor, !forward);
        }
        Some(cursor)
    }
}

pub(crate) struct CacheCore {
    inner: Mutex<CacheInner>,
    /// Signalled whenever a frame leaves `in_flight`.
    decoded: Condvar,
}

impl CacheCore {
    pub(crate) fn new(inner: CacheInner) -> Self {
        Self {
            inner: Mutex::new(inner),
            decoded: Condvar::new(),
        }
    }

    fn finish_decode(&self, inner: &mut CacheInner, frame: i32) {
        inner.in_flight.remove(&frame);
        self.decoded.notify_all();
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn playback_active(&self) -> bool {
        let inner = self.lock();
        inner.playback && inner.state == CacheState::Enabled
    }

    /// Produce an admitted frame and report it. Frames evicted mid-decode are released again.
    pub(crate) fn cache(&self, frame: i32) {
        let media = {
            let mut inner = self.lock();
            match inner.resolve() {
                Some(media) if media.contains(frame) => media,
                _ => {
                    self.finish_decode(&mut inner, frame);
                    return;
                }
            }
        };

        media.cache_frame(frame);

        let mut inner = self.lock();
        self.finish_decode(&mut inner, frame);
        if !inner.is_bound_to(&media) || !inner.frames.contains(frame) {
            trace!("Frame {} no longer admitted, releasing", frame);
            media.uncache_frame(frame);
            return;
        }
        let resident = inner.frames.len();
        inner.budget.learn_frame_size(media.frame_size(), resident);
        inner.notify(CacheEvent::FrameCached(frame));
    }

    /// Decode task body: claim under the lock, decode outside it.
    pub(crate) fn cache_next_frame(&self, forward: bool) {
        let claimed = {
            let mut inner = self.lock();
            let Some(media) = inner.resolve() else {
                return;
            };
            inner.claim(&media, forward)
        };
        if let Some(frame) = claimed {
            trace!("Task claimed {}", frame);
            self.cache(frame);
        }
    }

    /// Step the cursor by one frame with wrap-around, without producing anything.
    pub(crate) fn step_cursor(&self, forward: bool) -> Option<i32> {
        let mut inner = self.lock();
        let range = inner.range()?;
        inner.last_frame = range.step(inner.last_frame, forward);
        Some(inner.last_frame)
    }

    /// Synchronous seek path: admit (evicting if needed) and decode on the caller's thread.
    ///
    /// If a decode task is already producing the frame, waits for it instead of decoding twice.
    pub(crate) fn ensure_cached(&self, frame: i32) {
        let mut inner = self.lock();
        let Some(media) = inner.resolve() else {
            return;
        };
        if !media.contains(frame) {
            return;
        }
        inner.last_frame = frame;
        loop {
            if !inner.frames.contains(frame) && !inner.request(frame, true) {
                return;
            }
            if !inner.in_flight.contains(&frame) {
                if media.has_frame(frame) {
                    return;
                }
                break;
            }
            trace!("Seek waits for in-flight decode of {}", frame);
            inner = self.decoded.wait(inner).unwrap_or_else(|e| e.into_inner());
            if !inner.is_bound_to(&media) {
                return;
            }
        }
        inner.in_flight.insert(frame);
        drop(inner);

        debug!("Seek decode: {}", frame);
        self.cache(frame);
    }

    /// Force-produce the first frame of freshly bound media to learn the frame size.
    pub(crate) fn bootstrap(&self) {
        let first = {
            let mut inner = self.lock();
            let Some(range) = inner.range() else {
                return;
            };
            if !inner.request(range.start, true) {
                return;
            }
            inner.in_flight.insert(range.start);
            range.start
        };
        self.cache(first);

        let inner = self.lock();
        if inner.budget.frame_size().is_none() && inner.resolve().is_some() {
            warn!("Frame size still unknown after first decode, prefetch disabled for this media");
        }
    }

    /// Bulk fill once per media change: walk the whole range in direction order.
    pub(crate) fn cache_available(self: &Arc<Self>, workers: &Workers) -> usize {
        let (accepted, forward) = {
            let mut inner = self.lock();
            if inner.state != CacheState::Enabled {
                return 0;
            }
            let Some(range) = inner.range() else {
                return 0;
            };
            if inner.resolve().is_none() || inner.budget.frame_size().is_none() {
                return 0;
            }

            let forward = !inner.direction.is_backward();
            // Tasks step from here, so the first claim lands on the walk's first frame
            inner.last_frame =
                if forward { range.prev(range.start) } else { range.next(range.end) };

            let walk: Box<dyn Iterator<Item = i32>> = if forward {
                Box::new(range.start..=range.end)
            } else {
                Box::new((range.start..=range.end).rev())
            };

            let mut accepted = 0;
            for frame in walk {
                if inner.frames.contains(frame) {
                    continue;
                }
                if !inner.request(frame, false) {
                    break;
                }
                accepted += 1;
            }
            debug!(
                "Bulk fill: {} frames admitted ({} resident, {:?})",
                accepted,
                inner.frames.len(),
                inner.direction
            );
            (accepted, forward)
        };

        decode_task::schedule(self, workers, forward, accepted);
        accepted
    }

    /// Steady-state step: slide the window ahead of the playhead.
    ///
    /// Free budget is filled first; once full, new frames are only admitted
    /// while the trailing frame is beyond the back-buffer margin.
    pub(crate) fn advance_window(self: &Arc<Self>, workers: &Workers, forward: bool) -> usize {
        let accepted = {
            let mut inner = self.lock();
            if inner.state != CacheState::Enabled {
                return 0;
            }
            let Some(range) = inner.range() else {
                return 0;
            };
            if inner.resolve().is_none() || inner.budget.frame_size().is_none() {
                return 0;
            }

            if inner.is_full() {
                inner.playback = false;
                return 0;
            }

            let playhead = inner.playhead;
            let leading = if forward { inner.frames.back() } else { inner.frames.front() };
            let mut cursor = match inner.jump_cursor(forward) {
                Some(jump) => {
                    debug!("Playhead {} ahead of the window, prefetch jumps to {}", playhead, jump);
                    jump
                }
                None => leading.unwrap_or_else(|| range.step(playhead, !forward)),
            };
            let capacity = inner
                .budget
                .snapshot()
                .frame_capacity()
                .unwrap_or(range.duration() as usize);

            let mut admitted = Vec::new();
            for _ in 0..range.duration() {
                if admitted.len() >= capacity {
                    break;
                }
                if !inner.budget.fits_one_more() && !inner.trailing_is_stale(forward) {
                    break;
                }
                cursor = range.step(cursor, forward);
                if inner.frames.contains(cursor) {
                    continue;
                }
                if !inner.request(cursor, true) {
                    break;
                }
                admitted.push(cursor);
            }
            // Tasks only exist for frames still admitted after the pass
            let accepted = admitted.iter().filter(|&&f| inner.frames.contains(f)).count();
            if accepted > 0 {
                trace!(
                    "Window advanced by {} (playhead {}, {} resident)",
                    accepted,
                    playhead,
                    inner.frames.len()
                );
            }
            accepted
        };

        decode_task::schedule(self, workers, forward, accepted);
        accepted
    }
}
