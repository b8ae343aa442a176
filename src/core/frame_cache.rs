//! Frame cache engine: the player-facing handle.
//!
//! **Why**: Smooth playback in both directions needs decoded frames ahead of the
//! playhead, bounded by a memory budget, while media can be swapped or dropped at
//! any time.
//!
//! **Used by**: Player (set media, playback start/stop, seeks), preferences
//! (memory and thread limits).
//!
//! # Flow
//!
//! 1. `set_media()` drops the old state, decodes the first frame synchronously to
//!    learn the frame size, then bulk-fills the budget in playback direction.
//! 2. `start_playback_cache()` starts a fixed-interval tick. Each tick, if the
//!    pool is idle, trims frames that fell behind the playhead and admits new
//!    ones ahead of it.
//! 3. `ensure_cached()` covers direct seeks: decode now, on the caller's thread.
//!
//! Media is held weakly. If it is dropped elsewhere every call becomes a no-op.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use reelcache::{CacheSettings, Direction, FrameCache, FrameStore, SyntheticMedia};
//!
//! let (cache, events) = FrameCache::new(&CacheSettings::default());
//! let media: Arc<dyn FrameStore> = Arc::new(SyntheticMedia::new("shot", 1001, 1100, 1920, 1080));
//! cache.set_media(&media);
//! cache.start_playback_cache(Direction::Forward);
//! cache.set_current_frame(1010);
//! for event in events.try_iter() {
//!     println!("{:?}", event);
//! }
//! ```

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver};
use log::{debug, info};

use super::budget::MemorySnapshot;
use super::engine::{
    back_buffer_margin, CacheCore, CacheEvent, CacheInner, CacheState, Direction, FrameRange,
};
use super::ticker::PlaybackTicker;
use super::workers::Workers;
use crate::config::CacheSettings;
use crate::entities::FrameStore;

pub struct FrameCache {
    core: Arc<CacheCore>,
    workers: RwLock<Arc<Workers>>,
    ticker: Mutex<Option<PlaybackTicker>>,
    tick_interval: Mutex<Duration>,
}

impl FrameCache {
    /// Create the engine from preferences. Returns the notification receiver for the player.
    pub fn new(settings: &CacheSettings) -> (Self, Receiver<CacheEvent>) {
        Self::build(settings.memory_bytes(), settings.thread_count(), settings)
    }

    /// Explicit memory limit and pool size, other settings at defaults.
    pub fn with_limits(max_bytes: usize, threads: usize) -> (Self, Receiver<CacheEvent>) {
        Self::build(max_bytes, threads, &CacheSettings::default())
    }

    fn build(
        max_bytes: usize,
        threads: usize,
        settings: &CacheSettings,
    ) -> (Self, Receiver<CacheEvent>) {
        let (tx, rx) = unbounded();
        let mut inner = CacheInner::new(max_bytes, settings.default_direction, tx);
        inner.back_buffer_min = settings.back_buffer_min;
        inner.back_buffer_ratio = settings.back_buffer_ratio;

        info!(
            "FrameCache: limit={} MB, threads={}, tick={} ms",
            max_bytes / 1024 / 1024,
            threads.max(1),
            settings.tick_interval_ms
        );

        let cache = Self {
            core: Arc::new(CacheCore::new(inner)),
            workers: RwLock::new(Arc::new(Workers::new(threads))),
            ticker: Mutex::new(None),
            tick_interval: Mutex::new(Duration::from_millis(settings.tick_interval_ms)),
        };
        (cache, rx)
    }

    fn pool(&self) -> Arc<Workers> {
        Arc::clone(&self.workers.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn cancel_and_drain(&self) {
        let pool = self.pool();
        pool.cancel_pending();
        pool.wait_idle();
    }

    // ========== Media ==========

    /// Bind new active media: reset, decode its first frame, bulk-fill.
    ///
    /// A paused cache is re-enabled; a disabled one stays disabled and only keeps the first frame.
    pub fn set_media(&self, media: &Arc<dyn FrameStore>) {
        self.stop_playback_cache();
        self.cancel_and_drain();

        {
            let mut inner = self.core.lock();
            inner.unbind();
            if inner.state == CacheState::Paused {
                debug!("Caching resumed by media change");
                inner.state = CacheState::Enabled;
            }
            inner.bind(media);
        }

        self.core.bootstrap();
        self.core.cache_available(&self.pool());
    }

    /// Drop the active media binding and everything resident for it.
    pub fn unset_media(&self) {
        self.stop_playback_cache();
        self.cancel_and_drain();
        self.core.lock().unbind();
    }

    /// Bound media if it is still alive.
    pub fn media(&self) -> Option<Arc<dyn FrameStore>> {
        self.core.lock().resolve()
    }

    pub fn frame_range(&self) -> Option<FrameRange> {
        self.core.lock().range()
    }

    // ========== Admission / eviction ==========

    /// Admission control, see [`Direction`] for the eviction side.
    pub fn request(&self, frame: i32, evict: bool) -> bool {
        let mut inner = self.core.lock();
        if inner.resolve().is_none() {
            return false;
        }
        inner.request(frame, evict)
    }

    /// Decode an admitted frame now and report it resident.
    pub fn cache(&self, frame: i32) {
        self.core.cache(frame);
    }

    pub fn evict(&self, frame: i32) -> bool {
        self.core.lock().evict(frame)
    }

    pub fn evict_front(&self) -> Option<i32> {
        self.core.lock().evict_front()
    }

    pub fn evict_back(&self) -> Option<i32> {
        self.core.lock().evict_back()
    }

    /// Seek path: make `frame` resident before returning, evicting if needed.
    pub fn ensure_cached(&self, frame: i32) {
        self.core.ensure_cached(frame);
    }

    // ========== Prefetch ==========

    /// Bulk fill in direction order until the budget refuses. Returns frames scheduled.
    pub fn cache_available(&self) -> usize {
        self.core.cache_available(&self.pool())
    }

    /// Forward steady-state step. Returns frames scheduled.
    pub fn cache_next(&self) -> usize {
        self.core.advance_window(&self.pool(), true)
    }

    /// Backward steady-state step. Returns frames scheduled.
    pub fn cache_previous(&self) -> usize {
        self.core.advance_window(&self.pool(), false)
    }

    /// Decode task body, run inline.
    pub fn cache_next_frame(&self) {
        self.core.cache_next_frame(true);
    }

    pub fn cache_previous_frame(&self) {
        self.core.cache_next_frame(false);
    }

    /// Advance the "last produced" cursor forward with wrap-around.
    pub fn get_next_frame(&self) -> Option<i32> {
        self.core.step_cursor(true)
    }

    /// Advance the "last produced" cursor backward with wrap-around.
    pub fn get_previous_frame(&self) -> Option<i32> {
        self.core.step_cursor(false)
    }

    // ========== Playback tick ==========

    /// Start the playback tick.
    ///
    /// Refused when not enabled, unbound, already full, or `Direction::None`.
    pub fn start_playback_cache(&self, direction: Direction) -> bool {
        if direction == Direction::None {
            self.stop_playback_cache();
            return false;
        }
        {
            let mut inner = self.core.lock();
            if inner.state != CacheState::Enabled || inner.resolve().is_none() {
                return false;
            }
            if inner.is_full() {
                debug!("Playback cache not started: all frames resident");
                return false;
            }
            inner.direction = direction;
            inner.playback = true;
        }

        let interval = *self.tick_interval.lock().unwrap_or_else(|e| e.into_inner());
        let mut ticker = self.ticker.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = ticker.take() {
            old.stop();
        }
        *ticker = Some(PlaybackTicker::spawn(
            interval,
            Arc::downgrade(&self.core),
            self.pool(),
            !direction.is_backward(),
        ));
        true
    }

    pub fn stop_playback_cache(&self) {
        let ticker = self.ticker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(ticker) = ticker {
            ticker.stop();
        }
        self.core.lock().playback = false;
    }

    pub fn is_playback_caching(&self) -> bool {
        self.core.playback_active()
    }

    // ========== State transitions ==========

    /// Stop work and drop resident frames. The next `set_media` re-enables.
    pub fn pause_caching(&self) {
        self.halt(CacheState::Paused);
    }

    /// Stop work and drop resident frames until `resume_caching`.
    pub fn disable_caching(&self) {
        self.halt(CacheState::Disabled);
    }

    fn halt(&self, state: CacheState) {
        self.stop_playback_cache();
        self.cancel_and_drain();
        let mut inner = self.core.lock();
        debug!("Caching {:?} -> {:?}", inner.state, state);
        inner.state = state;
        inner.clear_resident();
    }

    pub fn resume_caching(&self) {
        {
            let mut inner = self.core.lock();
            if inner.state != CacheState::Enabled {
                debug!("Caching {:?} -> Enabled", inner.state);
            }
            inner.state = CacheState::Enabled;
        }
        self.cache_available();
    }

    /// Drop queued tasks, wait for running ones, clear, and restart the cursor at the playhead.
    pub fn stop_caching(&self) {
        self.stop_playback_cache();
        self.cancel_and_drain();
        let mut inner = self.core.lock();
        inner.clear_resident();
        inner.last_frame = inner.playhead;
    }

    pub fn clear_cache(&self) {
        self.cancel_and_drain();
        self.core.lock().clear_resident();
    }

    pub fn recache(&self) {
        self.clear_cache();
        self.cache_available();
    }

    // ========== Player input / configuration ==========

    /// Current playback head, as seen by the player.
    pub fn set_current_frame(&self, frame: i32) {
        self.core.lock().playhead = frame;
    }

    /// Direction used by the next bulk fill and for admission/eviction sides.
    pub fn set_direction(&self, direction: Direction) {
        self.core.lock().direction = direction;
    }

    /// New memory ceiling. Shrinking evicts trailing frames until usage fits.
    pub fn set_max_memory(&self, bytes: usize) {
        let mut inner = self.core.lock();
        inner.budget.set_max_bytes(bytes);
        while inner.budget.used_bytes() > inner.budget.max_bytes() {
            if inner.evict_trailing().is_none() {
                break;
            }
        }
    }

    /// Resize the worker pool. Running and queued tasks finish on the old pool first.
    pub fn set_max_threads(&self, count: usize) {
        let count = count.max(1);
        if self.pool().thread_count() == count {
            return;
        }

        let resume = {
            let mut ticker = self.ticker.lock().unwrap_or_else(|e| e.into_inner());
            ticker.take().map(|t| {
                let forward = t.is_forward();
                t.stop();
                forward
            })
        };

        let old = self.pool();
        old.wait_idle();
        *self.workers.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(Workers::new(count));
        drop(old);
        info!("Cache worker pool resized to {} threads", count);

        if let Some(forward) = resume {
            if self.core.playback_active() {
                let interval = *self.tick_interval.lock().unwrap_or_else(|e| e.into_inner());
                let engine = Arc::downgrade(&self.core);
                let ticker = PlaybackTicker::spawn(interval, engine, self.pool(), forward);
                *self.ticker.lock().unwrap_or_else(|e| e.into_inner()) = Some(ticker);
            }
        }
    }

    /// Takes effect the next time the tick starts.
    pub fn set_tick_interval(&self, interval: Duration) {
        *self.tick_interval.lock().unwrap_or_else(|e| e.into_inner()) = interval;
    }

    /// Back-buffer parameters; recomputed immediately for bound media.
    pub fn set_back_buffer(&self, min_frames: i32, ratio: f64) {
        let mut inner = self.core.lock();
        inner.back_buffer_min = min_frames;
        inner.back_buffer_ratio = ratio;
        if let Some(range) = inner.range() {
            inner.back_buffer = back_buffer_margin(range.duration(), min_frames, ratio);
        }
    }

    /// Re-apply preferences (memory, threads, tick, back buffer).
    pub fn apply_settings(&self, settings: &CacheSettings) {
        self.set_max_memory(settings.memory_bytes());
        self.set_max_threads(settings.thread_count());
        self.set_tick_interval(Duration::from_millis(settings.tick_interval_ms));
        self.set_back_buffer(settings.back_buffer_min, settings.back_buffer_ratio);
    }

    // ========== Introspection ==========

    /// Resident frames in admission order (front to back).
    pub fn resident_frames(&self) -> Vec<i32> {
        self.core.lock().frames.iter().collect()
    }

    pub fn is_resident(&self, frame: i32) -> bool {
        self.core.lock().frames.contains(frame)
    }

    pub fn resident_count(&self) -> usize {
        self.core.lock().frames.len()
    }

    pub fn is_full(&self) -> bool {
        self.core.lock().is_full()
    }

    pub fn memory(&self) -> MemorySnapshot {
        self.core.lock().budget.snapshot()
    }

    pub fn direction(&self) -> Direction {
        self.core.lock().direction
    }

    pub fn state(&self) -> CacheState {
        self.core.lock().state
    }

    pub fn back_buffer(&self) -> i32 {
        self.core.lock().back_buffer
    }

    pub fn current_frame(&self) -> i32 {
        self.core.lock().playhead
    }

    /// The "last produced" cursor.
    pub fn last_produced(&self) -> i32 {
        self.core.lock().last_frame
    }

    pub fn thread_count(&self) -> usize {
        self.pool().thread_count()
    }

    pub fn active_tasks(&self) -> usize {
        self.pool().active_count()
    }

    /// Block until no decode task is queued or running.
    pub fn wait_idle(&self) {
        self.pool().wait_idle();
    }
}

impl Drop for FrameCache {
    fn drop(&mut self) {
        self.stop_playback_cache();
        self.cancel_and_drain();
        self.core.lock().clear_resident();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::SyntheticMedia;
    use std::time::Instant;

    const FRAME: usize = 100;

    fn media(first: i32, last: i32) -> (Arc<SyntheticMedia>, Arc<dyn FrameStore>) {
        let concrete = Arc::new(SyntheticMedia::with_frame_bytes("test", first, last, FRAME));
        let shared: Arc<dyn FrameStore> = concrete.clone();
        (concrete, shared)
    }

    fn sorted(mut frames: Vec<i32>) -> Vec<i32> {
        frames.sort_unstable();
        frames
    }

    #[test]
    fn test_end_to_end_fill_and_evict() {
        let (concrete, shared) = media(1001, 1010);
        let (cache, events) = FrameCache::with_limits(4 * FRAME, 2);

        cache.set_media(&shared);
        assert_eq!(sorted(cache.resident_frames()), vec![1001, 1002, 1003, 1004]);

        cache.wait_idle();
        assert_eq!(concrete.decoded_frames(), vec![1001, 1002, 1003, 1004]);
        let cached: Vec<i32> = sorted(
            events
                .try_iter()
                .filter_map(|e| match e {
                    CacheEvent::FrameCached(f) => Some(f),
                    _ => None,
                })
                .collect(),
        );
        assert_eq!(cached, vec![1001, 1002, 1003, 1004]);

        assert!(cache.request(1005, true));
        assert_eq!(sorted(cache.resident_frames()), vec![1002, 1003, 1004, 1005]);
        assert!(!concrete.has_frame(1001));
        assert_eq!(events.try_recv(), Ok(CacheEvent::FrameEvicted(1001)));
        assert_eq!(cache.memory().used_bytes, 4 * FRAME);
    }

    #[test]
    fn test_bootstrap_with_budget_below_one_frame() {
        let (concrete, shared) = media(1, 500);
        let (cache, _events) = FrameCache::with_limits(FRAME / 2, 2);

        cache.set_media(&shared);
        cache.wait_idle();

        assert_eq!(cache.resident_frames(), vec![1]);
        assert_eq!(concrete.decoded_frames(), vec![1]);
        assert_eq!(cache.memory().frame_size, Some(FRAME));
        assert_eq!(cache.back_buffer(), 10);
    }

    #[test]
    fn test_wrap_around_cursor() {
        let (_concrete, shared) = media(10, 19);
        let (cache, _events) = FrameCache::with_limits(20 * FRAME, 1);
        cache.set_media(&shared);
        cache.wait_idle();

        cache.ensure_cached(19);
        assert_eq!(cache.last_produced(), 19);
        assert_eq!(cache.get_next_frame(), Some(10));
        assert_eq!(cache.get_next_frame(), Some(11));

        cache.ensure_cached(10);
        assert_eq!(cache.get_previous_frame(), Some(19));
        assert_eq!(cache.get_previous_frame(), Some(18));
    }

    #[test]
    fn test_sliding_window_forward() {
        let (concrete, shared) = media(0, 99);
        let (cache, _events) = FrameCache::with_limits(10 * FRAME, 2);
        cache.set_media(&shared);
        cache.wait_idle();
        assert_eq!(sorted(cache.resident_frames()), (0..10).collect::<Vec<_>>());

        // Playhead inside the back-buffer margin: nothing to do
        cache.set_current_frame(3);
        assert_eq!(cache.cache_next(), 0);

        cache.set_current_frame(5);
        assert_eq!(cache.cache_next(), 2);
        cache.wait_idle();

        assert_eq!(sorted(cache.resident_frames()), (2..12).collect::<Vec<_>>());
        assert_eq!(concrete.decoded_frames(), (2..12).collect::<Vec<_>>());
        assert!(cache.memory().used_bytes <= cache.memory().max_bytes);
    }

    #[test]
    fn test_sliding_window_backward() {
        let (concrete, shared) = media(0, 99);
        let (cache, _events) = FrameCache::with_limits(10 * FRAME, 2);
        cache.set_direction(Direction::Backward);
        cache.set_media(&shared);
        cache.wait_idle();

        let mut expected: Vec<i32> = (91..100).collect();
        expected.insert(0, 0);
        assert_eq!(sorted(cache.resident_frames()), expected);
        assert_eq!(concrete.decoded_frames(), expected);

        cache.set_current_frame(93);
        assert_eq!(cache.cache_previous(), 4);
        cache.wait_idle();

        assert_eq!(sorted(cache.resident_frames()), (87..97).collect::<Vec<_>>());
        assert_eq!(concrete.decoded_frames(), (87..97).collect::<Vec<_>>());
    }

    #[test]
    fn test_playback_tick_follows_playhead() {
        let (concrete, shared) = media(0, 199);
        let (cache, _events) = FrameCache::with_limits(10 * FRAME, 2);
        cache.set_tick_interval(Duration::from_millis(5));
        cache.set_media(&shared);
        cache.wait_idle();

        cache.set_current_frame(50);
        assert!(cache.start_playback_cache(Direction::Forward));
        assert!(cache.is_playback_caching());

        // Back buffer for 200 frames is 4
        let expected: Vec<i32> = (46..56).collect();
        let deadline = Instant::now() + Duration::from_secs(5);
        while sorted(cache.resident_frames()) != expected && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        cache.stop_playback_cache();
        cache.wait_idle();

        assert!(!cache.is_playback_caching());
        assert_eq!(sorted(cache.resident_frames()), expected);
        assert_eq!(concrete.decoded_frames(), expected);
    }

    #[test]
    fn test_start_playback_refused_when_full_or_disabled() {
        let (_concrete, shared) = media(0, 4);
        let (cache, _events) = FrameCache::with_limits(100 * FRAME, 2);
        cache.set_media(&shared);
        assert!(cache.is_full());
        assert!(!cache.start_playback_cache(Direction::Forward));

        let (_concrete, shared) = media(0, 99);
        cache.set_media(&shared);
        cache.disable_caching();
        assert!(!cache.start_playback_cache(Direction::Forward));
        assert!(!cache.start_playback_cache(Direction::None));
    }

    #[test]
    fn test_seek_decodes_synchronously() {
        let (concrete, shared) = media(0, 99);
        let (cache, _events) = FrameCache::with_limits(5 * FRAME, 2);
        cache.set_media(&shared);
        cache.wait_idle();

        cache.ensure_cached(50);
        assert!(concrete.has_frame(50));
        assert!(cache.is_resident(50));
        assert!(!cache.is_resident(0));
        assert_eq!(cache.resident_count(), 5);
        assert_eq!(cache.last_produced(), 50);
    }

    #[test]
    fn test_seek_waits_for_running_decode() {
        let concrete = Arc::new(
            SyntheticMedia::with_frame_bytes("slow", 1001, 1100, FRAME)
                .with_decode_delay(Duration::from_millis(150)),
        );
        let shared: Arc<dyn FrameStore> = concrete.clone();
        let (cache, _events) = FrameCache::with_limits(10 * FRAME, 1);
        cache.set_media(&shared);

        // The single worker is now busy decoding 1002
        std::thread::sleep(Duration::from_millis(50));
        cache.ensure_cached(1002);
        assert!(concrete.has_frame(1002));
        assert!(cache.is_resident(1002));

        cache.stop_caching();
    }

    #[test]
    fn test_seek_during_playback_tick() {
        let concrete = Arc::new(
            SyntheticMedia::with_frame_bytes("clip", 0, 199, FRAME)
                .with_decode_delay(Duration::from_millis(2)),
        );
        let shared: Arc<dyn FrameStore> = concrete.clone();
        let (cache, _events) = FrameCache::with_limits(20 * FRAME, 2);
        cache.set_tick_interval(Duration::from_millis(5));
        cache.set_media(&shared);
        assert!(cache.start_playback_cache(Direction::Forward));

        let frames = (0..40).chain(150..170);
        for frame in frames {
            cache.set_current_frame(frame);
            cache.ensure_cached(frame);
            assert!(concrete.has_frame(frame), "frame {} not decoded", frame);
            assert!(cache.is_resident(frame));
            std::thread::sleep(Duration::from_millis(1));
        }

        cache.stop_playback_cache();
        cache.wait_idle();
        let mem = cache.memory();
        assert!(mem.used_bytes <= mem.max_bytes);
        let resident = cache.resident_frames();
        for frame in concrete.decoded_frames() {
            assert!(resident.contains(&frame), "decoded frame {} not resident", frame);
        }
    }

    #[test]
    fn test_playhead_jump_skips_frames_in_between() {
        let (concrete, shared) = media(0, 999);
        let (cache, events) = FrameCache::with_limits(10 * FRAME, 2);
        cache.set_media(&shared);
        cache.wait_idle();
        let _ = events.try_iter().count();
        // Margin for 1000 frames is 20, clamped to half of the 10-frame capacity
        assert_eq!(cache.back_buffer(), 20);

        cache.set_current_frame(500);
        assert_eq!(cache.cache_next(), 10);
        cache.wait_idle();

        let expected: Vec<i32> = (495..505).collect();
        assert_eq!(sorted(cache.resident_frames()), expected);
        assert_eq!(concrete.decoded_frames(), expected);
        assert_eq!(concrete.decode_count(), 20);

        let (mut cached, mut evicted) = (Vec::new(), Vec::new());
        for event in events.try_iter() {
            match event {
                CacheEvent::FrameCached(f) => cached.push(f),
                CacheEvent::FrameEvicted(f) => evicted.push(f),
                CacheEvent::Cleared => {}
            }
        }
        assert_eq!(sorted(cached), expected);
        assert_eq!(sorted(evicted), (0..10).collect::<Vec<_>>());

        // Window now reaches past the playhead; nothing more to do
        assert_eq!(cache.cache_next(), 0);
    }

    #[test]
    fn test_unknown_frame_size_keeps_one_frame() {
        let concrete = Arc::new(SyntheticMedia::with_frame_bytes("empty", 0, 99, 0));
        let shared: Arc<dyn FrameStore> = concrete.clone();
        let (cache, _events) = FrameCache::with_limits(10 * FRAME, 2);
        cache.set_media(&shared);
        cache.wait_idle();
        assert_eq!(cache.resident_frames(), vec![0]);
        assert_eq!(cache.memory().frame_size, None);

        cache.ensure_cached(50);
        cache.ensure_cached(60);
        assert_eq!(cache.resident_frames(), vec![60]);
        assert_eq!(concrete.decoded_frames(), vec![60]);
        assert_eq!(cache.cache_available(), 0);
    }

    #[test]
    fn test_stop_and_clear_idempotent() {
        let (concrete, shared) = media(0, 9);
        let (cache, events) = FrameCache::with_limits(4 * FRAME, 2);
        cache.set_media(&shared);
        cache.wait_idle();
        let _ = events.try_iter().count();

        cache.set_current_frame(7);
        cache.stop_caching();
        assert!(cache.resident_frames().is_empty());
        assert_eq!(cache.last_produced(), 7);
        assert_eq!(events.try_iter().collect::<Vec<_>>(), vec![CacheEvent::Cleared]);

        cache.stop_caching();
        assert!(cache.resident_frames().is_empty());
        assert_eq!(cache.last_produced(), 7);
        assert_eq!(cache.memory().used_bytes, 0);
        assert!(events.try_recv().is_err());

        cache.clear_cache();
        assert!(events.try_recv().is_err());
        assert!(concrete.decoded_frames().is_empty());
    }

    #[test]
    fn test_pause_disable_resume() {
        let (_concrete, shared) = media(0, 99);
        let (cache, _events) = FrameCache::with_limits(5 * FRAME, 2);
        cache.set_media(&shared);
        cache.wait_idle();

        cache.pause_caching();
        assert_eq!(cache.state(), CacheState::Paused);
        assert_eq!(cache.resident_count(), 0);
        assert_eq!(cache.cache_available(), 0);

        // Media change re-enables a paused cache
        cache.set_media(&shared);
        assert_eq!(cache.state(), CacheState::Enabled);
        assert_eq!(cache.resident_count(), 5);

        cache.disable_caching();
        cache.set_media(&shared);
        cache.wait_idle();
        assert_eq!(cache.state(), CacheState::Disabled);
        assert_eq!(cache.resident_frames(), vec![0]);

        cache.resume_caching();
        cache.wait_idle();
        assert_eq!(cache.state(), CacheState::Enabled);
        assert_eq!(sorted(cache.resident_frames()), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_recache_refills() {
        let (concrete, shared) = media(0, 99);
        let (cache, _events) = FrameCache::with_limits(5 * FRAME, 2);
        cache.set_media(&shared);
        cache.wait_idle();
        cache.ensure_cached(60);

        cache.recache();
        cache.wait_idle();
        assert_eq!(sorted(cache.resident_frames()), vec![0, 1, 2, 3, 4]);
        assert_eq!(concrete.decoded_frames(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_dropped_media_is_silent() {
        let (concrete, shared) = media(0, 99);
        let (cache, _events) = FrameCache::with_limits(5 * FRAME, 2);
        cache.set_media(&shared);
        cache.wait_idle();

        drop(shared);
        drop(concrete);

        assert!(cache.media().is_none());
        assert!(!cache.request(10, true));
        cache.ensure_cached(10);
        cache.cache(10);
        assert_eq!(cache.cache_available(), 0);
        assert_eq!(cache.cache_next(), 0);
        assert!(!cache.start_playback_cache(Direction::Forward));
        assert!(!cache.is_resident(10));
    }

    #[test]
    fn test_shrink_memory_evicts_trailing() {
        let (concrete, shared) = media(0, 99);
        let (cache, _events) = FrameCache::with_limits(10 * FRAME, 2);
        cache.set_media(&shared);
        cache.wait_idle();

        cache.set_max_memory(6 * FRAME);
        assert_eq!(sorted(cache.resident_frames()), vec![4, 5, 6, 7, 8, 9]);
        assert_eq!(concrete.decoded_frames(), vec![4, 5, 6, 7, 8, 9]);
        assert_eq!(cache.memory().used_bytes, 6 * FRAME);
    }

    #[test]
    fn test_resize_pool_keeps_working() {
        let (concrete, shared) = media(0, 49);
        let (cache, _events) = FrameCache::with_limits(5 * FRAME, 1);
        cache.set_max_threads(3);
        assert_eq!(cache.thread_count(), 3);

        cache.set_media(&shared);
        cache.wait_idle();
        assert_eq!(concrete.decoded_frames(), vec![0, 1, 2, 3, 4]);
        assert_eq!(cache.active_tasks(), 0);
    }

    #[test]
    fn test_swapping_media_releases_old_frames() {
        let (old_concrete, old_shared) = media(0, 20);
        let (new_concrete, new_shared) = media(100, 120);
        let (cache, _events) = FrameCache::with_limits(3 * FRAME, 2);

        cache.set_media(&old_shared);
        cache.wait_idle();
        cache.set_media(&new_shared);
        cache.wait_idle();

        assert!(old_concrete.decoded_frames().is_empty());
        assert_eq!(new_concrete.decoded_frames(), vec![100, 101, 102]);
        assert_eq!(cache.frame_range(), Some(FrameRange::new(100, 120)));
    }
}
