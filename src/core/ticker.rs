//! Fixed-interval playback tick.
//!
//! While playback caching runs, a dedicated thread wakes every interval and, if
//! the worker pool is idle, slides the cache window in the playback direction.
//! The thread exits on `stop()`, when the engine is dropped, or once the engine
//! turns playback prefetch off (everything resident).

use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};
use log::{debug, trace};

use super::engine::CacheCore;
use super::workers::Workers;

pub(crate) struct PlaybackTicker {
    stop_tx: Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
    forward: bool,
}

impl PlaybackTicker {
    pub(crate) fn spawn(
        interval: Duration,
        engine: Weak<CacheCore>,
        workers: Arc<Workers>,
        forward: bool,
    ) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let interval = interval.max(Duration::from_millis(1));

        let handle = thread::Builder::new()
            .name("reelcache-tick".into())
            .spawn(move || {
                let side = if forward { "forward" } else { "backward" };
                debug!("Playback tick started ({} ms, {})", interval.as_millis(), side);
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            let Some(engine) = engine.upgrade() else {
                                break;
                            };
                            if !engine.playback_active() {
                                break;
                            }
                            // One wave at a time: tasks share the engine's cursor
                            if workers.is_idle() {
                                engine.advance_window(&workers, forward);
                            } else {
                                trace!("Tick skipped, {} tasks active", workers.active_count());
                            }
                        }
                    }
                }
                debug!("Playback tick stopped");
            })
            .expect("Failed to spawn playback tick thread");

        Self {
            stop_tx,
            handle: Some(handle),
            forward,
        }
    }

    pub(crate) fn is_forward(&self) -> bool {
        self.forward
    }

    /// Signal the thread and wait for it to exit.
    pub(crate) fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PlaybackTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
