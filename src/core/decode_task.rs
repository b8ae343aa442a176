//! Decode task: one "produce the next frame" unit of work on the worker pool.
//!
//! A task carries no frame number. It claims whatever admitted frame comes next
//! on the engine's shared cursor, so a wave of N tasks produces the N frames
//! the engine just admitted, in cursor order.

use std::sync::{Arc, Weak};

use log::trace;

use super::engine::CacheCore;
use super::workers::Workers;

pub(crate) struct DecodeTask {
    engine: Weak<CacheCore>,
    forward: bool,
}

impl DecodeTask {
    pub(crate) fn new(engine: &Arc<CacheCore>, forward: bool) -> Self {
        Self {
            engine: Arc::downgrade(engine),
            forward,
        }
    }

    pub(crate) fn run(self) {
        // Engine dropped while the task was queued
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        engine.cache_next_frame(self.forward);
    }
}

/// Queue `count` tasks stepping in the given direction.
pub(crate) fn schedule(engine: &Arc<CacheCore>, workers: &Workers, forward: bool, count: usize) {
    if count == 0 {
        return;
    }
    trace!(
        "Scheduling {} decode tasks ({})",
        count,
        if forward { "next" } else { "previous" }
    );
    for _ in 0..count {
        let task = DecodeTask::new(engine, forward);
        workers.execute(move || task.run());
    }
}
