//! Bounded worker pool for decode tasks.
//!
//! Uses work-stealing deques:
//! - External tasks go through a shared injector
//! - Idle workers steal from each other
//!
//! Epoch mechanism drops queued tasks that have not started yet (`cancel_pending`).
//! Every task, run or dropped, is counted in `active` until it leaves the pool,
//! so `is_idle()` is the signal the playback tick waits for before issuing a new wave.

use crossbeam::deque::{Injector, Worker};
use log::{info, trace};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Queued + running task counter with a condvar for blocking drains.
#[derive(Default)]
struct ActiveTasks {
    count: Mutex<usize>,
    idle: Condvar,
}

impl ActiveTasks {
    fn inc(&self) {
        *self.count.lock().unwrap_or_else(|e| e.into_inner()) += 1;
    }

    fn dec(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn get(&self) -> usize {
        *self.count.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait_zero(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        while *count > 0 {
            count = self.idle.wait(count).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Decrements the active counter when the job is done, even if it panicked.
struct ActiveGuard(Arc<ActiveTasks>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}

/// Worker pool owned by a single frame cache.
///
/// # Example
/// ```ignore
/// let workers = Workers::new(4);
/// workers.execute(move || task.run());
/// workers.wait_idle();
/// ```
pub struct Workers {
    injector: Arc<Injector<Job>>,         // Global queue for external tasks
    handles: Vec<thread::JoinHandle<()>>, // Thread handles for proper shutdown
    current_epoch: Arc<AtomicU64>,        // Bumped by cancel_pending()
    active: Arc<ActiveTasks>,             // Queued + running
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    /// Create pool with `num_threads` workers (at least one).
    ///
    /// Recommended: `num_cpus::get() * 3 / 4`, see [`default_thread_count`].
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers_local: Vec<Worker<Job>> = Vec::new();
        let mut stealers = Vec::new();
        let mut handles = Vec::new();

        for _ in 0..num_threads {
            let worker: Worker<Job> = Worker::new_fifo();
            stealers.push(worker.stealer());
            workers_local.push(worker);
        }

        for (worker_id, worker) in workers_local.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let stealers = stealers.clone();

            let handle = thread::Builder::new()
                .name(format!("reelcache-worker-{}", worker_id))
                .spawn(move || {
                    trace!("Worker {} started", worker_id);

                    loop {
                        // 1. Own queue
                        if let Some(job) = worker.pop() {
                            job();
                            continue;
                        }

                        // 2. Global injector
                        if let Some(job) = injector.steal().success() {
                            job();
                            continue;
                        }

                        // 3. Other workers
                        let mut found_work = false;
                        for stealer in &stealers {
                            if let Some(job) = stealer.steal().success() {
                                job();
                                found_work = true;
                                break;
                            }
                        }

                        if found_work {
                            continue;
                        }

                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }

                        thread::sleep(Duration::from_millis(1));
                    }

                    trace!("Worker {} stopped", worker_id);
                })
                .expect("Failed to spawn worker thread");

            handles.push(handle);
        }

        info!("Workers initialized: {} threads (work-stealing)", num_threads);

        Self {
            injector,
            handles,
            current_epoch: Arc::new(AtomicU64::new(0)),
            active: Arc::new(ActiveTasks::default()),
            shutdown,
        }
    }

    /// Number of worker threads.
    pub fn thread_count(&self) -> usize {
        self.handles.len()
    }

    /// Queue a task. It is skipped if `cancel_pending()` runs before a worker picks it up.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let epoch = self.current_epoch.load(Ordering::SeqCst);
        let current_epoch = Arc::clone(&self.current_epoch);
        let guard = ActiveGuard(Arc::clone(&self.active));
        self.active.inc();

        // Epoch is checked at execution time, not enqueue time
        let wrapped = move || {
            let _guard = guard;
            if current_epoch.load(Ordering::SeqCst) == epoch {
                f();
            } else {
                trace!("Skipped stale task (epoch {})", epoch);
            }
        };

        self.injector.push(Box::new(wrapped));
    }

    /// Drop every queued task that has not started. Running tasks are not interrupted.
    pub fn cancel_pending(&self) -> u64 {
        let epoch = self.current_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        trace!("Workers epoch -> {}", epoch);
        epoch
    }

    /// Tasks queued or running.
    pub fn active_count(&self) -> usize {
        self.active.get()
    }

    pub fn is_idle(&self) -> bool {
        self.active_count() == 0
    }

    /// Block until every queued and running task has left the pool.
    pub fn wait_idle(&self) {
        self.active.wait_zero();
    }
}

/// Default pool size: 75% of logical cores, leaving room for the player thread.
pub fn default_thread_count() -> usize {
    (num_cpus::get() * 3 / 4).max(1)
}

impl Drop for Workers {
    fn drop(&mut self) {
        use std::time::Instant;

        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);

        self.cancel_pending();
        self.shutdown.store(true, Ordering::SeqCst);

        // A task mid-decode is allowed to finish; the timeout only guards shutdown.
        let deadline = Instant::now() + Duration::from_millis(500);

        let handles = std::mem::take(&mut self.handles);
        for handle in handles {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, exiting anyway");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }

        trace!("All {} workers stopped gracefully", num_threads);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_execute_and_wait_idle() {
        let workers = Workers::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..16 {
            let counter = Arc::clone(&counter);
            workers.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        workers.wait_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 16);
        assert!(workers.is_idle());
    }

    #[test]
    fn test_cancel_pending_skips_queued() {
        let workers = Workers::new(1);
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);
        let counter = Arc::new(AtomicUsize::new(0));

        // Block the single worker so the rest stay queued
        workers.execute(move || {
            let _ = started_tx.send(());
            let _ = gate_rx.recv();
        });
        started_rx.recv().unwrap();
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            workers.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(workers.active_count(), 9);

        workers.cancel_pending();
        let _ = gate_tx.send(());
        workers.wait_idle();

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(workers.active_count(), 0);
    }

    #[test]
    fn test_thread_count_min_one() {
        let workers = Workers::new(0);
        assert_eq!(workers.thread_count(), 1);
        assert!(default_thread_count() >= 1);
    }
}
