// Layer 1: Standard library imports
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

// Layer 2: Third-party crate imports
use parking_lot::Mutex;

// Layer 3: Internal module imports
use super::activity::ActivityTracker;
use crate::queue::DemandQueue;

/// A joinable named worker thread.
pub(crate) struct WorkThread {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkThread {
    pub(crate) fn spawn(name: String, body: impl FnOnce() + Send + 'static) -> Self {
        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(body)
            .ok();
        Self {
            handle: Mutex::new(handle),
        }
    }

    /// Join the thread; safe to call more than once.
    pub(crate) fn join(&self) {
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Standard drain loop of a single-consumer demand queue.
///
/// Takes demands in batches of `max_demands_at_once`, executes them, and
/// feeds the activity tracker when tracking is on. Returns when the queue
/// closes.
pub(crate) fn drain_loop(
    queue: Arc<DemandQueue>,
    activity: Arc<ActivityTracker>,
    max_demands_at_once: usize,
) {
    loop {
        let wait_started = Instant::now();
        let Some(batch) = queue.wait_batch(max_demands_at_once) else {
            return;
        };
        activity.record_wait(wait_started.elapsed());

        let work_started = Instant::now();
        for demand in batch {
            demand.execute();
        }
        activity.record_work(work_started.elapsed());
    }
}

/// Default batch size of the simple dispatchers.
pub(crate) const DEFAULT_MAX_DEMANDS_AT_ONCE: usize = 4;
