// Layer 1: Standard library imports
use std::collections::VecDeque;

// Layer 2: Third-party crate imports
use parking_lot::{Condvar, Mutex};

// Layer 3: Internal module imports
use super::demand::ExecutionDemand;
use super::EventQueue;

struct QueueInner {
    demands: VecDeque<ExecutionDemand>,
    closed: bool,
}

/// Multi-producer FIFO of demands drained by one worker.
///
/// The workhorse queue behind `one_thread`, `active_obj` and
/// `active_group` dispatchers: producers push from any thread, the single
/// consumer blocks on the condvar and drains in batches.
pub struct DemandQueue {
    inner: Mutex<QueueInner>,
    signal: Condvar,
}

impl DemandQueue {
    /// Create an empty open queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                demands: VecDeque::new(),
                closed: false,
            }),
            signal: Condvar::new(),
        }
    }

    /// Append one demand. Silently discards after close.
    pub fn enqueue(&self, demand: ExecutionDemand) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.demands.push_back(demand);
        drop(inner);
        self.signal.notify_one();
    }

    /// Take up to `max` demands, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn wait_batch(&self, max: usize) -> Option<Vec<ExecutionDemand>> {
        let mut inner = self.inner.lock();
        loop {
            if !inner.demands.is_empty() {
                let take = inner.demands.len().min(max.max(1));
                return Some(inner.demands.drain(..take).collect());
            }
            if inner.closed {
                return None;
            }
            self.signal.wait(&mut inner);
        }
    }

    /// Grow the backing buffer by `additional` slots up front.
    pub fn reserve(&self, additional: usize) {
        self.inner.lock().demands.reserve(additional);
    }

    /// Close the queue and wake the consumer. Queued demands are dropped.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.demands.clear();
        drop(inner);
        self.signal.notify_all();
    }

    /// Current queue length.
    pub fn len(&self) -> usize {
        self.inner.lock().demands.len()
    }

    /// True when no demand is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DemandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue for DemandQueue {
    fn push(&self, demand: ExecutionDemand) {
        self.enqueue(demand);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_close_wakes_blocked_consumer() {
        let queue = Arc::new(DemandQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.wait_batch(4))
        };
        std::thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(consumer.join().unwrap().is_none());
    }

    #[test]
    fn test_len_reflects_pending_work() {
        let queue = DemandQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_enqueue_after_close_is_discarded() {
        let queue = DemandQueue::new();
        queue.close();
        assert_eq!(queue.len(), 0);
        assert!(queue.wait_batch(1).is_none());
    }
}
