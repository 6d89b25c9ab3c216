// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use parking_lot::Mutex;

/// Aggregated timing of one activity (work or wait).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityStats {
    /// Number of recorded intervals.
    pub count: u64,
    /// Sum of interval lengths.
    pub total: Duration,
}

impl ActivityStats {
    /// Average interval length; zero when nothing was recorded.
    pub fn avg(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / u32::try_from(self.count).unwrap_or(u32::MAX)
        }
    }

    fn record(&mut self, interval: Duration) {
        self.count += 1;
        self.total += interval;
    }
}

/// Snapshot of one worker thread's activity.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivitySnapshot {
    /// Time spent executing demands.
    pub work: ActivityStats,
    /// Time spent waiting for demands.
    pub wait: ActivityStats,
}

#[derive(Default)]
struct TrackerInner {
    work: ActivityStats,
    wait: ActivityStats,
}

/// Per-thread work/wait accumulator. Disabled trackers are free.
pub struct ActivityTracker {
    inner: Option<Mutex<TrackerInner>>,
}

impl ActivityTracker {
    /// Create a tracker; `enabled = false` makes every call a no-op.
    pub fn new(enabled: bool) -> Self {
        Self {
            inner: enabled.then(|| Mutex::new(TrackerInner::default())),
        }
    }

    /// True when tracking is on.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Record one work interval.
    pub fn record_work(&self, interval: Duration) {
        if let Some(inner) = &self.inner {
            inner.lock().work.record(interval);
        }
    }

    /// Record one wait interval.
    pub fn record_wait(&self, interval: Duration) {
        if let Some(inner) = &self.inner {
            inner.lock().wait.record(interval);
        }
    }

    /// Current totals; zeroes when tracking is off.
    pub fn snapshot(&self) -> ActivitySnapshot {
        match &self.inner {
            Some(inner) => {
                let inner = inner.lock();
                ActivitySnapshot {
                    work: inner.work,
                    wait: inner.wait,
                }
            }
            None => ActivitySnapshot::default(),
        }
    }
}
