// Layer 1: Standard library imports
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

// Layer 2: Third-party crate imports
use parking_lot::{Condvar, Mutex};

// Layer 3: Internal module imports
use super::activity::{ActivitySnapshot, ActivityTracker};
use super::traits::{BinderRef, Dispatcher, DispatcherBinder, DispatcherParams};
use super::work_thread::WorkThread;
use crate::agent::cell::AgentCell;
use crate::environment::Environment;
use crate::error::Result;
use crate::priority::{Priority, PRIORITY_LEVELS};
use crate::queue::{EventQueue, ExecutionDemand};

/// Per-priority demand quotas of [`QuotedRoundRobinDispatcher`].
///
/// # Example
/// ```rust
/// use agentry::dispatcher::Quotes;
/// use agentry::priority::Priority;
///
/// let quotes = Quotes::new(2)
///     .set(Priority::P7, 5)
///     .set(Priority::P5, 4)
///     .set(Priority::P3, 3);
/// assert_eq!(quotes.quote_for(Priority::P7), 5);
/// assert_eq!(quotes.quote_for(Priority::P1), 2);
/// ```
#[derive(Debug, Clone)]
pub struct Quotes {
    per_priority: [usize; PRIORITY_LEVELS],
}

impl Quotes {
    /// Same default quota for every priority.
    pub fn new(default_quote: usize) -> Self {
        Self {
            per_priority: [default_quote.max(1); PRIORITY_LEVELS],
        }
    }

    /// Override the quota of one priority.
    pub fn set(mut self, priority: Priority, quote: usize) -> Self {
        self.per_priority[priority.as_index()] = quote.max(1);
        self
    }

    /// The quota of `priority`.
    pub fn quote_for(&self, priority: Priority) -> usize {
        self.per_priority[priority.as_index()]
    }
}

struct Lanes {
    queues: [VecDeque<ExecutionDemand>; PRIORITY_LEVELS],
    closed: bool,
}

impl Lanes {
    fn new() -> Self {
        Self {
            queues: Default::default(),
            closed: false,
        }
    }

    fn highest_non_empty(&self) -> Option<usize> {
        (0..PRIORITY_LEVELS).rev().find(|p| !self.queues[*p].is_empty())
    }

    fn is_empty(&self) -> bool {
        self.queues.iter().all(VecDeque::is_empty)
    }

    fn total_len(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }
}

/// Strategy of one priority queue: strict order, or quoted round robin.
enum PopStrategy {
    Strict,
    Quoted {
        quotes: Quotes,
        current: usize,
        used: usize,
    },
}

struct PrioQueue {
    inner: Mutex<(Lanes, PopStrategy)>,
    signal: Condvar,
}

impl PrioQueue {
    fn new(strategy: PopStrategy) -> Self {
        Self {
            inner: Mutex::new((Lanes::new(), strategy)),
            signal: Condvar::new(),
        }
    }

    fn pop(&self) -> Option<ExecutionDemand> {
        let mut guard = self.inner.lock();
        loop {
            let (lanes, strategy) = &mut *guard;
            if let Some(demand) = Self::try_pop(lanes, strategy) {
                return Some(demand);
            }
            if lanes.closed {
                return None;
            }
            self.signal.wait(&mut guard);
        }
    }

    fn try_pop(lanes: &mut Lanes, strategy: &mut PopStrategy) -> Option<ExecutionDemand> {
        match strategy {
            PopStrategy::Strict => {
                let p = lanes.highest_non_empty()?;
                lanes.queues[p].pop_front()
            }
            PopStrategy::Quoted {
                quotes,
                current,
                used,
            } => {
                // Stay on the current priority while its quota lasts.
                if !lanes.queues[*current].is_empty()
                    && *used < quotes.per_priority[*current]
                {
                    *used += 1;
                    return lanes.queues[*current].pop_front();
                }
                // Quota exhausted (or lane empty): move to the next lower
                // occupied priority with a fresh quota.
                if let Some(p) = (0..*current).rev().find(|p| !lanes.queues[*p].is_empty()) {
                    *current = p;
                    *used = 1;
                    return lanes.queues[p].pop_front();
                }
                // End of the round: wrap to the highest occupied priority.
                if let Some(p) = lanes.highest_non_empty() {
                    *current = p;
                    *used = 1;
                    return lanes.queues[p].pop_front();
                }
                None
            }
        }
    }

    fn close(&self) {
        let mut guard = self.inner.lock();
        guard.0.closed = true;
        for lane in &mut guard.0.queues {
            lane.clear();
        }
        drop(guard);
        self.signal.notify_all();
    }

    fn len(&self) -> usize {
        self.inner.lock().0.total_len()
    }
}

impl EventQueue for PrioQueue {
    fn push(&self, demand: ExecutionDemand) {
        let mut guard = self.inner.lock();
        if guard.0.closed {
            return;
        }
        guard.0.queues[demand.priority().as_index()].push_back(demand);
        drop(guard);
        self.signal.notify_one();
    }
}

fn prio_worker(queue: Arc<PrioQueue>, activity: Arc<ActivityTracker>) {
    loop {
        let wait_started = Instant::now();
        let Some(demand) = queue.pop() else {
            return;
        };
        activity.record_wait(wait_started.elapsed());

        let work_started = Instant::now();
        demand.execute();
        activity.record_work(work_started.elapsed());
    }
}

macro_rules! prio_dispatcher_common {
    ($ty:ident) => {
        impl $ty {
            /// A binder placing agents on this dispatcher.
            pub fn binder(self: &Arc<Self>) -> BinderRef {
                Arc::new(PrioBinder {
                    queue: Arc::<PrioQueue>::clone(&self.queue),
                })
            }
        }

        impl Dispatcher for $ty {
            fn name(&self) -> String {
                self.name.clone()
            }

            fn shutdown(&self) {
                self.queue.close();
                self.worker.join();
            }

            fn queue_stats(&self, out: &mut dyn FnMut(String, usize)) {
                out(self.name.clone(), self.queue.len());
            }

            fn activity_stats(&self, out: &mut dyn FnMut(String, ActivitySnapshot)) {
                if self.activity.is_enabled() {
                    out(self.name.clone(), self.activity.snapshot());
                }
            }
        }
    };
}

/// Single worker; the queue is drained in strict priority order, never
/// mixing priorities: whenever a higher-priority demand is pending at
/// dequeue time, it is processed first.
pub struct StrictlyOrderedDispatcher {
    name: String,
    queue: Arc<PrioQueue>,
    worker: WorkThread,
    activity: Arc<ActivityTracker>,
}

impl StrictlyOrderedDispatcher {
    /// Create and start the dispatcher.
    pub fn new(env: &Environment, name: impl Into<String>, params: DispatcherParams) -> Arc<Self> {
        let name = name.into();
        let queue = Arc::new(PrioQueue::new(PopStrategy::Strict));
        let activity = Arc::new(ActivityTracker::new(params.track_activity));
        let worker = WorkThread::spawn(format!("agentry-prio-so-{name}"), {
            let queue = Arc::clone(&queue);
            let activity = Arc::clone(&activity);
            move || prio_worker(queue, activity)
        });
        let dispatcher = Arc::new(Self {
            name,
            queue,
            worker,
            activity,
        });
        env.register_dispatcher(Arc::<Self>::clone(&dispatcher));
        dispatcher
    }
}

prio_dispatcher_common!(StrictlyOrderedDispatcher);

/// Single worker; each priority level has a demand quota, served from the
/// highest occupied priority downward, wrapping back to the top after the
/// lowest occupied level.
pub struct QuotedRoundRobinDispatcher {
    name: String,
    queue: Arc<PrioQueue>,
    worker: WorkThread,
    activity: Arc<ActivityTracker>,
}

impl QuotedRoundRobinDispatcher {
    /// Create and start the dispatcher.
    pub fn new(
        env: &Environment,
        name: impl Into<String>,
        quotes: Quotes,
        params: DispatcherParams,
    ) -> Arc<Self> {
        let name = name.into();
        let queue = Arc::new(PrioQueue::new(PopStrategy::Quoted {
            quotes,
            current: PRIORITY_LEVELS - 1,
            used: 0,
        }));
        let activity = Arc::new(ActivityTracker::new(params.track_activity));
        let worker = WorkThread::spawn(format!("agentry-prio-rr-{name}"), {
            let queue = Arc::clone(&queue);
            let activity = Arc::clone(&activity);
            move || prio_worker(queue, activity)
        });
        let dispatcher = Arc::new(Self {
            name,
            queue,
            worker,
            activity,
        });
        env.register_dispatcher(Arc::<Self>::clone(&dispatcher));
        dispatcher
    }
}

prio_dispatcher_common!(QuotedRoundRobinDispatcher);

struct PrioBinder {
    queue: Arc<PrioQueue>,
}

impl DispatcherBinder for PrioBinder {
    fn preallocate_resources(&self, _agent: &Arc<AgentCell>) -> Result<()> {
        Ok(())
    }

    fn bind(&self, agent: &Arc<AgentCell>) {
        agent.bind_queue(Arc::<PrioQueue>::clone(&self.queue));
    }

    fn undo_preallocation(&self, _agent: &Arc<AgentCell>) {}

    fn unbind(&self, agent: &Arc<AgentCell>) {
        agent.unbind_queue();
    }
}
