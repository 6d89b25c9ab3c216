// Layer 1: Standard library imports
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

// Layer 2: Third-party crate imports
use parking_lot::{Condvar, Mutex};

// Layer 3: Internal module imports
use super::activity::{ActivitySnapshot, ActivityTracker};
use super::traits::{BinderRef, Dispatcher, DispatcherBinder};
use super::work_thread::WorkThread;
use crate::agent::cell::AgentCell;
use crate::environment::Environment;
use crate::error::Result;
use crate::queue::{EventQueue, ExecutionDemand};
use crate::util::{AgentId, CoopId};

/// How agents bound to a thread pool share FIFOs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolFifo {
    /// One FIFO per coop: agents of a coop never run in parallel.
    Cooperation,
    /// One FIFO per agent.
    Individual,
}

/// Construction parameters of [`ThreadPoolDispatcher`].
#[derive(Debug, Clone)]
pub struct ThreadPoolParams {
    pub(crate) threads: usize,
    pub(crate) fifo: PoolFifo,
    pub(crate) max_demands_at_once: usize,
    pub(crate) next_thread_wakeup_threshold: usize,
    pub(crate) track_activity: bool,
}

impl Default for ThreadPoolParams {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            fifo: PoolFifo::Cooperation,
            max_demands_at_once: 4,
            next_thread_wakeup_threshold: 0,
            track_activity: false,
        }
    }
}

impl ThreadPoolParams {
    /// Defaults: one thread per core, cooperation FIFO, batches of 4,
    /// wake a second worker immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of worker threads.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// FIFO sharing mode.
    pub fn fifo(mut self, fifo: PoolFifo) -> Self {
        self.fifo = fifo;
        self
    }

    /// How many demands one worker takes from a FIFO before requeuing it.
    pub fn max_demands_at_once(mut self, max: usize) -> Self {
        self.max_demands_at_once = max.max(1);
        self
    }

    /// How long a FIFO must grow before an extra worker is woken for it.
    /// `0` wakes immediately (the default).
    pub fn next_thread_wakeup_threshold(mut self, threshold: usize) -> Self {
        self.next_thread_wakeup_threshold = threshold;
        self
    }

    /// Toggle per-thread activity tracking.
    pub fn track_activity(mut self, on: bool) -> Self {
        self.track_activity = on;
        self
    }
}

struct PoolShared {
    active: Mutex<VecDeque<Arc<PoolQueue>>>,
    signal: Condvar,
    shutdown: AtomicBool,
    wakeup_threshold: usize,
    max_demands_at_once: usize,
}

impl PoolShared {
    fn schedule(&self, queue: Arc<PoolQueue>) {
        self.active.lock().push_back(queue);
        self.signal.notify_one();
    }

    fn next(&self) -> Option<Arc<PoolQueue>> {
        let mut active = self.active.lock();
        loop {
            if let Some(queue) = active.pop_front() {
                return Some(queue);
            }
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }
            self.signal.wait(&mut active);
        }
    }

    fn close(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.active.lock().clear();
        self.signal.notify_all();
    }
}

struct PoolQueueInner {
    demands: VecDeque<ExecutionDemand>,
    scheduled: bool,
    running: bool,
}

/// One FIFO of the pool (per agent or per coop).
struct PoolQueue {
    shared: Arc<PoolShared>,
    this: Weak<PoolQueue>,
    inner: Mutex<PoolQueueInner>,
}

impl PoolQueue {
    fn new(shared: Arc<PoolShared>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            shared,
            this: this.clone(),
            inner: Mutex::new(PoolQueueInner {
                demands: VecDeque::new(),
                scheduled: false,
                running: false,
            }),
        })
    }

    fn len(&self) -> usize {
        self.inner.lock().demands.len()
    }
}

impl EventQueue for PoolQueue {
    fn push(&self, demand: ExecutionDemand) {
        let mut inner = self.inner.lock();
        inner.demands.push_back(demand);
        let backlog = inner.demands.len();
        if !inner.scheduled && !inner.running {
            inner.scheduled = true;
            drop(inner);
            if let Some(this) = self.this.upgrade() {
                self.shared.schedule(this);
            }
        } else if backlog > self.shared.wakeup_threshold {
            drop(inner);
            self.shared.signal.notify_one();
        }
    }
}

fn pool_worker(shared: Arc<PoolShared>, activity: Arc<ActivityTracker>) {
    loop {
        let wait_started = Instant::now();
        let Some(queue) = shared.next() else {
            return;
        };
        activity.record_wait(wait_started.elapsed());

        let work_started = Instant::now();
        {
            let mut inner = queue.inner.lock();
            inner.scheduled = false;
            inner.running = true;
        }
        let mut processed = 0;
        loop {
            let demand = {
                let mut inner = queue.inner.lock();
                if processed >= shared.max_demands_at_once {
                    None
                } else {
                    inner.demands.pop_front()
                }
            };
            match demand {
                Some(demand) => {
                    demand.execute();
                    processed += 1;
                }
                None => break,
            }
        }
        {
            let mut inner = queue.inner.lock();
            inner.running = false;
            if !inner.demands.is_empty() && !inner.scheduled {
                inner.scheduled = true;
                drop(inner);
                if let Some(this) = queue.this.upgrade() {
                    shared.schedule(this);
                }
            }
        }
        activity.record_work(work_started.elapsed());
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum QueueKey {
    Agent(AgentId),
    Coop(CoopId),
}

struct QueueSlot {
    queue: Arc<PoolQueue>,
    refs: usize,
}

/// N worker threads draining a set of per-agent or per-coop FIFOs.
///
/// One FIFO is processed by at most one worker at a time, which preserves
/// per-agent (and, in cooperation mode, per-coop) serialization; workers
/// pick whichever FIFO has pending demands next.
pub struct ThreadPoolDispatcher {
    name: String,
    fifo: PoolFifo,
    shared: Arc<PoolShared>,
    workers: Vec<WorkThread>,
    activities: Vec<Arc<ActivityTracker>>,
    queues: Mutex<HashMap<QueueKey, QueueSlot>>,
}

impl ThreadPoolDispatcher {
    /// Create and start the pool.
    pub fn new(env: &Environment, name: impl Into<String>, params: ThreadPoolParams) -> Arc<Self> {
        let name = name.into();
        let shared = Arc::new(PoolShared {
            active: Mutex::new(VecDeque::new()),
            signal: Condvar::new(),
            shutdown: AtomicBool::new(false),
            wakeup_threshold: params.next_thread_wakeup_threshold,
            max_demands_at_once: params.max_demands_at_once,
        });

        let mut workers = Vec::with_capacity(params.threads);
        let mut activities = Vec::with_capacity(params.threads);
        for index in 0..params.threads {
            let activity = Arc::new(ActivityTracker::new(params.track_activity));
            activities.push(Arc::clone(&activity));
            workers.push(WorkThread::spawn(format!("agentry-tp-{name}-{index}"), {
                let shared = Arc::clone(&shared);
                move || pool_worker(shared, activity)
            }));
        }

        let dispatcher = Arc::new(Self {
            name,
            fifo: params.fifo,
            shared,
            workers,
            activities,
            queues: Mutex::new(HashMap::new()),
        });
        env.register_dispatcher(Arc::<Self>::clone(&dispatcher));
        dispatcher
    }

    /// A binder placing agents on this pool.
    pub fn binder(self: &Arc<Self>) -> BinderRef {
        Arc::new(ThreadPoolBinder {
            disp: Arc::<Self>::clone(self),
        })
    }

    fn key_for(&self, agent: &Arc<AgentCell>) -> QueueKey {
        match self.fifo {
            PoolFifo::Individual => QueueKey::Agent(agent.id()),
            PoolFifo::Cooperation => match agent.coop_backref() {
                Some(backref) => QueueKey::Coop(backref.id),
                None => QueueKey::Agent(agent.id()),
            },
        }
    }

    fn acquire_queue(&self, key: QueueKey) -> Arc<PoolQueue> {
        let mut queues = self.queues.lock();
        let slot = queues.entry(key).or_insert_with(|| QueueSlot {
            queue: PoolQueue::new(Arc::clone(&self.shared)),
            refs: 0,
        });
        slot.refs += 1;
        Arc::clone(&slot.queue)
    }

    fn release_queue(&self, key: QueueKey) {
        let mut queues = self.queues.lock();
        if let Some(slot) = queues.get_mut(&key) {
            slot.refs -= 1;
            if slot.refs == 0 {
                queues.remove(&key);
            }
        }
    }
}

impl Dispatcher for ThreadPoolDispatcher {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn shutdown(&self) {
        self.shared.close();
        for worker in &self.workers {
            worker.join();
        }
    }

    fn queue_stats(&self, out: &mut dyn FnMut(String, usize)) {
        for (key, slot) in self.queues.lock().iter() {
            let suffix = match key {
                QueueKey::Agent(id) => format!("agent-{id}"),
                QueueKey::Coop(id) => format!("coop-{id}"),
            };
            out(format!("{}/{suffix}", self.name), slot.queue.len());
        }
    }

    fn activity_stats(&self, out: &mut dyn FnMut(String, ActivitySnapshot)) {
        for (index, activity) in self.activities.iter().enumerate() {
            if activity.is_enabled() {
                out(format!("{}/{index}", self.name), activity.snapshot());
            }
        }
    }
}

struct ThreadPoolBinder {
    disp: Arc<ThreadPoolDispatcher>,
}

impl DispatcherBinder for ThreadPoolBinder {
    fn preallocate_resources(&self, agent: &Arc<AgentCell>) -> Result<()> {
        let key = self.disp.key_for(agent);
        self.disp.acquire_queue(key);
        Ok(())
    }

    fn bind(&self, agent: &Arc<AgentCell>) {
        let key = self.disp.key_for(agent);
        let queue = self
            .disp
            .queues
            .lock()
            .get(&key)
            .map(|slot| Arc::<PoolQueue>::clone(&slot.queue));
        if let Some(queue) = queue {
            agent.bind_queue(queue);
        }
    }

    fn undo_preallocation(&self, agent: &Arc<AgentCell>) {
        let key = self.disp.key_for(agent);
        self.disp.release_queue(key);
    }

    fn unbind(&self, agent: &Arc<AgentCell>) {
        agent.unbind_queue();
        let key = self.disp.key_for(agent);
        self.disp.release_queue(key);
    }
}
