// Layer 1: Standard library imports
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

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
use crate::util::AgentId;

/// Construction parameters of [`AdvThreadPoolDispatcher`].
#[derive(Debug, Clone)]
pub struct AdvThreadPoolParams {
    pub(crate) threads: usize,
    pub(crate) track_activity: bool,
}

impl Default for AdvThreadPoolParams {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            track_activity: false,
        }
    }
}

impl AdvThreadPoolParams {
    /// Defaults: one thread per core.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of worker threads.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Toggle per-thread activity tracking.
    pub fn track_activity(mut self, on: bool) -> Self {
        self.track_activity = on;
        self
    }
}

struct AdvShared {
    active: Mutex<VecDeque<Arc<AdvQueue>>>,
    signal: Condvar,
    shutdown: AtomicBool,
}

impl AdvShared {
    fn schedule(&self, queue: Arc<AdvQueue>) {
        self.active.lock().push_back(queue);
        self.signal.notify_one();
    }

    fn next(&self) -> Option<Arc<AdvQueue>> {
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

struct AdvQueueInner {
    demands: VecDeque<ExecutionDemand>,
    scheduled: bool,
    running_exclusive: bool,
    running_shared: usize,
}

/// Per-agent queue enforcing the safe/unsafe scheduling rule:
/// any number of thread-safe demands may run in parallel, an unsafe demand
/// runs strictly alone.
struct AdvQueue {
    shared: Arc<AdvShared>,
    this: Weak<AdvQueue>,
    inner: Mutex<AdvQueueInner>,
}

impl AdvQueue {
    fn new(shared: Arc<AdvShared>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            shared,
            this: this.clone(),
            inner: Mutex::new(AdvQueueInner {
                demands: VecDeque::new(),
                scheduled: false,
                running_exclusive: false,
                running_shared: 0,
            }),
        })
    }

    fn len(&self) -> usize {
        self.inner.lock().demands.len()
    }

    fn reschedule_if_needed(&self, inner: &mut AdvQueueInner) {
        if !inner.demands.is_empty() && !inner.scheduled && !inner.running_exclusive {
            inner.scheduled = true;
            if let Some(this) = self.this.upgrade() {
                self.shared.schedule(this);
            }
        }
    }
}

impl EventQueue for AdvQueue {
    fn push(&self, demand: ExecutionDemand) {
        let mut inner = self.inner.lock();
        inner.demands.push_back(demand);
        self.reschedule_if_needed(&mut inner);
    }
}

fn adv_worker(shared: Arc<AdvShared>, activity: Arc<ActivityTracker>) {
    loop {
        let wait_started = std::time::Instant::now();
        let Some(queue) = shared.next() else {
            return;
        };
        activity.record_wait(wait_started.elapsed());

        {
            let mut inner = queue.inner.lock();
            inner.scheduled = false;
        }

        // Take the front demand out, classify it without holding the queue
        // lock (classification takes the agent's read lock), then gate.
        let demand = {
            let mut inner = queue.inner.lock();
            inner.demands.pop_front()
        };
        let Some(demand) = demand else {
            continue;
        };

        let is_shared = demand.agent.demand_is_thread_safe(&demand);
        let agent = Arc::clone(&demand.agent);

        let admitted = {
            let mut inner = queue.inner.lock();
            if is_shared {
                if inner.running_exclusive {
                    inner.demands.push_front(demand);
                    None
                } else {
                    inner.running_shared += 1;
                    Some(demand)
                }
            } else if inner.running_exclusive || inner.running_shared > 0 {
                inner.demands.push_front(demand);
                None
            } else {
                inner.running_exclusive = true;
                Some(demand)
            }
        };
        let Some(demand) = admitted else {
            // The demand that finishes last re-schedules the queue.
            continue;
        };

        let work_started = std::time::Instant::now();
        if is_shared {
            // Let other workers start further thread-safe demands of the
            // same agent while this one runs.
            {
                let mut inner = queue.inner.lock();
                queue.reschedule_if_needed(&mut inner);
            }
            agent.exec_demand_shared(demand);
            let mut inner = queue.inner.lock();
            inner.running_shared -= 1;
            if inner.running_shared == 0 {
                queue.reschedule_if_needed(&mut inner);
            }
        } else {
            demand.execute();
            let mut inner = queue.inner.lock();
            inner.running_exclusive = false;
            queue.reschedule_if_needed(&mut inner);
        }
        activity.record_work(work_started.elapsed());
    }
}

struct AdvSlot {
    queue: Arc<AdvQueue>,
    refs: usize,
}

/// Thread pool with support for thread-safe event handlers.
///
/// For a given agent any number of thread-safe handlers may run in
/// parallel, but no unsafe handler runs while a safe one does and no safe
/// handler starts while an unsafe one runs. Subscription mutation is only
/// possible from unsafe handlers — safe handlers receive shared access and
/// no context, so the rule holds by construction.
pub struct AdvThreadPoolDispatcher {
    name: String,
    shared: Arc<AdvShared>,
    workers: Vec<WorkThread>,
    activities: Vec<Arc<ActivityTracker>>,
    queues: Mutex<HashMap<AgentId, AdvSlot>>,
}

impl AdvThreadPoolDispatcher {
    /// Create and start the pool.
    pub fn new(
        env: &Environment,
        name: impl Into<String>,
        params: AdvThreadPoolParams,
    ) -> Arc<Self> {
        let name = name.into();
        let shared = Arc::new(AdvShared {
            active: Mutex::new(VecDeque::new()),
            signal: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let mut workers = Vec::with_capacity(params.threads);
        let mut activities = Vec::with_capacity(params.threads);
        for index in 0..params.threads {
            let activity = Arc::new(ActivityTracker::new(params.track_activity));
            activities.push(Arc::clone(&activity));
            workers.push(WorkThread::spawn(format!("agentry-atp-{name}-{index}"), {
                let shared = Arc::clone(&shared);
                move || adv_worker(shared, activity)
            }));
        }

        let dispatcher = Arc::new(Self {
            name,
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
        Arc::new(AdvThreadPoolBinder {
            disp: Arc::<Self>::clone(self),
        })
    }
}

impl Dispatcher for AdvThreadPoolDispatcher {
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
        for (agent, slot) in self.queues.lock().iter() {
            out(format!("{}/{agent}", self.name), slot.queue.len());
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

struct AdvThreadPoolBinder {
    disp: Arc<AdvThreadPoolDispatcher>,
}

impl DispatcherBinder for AdvThreadPoolBinder {
    fn preallocate_resources(&self, agent: &Arc<AgentCell>) -> Result<()> {
        let mut queues = self.disp.queues.lock();
        let slot = queues.entry(agent.id()).or_insert_with(|| AdvSlot {
            queue: AdvQueue::new(Arc::clone(&self.disp.shared)),
            refs: 0,
        });
        slot.refs += 1;
        Ok(())
    }

    fn bind(&self, agent: &Arc<AgentCell>) {
        let queue = self
            .disp
            .queues
            .lock()
            .get(&agent.id())
            .map(|slot| Arc::<AdvQueue>::clone(&slot.queue));
        if let Some(queue) = queue {
            agent.bind_queue(queue);
        }
    }

    fn undo_preallocation(&self, agent: &Arc<AgentCell>) {
        self.release(agent.id());
    }

    fn unbind(&self, agent: &Arc<AgentCell>) {
        agent.unbind_queue();
        self.release(agent.id());
    }
}

impl AdvThreadPoolBinder {
    fn release(&self, agent: AgentId) {
        let mut queues = self.disp.queues.lock();
        if let Some(slot) = queues.get_mut(&agent) {
            slot.refs -= 1;
            if slot.refs == 0 {
                queues.remove(&agent);
            }
        }
    }
}
