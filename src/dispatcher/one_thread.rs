// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 3: Internal module imports
use super::activity::{ActivitySnapshot, ActivityTracker};
use super::traits::{BinderRef, Dispatcher, DispatcherBinder, DispatcherParams};
use super::work_thread::{drain_loop, WorkThread, DEFAULT_MAX_DEMANDS_AT_ONCE};
use crate::agent::cell::AgentCell;
use crate::environment::Environment;
use crate::error::Result;
use crate::queue::{DemandQueue, EventQueue, ExecutionDemand};

/// One worker thread, one FIFO, shared by every bound agent.
///
/// The default dispatcher of every environment is one of these.
pub struct OneThreadDispatcher {
    name: String,
    queue: Arc<DemandQueue>,
    worker: WorkThread,
    activity: Arc<ActivityTracker>,
}

impl OneThreadDispatcher {
    /// Create and start the dispatcher; it registers itself with the
    /// environment for shutdown.
    pub fn new(env: &Environment, name: impl Into<String>, params: DispatcherParams) -> Arc<Self> {
        let name = name.into();
        let queue = Arc::new(DemandQueue::new());
        let activity = Arc::new(ActivityTracker::new(params.track_activity));
        let worker = WorkThread::spawn(format!("agentry-disp-{name}"), {
            let queue = Arc::clone(&queue);
            let activity = Arc::clone(&activity);
            move || drain_loop(queue, activity, DEFAULT_MAX_DEMANDS_AT_ONCE)
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

    /// A binder placing agents on this dispatcher.
    pub fn binder(self: &Arc<Self>) -> BinderRef {
        Arc::new(OneThreadBinder {
            queue: Arc::clone(&self.queue),
        })
    }
}

impl Dispatcher for OneThreadDispatcher {
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

struct OneThreadBinder {
    queue: Arc<DemandQueue>,
}

impl DispatcherBinder for OneThreadBinder {
    fn preallocate_resources(&self, _agent: &Arc<AgentCell>) -> Result<()> {
        Ok(())
    }

    fn bind(&self, agent: &Arc<AgentCell>) {
        agent.bind_queue(Arc::<DemandQueue>::clone(&self.queue));
    }

    fn undo_preallocation(&self, _agent: &Arc<AgentCell>) {}

    fn unbind(&self, agent: &Arc<AgentCell>) {
        agent.unbind_queue();
    }
}

/// `one_thread` variant whose finish lane is preallocated.
///
/// The binder reserves queue space per agent up front, so scheduling the
/// final `evt_finish` demand never allocates on the shutdown path.
pub struct NefOneThreadDispatcher {
    inner: Arc<OneThreadDispatcher>,
}

impl NefOneThreadDispatcher {
    /// Create and start the dispatcher.
    pub fn new(env: &Environment, name: impl Into<String>, params: DispatcherParams) -> Arc<Self> {
        Arc::new(Self {
            inner: OneThreadDispatcher::new(env, name, params),
        })
    }

    /// A binder placing agents on this dispatcher.
    pub fn binder(self: &Arc<Self>) -> BinderRef {
        Arc::new(NefOneThreadBinder {
            queue: Arc::clone(&self.inner.queue),
        })
    }
}

impl Dispatcher for NefOneThreadDispatcher {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn shutdown(&self) {
        self.inner.shutdown();
    }

    fn queue_stats(&self, out: &mut dyn FnMut(String, usize)) {
        self.inner.queue_stats(out);
    }

    fn activity_stats(&self, out: &mut dyn FnMut(String, ActivitySnapshot)) {
        self.inner.activity_stats(out);
    }
}

struct NefOneThreadBinder {
    queue: Arc<DemandQueue>,
}

impl DispatcherBinder for NefOneThreadBinder {
    fn preallocate_resources(&self, _agent: &Arc<AgentCell>) -> Result<()> {
        self.queue.reserve(2);
        Ok(())
    }

    fn bind(&self, agent: &Arc<AgentCell>) {
        agent.bind_queue(NefQueueFacade::new(Arc::<DemandQueue>::clone(&self.queue)));
    }

    fn undo_preallocation(&self, _agent: &Arc<AgentCell>) {}

    fn unbind(&self, agent: &Arc<AgentCell>) {
        agent.unbind_queue();
    }
}

struct NefQueueFacade {
    queue: Arc<DemandQueue>,
}

impl NefQueueFacade {
    fn new(queue: Arc<DemandQueue>) -> Arc<Self> {
        Arc::new(Self { queue })
    }
}

impl EventQueue for NefQueueFacade {
    fn push(&self, demand: ExecutionDemand) {
        self.queue.enqueue(demand);
    }

    fn push_finish(&self, demand: ExecutionDemand) {
        // The slot was reserved at preallocation time.
        self.queue.enqueue(demand);
    }
}
