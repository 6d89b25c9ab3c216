// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use parking_lot::Mutex;

// Layer 3: Internal module imports
use super::activity::{ActivitySnapshot, ActivityTracker};
use super::traits::{BinderRef, Dispatcher, DispatcherBinder, DispatcherParams};
use super::work_thread::{drain_loop, WorkThread, DEFAULT_MAX_DEMANDS_AT_ONCE};
use crate::agent::cell::AgentCell;
use crate::environment::Environment;
use crate::error::Result;
use crate::queue::DemandQueue;
use crate::util::AgentId;

struct AgentWorker {
    queue: Arc<DemandQueue>,
    thread: Arc<WorkThread>,
    activity: Arc<ActivityTracker>,
}

impl AgentWorker {
    fn stop(&self) {
        self.queue.close();
        self.thread.join();
    }
}

/// One dedicated worker thread per bound agent.
///
/// The thread and queue are created at preallocation time so that binding
/// cannot fail; a failed registration tears them down again through
/// `undo_preallocation`.
pub struct ActiveObjDispatcher {
    name: String,
    track_activity: bool,
    workers: Mutex<HashMap<AgentId, AgentWorker>>,
}

impl ActiveObjDispatcher {
    /// Create and start the dispatcher.
    pub fn new(env: &Environment, name: impl Into<String>, params: DispatcherParams) -> Arc<Self> {
        let dispatcher = Arc::new(Self {
            name: name.into(),
            track_activity: params.track_activity,
            workers: Mutex::new(HashMap::new()),
        });
        env.register_dispatcher(Arc::<Self>::clone(&dispatcher));
        dispatcher
    }

    /// A binder placing agents on this dispatcher.
    pub fn binder(self: &Arc<Self>) -> BinderRef {
        Arc::new(ActiveObjBinder {
            disp: Arc::<Self>::clone(self),
        })
    }

    fn spawn_worker(&self, agent: AgentId) {
        let queue = Arc::new(DemandQueue::new());
        let activity = Arc::new(ActivityTracker::new(self.track_activity));
        let thread = Arc::new(WorkThread::spawn(
            format!("agentry-ao-{}-{agent}", self.name),
            {
                let queue = Arc::clone(&queue);
                let activity = Arc::clone(&activity);
                move || drain_loop(queue, activity, DEFAULT_MAX_DEMANDS_AT_ONCE)
            },
        ));
        self.workers.lock().insert(
            agent,
            AgentWorker {
                queue,
                thread,
                activity,
            },
        );
    }

    fn remove_worker(&self, agent: AgentId) {
        let worker = self.workers.lock().remove(&agent);
        if let Some(worker) = worker {
            worker.stop();
        }
    }
}

impl Dispatcher for ActiveObjDispatcher {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn shutdown(&self) {
        let workers: Vec<AgentWorker> = {
            let mut map = self.workers.lock();
            map.drain().map(|(_, w)| w).collect()
        };
        for worker in workers {
            worker.stop();
        }
    }

    fn queue_stats(&self, out: &mut dyn FnMut(String, usize)) {
        for (agent, worker) in self.workers.lock().iter() {
            out(format!("{}/{agent}", self.name), worker.queue.len());
        }
    }

    fn activity_stats(&self, out: &mut dyn FnMut(String, ActivitySnapshot)) {
        for (agent, worker) in self.workers.lock().iter() {
            if worker.activity.is_enabled() {
                out(format!("{}/{agent}", self.name), worker.activity.snapshot());
            }
        }
    }
}

struct ActiveObjBinder {
    disp: Arc<ActiveObjDispatcher>,
}

impl DispatcherBinder for ActiveObjBinder {
    fn preallocate_resources(&self, agent: &Arc<AgentCell>) -> Result<()> {
        self.disp.spawn_worker(agent.id());
        Ok(())
    }

    fn bind(&self, agent: &Arc<AgentCell>) {
        let queue = self
            .disp
            .workers
            .lock()
            .get(&agent.id())
            .map(|w| Arc::<DemandQueue>::clone(&w.queue));
        if let Some(queue) = queue {
            agent.bind_queue(queue);
        }
    }

    fn undo_preallocation(&self, agent: &Arc<AgentCell>) {
        self.disp.remove_worker(agent.id());
    }

    fn unbind(&self, agent: &Arc<AgentCell>) {
        agent.unbind_queue();
        self.disp.remove_worker(agent.id());
    }
}
