// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 3: Internal module imports
use super::activity::{ActivitySnapshot, ActivityTracker};
use super::traits::{BinderRef, Dispatcher, DispatcherBinder, DispatcherParams};
use super::work_thread::{drain_loop, WorkThread, DEFAULT_MAX_DEMANDS_AT_ONCE};
use crate::agent::cell::AgentCell;
use crate::environment::Environment;
use crate::error::Result;
use crate::priority::{Priority, PRIORITY_LEVELS};
use crate::queue::{DemandQueue, EventQueue, ExecutionDemand};

/// One dedicated worker thread per priority level.
///
/// Demands are routed to the lane of their priority at push time; levels
/// interact only through mailboxes. Agents of different priorities bound
/// here run genuinely in parallel.
pub struct PrioDedicatedThreadsDispatcher {
    name: String,
    router: Arc<LaneRouter>,
    workers: Vec<WorkThread>,
    activities: Vec<Arc<ActivityTracker>>,
}

struct LaneRouter {
    lanes: [Arc<DemandQueue>; PRIORITY_LEVELS],
}

impl EventQueue for LaneRouter {
    fn push(&self, demand: ExecutionDemand) {
        self.lanes[demand.priority().as_index()].enqueue(demand);
    }
}

impl PrioDedicatedThreadsDispatcher {
    /// Create and start the dispatcher: eight lanes, eight workers.
    pub fn new(env: &Environment, name: impl Into<String>, params: DispatcherParams) -> Arc<Self> {
        let name = name.into();
        let lanes: [Arc<DemandQueue>; PRIORITY_LEVELS] =
            std::array::from_fn(|_| Arc::new(DemandQueue::new()));

        let mut workers = Vec::with_capacity(PRIORITY_LEVELS);
        let mut activities = Vec::with_capacity(PRIORITY_LEVELS);
        for (index, lane) in lanes.iter().enumerate() {
            let activity = Arc::new(ActivityTracker::new(params.track_activity));
            activities.push(Arc::clone(&activity));
            workers.push(WorkThread::spawn(format!("agentry-prio-dt-{name}-p{index}"), {
                let lane = Arc::clone(lane);
                let activity = Arc::clone(&activity);
                move || drain_loop(lane, activity, DEFAULT_MAX_DEMANDS_AT_ONCE)
            }));
        }

        let dispatcher = Arc::new(Self {
            name,
            router: Arc::new(LaneRouter { lanes }),
            workers,
            activities,
        });
        env.register_dispatcher(Arc::<Self>::clone(&dispatcher));
        dispatcher
    }

    /// A binder placing agents on this dispatcher.
    pub fn binder(self: &Arc<Self>) -> BinderRef {
        Arc::new(PrioDedicatedBinder {
            router: Arc::<LaneRouter>::clone(&self.router),
        })
    }
}

impl Dispatcher for PrioDedicatedThreadsDispatcher {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn shutdown(&self) {
        for lane in &self.router.lanes {
            lane.close();
        }
        for worker in &self.workers {
            worker.join();
        }
    }

    fn queue_stats(&self, out: &mut dyn FnMut(String, usize)) {
        for (index, lane) in self.router.lanes.iter().enumerate() {
            out(
                format!("{}/{}", self.name, Priority::from_index(index)),
                lane.len(),
            );
        }
    }

    fn activity_stats(&self, out: &mut dyn FnMut(String, ActivitySnapshot)) {
        for (index, activity) in self.activities.iter().enumerate() {
            if activity.is_enabled() {
                out(
                    format!("{}/{}", self.name, Priority::from_index(index)),
                    activity.snapshot(),
                );
            }
        }
    }
}

struct PrioDedicatedBinder {
    router: Arc<LaneRouter>,
}

impl DispatcherBinder for PrioDedicatedBinder {
    fn preallocate_resources(&self, _agent: &Arc<AgentCell>) -> Result<()> {
        Ok(())
    }

    fn bind(&self, agent: &Arc<AgentCell>) {
        agent.bind_queue(Arc::<LaneRouter>::clone(&self.router));
    }

    fn undo_preallocation(&self, _agent: &Arc<AgentCell>) {}

    fn unbind(&self, agent: &Arc<AgentCell>) {
        agent.unbind_queue();
    }
}
