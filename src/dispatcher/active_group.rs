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
use crate::error::{Result, RuntimeError};
use crate::queue::DemandQueue;

struct GroupEntry {
    queue: Arc<DemandQueue>,
    thread: Arc<WorkThread>,
    activity: Arc<ActivityTracker>,
    agents: usize,
}

/// Named groups of agents, one worker thread per group.
///
/// Agents naming the same group at binding time share one FIFO and one
/// thread; the thread lives while at least one agent of the group does.
pub struct ActiveGroupDispatcher {
    name: String,
    track_activity: bool,
    groups: Mutex<HashMap<String, GroupEntry>>,
}

impl ActiveGroupDispatcher {
    /// Create and start the dispatcher.
    pub fn new(env: &Environment, name: impl Into<String>, params: DispatcherParams) -> Arc<Self> {
        let dispatcher = Arc::new(Self {
            name: name.into(),
            track_activity: params.track_activity,
            groups: Mutex::new(HashMap::new()),
        });
        env.register_dispatcher(Arc::<Self>::clone(&dispatcher));
        dispatcher
    }

    /// A binder placing agents into `group` on this dispatcher.
    pub fn binder(self: &Arc<Self>, group: impl Into<String>) -> Result<BinderRef> {
        let group = group.into();
        if group.is_empty() {
            return Err(RuntimeError::EmptyName);
        }
        Ok(Arc::new(ActiveGroupBinder {
            disp: Arc::<Self>::clone(self),
            group,
        }))
    }

    fn acquire_group(&self, group: &str) -> Arc<DemandQueue> {
        let mut groups = self.groups.lock();
        if let Some(entry) = groups.get_mut(group) {
            entry.agents += 1;
            return Arc::<DemandQueue>::clone(&entry.queue);
        }

        let queue = Arc::new(DemandQueue::new());
        let activity = Arc::new(ActivityTracker::new(self.track_activity));
        let thread = Arc::new(WorkThread::spawn(
            format!("agentry-ag-{}-{group}", self.name),
            {
                let queue = Arc::clone(&queue);
                let activity = Arc::clone(&activity);
                move || drain_loop(queue, activity, DEFAULT_MAX_DEMANDS_AT_ONCE)
            },
        ));
        groups.insert(
            group.to_string(),
            GroupEntry {
                queue: Arc::clone(&queue),
                thread,
                activity,
                agents: 1,
            },
        );
        queue
    }

    fn release_group(&self, group: &str) {
        let entry = {
            let mut groups = self.groups.lock();
            match groups.get_mut(group) {
                Some(entry) => {
                    entry.agents -= 1;
                    if entry.agents == 0 {
                        groups.remove(group)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };
        if let Some(entry) = entry {
            entry.queue.close();
            entry.thread.join();
        }
    }
}

impl Dispatcher for ActiveGroupDispatcher {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn shutdown(&self) {
        let groups: Vec<GroupEntry> = {
            let mut map = self.groups.lock();
            map.drain().map(|(_, entry)| entry).collect()
        };
        for entry in groups {
            entry.queue.close();
            entry.thread.join();
        }
    }

    fn queue_stats(&self, out: &mut dyn FnMut(String, usize)) {
        for (group, entry) in self.groups.lock().iter() {
            out(format!("{}/{group}", self.name), entry.queue.len());
        }
    }

    fn activity_stats(&self, out: &mut dyn FnMut(String, ActivitySnapshot)) {
        for (group, entry) in self.groups.lock().iter() {
            if entry.activity.is_enabled() {
                out(format!("{}/{group}", self.name), entry.activity.snapshot());
            }
        }
    }
}

struct ActiveGroupBinder {
    disp: Arc<ActiveGroupDispatcher>,
    group: String,
}

impl DispatcherBinder for ActiveGroupBinder {
    fn preallocate_resources(&self, _agent: &Arc<AgentCell>) -> Result<()> {
        self.disp.acquire_group(&self.group);
        Ok(())
    }

    fn bind(&self, agent: &Arc<AgentCell>) {
        let queue = self
            .disp
            .groups
            .lock()
            .get(&self.group)
            .map(|entry| Arc::<DemandQueue>::clone(&entry.queue));
        if let Some(queue) = queue {
            agent.bind_queue(queue);
        }
    }

    fn undo_preallocation(&self, _agent: &Arc<AgentCell>) {
        self.disp.release_group(&self.group);
    }

    fn unbind(&self, agent: &Arc<AgentCell>) {
        agent.unbind_queue();
        self.disp.release_group(&self.group);
    }
}
