// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 3: Internal module imports
use super::activity::ActivitySnapshot;
use crate::agent::cell::AgentCell;
use crate::error::Result;

/// Shared handle to a binder.
pub type BinderRef = Arc<dyn DispatcherBinder>;

/// A running dispatcher, as the environment sees it.
///
/// The environment keeps every dispatcher created against it and shuts
/// them down, in reverse creation order, during the final stop phase.
pub trait Dispatcher: Send + Sync + 'static {
    /// Diagnostic name; also the prefix of stats quantities.
    fn name(&self) -> String;

    /// Stop worker threads and join them. Idempotent.
    fn shutdown(&self);

    /// Report current demand-queue sizes.
    fn queue_stats(&self, _out: &mut dyn FnMut(String, usize)) {}

    /// Report per-thread activity snapshots, when tracking is on.
    fn activity_stats(&self, _out: &mut dyn FnMut(String, ActivitySnapshot)) {}
}

/// The glue installing an agent's event queue during registration.
///
/// Registration is a two-phase transaction. `preallocate_resources` runs
/// for every agent of the coop and may fail; on any failure every earlier
/// preallocation is undone in reverse order and the registration aborts.
/// Once all preallocations succeed, `bind` runs for every agent and must
/// not fail. `unbind` releases the resources when the coop is destroyed.
pub trait DispatcherBinder: Send + Sync + 'static {
    /// Reserve whatever the agent needs (thread, queue, slot). May fail.
    fn preallocate_resources(&self, agent: &Arc<AgentCell>) -> Result<()>;

    /// Install the agent's event-queue binding. Must not fail.
    fn bind(&self, agent: &Arc<AgentCell>);

    /// Roll one successful preallocation back.
    fn undo_preallocation(&self, agent: &Arc<AgentCell>);

    /// Release the agent's resources at coop destruction.
    fn unbind(&self, agent: &Arc<AgentCell>);
}

/// Common construction parameters of the simple dispatchers.
#[derive(Debug, Clone, Default)]
pub struct DispatcherParams {
    pub(crate) track_activity: bool,
}

impl DispatcherParams {
    /// Defaults: no activity tracking.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle per-thread work/wait activity tracking.
    pub fn track_activity(mut self, on: bool) -> Self {
        self.track_activity = on;
        self
    }
}
