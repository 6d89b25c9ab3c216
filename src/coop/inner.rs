// Layer 1: Standard library imports
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

// Layer 2: Third-party crate imports
use parking_lot::Mutex;

// Layer 3: Internal module imports
use super::builder::{Coop, CoopHandle};
use super::DeregNotificator;
use crate::agent::cell::AgentCell;
use crate::agent::ExceptionReaction;
use crate::dispatcher::{BinderRef, DispatcherBinder};
use crate::environment::Environment;
use crate::error::{Result, RuntimeError};
use crate::util::abort_guard::AbortOnPanic;
use crate::util::CoopId;

/// Why a coop is being deregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeregReason {
    /// Ordinary application-driven deregistration.
    Normal,
    /// Environment shutdown.
    Shutdown,
    /// The parent coop started its own deregistration.
    ParentDeregistration,
    /// A handler error with the `DeregCoopOnError` reaction.
    ExceptionReaction,
    /// Application-defined reason code.
    Custom(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum CoopState {
    BeingRegistered,
    Registered,
    DeregStarted,
    ReadyForFinal,
    Destroyed,
}

struct RegisteredAgent {
    cell: Arc<AgentCell>,
    binder: BinderRef,
}

/// A registered coop.
pub(crate) struct CoopInner {
    id: CoopId,
    env: Environment,
    parent: Option<Weak<CoopInner>>,
    state: Mutex<CoopState>,
    agents: Mutex<Vec<RegisteredAgent>>,
    children: Mutex<HashMap<CoopId, Arc<CoopInner>>>,
    working_agents: AtomicUsize,
    living_children: AtomicUsize,
    dereg_notificators: Mutex<Vec<DeregNotificator>>,
    resources: Mutex<Vec<Box<dyn Any + Send + Sync>>>,
    dereg_reason: Mutex<Option<DeregReason>>,
    exception_reaction: ExceptionReaction,
}

impl CoopInner {
    pub(crate) fn id(&self) -> CoopId {
        self.id
    }

    pub(crate) fn exception_reaction(&self) -> ExceptionReaction {
        self.exception_reaction
    }

    pub(crate) fn is_registered(&self) -> bool {
        *self.state.lock() == CoopState::Registered
    }

    pub(crate) fn agent_count(&self) -> usize {
        self.agents.lock().len()
    }

    /// Begin deregistration. Idempotent: a coop already past `Registered`
    /// ignores the call.
    pub(crate) fn start_dereg(self: &Arc<Self>, reason: DeregReason) {
        {
            let mut state = self.state.lock();
            match *state {
                CoopState::Registered => *state = CoopState::DeregStarted,
                _ => return,
            }
            *self.dereg_reason.lock() = Some(reason);
        }

        // Children go down first; their completion gates ours.
        let children: Vec<Arc<CoopInner>> = self.children.lock().values().cloned().collect();
        for child in children {
            child.start_dereg(DeregReason::ParentDeregistration);
        }

        let agents: Vec<Arc<AgentCell>> = self
            .agents
            .lock()
            .iter()
            .map(|a| Arc::clone(&a.cell))
            .collect();
        for agent in agents {
            agent.initiate_finish();
        }

        // A coop with no agents and no children completes immediately.
        self.try_complete();
    }

    /// One agent has executed its finish demand.
    pub(crate) fn agent_finished(self: &Arc<Self>) {
        self.working_agents.fetch_sub(1, Ordering::AcqRel);
        self.try_complete();
    }

    /// One child coop has been fully destroyed.
    fn child_destroyed(self: &Arc<Self>, child: CoopId) {
        self.children.lock().remove(&child);
        self.living_children.fetch_sub(1, Ordering::AcqRel);
        self.try_complete();
    }

    fn try_complete(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if *state != CoopState::DeregStarted
                || self.working_agents.load(Ordering::Acquire) != 0
                || self.living_children.load(Ordering::Acquire) != 0
            {
                return;
            }
            *state = CoopState::ReadyForFinal;
        }
        self.env
            .coop_repository()
            .enqueue_final(Arc::clone(self));
    }

    /// Destroy the coop. Runs on the final-dereg drainer thread only.
    pub(crate) fn finalize(self: &Arc<Self>) {
        let reason = self.dereg_reason.lock().unwrap_or(DeregReason::Normal);

        // Dereg notificators run first, while the coop's id is still
        // meaningful to observers. They must not unwind.
        let notificators: Vec<DeregNotificator> =
            self.dereg_notificators.lock().drain(..).collect();
        for notificator in notificators {
            let guard = AbortOnPanic::new("coop dereg notificator");
            notificator(&self.env, self.id, reason);
            guard.disarm();
        }

        // Agents next: unbind from dispatchers (joining dedicated worker
        // threads is safe here, on a neutral thread), then drop the user
        // objects.
        let agents: Vec<RegisteredAgent> = self.agents.lock().drain(..).collect();
        for agent in &agents {
            agent.binder.unbind(&agent.cell);
        }
        for agent in &agents {
            agent.cell.destroy_user();
        }
        drop(agents);

        // User resources go last, in reverse takeover order.
        {
            let mut resources = self.resources.lock();
            while let Some(resource) = resources.pop() {
                drop(resource);
            }
        }

        *self.state.lock() = CoopState::Destroyed;

        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            parent.child_destroyed(self.id);
        }
        self.env.coop_repository().coop_destroyed(self.id);
        self.env.on_coop_destroyed();
    }
}

/// The coop registration transaction.
///
/// Any failure before the commit point leaves no trace: binder
/// preallocations are undone in reverse order and subscriptions created by
/// `so_define_agent` are withdrawn. No partially-registered coop ever
/// becomes visible.
pub(crate) fn register_coop(env: &Environment, coop: Coop) -> Result<CoopHandle> {
    if !env.registrations_allowed() {
        return Err(RuntimeError::StopInProgress);
    }

    let parent = match &coop.parent {
        Some(handle) => {
            let inner = handle
                .inner
                .upgrade()
                .ok_or(RuntimeError::CoopNotInRegisteredState { coop: handle.id })?;
            if !inner.is_registered() {
                return Err(RuntimeError::CoopNotInRegisteredState { coop: handle.id });
            }
            Some(inner)
        }
        None => None,
    };

    let repo = env.coop_repository();
    let id = repo.next_id();

    let inner = Arc::new(CoopInner {
        id,
        env: env.clone(),
        parent: parent.as_ref().map(Arc::downgrade),
        state: Mutex::new(CoopState::BeingRegistered),
        agents: Mutex::new(
            coop.agents
                .iter()
                .map(|(cell, binder)| RegisteredAgent {
                    cell: Arc::clone(cell),
                    binder: Arc::clone(binder),
                })
                .collect(),
        ),
        children: Mutex::new(HashMap::new()),
        working_agents: AtomicUsize::new(coop.agents.len()),
        living_children: AtomicUsize::new(0),
        dereg_notificators: Mutex::new(coop.dereg_notificators.clone()),
        resources: Mutex::new(coop.resources),
        dereg_reason: Mutex::new(None),
        exception_reaction: coop.exception_reaction,
    });

    let agents = coop.agents;
    for (cell, _) in &agents {
        cell.set_coop(id, Arc::downgrade(&inner));
    }

    // Phase one: preallocate everything that may fail.
    for (index, (cell, binder)) in agents.iter().enumerate() {
        if let Err(error) = binder.preallocate_resources(cell) {
            for (cell, binder) in agents[..index].iter().rev() {
                binder.undo_preallocation(cell);
            }
            return Err(error);
        }
    }

    // so_define_agent for every agent; a failure rolls everything back.
    for (index, (cell, _)) in agents.iter().enumerate() {
        if let Err(error) = cell.run_define() {
            for (cell, _) in agents[..=index].iter() {
                cell.drop_all_subscriptions();
            }
            for (cell, binder) in agents.iter().rev() {
                binder.undo_preallocation(cell);
            }
            return Err(RuntimeError::AgentDefinitionFailed {
                agent: cell.id(),
                message: error.to_string(),
            });
        }
    }

    // Phase two: noexcept binding, then the commit.
    for (cell, binder) in &agents {
        binder.bind(cell);
    }

    repo.add(Arc::clone(&inner), parent.is_none());
    if let Some(parent) = &parent {
        parent.children.lock().insert(id, Arc::clone(&inner));
        parent.living_children.fetch_add(1, Ordering::AcqRel);
    }
    *inner.state.lock() = CoopState::Registered;

    for notificator in &coop.reg_notificators {
        let guard = AbortOnPanic::new("coop reg notificator");
        notificator(env, id);
        guard.disarm();
    }

    for (cell, _) in &agents {
        cell.activate();
    }

    Ok(CoopHandle {
        id,
        inner: Arc::downgrade(&inner),
    })
}
