// Layer 1: Standard library imports
use std::any::Any;
use std::sync::{Arc, Weak};

// Layer 3: Internal module imports
use super::inner::CoopInner;
use super::{DeregNotificator, RegNotificator};
use crate::agent::cell::AgentCell;
use crate::agent::{Agent, AgentOptions, ExceptionReaction};
use crate::coop::DeregReason;
use crate::dispatcher::BinderRef;
use crate::environment::Environment;
use crate::mailbox::MboxRef;
use crate::util::CoopId;

/// Handle to a registered coop.
///
/// Cheap to clone; holding one does not keep the coop alive. Used with
/// [`Environment::deregister_coop`](crate::environment::Environment::deregister_coop).
#[derive(Clone)]
pub struct CoopHandle {
    pub(crate) id: CoopId,
    pub(crate) inner: Weak<CoopInner>,
}

impl CoopHandle {
    /// The coop's id.
    pub fn id(&self) -> CoopId {
        self.id
    }
}

impl std::fmt::Debug for CoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoopHandle").field("id", &self.id).finish()
    }
}

/// A coop under construction.
///
/// Create one with [`Environment::make_coop`], add agents and resources,
/// then hand it to [`Environment::register_coop`]. Nothing runs until
/// registration commits.
///
/// [`Environment::make_coop`]: crate::environment::Environment::make_coop
/// [`Environment::register_coop`]: crate::environment::Environment::register_coop
pub struct Coop {
    pub(crate) env: Environment,
    pub(crate) parent: Option<CoopHandle>,
    pub(crate) default_binder: BinderRef,
    pub(crate) agents: Vec<(Arc<AgentCell>, BinderRef)>,
    pub(crate) reg_notificators: Vec<RegNotificator>,
    pub(crate) dereg_notificators: Vec<DeregNotificator>,
    pub(crate) resources: Vec<Box<dyn Any + Send + Sync>>,
    pub(crate) exception_reaction: ExceptionReaction,
}

impl Coop {
    pub(crate) fn new(env: Environment, parent: Option<CoopHandle>, binder: BinderRef) -> Self {
        Self {
            env,
            parent,
            default_binder: binder,
            agents: Vec::new(),
            reg_notificators: Vec::new(),
            dereg_notificators: Vec::new(),
            resources: Vec::new(),
            exception_reaction: ExceptionReaction::ShutdownEnvOnError,
        }
    }

    /// Add an agent with default options and the coop's default binder.
    /// Returns the agent's direct mailbox.
    pub fn add_agent<A: Agent>(&mut self, agent: A) -> MboxRef {
        self.add_agent_full(agent, AgentOptions::default(), None)
    }

    /// Add an agent with explicit options.
    pub fn add_agent_with_options<A: Agent>(&mut self, agent: A, options: AgentOptions) -> MboxRef {
        self.add_agent_full(agent, options, None)
    }

    /// Add an agent bound through `binder` instead of the coop default.
    pub fn add_agent_with_binder<A: Agent>(&mut self, agent: A, binder: BinderRef) -> MboxRef {
        self.add_agent_full(agent, AgentOptions::default(), Some(binder))
    }

    /// Add an agent with explicit options and binder.
    pub fn add_agent_full<A: Agent>(
        &mut self,
        agent: A,
        options: AgentOptions,
        binder: Option<BinderRef>,
    ) -> MboxRef {
        let cell = AgentCell::new(&self.env, agent, &options);
        let mbox = cell.direct_mbox();
        let binder = binder.unwrap_or_else(|| Arc::clone(&self.default_binder));
        self.agents.push((cell, binder));
        mbox
    }

    /// Move `resource` under the coop's control.
    ///
    /// The coop keeps the resource alive until its own destruction; taken
    /// resources are dropped in reverse takeover order, after the coop's
    /// agents. The returned `Arc` is how agents reach the resource.
    pub fn take_under_control<T: Send + Sync + 'static>(&mut self, resource: T) -> Arc<T> {
        let shared = Arc::new(resource);
        self.resources.push(Box::new(Arc::clone(&shared)));
        shared
    }

    /// Run `notificator` right after the coop becomes registered.
    /// Notificators must not panic.
    pub fn add_reg_notificator(
        &mut self,
        notificator: impl Fn(&Environment, CoopId) + Send + Sync + 'static,
    ) {
        self.reg_notificators.push(Arc::new(notificator));
    }

    /// Run `notificator` while the coop is destroyed, with the reason the
    /// deregistration was started with. Notificators must not panic.
    pub fn add_dereg_notificator(
        &mut self,
        notificator: impl Fn(&Environment, CoopId, DeregReason) + Send + Sync + 'static,
    ) {
        self.dereg_notificators.push(Arc::new(notificator));
    }

    /// Exception reaction inherited by agents that do not override it.
    pub fn set_exception_reaction(&mut self, reaction: ExceptionReaction) {
        self.exception_reaction = reaction;
    }

    /// Number of agents added so far.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}
