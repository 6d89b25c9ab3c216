// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

// Layer 2: Third-party crate imports
use parking_lot::{Mutex, RwLock};

// Layer 3: Internal module imports
use super::context::AgentContext;
use super::options::AgentOptions;
use super::state::{self, StateId, StateMachine, TimeLimitExpired};
use super::subscriptions::{
    DeadletterRegistry, FilterRegistry, HandlerAction, SubscriptionStorage,
};
use super::traits::{Agent, AnyAgent, ExceptionReaction};
use crate::coop::{CoopInner, DeregReason};
use crate::environment::Environment;
use crate::error::AgentError;
use crate::mailbox::{DirectMbox, Mailbox, MboxRef};
use crate::message::{envelope, MessageRef};
use crate::msg_tracing::{TraceEvent, TraceStep, TracingHub};
use crate::priority::Priority;
use crate::queue::{DemandKind, EventQueue, ExecutionDemand};
use crate::sink::{AgentSink, LimitControlBlock, SinkRef};
use crate::util::{AgentId, CoopId, MailboxId};

const STATUS_CONSTRUCTED: u8 = 0;
const STATUS_ACTIVE: u8 = 1;
const STATUS_FINISHING: u8 = 2;
const STATUS_FINISHED: u8 = 3;

#[derive(Clone)]
pub(crate) struct CoopBackref {
    pub(crate) id: CoopId,
    pub(crate) inner: Weak<CoopInner>,
}

/// Event-queue binding of one agent.
///
/// Demands delivered between `so_define_agent` (which creates
/// subscriptions) and the registration commit are buffered here, then
/// flushed right after the `Start` demand so that `so_evt_start` is always
/// the first thing the agent executes.
struct QueueBinding {
    queue: Option<Arc<dyn EventQueue>>,
    live: bool,
    buffer: Vec<ExecutionDemand>,
}

pub(crate) struct AgentExclusive {
    pub(crate) user: Option<Box<dyn AnyAgent>>,
    pub(crate) subscriptions: SubscriptionStorage,
    pub(crate) states: StateMachine,
    pub(crate) deadletters: DeadletterRegistry,
    pub(crate) filters: FilterRegistry,
}

/// The framework half of an agent.
///
/// The cell owns what every thread may touch (id, direct mailbox, queue
/// binding, limits, status) directly, and everything bound to the working
/// thread behind an `RwLock`. That lock is also the adv-thread-pool
/// discipline: exclusive handlers take the write side, thread-safe handlers
/// the read side.
pub struct AgentCell {
    id: AgentId,
    env: Environment,
    priority: Priority,
    direct_mbox: MboxRef,
    limits: HashMap<crate::message::TypeKey, Arc<LimitControlBlock>>,
    exception_reaction: Option<ExceptionReaction>,
    status: AtomicU8,
    binding: Mutex<QueueBinding>,
    coop: Mutex<Option<CoopBackref>>,
    exclusive: RwLock<AgentExclusive>,
}

impl AgentCell {
    pub(crate) fn new<A: Agent>(env: &Environment, agent: A, options: &AgentOptions) -> Arc<Self> {
        let id = env.next_agent_id();
        let limits: HashMap<_, _> = options
            .limits
            .iter()
            .cloned()
            .map(|limit| limit.into_control_block())
            .collect();

        Arc::new_cyclic(|weak: &Weak<AgentCell>| {
            let standard: MboxRef = Arc::new(DirectMbox::new(
                env.next_mbox_id(),
                env.clone(),
                env.tracing_hub(),
                weak.clone(),
            ));
            let direct_mbox = match &options.direct_mbox_factory {
                Some(factory) => factory(standard),
                None => standard,
            };

            AgentCell {
                id,
                env: env.clone(),
                priority: options.priority,
                direct_mbox,
                limits,
                exception_reaction: options.exception_reaction,
                status: AtomicU8::new(STATUS_CONSTRUCTED),
                binding: Mutex::new(QueueBinding {
                    queue: None,
                    live: false,
                    buffer: Vec::new(),
                }),
                coop: Mutex::new(None),
                exclusive: RwLock::new(AgentExclusive {
                    user: Some(Box::new(agent)),
                    subscriptions: SubscriptionStorage::new(
                        options.subscription_storage_threshold,
                    ),
                    states: StateMachine::new(),
                    deadletters: DeadletterRegistry::new(),
                    filters: FilterRegistry::new(),
                }),
            }
        })
    }

    // ----- plain accessors -----------------------------------------------

    pub(crate) fn id(&self) -> AgentId {
        self.id
    }

    pub(crate) fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn environment(&self) -> &Environment {
        &self.env
    }

    pub(crate) fn direct_mbox(&self) -> MboxRef {
        Arc::clone(&self.direct_mbox)
    }

    pub(crate) fn direct_mbox_id(&self) -> MailboxId {
        self.direct_mbox.id()
    }

    pub(crate) fn tracing_hub(&self) -> Arc<TracingHub> {
        self.env.tracing_hub()
    }

    pub(crate) fn limit_for(&self, key: crate::message::TypeKey) -> Option<Arc<LimitControlBlock>> {
        self.limits.get(&key).map(Arc::clone)
    }

    pub(crate) fn make_sink(self: &Arc<Self>, key: crate::message::TypeKey) -> SinkRef {
        Arc::new(AgentSink::new(Arc::clone(self), self.limit_for(key)))
    }

    pub(crate) fn set_coop(&self, id: CoopId, inner: Weak<CoopInner>) {
        *self.coop.lock() = Some(CoopBackref { id, inner });
    }

    pub(crate) fn coop_backref(&self) -> Option<CoopBackref> {
        self.coop.lock().clone()
    }

    // ----- queue binding --------------------------------------------------

    pub(crate) fn bind_queue(&self, queue: Arc<dyn EventQueue>) {
        self.binding.lock().queue = Some(queue);
    }

    pub(crate) fn unbind_queue(&self) {
        let mut binding = self.binding.lock();
        binding.queue = None;
        binding.live = false;
    }

    /// Push the `Start` demand and flush buffered deliveries. Called once,
    /// at the end of the registration transaction.
    pub(crate) fn activate(self: &Arc<Self>) {
        self.status.store(STATUS_ACTIVE, Ordering::Release);
        let mut binding = self.binding.lock();
        binding.live = true;
        if let Some(queue) = binding.queue.clone() {
            queue.push(ExecutionDemand::start(Arc::clone(self)));
            for demand in binding.buffer.drain(..) {
                queue.push(demand);
            }
        }
    }

    /// Accept one delivery into the event queue (or the pre-start buffer).
    /// `false` means the agent is past its finish demand.
    pub(crate) fn enqueue_event(
        self: &Arc<Self>,
        limit: Option<Arc<LimitControlBlock>>,
        mbox_id: MailboxId,
        message: MessageRef,
        priority: Priority,
    ) -> bool {
        if self.status.load(Ordering::Acquire) >= STATUS_FINISHING {
            return false;
        }
        let demand = ExecutionDemand::event(Arc::clone(self), limit, mbox_id, message, priority);
        let mut binding = self.binding.lock();
        if !binding.live {
            binding.buffer.push(demand);
            return true;
        }
        match binding.queue.clone() {
            Some(queue) => {
                drop(binding);
                queue.push(demand);
                true
            }
            None => false,
        }
    }

    /// Schedule the `Finish` demand. Idempotent.
    pub(crate) fn initiate_finish(self: &Arc<Self>) {
        if self
            .status
            .compare_exchange(
                STATUS_ACTIVE,
                STATUS_FINISHING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }
        let queue = self.binding.lock().queue.clone();
        if let Some(queue) = queue {
            queue.push_finish(ExecutionDemand::finish(Arc::clone(self)));
        }
    }


    /// Drop the user object. Runs on the final-dereg drainer thread.
    pub(crate) fn destroy_user(&self) {
        self.exclusive.write().user = None;
    }

    /// Deregister the owning coop from inside a handler or hook.
    pub(crate) fn initiate_coop_dereg(&self, reason: DeregReason) {
        if let Some(backref) = self.coop_backref() {
            if let Some(coop) = backref.inner.upgrade() {
                coop.start_dereg(reason);
            }
        }
    }

    // ----- demand execution ----------------------------------------------

    /// Execute one demand with exclusive access to the agent.
    pub(crate) fn exec_demand(self: &Arc<Self>, demand: ExecutionDemand) {
        match demand.kind {
            DemandKind::Start => self.run_start(),
            DemandKind::Finish => self.run_finish(),
            DemandKind::Event => self.dispatch_event(demand),
        }
    }

    /// True when the demand resolves to a thread-safe handler under the
    /// current state. Used by `adv_thread_pool` to pick the lock side.
    pub(crate) fn demand_is_thread_safe(&self, demand: &ExecutionDemand) -> bool {
        if demand.kind != DemandKind::Event {
            return false;
        }
        let Some(message) = &demand.message else {
            return false;
        };
        let key = message.key();
        if state::is_internal_key(key) {
            return false;
        }
        let excl = self.exclusive.read();
        let path = excl.states.current_path();
        excl.subscriptions
            .find_on_path(demand.mbox_id, key, &path)
            .map(|(_, action)| action.is_shared())
            .unwrap_or(false)
    }

    /// Execute an event demand under the read lock; only legal when
    /// [`AgentCell::demand_is_thread_safe`] said so and the dispatcher's
    /// gate keeps exclusive demands out meanwhile.
    pub(crate) fn exec_demand_shared(self: &Arc<Self>, demand: ExecutionDemand) {
        if let Some(block) = &demand.limit {
            block.release();
        }
        let Some(message) = demand.message else {
            return;
        };
        let key = message.key();
        let error = {
            let excl = self.exclusive.read();
            let Some(user) = excl.user.as_ref() else {
                return;
            };
            let path = excl.states.current_path();
            match excl
                .subscriptions
                .find_on_path(demand.mbox_id, key, &path)
            {
                Some((_, HandlerAction::Shared(handler))) => {
                    self.tracing_hub().emit(&message, || {
                        TraceEvent::new(
                            TraceStep::HandlerFound,
                            demand.mbox_id.raw(),
                            key.type_name(),
                        )
                        .with_agent(self.id.raw())
                    });
                    match envelope::payload_for_handler(&message) {
                        Some(payload) => handler(user.as_any_ref(), &payload).err(),
                        None => None,
                    }
                }
                _ => None,
            }
        };
        if let Some(error) = error {
            self.handle_handler_error(error);
        }
    }

    fn run_start(self: &Arc<Self>) {
        let mut error: Option<AgentError> = None;
        {
            let mut guard = self.exclusive.write();
            let excl = &mut *guard;
            let pending = {
                let AgentExclusive {
                    user,
                    subscriptions,
                    states,
                    deadletters,
                    filters,
                } = excl;
                let Some(user) = user.as_mut() else {
                    return;
                };
                let mut ctx = AgentContext {
                    cell: self,
                    subscriptions,
                    states,
                    deadletters,
                    filters,
                    pending_state: None,
                };
                let result = user.so_evt_start(&mut ctx);
                let pending = ctx.pending_state;
                if let Err(e) = result {
                    error = Some(e);
                }
                pending
            };
            if let Err(e) = self.apply_pending(excl, pending) {
                error.get_or_insert_with(|| Box::new(e));
            }
        }
        if let Some(error) = error {
            self.handle_handler_error(error);
        }
    }

    fn run_finish(self: &Arc<Self>) {
        let mut error: Option<AgentError> = None;
        {
            let mut guard = self.exclusive.write();
            let excl = &mut *guard;
            {
                let AgentExclusive {
                    user,
                    subscriptions,
                    states,
                    deadletters,
                    filters,
                } = excl;
                if let Some(user) = user.as_mut() {
                    let mut ctx = AgentContext {
                        cell: self,
                        subscriptions,
                        states,
                        deadletters,
                        filters,
                        pending_state: None,
                    };
                    if let Err(e) = user.so_evt_finish(&mut ctx) {
                        error = Some(e);
                    }
                }
            }

            // Teardown: withdraw this agent from every mailbox it touched.
            excl.states.limit_timer = None;
            let pairs = excl.subscriptions.referenced_pairs();
            let dead_pairs = excl.deadletters.referenced_pairs();
            excl.subscriptions.clear();
            excl.deadletters.clear();
            let filters = excl.filters.drain();
            drop(guard);

            for (mbox, key) in pairs.into_iter().chain(dead_pairs) {
                mbox.unsubscribe(key, &self.make_sink(key));
            }
            for (mbox, key) in filters {
                mbox.drop_delivery_filter(key, &self.make_sink(key));
            }
        }
        self.status.store(STATUS_FINISHED, Ordering::Release);

        if let Some(error) = error {
            // so_evt_finish failures are logged but cannot change the
            // agent's fate: it is already past the point of no return.
            self.env
                .error_logger()
                .log(error.as_ref(), self.id, self.coop_backref().map(|c| c.id));
        }

        if let Some(backref) = self.coop_backref() {
            if let Some(coop) = backref.inner.upgrade() {
                coop.agent_finished();
            }
        }
    }

    fn dispatch_event(self: &Arc<Self>, demand: ExecutionDemand) {
        if let Some(block) = &demand.limit {
            block.release();
        }
        let Some(message) = demand.message else {
            return;
        };
        let key = message.key();
        let hub = self.tracing_hub();

        if state::is_internal_key(key) {
            self.handle_time_limit(&message);
            return;
        }

        let mut error: Option<AgentError> = None;
        {
            let mut guard = self.exclusive.write();
            let excl = &mut *guard;
            if excl.user.is_none() {
                return;
            }

            let mut visited: Vec<StateId> = Vec::new();
            loop {
                let path = excl.states.current_path();
                let found = excl
                    .subscriptions
                    .find_on_path(demand.mbox_id, key, &path);
                match found {
                    Some((_, HandlerAction::Transfer(target))) => {
                        let current = excl.states.current();
                        if visited.contains(&current) {
                            error = Some(Box::new(
                                crate::error::RuntimeError::TransferToStateLoop {
                                    agent: self.id,
                                    type_name: key.type_name(),
                                    state: excl.states.name_of(current).to_string(),
                                },
                            ));
                            break;
                        }
                        visited.push(current);
                        hub.emit(&message, || {
                            TraceEvent::new(
                                TraceStep::TransferToState,
                                demand.mbox_id.raw(),
                                key.type_name(),
                            )
                            .with_agent(self.id.raw())
                        });
                        if let Err(e) = self.apply_transition(excl, target) {
                            error = Some(Box::new(e));
                            break;
                        }
                        continue;
                    }
                    Some((_, HandlerAction::JustSwitch(target))) => {
                        if let Err(e) = self.apply_transition(excl, target) {
                            error = Some(Box::new(e));
                        }
                        break;
                    }
                    Some((_, HandlerAction::Suppress)) => break,
                    Some((_, HandlerAction::Exclusive(handler))) => {
                        hub.emit(&message, || {
                            TraceEvent::new(
                                TraceStep::HandlerFound,
                                demand.mbox_id.raw(),
                                key.type_name(),
                            )
                            .with_agent(self.id.raw())
                        });
                        error = self.invoke_exclusive(excl, &handler, &message);
                        break;
                    }
                    Some((_, HandlerAction::Shared(handler))) => {
                        hub.emit(&message, || {
                            TraceEvent::new(
                                TraceStep::HandlerFound,
                                demand.mbox_id.raw(),
                                key.type_name(),
                            )
                            .with_agent(self.id.raw())
                        });
                        if let Some(payload) = envelope::payload_for_handler(&message) {
                            if let Some(user) = excl.user.as_ref() {
                                if let Err(e) = handler(user.as_any_ref(), &payload) {
                                    error = Some(e);
                                }
                            }
                        }
                        break;
                    }
                    None => {
                        let dead = excl
                            .deadletters
                            .find(demand.mbox_id, key)
                            .map(|entry| entry.action.clone());
                        match dead {
                            Some(HandlerAction::Exclusive(handler)) => {
                                hub.emit(&message, || {
                                    TraceEvent::new(
                                        TraceStep::DeadletterHandlerFound,
                                        demand.mbox_id.raw(),
                                        key.type_name(),
                                    )
                                    .with_agent(self.id.raw())
                                });
                                error = self.invoke_exclusive(excl, &handler, &message);
                            }
                            _ => {
                                hub.emit(&message, || {
                                    TraceEvent::new(
                                        TraceStep::HandlerNotFound,
                                        demand.mbox_id.raw(),
                                        key.type_name(),
                                    )
                                    .with_agent(self.id.raw())
                                });
                            }
                        }
                        break;
                    }
                }
            }
        }

        if let Some(error) = error {
            self.handle_handler_error(error);
        }
    }

    fn invoke_exclusive(
        self: &Arc<Self>,
        excl: &mut AgentExclusive,
        handler: &Arc<super::subscriptions::ExclusiveHandlerFn>,
        message: &MessageRef,
    ) -> Option<AgentError> {
        let Some(payload) = envelope::payload_for_handler(message) else {
            return None;
        };
        let mut error: Option<AgentError> = None;
        let pending = {
            let AgentExclusive {
                user,
                subscriptions,
                states,
                deadletters,
                filters,
            } = excl;
            let Some(user) = user.as_mut() else {
                return None;
            };
            let mut ctx = AgentContext {
                cell: self,
                subscriptions,
                states,
                deadletters,
                filters,
                pending_state: None,
            };
            let result = handler(user.as_any_mut(), &mut ctx, &payload);
            let pending = ctx.pending_state;
            if let Err(e) = result {
                error = Some(e);
            }
            pending
        };
        if let Err(e) = self.apply_pending(excl, pending) {
            error.get_or_insert_with(|| Box::new(e));
        }
        error
    }

    fn handle_time_limit(self: &Arc<Self>, message: &MessageRef) {
        let Some(expired) = message.downcast_ref::<TimeLimitExpired>() else {
            return;
        };
        let mut error = None;
        {
            let mut guard = self.exclusive.write();
            let excl = &mut *guard;
            if excl.user.is_none() {
                return;
            }
            if expired.token != excl.states.limit_token || !excl.states.is_in(expired.state) {
                return;
            }
            let Some((_, _, target)) = excl.states.active_time_limit(excl.states.current()) else {
                return;
            };
            if let Err(e) = self.apply_transition(excl, target) {
                error = Some(e);
            }
        }
        if let Some(e) = error {
            self.handle_handler_error(Box::new(e));
        }
    }

    fn apply_pending(
        self: &Arc<Self>,
        excl: &mut AgentExclusive,
        pending: Option<StateId>,
    ) -> crate::error::Result<()> {
        match pending {
            Some(target) => self.apply_transition(excl, target),
            None => Ok(()),
        }
    }

    /// Run one state transition: exits to the LCA, pointer move, descent,
    /// entries, time-limit arming.
    fn apply_transition(
        self: &Arc<Self>,
        excl: &mut AgentExclusive,
        target: StateId,
    ) -> crate::error::Result<()> {
        let plan = excl.states.plan_transition(target)?;

        for id in &plan.exits {
            let action = excl.states.node(*id).on_exit.clone();
            if let (Some(action), Some(user)) = (action, excl.user.as_mut()) {
                action(user.as_any_mut());
            }
        }

        excl.states.set_current(plan.leaf);

        for id in &plan.enters {
            let action = excl.states.node(*id).on_enter.clone();
            if let (Some(action), Some(user)) = (action, excl.user.as_mut()) {
                action(user.as_any_mut());
            }
        }

        // Re-arm the time limit. Dropping the previous handle cancels it;
        // the token recognizes stale timeout messages already in flight.
        excl.states.limit_timer = None;
        excl.states.limit_token = excl.states.limit_token.wrapping_add(1);
        if let Some((state_id, duration, _)) = excl.states.active_time_limit(plan.leaf) {
            let token = excl.states.limit_token;
            let message = MessageRef::message(TimeLimitExpired {
                state: state_id,
                token,
            });
            let handle =
                self.env
                    .schedule_timer_message(duration, None, message, self.direct_mbox());
            excl.states.limit_timer = handle;
        }
        Ok(())
    }

    /// Run `so_define_agent`. Called on the registering thread during the
    /// coop registration transaction.
    pub(crate) fn run_define(self: &Arc<Self>) -> Result<(), AgentError> {
        let mut guard = self.exclusive.write();
        let excl = &mut *guard;
        let pending = {
            let AgentExclusive {
                user,
                subscriptions,
                states,
                deadletters,
                filters,
            } = excl;
            let Some(user) = user.as_mut() else {
                return Ok(());
            };
            let mut ctx = AgentContext {
                cell: self,
                subscriptions,
                states,
                deadletters,
                filters,
                pending_state: None,
            };
            let result = user.so_define_agent(&mut ctx);
            let pending = ctx.pending_state;
            result?;
            pending
        };
        self.apply_pending(excl, pending).map_err(|e| {
            let boxed: AgentError = Box::new(e);
            boxed
        })
    }

    /// Withdraw all subscriptions; used when a registration is rolled back
    /// after `so_define_agent` already ran.
    pub(crate) fn drop_all_subscriptions(self: &Arc<Self>) {
        let (pairs, filters) = {
            let mut guard = self.exclusive.write();
            let excl = &mut *guard;
            let mut pairs = excl.subscriptions.referenced_pairs();
            pairs.extend(excl.deadletters.referenced_pairs());
            excl.subscriptions.clear();
            excl.deadletters.clear();
            (pairs, excl.filters.drain())
        };
        for (mbox, key) in pairs {
            mbox.unsubscribe(key, &self.make_sink(key));
        }
        for (mbox, key) in filters {
            mbox.drop_delivery_filter(key, &self.make_sink(key));
        }
    }

    fn handle_handler_error(self: &Arc<Self>, error: AgentError) {
        let backref = self.coop_backref();
        self.env
            .error_logger()
            .log(error.as_ref(), self.id, backref.as_ref().map(|c| c.id));

        let coop = backref.and_then(|b| b.inner.upgrade());
        let reaction = self
            .exception_reaction
            .or_else(|| coop.as_ref().map(|c| c.exception_reaction()))
            .unwrap_or(ExceptionReaction::ShutdownEnvOnError);

        match reaction {
            ExceptionReaction::Abort => {
                eprintln!("agentry: unhandled agent error on agent {}; aborting", self.id);
                std::process::abort();
            }
            ExceptionReaction::ShutdownEnvOnError => self.env.stop(),
            ExceptionReaction::DeregCoopOnError => {
                if let Some(coop) = coop {
                    coop.start_dereg(DeregReason::ExceptionReaction);
                }
            }
            ExceptionReaction::Ignore => {}
        }
    }
}

