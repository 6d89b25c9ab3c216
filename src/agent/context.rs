// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 3: Internal module imports
use super::cell::AgentCell;
use super::state::{State, StateId, StateMachine, DEFAULT_STATE};
use super::subscriptions::{
    DeadletterRegistry, ExclusiveHandlerFn, FilterRegistry, HandlerAction, SharedHandlerFn,
    SubscriptionEntry, SubscriptionKey, SubscriptionStorage,
};
use super::traits::{Agent, IntoHandlerResult};
use crate::coop::DeregReason;
use crate::environment::Environment;
use crate::error::{AgentError, Result, RuntimeError};
use crate::mailbox::{FilterRef, Mailbox, MboxRef};
use crate::message::envelope::{open_envelope, AccessContext as EnvelopeAccess};
use crate::message::{Message, MessageRef, Signal, TypeKey};
use crate::util::AgentId;

fn type_mismatch<A>() -> AgentError {
    Box::new(RuntimeError::AgentTypeMismatch {
        agent: AgentId::from_raw(0),
        expected: std::any::type_name::<A>(),
    })
}

fn payload_missing(type_name: &'static str) -> AgentError {
    Box::new(RuntimeError::EnvelopePayloadMissing { type_name })
}

/// The window through which an agent talks to the runtime.
///
/// A context exists only while a hook or an exclusive event handler runs;
/// it borrows the agent's private storage mutably, which is what makes
/// subscription and state mutation race-free without extra locking.
/// Thread-safe handlers never receive one.
pub struct AgentContext<'a> {
    pub(crate) cell: &'a Arc<AgentCell>,
    pub(crate) subscriptions: &'a mut SubscriptionStorage,
    pub(crate) states: &'a mut StateMachine,
    pub(crate) deadletters: &'a mut DeadletterRegistry,
    pub(crate) filters: &'a mut FilterRegistry,
    /// State change requested by the running handler; applied after the
    /// handler returns, before the next demand is fetched.
    pub(crate) pending_state: Option<StateId>,
}

impl<'a> AgentContext<'a> {
    /// The environment this agent runs in.
    pub fn so_environment(&self) -> &Environment {
        self.cell.environment()
    }

    /// The agent's direct (MPSC) mailbox.
    pub fn so_direct_mbox(&self) -> MboxRef {
        self.cell.direct_mbox()
    }

    /// This agent's id.
    pub fn so_agent_id(&self) -> AgentId {
        self.cell.id()
    }

    // ----- states ---------------------------------------------------------

    /// The default state every agent starts in.
    pub fn so_default_state(&self) -> State {
        State::default_state()
    }

    /// Define a new top-level state.
    pub fn so_define_state(&mut self, name: &str) -> State {
        State {
            id: self.states.define(name, None),
        }
    }

    /// Define a substate of `parent`.
    pub fn so_define_substate(&mut self, name: &str, parent: &State) -> State {
        State {
            id: self.states.define(name, Some(parent.id)),
        }
    }

    /// Define a substate of `parent` and make it the initial one, unless
    /// the parent already has an initial substate.
    pub fn so_define_initial_substate(&mut self, name: &str, parent: &State) -> State {
        let child = self.so_define_substate(name, parent);
        self.states.set_initial_substate(parent.id, child.id);
        child
    }

    /// Configure a state: entry/exit actions, time limit, intermediate
    /// handlers.
    pub fn so_state(&mut self, state: &State) -> StateBuilder<'_, 'a> {
        StateBuilder {
            ctx: self,
            state: state.id,
        }
    }

    /// The current leaf state.
    pub fn so_current_state(&self) -> State {
        State {
            id: self.states.current(),
        }
    }

    /// True when `state` lies on the path from the current leaf to the root.
    pub fn so_is_in_state(&self, state: &State) -> bool {
        self.states.is_in(state.id)
    }

    /// Name of a state, for diagnostics.
    pub fn so_state_name(&self, state: &State) -> String {
        self.states.name_of(state.id).to_string()
    }

    /// Request a transition to `state`.
    ///
    /// The target is validated now (a composite state needs an initial
    /// substate); exit/entry actions run after the current handler returns
    /// and before the next demand of this agent is fetched.
    pub fn so_change_state(&mut self, state: &State) -> Result<()> {
        self.states.resolve_leaf(state.id)?;
        self.pending_state = Some(state.id);
        Ok(())
    }

    // ----- subscriptions --------------------------------------------------

    /// Start a subscription on `mbox`.
    pub fn so_subscribe(&mut self, mbox: &MboxRef) -> SubscriptionBuilder<'_, 'a> {
        SubscriptionBuilder {
            mbox: Arc::clone(mbox),
            states: Vec::new(),
            ctx: self,
        }
    }

    /// Start a subscription on the agent's own direct mailbox.
    pub fn so_subscribe_self(&mut self) -> SubscriptionBuilder<'_, 'a> {
        let mbox = self.cell.direct_mbox();
        SubscriptionBuilder {
            mbox,
            states: Vec::new(),
            ctx: self,
        }
    }

    /// Drop the subscription of `M` on `mbox` in `state`.
    pub fn so_drop_subscription<M: Message>(&mut self, mbox: &MboxRef, state: &State) {
        self.drop_subscription_key(TypeKey::immutable::<M>(), mbox, state.id);
    }

    /// Drop the subscription of signal `S` on `mbox` in `state`.
    pub fn so_drop_subscription_signal<S: Signal>(&mut self, mbox: &MboxRef, state: &State) {
        self.drop_subscription_key(TypeKey::signal::<S>(), mbox, state.id);
    }

    /// Drop the subscription of mutable `M` on `mbox` in `state`.
    pub fn so_drop_subscription_mutable<M: Message>(&mut self, mbox: &MboxRef, state: &State) {
        self.drop_subscription_key(TypeKey::mutable::<M>(), mbox, state.id);
    }

    /// Drop the subscriptions of `M` on `mbox` in every state.
    pub fn so_drop_subscription_for_all_states<M: Message>(&mut self, mbox: &MboxRef) {
        let key = TypeKey::immutable::<M>();
        self.subscriptions.remove_all_states(mbox.id(), key);
        self.release_mbox_if_unused(mbox, key);
    }

    /// Drop the subscriptions of signal `S` on `mbox` in every state.
    pub fn so_drop_subscription_for_all_states_signal<S: Signal>(&mut self, mbox: &MboxRef) {
        let key = TypeKey::signal::<S>();
        self.subscriptions.remove_all_states(mbox.id(), key);
        self.release_mbox_if_unused(mbox, key);
    }

    /// Is `M` subscribed on `mbox` (in `state`, or in any state)?
    pub fn so_has_subscription<M: Message>(&self, mbox: &MboxRef, state: Option<&State>) -> bool {
        self.subscriptions.has_subscription(
            mbox.id(),
            TypeKey::immutable::<M>(),
            state.map(|s| s.id),
        )
    }

    /// Is signal `S` subscribed on `mbox` (in `state`, or in any state)?
    pub fn so_has_subscription_signal<S: Signal>(
        &self,
        mbox: &MboxRef,
        state: Option<&State>,
    ) -> bool {
        self.subscriptions
            .has_subscription(mbox.id(), TypeKey::signal::<S>(), state.map(|s| s.id))
    }

    fn drop_subscription_key(&mut self, key: TypeKey, mbox: &MboxRef, state: StateId) {
        let sub_key = SubscriptionKey {
            mbox: mbox.id(),
            type_key: key,
            state,
        };
        if self.subscriptions.remove(&sub_key).is_some() {
            self.release_mbox_if_unused(mbox, key);
        }
    }

    fn release_mbox_if_unused(&mut self, mbox: &MboxRef, key: TypeKey) {
        if self.subscriptions.usage_count(mbox.id(), key) == 0
            && !self.deadletters.contains(mbox.id(), key)
        {
            mbox.unsubscribe(key, &self.cell.make_sink(key));
        }
    }

    pub(crate) fn install(
        &mut self,
        mbox: MboxRef,
        key: TypeKey,
        states: Vec<StateId>,
        action: HandlerAction,
    ) -> Result<()> {
        let states = if states.is_empty() {
            vec![DEFAULT_STATE]
        } else {
            states
        };

        for state in &states {
            let sub_key = SubscriptionKey {
                mbox: mbox.id(),
                type_key: key,
                state: *state,
            };
            if self.subscriptions.contains(&sub_key) {
                return Err(RuntimeError::SubscriptionDuplicate {
                    mbox: mbox.id(),
                    type_name: key.type_name(),
                    state: self.states.name_of(*state).to_string(),
                });
            }
        }

        if self.subscriptions.usage_count(mbox.id(), key) == 0
            && !self.deadletters.contains(mbox.id(), key)
        {
            mbox.subscribe(key, self.cell.make_sink(key))?;
        }

        for state in states {
            self.subscriptions.insert(
                SubscriptionKey {
                    mbox: mbox.id(),
                    type_key: key,
                    state,
                },
                SubscriptionEntry {
                    mbox_ref: Arc::clone(&mbox),
                    action: action.clone(),
                },
            );
        }
        Ok(())
    }

    // ----- deadletter handlers -------------------------------------------

    /// Install the deadletter handler for `M` on `mbox`.
    ///
    /// It runs when a delivered message finds no handler on the current
    /// state path, regardless of the state.
    pub fn so_subscribe_deadletter<A, M, F, R>(&mut self, mbox: &MboxRef, handler: F) -> Result<()>
    where
        A: Agent,
        M: Message,
        F: Fn(&mut A, &M) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let key = TypeKey::immutable::<M>();
        if self.deadletters.contains(mbox.id(), key) {
            return Err(RuntimeError::SubscriptionDuplicate {
                mbox: mbox.id(),
                type_name: key.type_name(),
                state: "<deadletter>".to_string(),
            });
        }
        if self.subscriptions.usage_count(mbox.id(), key) == 0 {
            mbox.subscribe(key, self.cell.make_sink(key))?;
        }
        let erased: Arc<ExclusiveHandlerFn> = Arc::new(move |user, _ctx, msg| {
            let agent = user.downcast_mut::<A>().ok_or_else(type_mismatch::<A>)?;
            let m = msg
                .downcast_ref::<M>()
                .ok_or_else(|| payload_missing(std::any::type_name::<M>()))?;
            handler(agent, m).into_handler_result()
        });
        self.deadletters.insert(
            mbox.id(),
            key,
            SubscriptionEntry {
                mbox_ref: Arc::clone(mbox),
                action: HandlerAction::Exclusive(erased),
            },
        );
        Ok(())
    }

    /// Remove the deadletter handler for `M` on `mbox`.
    pub fn so_drop_deadletter_handler<M: Message>(&mut self, mbox: &MboxRef) {
        let key = TypeKey::immutable::<M>();
        if self.deadletters.remove(mbox.id(), key).is_some() {
            self.release_mbox_if_unused(mbox, key);
        }
    }

    // ----- delivery filters ----------------------------------------------

    /// Install (or replace) this agent's delivery filter for `M` on `mbox`.
    ///
    /// The predicate runs inside `deliver`, on whatever thread sends; keep
    /// it pure and fast. Enveloped messages are inspected through the
    /// envelope's access hook.
    pub fn so_set_delivery_filter<M, F>(&mut self, mbox: &MboxRef, predicate: F) -> Result<()>
    where
        M: Message,
        F: Fn(&M) -> bool + Send + Sync + 'static,
    {
        let key = TypeKey::immutable::<M>();
        let erased: FilterRef = Arc::new(move |msg: &MessageRef| {
            if let Some(m) = msg.downcast_ref::<M>() {
                return predicate(m);
            }
            if let Some(envelope) = msg.as_envelope() {
                if let Some(payload) = open_envelope(envelope, EnvelopeAccess::Inspection) {
                    if let Some(m) = payload.downcast_ref::<M>() {
                        return predicate(m);
                    }
                }
            }
            true
        });
        mbox.set_delivery_filter(key, erased, &self.cell.make_sink(key))?;
        self.filters.record(mbox, key);
        Ok(())
    }

    /// Remove this agent's delivery filter for `M` on `mbox`.
    pub fn so_drop_delivery_filter<M: Message>(&mut self, mbox: &MboxRef) {
        let key = TypeKey::immutable::<M>();
        mbox.drop_delivery_filter(key, &self.cell.make_sink(key));
        self.filters.forget(mbox, key);
    }

    // ----- lifecycle ------------------------------------------------------

    /// Deregister the coop this agent belongs to.
    pub fn so_deregister_agent_coop(&self, reason: DeregReason) {
        self.cell.initiate_coop_dereg(reason);
    }

    /// Deregister the coop with the `Normal` reason.
    pub fn so_deregister_agent_coop_normally(&self) {
        self.so_deregister_agent_coop(DeregReason::Normal);
    }
}

/// Builder returned by [`AgentContext::so_subscribe`].
///
/// Collects target states (`in_state`), then registers one handler. With
/// no explicit state the subscription lands in the default state.
pub struct SubscriptionBuilder<'c, 'a> {
    ctx: &'c mut AgentContext<'a>,
    mbox: MboxRef,
    states: Vec<StateId>,
}

impl<'c, 'a> SubscriptionBuilder<'c, 'a> {
    /// Add a target state. May be called several times.
    pub fn in_state(mut self, state: &State) -> Self {
        self.states.push(state.id);
        self
    }

    /// Final handler for immutable messages of type `M`.
    pub fn event<A, M, F, R>(self, handler: F) -> Result<()>
    where
        A: Agent,
        M: Message,
        F: Fn(&mut A, &M) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let erased: Arc<ExclusiveHandlerFn> = Arc::new(move |user, _ctx, msg| {
            let agent = user.downcast_mut::<A>().ok_or_else(type_mismatch::<A>)?;
            let m = msg
                .downcast_ref::<M>()
                .ok_or_else(|| payload_missing(std::any::type_name::<M>()))?;
            handler(agent, m).into_handler_result()
        });
        self.ctx.install(
            self.mbox,
            TypeKey::immutable::<M>(),
            self.states,
            HandlerAction::Exclusive(erased),
        )
    }

    /// Final handler for `M` that also receives the agent context.
    pub fn event_ctx<A, M, F, R>(self, handler: F) -> Result<()>
    where
        A: Agent,
        M: Message,
        F: Fn(&mut A, &mut AgentContext<'_>, &M) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let erased: Arc<ExclusiveHandlerFn> = Arc::new(move |user, ctx, msg| {
            let agent = user.downcast_mut::<A>().ok_or_else(type_mismatch::<A>)?;
            let m = msg
                .downcast_ref::<M>()
                .ok_or_else(|| payload_missing(std::any::type_name::<M>()))?;
            handler(agent, ctx, m).into_handler_result()
        });
        self.ctx.install(
            self.mbox,
            TypeKey::immutable::<M>(),
            self.states,
            HandlerAction::Exclusive(erased),
        )
    }

    /// Final handler for mutable messages of type `M`, taken by value.
    pub fn event_mutable<A, M, F, R>(self, handler: F) -> Result<()>
    where
        A: Agent,
        M: Message,
        F: Fn(&mut A, M) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let erased: Arc<ExclusiveHandlerFn> = Arc::new(move |user, _ctx, msg| {
            let agent = user.downcast_mut::<A>().ok_or_else(type_mismatch::<A>)?;
            let m = msg
                .take_mutable::<M>()
                .ok_or_else(|| payload_missing(std::any::type_name::<M>()))?;
            handler(agent, *m).into_handler_result()
        });
        self.ctx.install(
            self.mbox,
            TypeKey::mutable::<M>(),
            self.states,
            HandlerAction::Exclusive(erased),
        )
    }

    /// Final handler for the signal `S`. The signal type cannot be
    /// inferred, so call sites name it: `.event_signal::<Done, _, _, _>(…)`.
    pub fn event_signal<S, A, F, R>(self, handler: F) -> Result<()>
    where
        S: Signal,
        A: Agent,
        F: Fn(&mut A) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let erased: Arc<ExclusiveHandlerFn> = Arc::new(move |user, _ctx, _msg| {
            let agent = user.downcast_mut::<A>().ok_or_else(type_mismatch::<A>)?;
            handler(agent).into_handler_result()
        });
        self.ctx.install(
            self.mbox,
            TypeKey::signal::<S>(),
            self.states,
            HandlerAction::Exclusive(erased),
        )
    }

    /// Final handler for the signal `S` that also receives the context.
    pub fn event_signal_ctx<S, A, F, R>(self, handler: F) -> Result<()>
    where
        S: Signal,
        A: Agent,
        F: Fn(&mut A, &mut AgentContext<'_>) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let erased: Arc<ExclusiveHandlerFn> = Arc::new(move |user, ctx, _msg| {
            let agent = user.downcast_mut::<A>().ok_or_else(type_mismatch::<A>)?;
            handler(agent, ctx).into_handler_result()
        });
        self.ctx.install(
            self.mbox,
            TypeKey::signal::<S>(),
            self.states,
            HandlerAction::Exclusive(erased),
        )
    }

    /// Thread-safe final handler for `M`.
    ///
    /// Under `adv_thread_pool` any number of thread-safe handlers of the
    /// same agent may run in parallel. The handler gets shared access only
    /// and no context — subscription and state mutation are unavailable
    /// here by construction.
    pub fn thread_safe_event<A, M, F, R>(self, handler: F) -> Result<()>
    where
        A: Agent,
        M: Message,
        F: Fn(&A, &M) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let erased: Arc<SharedHandlerFn> = Arc::new(move |user, msg| {
            let agent = user.downcast_ref::<A>().ok_or_else(type_mismatch::<A>)?;
            let m = msg
                .downcast_ref::<M>()
                .ok_or_else(|| payload_missing(std::any::type_name::<M>()))?;
            handler(agent, m).into_handler_result()
        });
        self.ctx.install(
            self.mbox,
            TypeKey::immutable::<M>(),
            self.states,
            HandlerAction::Shared(erased),
        )
    }

    /// Thread-safe final handler for the signal `S`.
    pub fn thread_safe_event_signal<S, A, F, R>(self, handler: F) -> Result<()>
    where
        S: Signal,
        A: Agent,
        F: Fn(&A) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let erased: Arc<SharedHandlerFn> = Arc::new(move |user, _msg| {
            let agent = user.downcast_ref::<A>().ok_or_else(type_mismatch::<A>)?;
            handler(agent).into_handler_result()
        });
        self.ctx.install(
            self.mbox,
            TypeKey::signal::<S>(),
            self.states,
            HandlerAction::Shared(erased),
        )
    }
}

/// Builder returned by [`AgentContext::so_state`].
pub struct StateBuilder<'c, 'a> {
    ctx: &'c mut AgentContext<'a>,
    state: StateId,
}

impl<'c, 'a> StateBuilder<'c, 'a> {
    /// Entry action, run each time the state is entered.
    pub fn on_enter<A, F>(self, action: F) -> Self
    where
        A: Agent,
        F: Fn(&mut A) + Send + Sync + 'static,
    {
        let erased = Arc::new(move |user: &mut dyn std::any::Any| {
            if let Some(agent) = user.downcast_mut::<A>() {
                action(agent);
            }
        });
        self.ctx.states.set_on_enter(self.state, erased);
        self
    }

    /// Exit action, run each time the state is left.
    pub fn on_exit<A, F>(self, action: F) -> Self
    where
        A: Agent,
        F: Fn(&mut A) + Send + Sync + 'static,
    {
        let erased = Arc::new(move |user: &mut dyn std::any::Any| {
            if let Some(agent) = user.downcast_mut::<A>() {
                action(agent);
            }
        });
        self.ctx.states.set_on_exit(self.state, erased);
        self
    }

    /// Leave for `target` after `limit` unless something else changes state
    /// first. Re-entering the state restarts the clock.
    pub fn time_limit(self, limit: Duration, target: &State) -> Self {
        self.ctx.states.set_time_limit(self.state, limit, target.id);
        self
    }

    /// Make this state the initial substate of its parent, explicitly.
    pub fn initial_substate_of(self, parent: &State) -> Self {
        self.ctx.states.set_initial_substate(parent.id, self.state);
        self
    }

    /// When `M` arrives from the direct mailbox in this state, switch to
    /// `target` and re-dispatch the same message there.
    pub fn transfer_to_state<M: Message>(self, target: &State) -> Result<Self> {
        let mbox = self.ctx.cell.direct_mbox();
        self.transfer_on::<M>(&mbox, target)
    }

    /// `transfer_to_state` for messages arriving from `mbox`.
    pub fn transfer_on<M: Message>(self, mbox: &MboxRef, target: &State) -> Result<Self> {
        let state = self.state;
        self.ctx.install(
            Arc::clone(mbox),
            TypeKey::immutable::<M>(),
            vec![state],
            HandlerAction::Transfer(target.id),
        )?;
        Ok(self)
    }

    /// `transfer_to_state` for the signal `S` from the direct mailbox.
    pub fn transfer_signal_to_state<S: Signal>(self, target: &State) -> Result<Self> {
        let mbox = self.ctx.cell.direct_mbox();
        let state = self.state;
        self.ctx.install(
            mbox,
            TypeKey::signal::<S>(),
            vec![state],
            HandlerAction::Transfer(target.id),
        )?;
        Ok(self)
    }

    /// When `M` arrives from the direct mailbox in this state, switch to
    /// `target` without re-dispatching.
    pub fn just_switch_to<M: Message>(self, target: &State) -> Result<Self> {
        let mbox = self.ctx.cell.direct_mbox();
        let state = self.state;
        self.ctx.install(
            mbox,
            TypeKey::immutable::<M>(),
            vec![state],
            HandlerAction::JustSwitch(target.id),
        )?;
        Ok(self)
    }

    /// `just_switch_to` for messages arriving from `mbox`.
    pub fn just_switch_on<M: Message>(self, mbox: &MboxRef, target: &State) -> Result<Self> {
        let state = self.state;
        self.ctx.install(
            Arc::clone(mbox),
            TypeKey::immutable::<M>(),
            vec![state],
            HandlerAction::JustSwitch(target.id),
        )?;
        Ok(self)
    }

    /// Swallow `M` from the direct mailbox in this state.
    pub fn suppress<M: Message>(self) -> Result<Self> {
        let mbox = self.ctx.cell.direct_mbox();
        let state = self.state;
        self.ctx.install(
            mbox,
            TypeKey::immutable::<M>(),
            vec![state],
            HandlerAction::Suppress,
        )?;
        Ok(self)
    }

    /// Swallow `M` from `mbox` in this state.
    pub fn suppress_on<M: Message>(self, mbox: &MboxRef) -> Result<Self> {
        let state = self.state;
        self.ctx.install(
            Arc::clone(mbox),
            TypeKey::immutable::<M>(),
            vec![state],
            HandlerAction::Suppress,
        )?;
        Ok(self)
    }

    /// Subscribe a handler for `M` from the direct mailbox in this state.
    pub fn event<A, M, F, R>(self, handler: F) -> Result<Self>
    where
        A: Agent,
        M: Message,
        F: Fn(&mut A, &M) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let state = self.state;
        let mbox = self.ctx.cell.direct_mbox();
        let erased: Arc<ExclusiveHandlerFn> = Arc::new(move |user, _ctx, msg| {
            let agent = user.downcast_mut::<A>().ok_or_else(type_mismatch::<A>)?;
            let m = msg
                .downcast_ref::<M>()
                .ok_or_else(|| payload_missing(std::any::type_name::<M>()))?;
            handler(agent, m).into_handler_result()
        });
        self.ctx.install(
            mbox,
            TypeKey::immutable::<M>(),
            vec![state],
            HandlerAction::Exclusive(erased),
        )?;
        Ok(self)
    }

    /// Subscribe a context-taking handler for `M` from the direct mailbox
    /// in this state.
    pub fn event_ctx<A, M, F, R>(self, handler: F) -> Result<Self>
    where
        A: Agent,
        M: Message,
        F: Fn(&mut A, &mut AgentContext<'_>, &M) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let state = self.state;
        let mbox = self.ctx.cell.direct_mbox();
        let erased: Arc<ExclusiveHandlerFn> = Arc::new(move |user, ctx, msg| {
            let agent = user.downcast_mut::<A>().ok_or_else(type_mismatch::<A>)?;
            let m = msg
                .downcast_ref::<M>()
                .ok_or_else(|| payload_missing(std::any::type_name::<M>()))?;
            handler(agent, ctx, m).into_handler_result()
        });
        self.ctx.install(
            mbox,
            TypeKey::immutable::<M>(),
            vec![state],
            HandlerAction::Exclusive(erased),
        )?;
        Ok(self)
    }

    /// Subscribe a signal handler for `S` from the direct mailbox in this
    /// state.
    pub fn event_signal<S, A, F, R>(self, handler: F) -> Result<Self>
    where
        S: Signal,
        A: Agent,
        F: Fn(&mut A) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let state = self.state;
        let mbox = self.ctx.cell.direct_mbox();
        let erased: Arc<ExclusiveHandlerFn> = Arc::new(move |user, _ctx, _msg| {
            let agent = user.downcast_mut::<A>().ok_or_else(type_mismatch::<A>)?;
            handler(agent).into_handler_result()
        });
        self.ctx.install(
            mbox,
            TypeKey::signal::<S>(),
            vec![state],
            HandlerAction::Exclusive(erased),
        )?;
        Ok(self)
    }
}
