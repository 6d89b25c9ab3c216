// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

// Layer 2: Third-party crate imports
use parking_lot::{Condvar, Mutex};

// Layer 3: Internal module imports
use super::logger::{ErrorLogger, TracingErrorLogger};
use super::params::EnvParams;
use super::stats_source::EnvStatsSource;
use super::stop_guard::StopGuard;
use crate::coop::{register_coop, Coop, CoopHandle, CoopRepository, DeregReason};
use crate::dispatcher::{BinderRef, Dispatcher, DispatcherParams, OneThreadDispatcher};
use crate::error::{Result, RuntimeError};
use crate::mailbox::{
    LocalMbox, MboxRef, NamedMboxRegistry, UniqueSubscribersMbox, DEFAULT_NAMESPACE,
};
use crate::mchain::{MChain, MChainParams};
use crate::message::{Message, MessageRef};
use crate::msg_tracing::{TraceFilter, TracingHub};
use crate::stats::StatsController;
use crate::timer::{TimerFactory, TimerHandle, TimerService};
use crate::util::abort_guard::AbortOnPanic;
use crate::util::ids::IdGenerator;
use crate::util::{AgentId, MailboxId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EnvStatus {
    /// Being assembled; named dispatchers may still be added.
    Initial,
    /// Init function ran or is running; coops come and go.
    Running,
    /// `stop()` was called; waiting for stop-guards to be removed.
    Stopping,
    /// Guards are gone; root coops are being deregistered and drained.
    FinalPhase,
    /// Fully torn down.
    Stopped,
}

pub(crate) struct EnvInner {
    mbox_ids: IdGenerator,
    agent_ids: IdGenerator,
    named_mboxes: NamedMboxRegistry,
    coop_repo: CoopRepository,
    timer: TimerService,
    dispatchers: Mutex<Vec<Arc<dyn Dispatcher>>>,
    named_binders: Mutex<HashMap<String, BinderRef>>,
    default_binder: Mutex<Option<BinderRef>>,
    stop_guards: Mutex<Vec<Arc<dyn StopGuard>>>,
    status: Mutex<EnvStatus>,
    status_signal: Condvar,
    autoshutdown_disabled: bool,
    init_done: AtomicBool,
    error_logger: Arc<dyn ErrorLogger>,
    hub: Arc<TracingHub>,
    stats: StatsController,
}

/// Handle to one runtime instance. Cheap to clone.
///
/// # Example
///
/// ```rust,ignore
/// Environment::launch(|env| {
///     env.introduce_coop(|coop| {
///         coop.add_agent(Greeter::new());
///         Ok(())
///     })?;
///     Ok(())
/// })?;
/// ```
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvInner>,
}

/// Non-owning environment handle for long-lived observers.
#[derive(Clone)]
pub(crate) struct WeakEnvironment {
    inner: Weak<EnvInner>,
}

impl WeakEnvironment {
    pub(crate) fn upgrade(&self) -> Option<Environment> {
        self.inner.upgrade().map(|inner| Environment { inner })
    }
}

/// What a custom-mailbox factory receives.
pub struct MboxCreationData {
    /// The fresh id assigned to the new mailbox.
    pub id: MailboxId,
    /// The owning environment.
    pub env: Environment,
    /// The environment's tracing hub, so custom mailboxes can trace too.
    pub tracing_hub: Arc<TracingHub>,
}

impl Environment {
    // ----- construction and lifecycle ------------------------------------

    fn create(params: EnvParams) -> Environment {
        let hub = Arc::new(match params.tracer {
            Some(tracer) => TracingHub::with_tracer(tracer),
            None => TracingHub::disabled(),
        });
        if let Some(filter) = params.trace_filter {
            hub.set_filter(filter);
        }

        let inner = Arc::new(EnvInner {
            mbox_ids: IdGenerator::new(),
            agent_ids: IdGenerator::new(),
            named_mboxes: NamedMboxRegistry::new(),
            coop_repo: CoopRepository::new(),
            timer: TimerService::start(params.timer_factory),
            dispatchers: Mutex::new(Vec::new()),
            named_binders: Mutex::new(HashMap::new()),
            default_binder: Mutex::new(None),
            stop_guards: Mutex::new(Vec::new()),
            status: Mutex::new(EnvStatus::Initial),
            status_signal: Condvar::new(),
            autoshutdown_disabled: params.disable_autoshutdown,
            init_done: AtomicBool::new(false),
            error_logger: params
                .error_logger
                .unwrap_or_else(|| Arc::new(TracingErrorLogger)),
            hub,
            stats: StatsController::new(params.stats_period),
        });
        let env = Environment { inner };

        env.inner.coop_repo.start_drainer();

        let default_disp =
            OneThreadDispatcher::new(&env, "default", DispatcherParams::default());
        *env.inner.default_binder.lock() = Some(default_disp.binder());

        for (name, factory) in params.named_dispatchers {
            let binder = factory(&env);
            env.inner.named_binders.lock().insert(name, binder);
        }

        env.inner.stats.set_mbox(env.create_mbox());
        env.inner
            .stats
            .register_source(Arc::new(EnvStatsSource::new(env.downgrade())));

        env
    }

    /// Run an environment with default parameters: construct, call
    /// `init`, then block until the environment stops.
    pub fn launch(init: impl FnOnce(&Environment) -> Result<()>) -> Result<()> {
        Self::launch_with_params(EnvParams::default(), init)
    }

    /// Run an environment with explicit parameters.
    pub fn launch_with_params(
        params: EnvParams,
        init: impl FnOnce(&Environment) -> Result<()>,
    ) -> Result<()> {
        let env = Self::create(params);
        *env.inner.status.lock() = EnvStatus::Running;

        let init_result = init(&env);
        env.inner.init_done.store(true, Ordering::Release);

        match init_result {
            Ok(()) => {
                env.check_autoshutdown();
                env.wait_for_drain();
                env.teardown();
                Ok(())
            }
            Err(error) => {
                env.stop();
                env.wait_for_drain();
                env.teardown();
                Err(error)
            }
        }
    }

    /// Minimal running environment for unit tests of the building blocks.
    #[doc(hidden)]
    pub fn core_for_tests() -> Environment {
        let env = Self::create(EnvParams::default());
        *env.inner.status.lock() = EnvStatus::Running;
        env.inner.init_done.store(true, Ordering::Release);
        env
    }

    // ----- ids and internals ---------------------------------------------

    pub(crate) fn next_mbox_id(&self) -> MailboxId {
        MailboxId::from_raw(self.inner.mbox_ids.next())
    }

    pub(crate) fn next_agent_id(&self) -> AgentId {
        AgentId::from_raw(self.inner.agent_ids.next())
    }

    pub(crate) fn tracing_hub(&self) -> Arc<TracingHub> {
        Arc::clone(&self.inner.hub)
    }

    pub(crate) fn error_logger(&self) -> Arc<dyn ErrorLogger> {
        Arc::clone(&self.inner.error_logger)
    }

    pub(crate) fn coop_repository(&self) -> &CoopRepository {
        &self.inner.coop_repo
    }

    pub(crate) fn downgrade(&self) -> WeakEnvironment {
        WeakEnvironment {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub(crate) fn timer_counts(&self) -> (usize, usize) {
        self.inner.timer.armed_counts()
    }

    pub(crate) fn dispatchers_snapshot(&self) -> Vec<Arc<dyn Dispatcher>> {
        self.inner.dispatchers.lock().clone()
    }

    // ----- mailboxes ------------------------------------------------------

    /// Create an anonymous MPMC mailbox.
    pub fn create_mbox(&self) -> MboxRef {
        Arc::new(LocalMbox::new(
            self.next_mbox_id(),
            self.clone(),
            self.tracing_hub(),
        ))
    }

    /// Create or look up the named MPMC mailbox `name` in the default
    /// namespace.
    pub fn create_named_mbox(&self, name: &str) -> Result<MboxRef> {
        self.introduce_named_mbox(DEFAULT_NAMESPACE, name, |data| {
            Ok(Arc::new(LocalMbox::new(data.id, data.env, data.tracing_hub)) as MboxRef)
        })
    }

    /// Idempotently register a mailbox under `(namespace, name)`.
    ///
    /// The factory runs at most once per pair; later callers get the
    /// registered mailbox back. Factory errors propagate and leave the
    /// registry unchanged.
    pub fn introduce_named_mbox(
        &self,
        namespace: &str,
        name: &str,
        factory: impl FnOnce(MboxCreationData) -> Result<MboxRef>,
    ) -> Result<MboxRef> {
        self.inner.named_mboxes.introduce(namespace, name, || {
            factory(MboxCreationData {
                id: self.next_mbox_id(),
                env: self.clone(),
                tracing_hub: self.tracing_hub(),
            })
        })
    }

    /// Look up an already-registered named mailbox.
    pub fn find_named_mbox(&self, namespace: &str, name: &str) -> Result<MboxRef> {
        self.inner.named_mboxes.find(namespace, name)
    }

    /// Create a mailbox with an arbitrary user implementation.
    pub fn make_custom_mbox(
        &self,
        factory: impl FnOnce(MboxCreationData) -> Result<MboxRef>,
    ) -> Result<MboxRef> {
        factory(MboxCreationData {
            id: self.next_mbox_id(),
            env: self.clone(),
            tracing_hub: self.tracing_hub(),
        })
    }

    /// Create a mailbox allowing one subscriber per message type; the
    /// MPMC-creatable destination where mutable messages are legal.
    pub fn create_unique_subscribers_mbox(&self) -> MboxRef {
        Arc::new(UniqueSubscribersMbox::new(
            self.next_mbox_id(),
            self.clone(),
            self.tracing_hub(),
        ))
    }

    /// Create a message chain.
    pub fn create_mchain(&self, params: MChainParams) -> Arc<MChain> {
        MChain::new(
            self.next_mbox_id(),
            self.clone(),
            self.tracing_hub(),
            params,
        )
    }

    // ----- coops ----------------------------------------------------------

    /// A new coop using the environment's default dispatcher.
    pub fn make_coop(&self) -> Coop {
        Coop::new(self.clone(), None, self.default_binder())
    }

    /// A new coop with an explicit default binder.
    pub fn make_coop_with_binder(&self, binder: BinderRef) -> Coop {
        Coop::new(self.clone(), None, binder)
    }

    /// A new child coop of `parent`.
    pub fn make_child_coop(&self, parent: &CoopHandle) -> Coop {
        Coop::new(self.clone(), Some(parent.clone()), self.default_binder())
    }

    /// A new child coop of `parent` with an explicit default binder.
    pub fn make_child_coop_with_binder(&self, parent: &CoopHandle, binder: BinderRef) -> Coop {
        Coop::new(self.clone(), Some(parent.clone()), binder)
    }

    /// Run the coop registration transaction.
    pub fn register_coop(&self, coop: Coop) -> Result<CoopHandle> {
        register_coop(self, coop)
    }

    /// Build and register a coop in one step.
    pub fn introduce_coop(
        &self,
        build: impl FnOnce(&mut Coop) -> Result<()>,
    ) -> Result<CoopHandle> {
        let mut coop = self.make_coop();
        build(&mut coop)?;
        self.register_coop(coop)
    }

    /// Build and register a child coop in one step.
    pub fn introduce_child_coop(
        &self,
        parent: &CoopHandle,
        build: impl FnOnce(&mut Coop) -> Result<()>,
    ) -> Result<CoopHandle> {
        let mut coop = self.make_child_coop(parent);
        build(&mut coop)?;
        self.register_coop(coop)
    }

    /// Start deregistration of a coop. Idempotent; a handle whose coop is
    /// already gone is a no-op.
    pub fn deregister_coop(&self, handle: &CoopHandle, reason: DeregReason) {
        if let Some(inner) = handle.inner.upgrade() {
            inner.start_dereg(reason);
        }
    }

    pub(crate) fn registrations_allowed(&self) -> bool {
        *self.inner.status.lock() <= EnvStatus::Running
    }

    /// Called by the final-dereg drainer after each coop destruction.
    pub(crate) fn on_coop_destroyed(&self) {
        let status = *self.inner.status.lock();
        match status {
            EnvStatus::Running => self.check_autoshutdown(),
            EnvStatus::FinalPhase => {
                let _guard = self.inner.status.lock();
                self.inner.status_signal.notify_all();
            }
            _ => {}
        }
    }

    fn check_autoshutdown(&self) {
        if self.inner.autoshutdown_disabled
            || !self.inner.init_done.load(Ordering::Acquire)
            || self.inner.coop_repo.live_count() != 0
        {
            return;
        }
        self.stop();
    }

    // ----- timers ---------------------------------------------------------

    /// Arm a timer delivering `message` to `target` after `delay`, then
    /// every `period` if one is given.
    #[must_use = "dropping the handle cancels the timer"]
    pub fn schedule_timer<M: Message>(
        &self,
        delay: Duration,
        period: Option<Duration>,
        message: M,
        target: &MboxRef,
    ) -> TimerHandle {
        self.inner
            .timer
            .schedule(delay, period, MessageRef::message(message), target.clone())
    }

    pub(crate) fn schedule_timer_ref(
        &self,
        delay: Duration,
        period: Option<Duration>,
        message: MessageRef,
        target: MboxRef,
    ) -> Result<TimerHandle> {
        Ok(self.inner.timer.schedule(delay, period, message, target))
    }

    pub(crate) fn schedule_timer_message(
        &self,
        delay: Duration,
        period: Option<Duration>,
        message: MessageRef,
        target: MboxRef,
    ) -> Option<TimerHandle> {
        Some(self.inner.timer.schedule(delay, period, message, target))
    }

    pub(crate) fn schedule_timer_detached(
        &self,
        delay: Duration,
        message: MessageRef,
        target: MboxRef,
    ) -> Result<()> {
        self.inner
            .timer
            .schedule(delay, None, message, target)
            .detach();
        Ok(())
    }

    // ----- dispatchers ----------------------------------------------------

    pub(crate) fn register_dispatcher(&self, dispatcher: Arc<dyn Dispatcher>) {
        self.inner.dispatchers.lock().push(dispatcher);
    }

    /// Install a named dispatcher binder. Only legal before the
    /// environment starts; afterwards the call fails with
    /// [`RuntimeError::DispatcherAfterStart`].
    pub fn add_named_dispatcher(&self, name: impl Into<String>, binder: BinderRef) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(RuntimeError::EmptyName);
        }
        if *self.inner.status.lock() != EnvStatus::Initial {
            return Err(RuntimeError::DispatcherAfterStart { name });
        }
        self.inner.named_binders.lock().insert(name, binder);
        Ok(())
    }

    /// Binder of the named dispatcher `name`.
    pub fn named_dispatcher_binder(&self, name: &str) -> Result<BinderRef> {
        self.inner
            .named_binders
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::DispatcherNotFound {
                name: name.to_string(),
            })
    }

    /// The default dispatcher's binder.
    pub fn default_binder(&self) -> BinderRef {
        // The default dispatcher is installed during construction and
        // removed only at teardown; a missing binder can only be observed
        // after the environment stopped, where binding is meaningless.
        // A no-op binder keeps this path total.
        self.inner
            .default_binder
            .lock()
            .clone()
            .unwrap_or_else(|| Arc::new(NullBinder))
    }

    // ----- stats and tracing ---------------------------------------------

    /// The stats controller.
    pub fn stats(&self) -> &StatsController {
        &self.inner.stats
    }

    /// Replace the message-delivery trace filter.
    pub fn set_trace_filter(&self, filter: Arc<dyn TraceFilter>) {
        self.inner.hub.set_filter(filter);
    }

    /// Remove the trace filter.
    pub fn drop_trace_filter(&self) {
        self.inner.hub.drop_filter();
    }

    /// True when a tracer is installed.
    pub fn is_tracing_enabled(&self) -> bool {
        self.inner.hub.is_enabled()
    }

    // ----- stop coordination ---------------------------------------------

    /// Initiate shutdown.
    ///
    /// Every installed stop-guard's `stop()` runs; the final phase (root
    /// coop deregistration, dispatcher and timer shutdown) starts once the
    /// application has removed all guards. Idempotent.
    pub fn stop(&self) {
        {
            let mut status = self.inner.status.lock();
            match *status {
                EnvStatus::Initial | EnvStatus::Running => *status = EnvStatus::Stopping,
                _ => return,
            }
        }
        self.inner.status_signal.notify_all();

        let guards: Vec<Arc<dyn StopGuard>> = self.inner.stop_guards.lock().clone();
        for guard in guards {
            let no_unwind = AbortOnPanic::new("stop guard");
            guard.stop();
            no_unwind.disarm();
        }

        self.maybe_enter_final_phase();
    }

    /// Install a stop-guard. Fails once stop is already in progress.
    pub fn setup_stop_guard(&self, guard: Arc<dyn StopGuard>) -> Result<()> {
        if *self.inner.status.lock() >= EnvStatus::Stopping {
            return Err(RuntimeError::StopInProgress);
        }
        self.inner.stop_guards.lock().push(guard);
        Ok(())
    }

    /// Remove a previously installed stop-guard. Removing the last guard
    /// after `stop()` lets the shutdown proceed.
    pub fn remove_stop_guard(&self, guard: &Arc<dyn StopGuard>) {
        self.inner
            .stop_guards
            .lock()
            .retain(|g| !Arc::ptr_eq(g, guard));
        self.maybe_enter_final_phase();
    }

    fn maybe_enter_final_phase(&self) {
        {
            let mut status = self.inner.status.lock();
            if *status != EnvStatus::Stopping || !self.inner.stop_guards.lock().is_empty() {
                return;
            }
            *status = EnvStatus::FinalPhase;
        }
        self.inner.status_signal.notify_all();
        self.inner.coop_repo.dereg_all_roots(DeregReason::Shutdown);
        {
            let _guard = self.inner.status.lock();
            self.inner.status_signal.notify_all();
        }
    }

    /// Block until the final phase has drained every coop.
    fn wait_for_drain(&self) {
        let mut status = self.inner.status.lock();
        loop {
            if *status == EnvStatus::FinalPhase && self.inner.coop_repo.live_count() == 0 {
                return;
            }
            self.inner.status_signal.wait(&mut status);
        }
    }

    /// Tear the infrastructure down. Runs on the launch thread, after the
    /// drain: stats off, dispatchers (reverse creation order), the
    /// final-dereg drainer, the timer, the mailbox registry.
    fn teardown(&self) {
        self.inner.stats.turn_off();

        let dispatchers: Vec<Arc<dyn Dispatcher>> = {
            let mut list = self.inner.dispatchers.lock();
            let mut taken: Vec<_> = list.drain(..).collect();
            taken.reverse();
            taken
        };
        for dispatcher in dispatchers {
            dispatcher.shutdown();
        }

        self.inner.coop_repo.shutdown_drainer();
        self.inner.timer.shutdown();
        self.inner.named_mboxes.clear();
        *self.inner.default_binder.lock() = None;
        self.inner.named_binders.lock().clear();

        *self.inner.status.lock() = EnvStatus::Stopped;
        self.inner.status_signal.notify_all();
    }
}

/// Binder handed out after teardown; binds nothing.
struct NullBinder;

impl crate::dispatcher::DispatcherBinder for NullBinder {
    fn preallocate_resources(&self, _agent: &Arc<crate::agent::cell::AgentCell>) -> Result<()> {
        Err(RuntimeError::StopInProgress)
    }

    fn bind(&self, _agent: &Arc<crate::agent::cell::AgentCell>) {}

    fn undo_preallocation(&self, _agent: &Arc<crate::agent::cell::AgentCell>) {}

    fn unbind(&self, _agent: &Arc<crate::agent::cell::AgentCell>) {}
}
