// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 3: Internal module imports
use super::env::Environment;
use super::logger::ErrorLogger;
use crate::dispatcher::BinderRef;
use crate::msg_tracing::{TraceFilter, Tracer};
use crate::timer::TimerFactory;

/// Factory of a named dispatcher, run while the environment is being
/// assembled. It typically creates the dispatcher (which registers itself
/// for shutdown) and returns the binder agents will be bound through.
pub type DispatcherFactory = Box<dyn FnOnce(&Environment) -> BinderRef + Send>;

/// Environment construction parameters.
///
/// # Example
/// ```rust,ignore
/// let params = EnvParams::default()
///     .timer_factory(TimerFactory::Wheel)
///     .disable_autoshutdown()
///     .tracer(Arc::new(StdoutTracer::new()))
///     .add_named_dispatcher("workers", Box::new(|env| {
///         ThreadPoolDispatcher::new(env, "workers", ThreadPoolParams::new()).binder()
///     }));
/// Environment::launch_with_params(params, |env| { /* init */ Ok(()) })?;
/// ```
pub struct EnvParams {
    pub(crate) timer_factory: TimerFactory,
    pub(crate) disable_autoshutdown: bool,
    pub(crate) error_logger: Option<Arc<dyn ErrorLogger>>,
    pub(crate) tracer: Option<Arc<dyn Tracer>>,
    pub(crate) trace_filter: Option<Arc<dyn TraceFilter>>,
    pub(crate) stats_period: Duration,
    pub(crate) named_dispatchers: Vec<(String, DispatcherFactory)>,
}

impl Default for EnvParams {
    fn default() -> Self {
        Self {
            timer_factory: TimerFactory::default(),
            disable_autoshutdown: false,
            error_logger: None,
            tracer: None,
            trace_filter: None,
            stats_period: Duration::from_secs(2),
            named_dispatchers: Vec::new(),
        }
    }
}

impl EnvParams {
    /// Start from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose the timer backend.
    pub fn timer_factory(mut self, factory: TimerFactory) -> Self {
        self.timer_factory = factory;
        self
    }

    /// Keep the environment alive after the last user coop leaves.
    pub fn disable_autoshutdown(mut self) -> Self {
        self.disable_autoshutdown = true;
        self
    }

    /// Replace the default error logger.
    pub fn error_logger(mut self, logger: Arc<dyn ErrorLogger>) -> Self {
        self.error_logger = Some(logger);
        self
    }

    /// Install a message-delivery tracer.
    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Install the initial trace filter.
    pub fn trace_filter(mut self, filter: Arc<dyn TraceFilter>) -> Self {
        self.trace_filter = Some(filter);
        self
    }

    /// Period of stats distribution once the controller is turned on.
    pub fn stats_period(mut self, period: Duration) -> Self {
        self.stats_period = period;
        self
    }

    /// Install a named dispatcher. Named dispatchers can only be added
    /// before the environment starts.
    pub fn add_named_dispatcher(mut self, name: impl Into<String>, factory: DispatcherFactory) -> Self {
        self.named_dispatchers.push((name.into(), factory));
        self
    }
}
