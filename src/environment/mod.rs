//! The environment: the top-level container of one runtime instance.
//!
//! An environment owns the mailbox registry, the timer service, the coop
//! repository with its final-dereg drainer, the dispatcher set, the stats
//! controller, the stop-guard set, the error logger and the optional
//! message-delivery tracer. Several environments can run side by side in
//! one process; nothing is process-global.
//!
//! The usual entry point is [`Environment::launch`], which blocks until
//! the environment stops; [`WrappedEnv`] is the RAII alternative for
//! embedding.

pub mod params;
pub mod stop_guard;

mod env;
mod logger;
mod stats_source;
mod wrapped;

pub use env::{Environment, MboxCreationData};
pub use logger::{ErrorLogger, TracingErrorLogger};
pub use params::{DispatcherFactory, EnvParams};
pub use stop_guard::StopGuard;
pub use wrapped::WrappedEnv;

pub(crate) use env::WeakEnvironment;
