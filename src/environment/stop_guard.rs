/// A user object delaying environment shutdown.
///
/// Installed with [`Environment::setup_stop_guard`]; when
/// [`Environment::stop`] runs, every guard's `stop` method is invoked, and
/// the shutdown reaches its final phase only after the application has
/// removed every guard with [`Environment::remove_stop_guard`]. The usual
/// pattern: `stop()` starts an orderly wind-down (flushing, final sends),
/// and the owner removes the guard when done.
///
/// `stop` runs on the thread that called [`Environment::stop`] and must
/// not panic.
///
/// [`Environment::setup_stop_guard`]: super::Environment::setup_stop_guard
/// [`Environment::stop`]: super::Environment::stop
/// [`Environment::remove_stop_guard`]: super::Environment::remove_stop_guard
pub trait StopGuard: Send + Sync + 'static {
    /// The environment wants to stop.
    fn stop(&self);
}
