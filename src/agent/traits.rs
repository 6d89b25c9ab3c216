// Layer 1: Standard library imports
use std::any::Any;

// Layer 3: Internal module imports
use super::context::AgentContext;
use crate::error::AgentError;

/// Result type of lifecycle hooks and event handlers.
pub type AgentResult = Result<(), AgentError>;

/// The user side of an agent.
///
/// All three hooks have do-nothing defaults. `so_define_agent` runs
/// synchronously during coop registration and is where states,
/// subscriptions and delivery filters are declared; an error there aborts
/// the whole coop registration. `so_evt_start` is the first demand executed
/// on the agent's working thread, `so_evt_finish` the last.
///
/// # Example
///
/// ```rust,ignore
/// struct Collector {
///     log: String,
/// }
///
/// impl Agent for Collector {
///     fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
///         let mbox = ctx.so_environment().create_mbox();
///         ctx.so_subscribe(&mbox)
///             .event(|this: &mut Self, text: &String| this.log.push_str(text))?;
///         Ok(())
///     }
/// }
/// ```
pub trait Agent: Send + Sync + 'static {
    /// Declare states, subscriptions and filters. Runs during registration,
    /// before the agent is scheduled for the first time.
    fn so_define_agent(&mut self, _ctx: &mut AgentContext<'_>) -> AgentResult {
        Ok(())
    }

    /// First demand executed for the agent.
    fn so_evt_start(&mut self, _ctx: &mut AgentContext<'_>) -> AgentResult {
        Ok(())
    }

    /// Last demand executed for the agent, during coop deregistration.
    ///
    /// Subscriptions installed here are silently ineffective: the agent is
    /// tearing down and its queue will not deliver more messages.
    fn so_evt_finish(&mut self, _ctx: &mut AgentContext<'_>) -> AgentResult {
        Ok(())
    }
}

/// What the runtime does after a handler or hook reports an error.
///
/// The event-exception logger sees the error first in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionReaction {
    /// Terminate the process.
    Abort,
    /// Stop the whole environment.
    ShutdownEnvOnError,
    /// Deregister the agent's coop.
    DeregCoopOnError,
    /// Log and continue.
    Ignore,
}

/// Object-safe bridge between the runtime and the concrete agent type.
///
/// Event handlers are registered against the concrete type and downcast
/// through `Any`; lifecycle hooks dispatch through `Agent`.
pub(crate) trait AnyAgent: Agent {
    fn as_any_ref(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Agent> AnyAgent for T {
    fn as_any_ref(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Accepted return types of event handlers.
///
/// Handlers may return nothing or a `Result` whose error converts into
/// [`AgentError`]; both feed the exception-reaction machinery uniformly.
pub trait IntoHandlerResult {
    /// Normalize into the runtime result shape.
    fn into_handler_result(self) -> AgentResult;
}

impl IntoHandlerResult for () {
    fn into_handler_result(self) -> AgentResult {
        Ok(())
    }
}

impl<E> IntoHandlerResult for Result<(), E>
where
    E: Into<AgentError>,
{
    fn into_handler_result(self) -> AgentResult {
        self.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_into_handler_result() {
        assert!(().into_handler_result().is_ok());
    }

    #[test]
    fn test_error_into_handler_result() {
        let failed: Result<(), std::io::Error> = Err(std::io::Error::other("boom"));
        let result = failed.into_handler_result();
        assert!(result.is_err());
    }

    #[test]
    fn test_default_hooks_are_noops() {
        struct Quiet;
        impl Agent for Quiet {}

        // The blanket AnyAgent impl must apply.
        fn assert_any_agent<T: AnyAgent>() {}
        assert_any_agent::<Quiet>();
    }
}
