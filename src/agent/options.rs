// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 3: Internal module imports
use super::traits::ExceptionReaction;
use crate::mailbox::MboxRef;
use crate::priority::Priority;
use crate::sink::MessageLimit;

/// Factory wrapping an agent's standard direct mailbox into a custom one.
pub type DirectMboxFactory = Arc<dyn Fn(MboxRef) -> MboxRef + Send + Sync>;

/// Construction-time tuning of one agent.
///
/// # Example
/// ```rust,ignore
/// let options = AgentOptions::default()
///     .priority(Priority::P5)
///     .limit(MessageLimit::drop::<Telemetry>(1000))
///     .exception_reaction(ExceptionReaction::DeregCoopOnError);
/// coop.add_agent_with_options(worker, options);
/// ```
#[derive(Clone, Default)]
pub struct AgentOptions {
    pub(crate) priority: Priority,
    pub(crate) limits: Vec<MessageLimit>,
    pub(crate) direct_mbox_factory: Option<DirectMboxFactory>,
    pub(crate) exception_reaction: Option<ExceptionReaction>,
    pub(crate) subscription_storage_threshold: Option<usize>,
}

impl AgentOptions {
    /// Start from the defaults: priority `P0`, no limits, standard direct
    /// mailbox, the coop's exception reaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the agent priority consulted by priority dispatchers.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Add one message limit. Later limits for the same type win.
    pub fn limit(mut self, limit: MessageLimit) -> Self {
        self.limits.push(limit);
        self
    }

    /// Wrap the standard direct mailbox with a custom implementation.
    pub fn direct_mbox_factory(
        mut self,
        factory: impl Fn(MboxRef) -> MboxRef + Send + Sync + 'static,
    ) -> Self {
        self.direct_mbox_factory = Some(Arc::new(factory));
        self
    }

    /// Override the exception reaction inherited from the coop.
    pub fn exception_reaction(mut self, reaction: ExceptionReaction) -> Self {
        self.exception_reaction = Some(reaction);
        self
    }

    /// Number of subscriptions at which the storage switches from the
    /// small vector layout to the map layout.
    pub fn subscription_storage_threshold(mut self, threshold: usize) -> Self {
        self.subscription_storage_threshold = Some(threshold);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = AgentOptions::new();
        assert_eq!(options.priority, Priority::P0);
        assert!(options.limits.is_empty());
        assert!(options.direct_mbox_factory.is_none());
        assert!(options.exception_reaction.is_none());
    }

    #[test]
    fn test_builder_accumulates() {
        #[derive(Debug)]
        struct Job;

        let options = AgentOptions::new()
            .priority(Priority::P7)
            .limit(MessageLimit::drop::<Job>(8))
            .exception_reaction(ExceptionReaction::Ignore);

        assert_eq!(options.priority, Priority::P7);
        assert_eq!(options.limits.len(), 1);
        assert_eq!(options.exception_reaction, Some(ExceptionReaction::Ignore));
    }
}
