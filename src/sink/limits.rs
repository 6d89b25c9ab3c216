// Layer 1: Standard library imports
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// Layer 3: Internal module imports
use crate::mailbox::MboxRef;
use crate::message::{Message, MessageRef, Signal, TypeKey};

/// Hard cap on redirect/transform chains.
///
/// An overlimit reaction that sends the message onward increments the
/// delivery depth; when the depth passes this cap the message is dropped
/// with a structured warning instead of recursing further.
pub const MAX_REDIRECTION_DEPTH: u32 = 32;

/// A message re-targeted by a transform reaction.
pub struct TransformedMessage {
    /// Where the transformed message goes.
    pub mbox: MboxRef,
    /// The replacement message.
    pub message: MessageRef,
}

impl TransformedMessage {
    /// Transform into an immutable message.
    pub fn new<M: Message>(mbox: MboxRef, message: M) -> Self {
        Self {
            mbox,
            message: MessageRef::message(message),
        }
    }

    /// Transform into a signal.
    pub fn signal<S: Signal>(mbox: MboxRef) -> Self {
        Self {
            mbox,
            message: MessageRef::signal::<S>(),
        }
    }

    /// Transform into a mutable message.
    pub fn mutable<M: Message>(mbox: MboxRef, message: M) -> Self {
        Self {
            mbox,
            message: MessageRef::mutable_message(message),
        }
    }
}

/// What to do when a message arrives above the configured limit.
#[derive(Clone)]
pub enum OverlimitReaction {
    /// Discard the message.
    Drop,
    /// Terminate the process. For messages whose loss is unacceptable.
    AbortApp,
    /// Deliver the message to the mailbox returned by the function,
    /// non-blocking, with depth + 1.
    RedirectTo(Arc<dyn Fn() -> MboxRef + Send + Sync>),
    /// Replace the message and deliver the replacement, non-blocking, with
    /// depth + 1. Returning `None` suppresses delivery.
    Transform(Arc<dyn Fn(&MessageRef) -> Option<TransformedMessage> + Send + Sync>),
    /// Invoke the logger, then terminate the process.
    LogThenAbort(Arc<dyn Fn(&MessageRef) + Send + Sync>),
}

impl fmt::Debug for OverlimitReaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Drop => "Drop",
            Self::AbortApp => "AbortApp",
            Self::RedirectTo(_) => "RedirectTo",
            Self::Transform(_) => "Transform",
            Self::LogThenAbort(_) => "LogThenAbort",
        };
        f.write_str(name)
    }
}

/// Per-(sink, type) runtime counter with its overlimit reaction.
#[derive(Debug)]
pub struct LimitControlBlock {
    limit: usize,
    count: AtomicUsize,
    reaction: OverlimitReaction,
}

impl LimitControlBlock {
    pub(crate) fn new(limit: usize, reaction: OverlimitReaction) -> Self {
        Self {
            limit,
            count: AtomicUsize::new(0),
            reaction,
        }
    }

    /// The configured limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Current number of queued demands accounted to this block.
    pub fn current(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) fn reaction(&self) -> &OverlimitReaction {
        &self.reaction
    }

    /// Try to account one more queued message. `false` means overlimit.
    pub(crate) fn try_acquire(&self) -> bool {
        if self.count.fetch_add(1, Ordering::AcqRel) < self.limit {
            true
        } else {
            self.count.fetch_sub(1, Ordering::AcqRel);
            false
        }
    }

    /// Release one accounted message (demand executed or discarded).
    pub(crate) fn release(&self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}

/// One configured limit: which type, how many, and the reaction.
///
/// Limits are attached to an agent via its construction options and are
/// consulted by every sink the agent subscribes with.
///
/// # Example
/// ```rust,ignore
/// let options = AgentOptions::default()
///     .limit(MessageLimit::drop::<Telemetry>(100))
///     .limit(MessageLimit::redirect::<Job>(1, move || overflow_mbox.clone()));
/// ```
#[derive(Clone, Debug)]
pub struct MessageLimit {
    key: TypeKey,
    limit: usize,
    reaction: OverlimitReaction,
}

impl MessageLimit {
    /// Limit with an explicit key and reaction.
    pub fn new(key: TypeKey, limit: usize, reaction: OverlimitReaction) -> Self {
        Self {
            key,
            limit,
            reaction,
        }
    }

    /// Drop instances of `M` above `limit`.
    pub fn drop<M: Message>(limit: usize) -> Self {
        Self::new(TypeKey::immutable::<M>(), limit, OverlimitReaction::Drop)
    }

    /// Drop signals of type `S` above `limit`.
    pub fn drop_signal<S: Signal>(limit: usize) -> Self {
        Self::new(TypeKey::signal::<S>(), limit, OverlimitReaction::Drop)
    }

    /// Abort the process when an instance of `M` arrives above `limit`.
    pub fn abort_app<M: Message>(limit: usize) -> Self {
        Self::new(TypeKey::immutable::<M>(), limit, OverlimitReaction::AbortApp)
    }

    /// Redirect instances of `M` above `limit` to another mailbox.
    pub fn redirect<M, F>(limit: usize, target: F) -> Self
    where
        M: Message,
        F: Fn() -> MboxRef + Send + Sync + 'static,
    {
        Self::new(
            TypeKey::immutable::<M>(),
            limit,
            OverlimitReaction::RedirectTo(Arc::new(target)),
        )
    }

    /// Redirect mutable instances of `M` above `limit` to another mailbox.
    pub fn redirect_mutable<M, F>(limit: usize, target: F) -> Self
    where
        M: Message,
        F: Fn() -> MboxRef + Send + Sync + 'static,
    {
        Self::new(
            TypeKey::mutable::<M>(),
            limit,
            OverlimitReaction::RedirectTo(Arc::new(target)),
        )
    }

    /// Transform instances of `M` above `limit`.
    ///
    /// The transformer sees the typed payload and yields the replacement,
    /// or `None` to suppress delivery.
    pub fn transform<M, F>(limit: usize, transformer: F) -> Self
    where
        M: Message,
        F: Fn(&M) -> Option<TransformedMessage> + Send + Sync + 'static,
    {
        let erased = move |message: &MessageRef| -> Option<TransformedMessage> {
            message.downcast_ref::<M>().and_then(&transformer)
        };
        Self::new(
            TypeKey::immutable::<M>(),
            limit,
            OverlimitReaction::Transform(Arc::new(erased)),
        )
    }

    /// Transform signals of type `S` above `limit`.
    ///
    /// Signals carry no payload, so the transformer takes no argument.
    pub fn transform_signal<S, F>(limit: usize, transformer: F) -> Self
    where
        S: Signal,
        F: Fn() -> Option<TransformedMessage> + Send + Sync + 'static,
    {
        let erased = move |_: &MessageRef| -> Option<TransformedMessage> { transformer() };
        Self::new(
            TypeKey::signal::<S>(),
            limit,
            OverlimitReaction::Transform(Arc::new(erased)),
        )
    }

    /// Log, then abort the process.
    pub fn log_then_abort<M, F>(limit: usize, logger: F) -> Self
    where
        M: Message,
        F: Fn(&MessageRef) + Send + Sync + 'static,
    {
        Self::new(
            TypeKey::immutable::<M>(),
            limit,
            OverlimitReaction::LogThenAbort(Arc::new(logger)),
        )
    }

    /// The dispatch key this limit applies to.
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub(crate) fn into_control_block(self) -> (TypeKey, Arc<LimitControlBlock>) {
        (
            self.key,
            Arc::new(LimitControlBlock::new(self.limit, self.reaction)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Job;

    #[test]
    fn test_acquire_up_to_limit() {
        let block = LimitControlBlock::new(2, OverlimitReaction::Drop);
        assert!(block.try_acquire());
        assert!(block.try_acquire());
        assert!(!block.try_acquire());
        assert_eq!(block.current(), 2);
    }

    #[test]
    fn test_release_frees_a_slot() {
        let block = LimitControlBlock::new(1, OverlimitReaction::Drop);
        assert!(block.try_acquire());
        assert!(!block.try_acquire());
        block.release();
        assert!(block.try_acquire());
    }

    #[test]
    fn test_limit_constructors_pick_keys() {
        let limit = MessageLimit::drop::<Job>(3);
        assert_eq!(limit.key(), TypeKey::immutable::<Job>());

        struct Tick;
        impl Signal for Tick {}
        let limit = MessageLimit::drop_signal::<Tick>(3);
        assert_eq!(limit.key(), TypeKey::signal::<Tick>());
    }

    #[test]
    fn test_control_block_from_limit() {
        let (key, block) = MessageLimit::drop::<Job>(5).into_control_block();
        assert_eq!(key, TypeKey::immutable::<Job>());
        assert_eq!(block.limit(), 5);
        assert_eq!(block.current(), 0);
    }

    #[test]
    fn test_reaction_debug_names() {
        assert_eq!(format!("{:?}", OverlimitReaction::Drop), "Drop");
        assert_eq!(format!("{:?}", OverlimitReaction::AbortApp), "AbortApp");
    }
}
