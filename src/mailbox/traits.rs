// Layer 1: Standard library imports
use std::any::Any;
use std::sync::Arc;

// Layer 3: Internal module imports
use crate::error::Result;
use crate::message::{MessageRef, TypeKey};
use crate::sink::SinkRef;
use crate::util::MailboxId;

/// Shared handle to a mailbox.
pub type MboxRef = Arc<dyn Mailbox>;

/// Type-erased delivery filter: `true` lets the message through.
pub type FilterRef = Arc<dyn Fn(&MessageRef) -> bool + Send + Sync>;

/// The two base mailbox kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxKind {
    /// Multi-producer, multi-consumer: any agent may subscribe.
    Mpmc,
    /// Multi-producer, single-consumer: bound to one owner agent.
    Mpsc,
}

/// How a delivery may treat the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// May block the caller (bounded chains with a wait policy).
    Ordinary,
    /// Must neither block nor fail; used from the timer thread and from
    /// overlimit-reaction callbacks.
    NonBlocking,
}

/// A message destination.
///
/// Subscription management touches only the subscriber table; delivery
/// takes the read side and must tolerate concurrent subscribe/deliver
/// calls. All methods are callable from any thread.
pub trait Mailbox: Send + Sync + 'static {
    /// Unique id of this mailbox within its environment.
    fn id(&self) -> MailboxId;

    /// MPMC or MPSC.
    fn kind(&self) -> MailboxKind;

    /// Diagnostic name, e.g. `<mbox:type=MPMC:id=42>`.
    fn name(&self) -> String;

    /// The environment this mailbox belongs to.
    fn environment(&self) -> crate::environment::Environment;

    /// Add a subscription of `sink` for messages keyed by `key`.
    fn subscribe(&self, key: TypeKey, sink: SinkRef) -> Result<()>;

    /// Remove the subscription of `sink` for `key`. Unknown pairs are a
    /// no-op.
    fn unsubscribe(&self, key: TypeKey, sink: &SinkRef);

    /// Deliver one message to the matching subscribers.
    ///
    /// `depth` counts overlimit redirect/transform hops; plain sends pass 0.
    fn deliver(&self, mode: DeliveryMode, message: MessageRef, depth: u32) -> Result<()>;

    /// Install (or replace) the delivery filter of `sink` for `key`.
    fn set_delivery_filter(&self, key: TypeKey, filter: FilterRef, sink: &SinkRef) -> Result<()>;

    /// Remove the delivery filter of `sink` for `key`.
    fn drop_delivery_filter(&self, key: TypeKey, sink: &SinkRef);

    /// Downcast support for concrete mailbox types (message chains).
    fn as_any(&self) -> &dyn Any;
}
