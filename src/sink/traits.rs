// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 3: Internal module imports
use crate::error::Result;
use crate::mailbox::DeliveryMode;
use crate::message::MessageRef;
use crate::priority::Priority;
use crate::util::{AgentId, MailboxId};

/// Shared handle to a message sink.
pub type SinkRef = Arc<dyn MessageSink>;

/// The endpoint a mailbox calls during delivery.
///
/// Mailboxes identify sinks by [`MessageSink::sink_id`]: two sinks with the
/// same id represent the same subscriber, which is what subscribe-dedup and
/// unsubscribe rely on.
pub trait MessageSink: Send + Sync + 'static {
    /// Identity of the subscriber behind this sink.
    fn sink_id(&self) -> AgentId;

    /// Priority attached to demands produced by this sink.
    fn priority(&self) -> Priority;

    /// Accept one delivery.
    ///
    /// Called on the sender's thread, with the mailbox's subscriber table
    /// read-locked. Must be cheap and must not block in
    /// [`DeliveryMode::NonBlocking`] mode.
    fn push_event(
        &self,
        mode: DeliveryMode,
        mbox_id: MailboxId,
        message: MessageRef,
        depth: u32,
    ) -> Result<()>;
}
