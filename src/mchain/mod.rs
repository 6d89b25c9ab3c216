//! Message chains: mailbox-compatible queues consumed from plain threads.
//!
//! A chain is the bridge between the agent world and ordinary code: any
//! send function delivers into it (it implements
//! [`Mailbox`](crate::mailbox::Mailbox)), and any thread drains it with
//! [`MChain::recv`]. Chains are bounded or unbounded; a bounded chain
//! applies its overflow reaction when full, optionally after blocking the
//! sender for a configured wait (never in non-blocking deliveries).

// Layer 1: Standard library imports
use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use parking_lot::{Condvar, Mutex};

// Layer 3: Internal module imports
use crate::environment::Environment;
use crate::error::{Result, RuntimeError};
use crate::mailbox::{DeliveryMode, FilterRef, Mailbox, MailboxKind, MboxRef};
use crate::message::{MessageRef, TypeKey};
use crate::msg_tracing::TracingHub;
use crate::sink::SinkRef;
use crate::util::MailboxId;

/// What a bounded chain does with a message arriving while full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowReaction {
    /// Discard the new message.
    DropNewest,
    /// Discard the oldest queued message to make room.
    RemoveOldest,
    /// Fail the send with [`RuntimeError::MChainFull`]. Downgrades to
    /// `DropNewest` for non-blocking deliveries, which must not fail.
    ThrowException,
    /// Terminate the process.
    AbortApp,
}

/// Construction parameters of a chain.
#[derive(Debug, Clone)]
pub struct MChainParams {
    pub(crate) capacity: Option<usize>,
    pub(crate) overflow: OverflowReaction,
    pub(crate) wait_on_overflow: Option<Duration>,
}

impl MChainParams {
    /// Chain without a capacity limit.
    pub fn unbounded() -> Self {
        Self {
            capacity: None,
            overflow: OverflowReaction::DropNewest,
            wait_on_overflow: None,
        }
    }

    /// Chain holding at most `capacity` messages.
    pub fn bounded(capacity: usize, overflow: OverflowReaction) -> Self {
        Self {
            capacity: Some(capacity),
            overflow,
            wait_on_overflow: None,
        }
    }

    /// Let ordinary (blocking-allowed) senders wait this long for room
    /// before the overflow reaction applies.
    pub fn wait_on_overflow(mut self, wait: Duration) -> Self {
        self.wait_on_overflow = Some(wait);
        self
    }
}

/// How [`MChain::close`] treats queued messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// Queued messages are dropped; pending `recv` calls fail.
    DropContent,
    /// Queued messages stay receivable; `recv` fails once drained.
    RetainContent,
}

struct ChainInner {
    queue: VecDeque<MessageRef>,
    closed: bool,
}

/// A message chain. Created with
/// [`Environment::create_mchain`](crate::environment::Environment::create_mchain).
pub struct MChain {
    id: MailboxId,
    env: Environment,
    hub: Arc<TracingHub>,
    params: MChainParams,
    inner: Mutex<ChainInner>,
    readable: Condvar,
    writable: Condvar,
}

impl MChain {
    pub(crate) fn new(
        id: MailboxId,
        env: Environment,
        hub: Arc<TracingHub>,
        params: MChainParams,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            env,
            hub,
            params,
            inner: Mutex::new(ChainInner {
                queue: VecDeque::new(),
                closed: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        })
    }

    /// This chain as a mailbox, for the send functions.
    pub fn as_mbox(self: &Arc<Self>) -> MboxRef {
        Arc::<Self>::clone(self) as MboxRef
    }

    /// Take the next message, waiting up to `timeout` (forever if `None`).
    pub fn recv(&self, timeout: Option<Duration>) -> Result<MessageRef> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(message) = inner.queue.pop_front() {
                drop(inner);
                self.writable.notify_one();
                return Ok(message);
            }
            if inner.closed {
                return Err(RuntimeError::MChainClosed { mbox: self.id });
            }
            match timeout {
                None => self.readable.wait(&mut inner),
                Some(timeout) => {
                    if self.readable.wait_for(&mut inner, timeout).timed_out()
                        && inner.queue.is_empty()
                    {
                        return Err(RuntimeError::Timeout { timeout });
                    }
                }
            }
        }
    }

    /// Take the next message if one is queued.
    pub fn try_recv(&self) -> Option<MessageRef> {
        let message = self.inner.lock().queue.pop_front();
        if message.is_some() {
            self.writable.notify_one();
        }
        message
    }

    /// Close the chain and wake every blocked sender and receiver.
    pub fn close(&self, mode: CloseMode) {
        {
            let mut inner = self.inner.lock();
            inner.closed = true;
            if mode == CloseMode::DropContent {
                inner.queue.clear();
            }
        }
        self.readable.notify_all();
        self.writable.notify_all();
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once the chain is closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl Mailbox for MChain {
    fn id(&self) -> MailboxId {
        self.id
    }

    fn kind(&self) -> MailboxKind {
        MailboxKind::Mpsc
    }

    fn name(&self) -> String {
        format!("<mbox:type=MCHAIN:id={}>", self.id)
    }

    fn environment(&self) -> Environment {
        self.env.clone()
    }

    fn subscribe(&self, _key: TypeKey, _sink: SinkRef) -> Result<()> {
        Err(RuntimeError::SubscriptionNotSupported { mbox: self.id })
    }

    fn unsubscribe(&self, _key: TypeKey, _sink: &SinkRef) {}

    fn deliver(&self, mode: DeliveryMode, message: MessageRef, _depth: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return match mode {
                DeliveryMode::Ordinary => Err(RuntimeError::MChainClosed { mbox: self.id }),
                DeliveryMode::NonBlocking => Ok(()),
            };
        }

        if let Some(capacity) = self.params.capacity {
            if inner.queue.len() >= capacity && mode == DeliveryMode::Ordinary {
                if let Some(wait) = self.params.wait_on_overflow {
                    let deadline = std::time::Instant::now() + wait;
                    while inner.queue.len() >= capacity && !inner.closed {
                        if self.writable.wait_until(&mut inner, deadline).timed_out() {
                            break;
                        }
                    }
                    if inner.closed {
                        return Err(RuntimeError::MChainClosed { mbox: self.id });
                    }
                }
            }

            if inner.queue.len() >= capacity {
                match self.params.overflow {
                    OverflowReaction::DropNewest => return Ok(()),
                    OverflowReaction::RemoveOldest => {
                        inner.queue.pop_front();
                    }
                    OverflowReaction::ThrowException => {
                        return match mode {
                            DeliveryMode::Ordinary => Err(RuntimeError::MChainFull {
                                mbox: self.id,
                                capacity,
                            }),
                            // The timer thread and overlimit reactions must
                            // not observe failures; full means drop.
                            DeliveryMode::NonBlocking => Ok(()),
                        };
                    }
                    OverflowReaction::AbortApp => {
                        eprintln!(
                            "agentry: message chain {} overflow with AbortApp policy; aborting",
                            self.id
                        );
                        std::process::abort();
                    }
                }
            }
        }

        inner.queue.push_back(message);
        drop(inner);
        self.readable.notify_one();
        Ok(())
    }

    fn set_delivery_filter(&self, _key: TypeKey, _filter: FilterRef, _sink: &SinkRef) -> Result<()> {
        Err(RuntimeError::DeliveryFilterOnMpscMbox { mbox: self.id })
    }

    fn drop_delivery_filter(&self, _key: TypeKey, _sink: &SinkRef) {}

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::send::{send, send_signal};
    use crate::message::Signal;

    fn chain(params: MChainParams) -> Arc<MChain> {
        Environment::core_for_tests().create_mchain(params)
    }

    #[test]
    fn test_fifo_roundtrip() {
        let chain = chain(MChainParams::unbounded());
        let mbox = chain.as_mbox();
        send(&mbox, 1u32).unwrap();
        send(&mbox, 2u32).unwrap();

        let first = chain.recv(None).unwrap();
        let second = chain.recv(None).unwrap();
        assert_eq!(first.downcast_ref::<u32>(), Some(&1));
        assert_eq!(second.downcast_ref::<u32>(), Some(&2));
    }

    #[test]
    fn test_signals_travel_too() {
        struct Done;
        impl Signal for Done {}

        let chain = chain(MChainParams::unbounded());
        send_signal::<Done>(&chain.as_mbox()).unwrap();
        let msg = chain.recv(None).unwrap();
        assert!(msg.is_signal());
        assert_eq!(msg.key(), TypeKey::signal::<Done>());
    }

    #[test]
    fn test_bounded_drop_newest() {
        let chain = chain(MChainParams::bounded(1, OverflowReaction::DropNewest));
        let mbox = chain.as_mbox();
        send(&mbox, 1u32).unwrap();
        send(&mbox, 2u32).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.recv(None).unwrap().downcast_ref::<u32>(), Some(&1));
    }

    #[test]
    fn test_bounded_remove_oldest() {
        let chain = chain(MChainParams::bounded(1, OverflowReaction::RemoveOldest));
        let mbox = chain.as_mbox();
        send(&mbox, 1u32).unwrap();
        send(&mbox, 2u32).unwrap();
        assert_eq!(chain.recv(None).unwrap().downcast_ref::<u32>(), Some(&2));
    }

    #[test]
    fn test_bounded_throw_exception() {
        let chain = chain(MChainParams::bounded(1, OverflowReaction::ThrowException));
        let mbox = chain.as_mbox();
        send(&mbox, 1u32).unwrap();
        assert!(matches!(
            send(&mbox, 2u32),
            Err(RuntimeError::MChainFull { capacity: 1, .. })
        ));
        // Non-blocking delivery degrades to a silent drop.
        assert!(mbox
            .deliver(DeliveryMode::NonBlocking, MessageRef::message(3u32), 0)
            .is_ok());
    }

    #[test]
    fn test_recv_timeout() {
        let chain = chain(MChainParams::unbounded());
        let result = chain.recv(Some(Duration::from_millis(10)));
        assert!(matches!(result, Err(RuntimeError::Timeout { .. })));
    }

    #[test]
    fn test_close_drop_content() {
        let chain = chain(MChainParams::unbounded());
        send(&chain.as_mbox(), 1u32).unwrap();
        chain.close(CloseMode::DropContent);
        assert!(matches!(
            chain.recv(None),
            Err(RuntimeError::MChainClosed { .. })
        ));
    }

    #[test]
    fn test_close_retain_content() {
        let chain = chain(MChainParams::unbounded());
        send(&chain.as_mbox(), 1u32).unwrap();
        chain.close(CloseMode::RetainContent);
        assert_eq!(chain.recv(None).unwrap().downcast_ref::<u32>(), Some(&1));
        assert!(chain.recv(None).is_err());
    }

    #[test]
    fn test_subscribe_refused() {
        let chain = chain(MChainParams::unbounded());
        assert_eq!(chain.kind(), MailboxKind::Mpsc);
        assert!(chain.name().contains("MCHAIN"));
    }
}
