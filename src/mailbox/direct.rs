// Layer 1: Standard library imports
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

// Layer 2: Third-party crate imports
use parking_lot::RwLock;

// Layer 3: Internal module imports
use super::traits::{DeliveryMode, FilterRef, Mailbox, MailboxKind};
use crate::agent::cell::AgentCell;
use crate::environment::Environment;
use crate::error::{Result, RuntimeError};
use crate::message::{MessageRef, TypeKey};
use crate::msg_tracing::{TraceEvent, TraceStep, TracingHub};
use crate::sink::{AgentSink, MessageSink, SinkRef};
use crate::util::MailboxId;

/// The MPSC mailbox owned by exactly one agent.
///
/// Every agent gets one at construction — its direct mailbox. Subscription
/// attempts by any other agent fail with a distinguished error; delivery
/// forwards to the owner once it has subscribed to the message type.
/// Delivery filters are not applicable here: there is no fan-out to filter.
pub struct DirectMbox {
    id: MailboxId,
    env: Environment,
    hub: Arc<TracingHub>,
    owner: Weak<AgentCell>,
    subscriptions: RwLock<HashMap<TypeKey, SinkRef>>,
}

impl DirectMbox {
    pub(crate) fn new(
        id: MailboxId,
        env: Environment,
        hub: Arc<TracingHub>,
        owner: Weak<AgentCell>,
    ) -> Self {
        Self {
            id,
            env,
            hub,
            owner,
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    fn owner_id(&self) -> Option<crate::util::AgentId> {
        self.owner.upgrade().map(|cell| cell.id())
    }
}

impl Mailbox for DirectMbox {
    fn id(&self) -> MailboxId {
        self.id
    }

    fn kind(&self) -> MailboxKind {
        MailboxKind::Mpsc
    }

    fn name(&self) -> String {
        format!("<mbox:type=MPSC:id={}>", self.id)
    }

    fn environment(&self) -> Environment {
        self.env.clone()
    }

    fn subscribe(&self, key: TypeKey, sink: SinkRef) -> Result<()> {
        match self.owner_id() {
            Some(owner) if owner == sink.sink_id() => {
                self.subscriptions.write().insert(key, sink);
                Ok(())
            }
            _ => Err(RuntimeError::IllegalSubscriberForMpscMbox {
                mbox: self.id,
                subscriber: sink.sink_id(),
            }),
        }
    }

    fn unsubscribe(&self, key: TypeKey, sink: &SinkRef) {
        let mut table = self.subscriptions.write();
        if let Some(existing) = table.get(&key) {
            if existing.sink_id() == sink.sink_id() {
                table.remove(&key);
            }
        }
    }

    fn deliver(&self, mode: DeliveryMode, message: MessageRef, depth: u32) -> Result<()> {
        let key = message.key();

        if let Some(sink) = self.subscriptions.read().get(&key) {
            return sink.push_event(mode, self.id, message, depth);
        }

        // Runtime-internal messages (state time limits) reach the owner
        // without a user subscription.
        if crate::agent::state::is_internal_key(key) {
            if let Some(owner) = self.owner.upgrade() {
                let sink = AgentSink::new(owner, None);
                return sink.push_event(mode, self.id, message, depth);
            }
        }

        self.hub.emit(&message, || {
            TraceEvent::new(TraceStep::NoSubscribers, self.id.raw(), key.type_name())
                .with_depth(depth)
        });
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
