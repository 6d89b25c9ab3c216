// Layer 1: Standard library imports
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use parking_lot::RwLock;

// Layer 3: Internal module imports
use super::traits::{DeliveryMode, FilterRef, Mailbox, MailboxKind};
use crate::environment::Environment;
use crate::error::{Result, RuntimeError};
use crate::message::{MessageRef, TypeKey};
use crate::msg_tracing::{TraceEvent, TraceStep, TracingHub};
use crate::sink::{MessageSink, SinkRef};
use crate::util::MailboxId;

struct UniqueEntry {
    sink: SinkRef,
    subscribed: bool,
    filter: Option<FilterRef>,
}

/// MPMC-creatable mailbox with at most one subscriber per message type.
///
/// Because each type has a unique consumer, subscriptions to mutable
/// messages are legal here — the one place outside direct mailboxes where
/// they are. Different types may be consumed by different agents.
pub struct UniqueSubscribersMbox {
    id: MailboxId,
    env: Environment,
    hub: Arc<TracingHub>,
    subscribers: RwLock<HashMap<TypeKey, UniqueEntry>>,
}

impl UniqueSubscribersMbox {
    pub(crate) fn new(id: MailboxId, env: Environment, hub: Arc<TracingHub>) -> Self {
        Self {
            id,
            env,
            hub,
            subscribers: RwLock::new(HashMap::new()),
        }
    }
}

impl Mailbox for UniqueSubscribersMbox {
    fn id(&self) -> MailboxId {
        self.id
    }

    fn kind(&self) -> MailboxKind {
        MailboxKind::Mpmc
    }

    fn name(&self) -> String {
        format!("<mbox:type=MPMC-unique:id={}>", self.id)
    }

    fn environment(&self) -> Environment {
        self.env.clone()
    }

    fn subscribe(&self, key: TypeKey, sink: SinkRef) -> Result<()> {
        let mut table = self.subscribers.write();
        match table.get(&key) {
            Some(entry) if entry.sink.sink_id() != sink.sink_id() => {
                Err(RuntimeError::UniqueSubscriberClash {
                    mbox: self.id,
                    type_name: key.type_name(),
                })
            }
            Some(_) => {
                if let Some(entry) = table.get_mut(&key) {
                    entry.subscribed = true;
                }
                Ok(())
            }
            None => {
                table.insert(
                    key,
                    UniqueEntry {
                        sink,
                        subscribed: true,
                        filter: None,
                    },
                );
                Ok(())
            }
        }
    }

    fn unsubscribe(&self, key: TypeKey, sink: &SinkRef) {
        let mut table = self.subscribers.write();
        if let Some(entry) = table.get(&key) {
            if entry.sink.sink_id() == sink.sink_id() {
                table.remove(&key);
            }
        }
    }

    fn deliver(&self, mode: DeliveryMode, message: MessageRef, depth: u32) -> Result<()> {
        let key = message.key();
        let table = self.subscribers.read();

        if let Some(entry) = table.get(&key).filter(|e| e.subscribed) {
            if let Some(filter) = &entry.filter {
                if !filter(&message) {
                    self.hub.emit(&message, || {
                        TraceEvent::new(TraceStep::FilteredOut, self.id.raw(), key.type_name())
                            .with_agent(entry.sink.sink_id().raw())
                            .with_depth(depth)
                    });
                    return Ok(());
                }
            }
            return entry.sink.push_event(mode, self.id, message, depth);
        }

        self.hub.emit(&message, || {
            TraceEvent::new(TraceStep::NoSubscribers, self.id.raw(), key.type_name())
                .with_depth(depth)
        });
        Ok(())
    }

    fn set_delivery_filter(&self, key: TypeKey, filter: FilterRef, sink: &SinkRef) -> Result<()> {
        let mut table = self.subscribers.write();
        match table.get_mut(&key) {
            Some(entry) if entry.sink.sink_id() == sink.sink_id() => {
                entry.filter = Some(filter);
                Ok(())
            }
            Some(_) => Err(RuntimeError::UniqueSubscriberClash {
                mbox: self.id,
                type_name: key.type_name(),
            }),
            None => {
                table.insert(
                    key,
                    UniqueEntry {
                        sink: Arc::clone(sink),
                        subscribed: false,
                        filter: Some(filter),
                    },
                );
                Ok(())
            }
        }
    }

    fn drop_delivery_filter(&self, key: TypeKey, sink: &SinkRef) {
        let mut table = self.subscribers.write();
        if let Some(entry) = table.get_mut(&key) {
            if entry.sink.sink_id() == sink.sink_id() {
                entry.filter = None;
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
