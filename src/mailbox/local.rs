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
use crate::message::{MessageRef, Mutability, TypeKey};
use crate::msg_tracing::{TraceEvent, TraceStep, TracingHub};
use crate::sink::{MessageSink, SinkRef};
use crate::util::MailboxId;

struct SubscriberEntry {
    sink: SinkRef,
    subscribed: bool,
    filter: Option<FilterRef>,
}

/// The standard MPMC mailbox.
///
/// Holds `TypeKey → ordered subscriber list`; delivery walks the list under
/// a read lock and fans the message out to every subscriber whose filter
/// (if any) accepts it, in subscription order. Subscribing to a mutable
/// message type fails here: fan-out and single-consumer semantics do not
/// mix.
pub struct LocalMbox {
    id: MailboxId,
    env: Environment,
    hub: Arc<TracingHub>,
    subscribers: RwLock<HashMap<TypeKey, Vec<SubscriberEntry>>>,
}

impl LocalMbox {
    pub(crate) fn new(id: MailboxId, env: Environment, hub: Arc<TracingHub>) -> Self {
        Self {
            id,
            env,
            hub,
            subscribers: RwLock::new(HashMap::new()),
        }
    }
}

impl Mailbox for LocalMbox {
    fn id(&self) -> MailboxId {
        self.id
    }

    fn kind(&self) -> MailboxKind {
        MailboxKind::Mpmc
    }

    fn name(&self) -> String {
        format!("<mbox:type=MPMC:id={}>", self.id)
    }

    fn environment(&self) -> Environment {
        self.env.clone()
    }

    fn subscribe(&self, key: TypeKey, sink: SinkRef) -> Result<()> {
        if key.mutability() == Mutability::Mutable {
            return Err(RuntimeError::SubscriptionToMutableFromMpmcMbox {
                mbox: self.id,
                type_name: key.type_name(),
            });
        }

        let mut table = self.subscribers.write();
        let entries = table.entry(key).or_default();
        match entries.iter_mut().find(|e| e.sink.sink_id() == sink.sink_id()) {
            Some(entry) => entry.subscribed = true,
            None => entries.push(SubscriberEntry {
                sink,
                subscribed: true,
                filter: None,
            }),
        }
        Ok(())
    }

    fn unsubscribe(&self, key: TypeKey, sink: &SinkRef) {
        let mut table = self.subscribers.write();
        if let Some(entries) = table.get_mut(&key) {
            if let Some(pos) = entries
                .iter()
                .position(|e| e.sink.sink_id() == sink.sink_id())
            {
                entries[pos].subscribed = false;
                if entries[pos].filter.is_none() {
                    entries.remove(pos);
                }
            }
            if entries.is_empty() {
                table.remove(&key);
            }
        }
    }

    fn deliver(&self, mode: DeliveryMode, message: MessageRef, depth: u32) -> Result<()> {
        let key = message.key();
        let table = self.subscribers.read();

        let mut delivered = false;
        if let Some(entries) = table.get(&key) {
            for entry in entries.iter().filter(|e| e.subscribed) {
                if let Some(filter) = &entry.filter {
                    if !filter(&message) {
                        self.hub.emit(&message, || {
                            TraceEvent::new(
                                TraceStep::FilteredOut,
                                self.id.raw(),
                                key.type_name(),
                            )
                            .with_agent(entry.sink.sink_id().raw())
                            .with_depth(depth)
                        });
                        continue;
                    }
                }
                entry
                    .sink
                    .push_event(mode, self.id, message.clone(), depth)?;
                delivered = true;
            }
        }

        if !delivered {
            self.hub.emit(&message, || {
                TraceEvent::new(TraceStep::NoSubscribers, self.id.raw(), key.type_name())
                    .with_depth(depth)
            });
        }
        Ok(())
    }

    fn set_delivery_filter(&self, key: TypeKey, filter: FilterRef, sink: &SinkRef) -> Result<()> {
        let mut table = self.subscribers.write();
        let entries = table.entry(key).or_default();
        match entries.iter_mut().find(|e| e.sink.sink_id() == sink.sink_id()) {
            Some(entry) => entry.filter = Some(filter),
            None => entries.push(SubscriberEntry {
                sink: Arc::clone(sink),
                subscribed: false,
                filter: Some(filter),
            }),
        }
        Ok(())
    }

    fn drop_delivery_filter(&self, key: TypeKey, sink: &SinkRef) {
        let mut table = self.subscribers.write();
        if let Some(entries) = table.get_mut(&key) {
            if let Some(pos) = entries
                .iter()
                .position(|e| e.sink.sink_id() == sink.sink_id())
            {
                entries[pos].filter = None;
                if !entries[pos].subscribed {
                    entries.remove(pos);
                }
            }
            if entries.is_empty() {
                table.remove(&key);
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
