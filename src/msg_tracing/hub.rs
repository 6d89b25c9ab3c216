// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use parking_lot::RwLock;

// Layer 3: Internal module imports
use super::events::TraceEvent;
use super::traits::{TraceFilter, Tracer};
use crate::message::{Envelope, MessageRef};

/// Per-environment tracing state shared by mailboxes and sinks.
///
/// The hub is created once from the environment params; the tracer is fixed
/// for the environment lifetime, the filter can be swapped at run time.
/// When no tracer is installed every emit call is a cheap boolean check.
pub struct TracingHub {
    tracer: Option<Arc<dyn Tracer>>,
    filter: RwLock<Option<Arc<dyn TraceFilter>>>,
}

impl TracingHub {
    /// Hub with no tracer: tracing disabled.
    pub(crate) fn disabled() -> Self {
        Self {
            tracer: None,
            filter: RwLock::new(None),
        }
    }

    /// Hub with the given tracer installed.
    pub(crate) fn with_tracer(tracer: Arc<dyn Tracer>) -> Self {
        Self {
            tracer: Some(tracer),
            filter: RwLock::new(None),
        }
    }

    /// True when a tracer is installed.
    pub fn is_enabled(&self) -> bool {
        self.tracer.is_some()
    }

    /// Install or replace the trace filter.
    pub fn set_filter(&self, filter: Arc<dyn TraceFilter>) {
        *self.filter.write() = Some(filter);
    }

    /// Remove the trace filter; every event reaches the tracer again.
    pub fn drop_filter(&self) {
        *self.filter.write() = None;
    }

    /// Emit one event for the given message.
    ///
    /// The event is built lazily: when tracing is off the closure never
    /// runs. Individually-traced messages bypass the filter.
    pub(crate) fn emit(&self, message: &MessageRef, build: impl FnOnce() -> TraceEvent) {
        let Some(tracer) = &self.tracer else {
            return;
        };

        let individual = message
            .as_envelope()
            .map(|envelope| envelope.individual_trace())
            .unwrap_or(false);

        let mut event = build();
        event.individual = individual;

        if !individual {
            if let Some(filter) = self.filter.read().as_ref() {
                if !filter.accept(&event) {
                    return;
                }
            }
        }

        tracer.trace(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::IndividualTraceEnvelope;
    use crate::msg_tracing::events::TraceStep;
    use crate::msg_tracing::CollectorTracer;

    #[derive(Debug)]
    struct Ping;

    fn event() -> TraceEvent {
        TraceEvent::new(TraceStep::PushEvent, 1, "Ping")
    }

    #[test]
    fn test_disabled_hub_emits_nothing() {
        let hub = TracingHub::disabled();
        assert!(!hub.is_enabled());
        hub.emit(&MessageRef::message(Ping), event);
    }

    #[test]
    fn test_enabled_hub_reaches_tracer() {
        let tracer = Arc::new(CollectorTracer::new());
        let hub = TracingHub::with_tracer(Arc::<CollectorTracer>::clone(&tracer));
        hub.emit(&MessageRef::message(Ping), event);
        assert_eq!(tracer.events().len(), 1);
    }

    #[test]
    fn test_filter_rejects_events() {
        let tracer = Arc::new(CollectorTracer::new());
        let hub = TracingHub::with_tracer(Arc::<CollectorTracer>::clone(&tracer));
        hub.set_filter(Arc::new(|_: &TraceEvent| false));
        hub.emit(&MessageRef::message(Ping), event);
        assert!(tracer.events().is_empty());

        hub.drop_filter();
        hub.emit(&MessageRef::message(Ping), event);
        assert_eq!(tracer.events().len(), 1);
    }

    #[test]
    fn test_individual_trace_bypasses_filter() {
        let tracer = Arc::new(CollectorTracer::new());
        let hub = TracingHub::with_tracer(Arc::<CollectorTracer>::clone(&tracer));
        hub.set_filter(Arc::new(|_: &TraceEvent| false));

        let marked = IndividualTraceEnvelope::wrap(Ping);
        hub.emit(&marked, event);

        let events = tracer.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].individual);
    }
}
