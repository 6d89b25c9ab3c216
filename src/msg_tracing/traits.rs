// Layer 3: Internal module imports
use super::events::TraceEvent;

/// Receiver of delivery trace events.
///
/// Implementations must be cheap and must not panic: tracing runs inline on
/// delivery paths of arbitrary threads.
pub trait Tracer: Send + Sync + 'static {
    /// Record one delivery step.
    fn trace(&self, event: &TraceEvent);
}

/// Predicate narrowing the trace stream.
///
/// Returning `false` skips the event. The filter does not see events for
/// individually-traced messages; those bypass it by design.
pub trait TraceFilter: Send + Sync + 'static {
    /// Decide whether the event should reach the tracer.
    fn accept(&self, event: &TraceEvent) -> bool;
}

impl<F> TraceFilter for F
where
    F: Fn(&TraceEvent) -> bool + Send + Sync + 'static,
{
    fn accept(&self, event: &TraceEvent) -> bool {
        self(event)
    }
}
