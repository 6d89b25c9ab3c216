// Layer 1: Standard library imports
use std::io::Write;

// Layer 2: Third-party crate imports
use parking_lot::Mutex;

// Layer 3: Internal module imports
use super::events::TraceEvent;
use super::traits::Tracer;

/// Tracer writing one JSON object per line to stdout.
pub struct StdoutTracer;

impl StdoutTracer {
    /// Create the tracer.
    pub fn new() -> Self {
        Self
    }
}

impl Default for StdoutTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer for StdoutTracer {
    fn trace(&self, event: &TraceEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            let _ = writeln!(lock, "{line}");
        }
    }
}

/// Tracer accumulating events in memory; meant for tests and inspection.
pub struct CollectorTracer {
    events: Mutex<Vec<TraceEvent>>,
}

impl CollectorTracer {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the collected events.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    /// Number of collected events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True when nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl Default for CollectorTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer for CollectorTracer {
    fn trace(&self, event: &TraceEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg_tracing::events::TraceStep;

    #[test]
    fn test_collector_accumulates() {
        let tracer = CollectorTracer::new();
        assert!(tracer.is_empty());

        tracer.trace(&TraceEvent::new(TraceStep::PushEvent, 1, "A"));
        tracer.trace(&TraceEvent::new(TraceStep::NoSubscribers, 2, "B"));

        assert_eq!(tracer.len(), 2);
        assert_eq!(tracer.events()[1].step, TraceStep::NoSubscribers);
    }
}
