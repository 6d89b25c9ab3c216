//! Message-delivery tracing.
//!
//! When enabled, the runtime emits a [`TraceEvent`] at each major delivery
//! step: the push into a sink, an overlimit reaction, a filtered-out
//! delivery, a delivery with no subscribers, and the handler search outcome
//! on the receiving side. A pluggable [`TraceFilter`] narrows the stream; a
//! message wrapped in [`IndividualTraceEnvelope`] is traced regardless of
//! the filter.
//!
//! [`IndividualTraceEnvelope`]: crate::message::IndividualTraceEnvelope

pub mod events;
pub mod hub;
pub mod traits;

mod std_tracer;

pub use events::{TraceEvent, TraceStep};
pub use hub::TracingHub;
pub use std_tracer::{CollectorTracer, StdoutTracer};
pub use traits::{TraceFilter, Tracer};
