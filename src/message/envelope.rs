//! Enveloped messages.
//!
//! An envelope is a message that wraps another message and gets a say at
//! the moment the wrapped payload is about to be used. Final handlers never
//! see the envelope itself: just before invocation the runtime calls the
//! envelope's access hook, and the envelope decides whether to expose the
//! payload by calling back into the supplied invoker. Not calling the
//! invoker suppresses handling silently. Intermediate handlers
//! (`transfer_to_state` and friends) operate on the envelope as a whole and
//! keep it intact across re-dispatch.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 3: Internal module imports
use super::refs::MessageRef;
use super::traits::{Message, TypeKey};

/// Why the payload is being accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessContext {
    /// A final event handler was found and is about to be invoked.
    HandlerFound,
    /// An overlimit transform/redirect reaction needs the payload.
    Transformation,
    /// An observer (tracer, test fixture) wants to look without handling.
    Inspection,
}

/// Callback handed to [`Envelope::access_hook`].
///
/// The envelope calls [`EnvelopeInvoker::invoke`] with the payload it
/// chooses to expose; skipping the call suppresses the operation.
pub trait EnvelopeInvoker {
    /// Proceed with the exposed payload.
    fn invoke(&mut self, payload: &MessageRef);
}

/// A message wrapping another message.
///
/// Implementations must not unwind from the hook: it runs on delivery and
/// dispatch paths that cannot tolerate panics.
pub trait Envelope: Send + Sync + 'static {
    /// Give the envelope control just before its payload is used.
    fn access_hook(&self, context: AccessContext, invoker: &mut dyn EnvelopeInvoker);

    /// True when this envelope requests tracing of its payload regardless
    /// of the global trace filter.
    fn individual_trace(&self) -> bool {
        false
    }
}

/// Envelope that marks a single message for delivery tracing.
///
/// Wrapping a message in this envelope makes the tracer record its delivery
/// steps even when the global filter would skip them. The payload is exposed
/// unconditionally in every access context.
pub struct IndividualTraceEnvelope {
    payload: MessageRef,
}

impl IndividualTraceEnvelope {
    /// Wrap a message value.
    pub fn wrap<M: Message>(message: M) -> MessageRef {
        let payload = MessageRef::message(message);
        let key = payload.key();
        MessageRef::envelope(Arc::new(Self { payload }), key)
    }

    /// Wrap an existing reference.
    pub fn wrap_ref(payload: MessageRef) -> MessageRef {
        let key = payload.key();
        MessageRef::envelope(Arc::new(Self { payload }), key)
    }
}

impl Envelope for IndividualTraceEnvelope {
    fn access_hook(&self, _context: AccessContext, invoker: &mut dyn EnvelopeInvoker) {
        invoker.invoke(&self.payload);
    }

    fn individual_trace(&self) -> bool {
        true
    }
}

/// Helper: run the access hook and collect the exposed payload, if any.
pub(crate) fn open_envelope(
    envelope: &Arc<dyn Envelope>,
    context: AccessContext,
) -> Option<MessageRef> {
    struct Collect {
        exposed: Option<MessageRef>,
    }
    impl EnvelopeInvoker for Collect {
        fn invoke(&mut self, payload: &MessageRef) {
            self.exposed = Some(payload.clone());
        }
    }

    let mut collect = Collect { exposed: None };
    let guard = crate::util::abort_guard::AbortOnPanic::new("envelope access hook");
    envelope.access_hook(context, &mut collect);
    guard.disarm();
    collect.exposed
}

/// Resolve a message to the payload a final handler should see.
///
/// Plain messages pass through unchanged; envelopes are opened in
/// [`AccessContext::HandlerFound`]. `None` means the envelope suppressed
/// handling.
pub(crate) fn payload_for_handler(message: &MessageRef) -> Option<MessageRef> {
    match message.as_envelope() {
        Some(envelope) => open_envelope(envelope, AccessContext::HandlerFound),
        None => Some(message.clone()),
    }
}

/// Resolve a message to the payload a transformation should see.
pub(crate) fn payload_for_transformation(message: &MessageRef) -> Option<MessageRef> {
    match message.as_envelope() {
        Some(envelope) => open_envelope(envelope, AccessContext::Transformation),
        None => Some(message.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Inner {
        value: i32,
    }

    struct Selective {
        payload: MessageRef,
        expose_on_handler: bool,
    }

    impl Envelope for Selective {
        fn access_hook(&self, context: AccessContext, invoker: &mut dyn EnvelopeInvoker) {
            if context != AccessContext::HandlerFound || self.expose_on_handler {
                invoker.invoke(&self.payload);
            }
        }
    }

    fn make_selective(expose: bool) -> MessageRef {
        let payload = MessageRef::message(Inner { value: 17 });
        let key = payload.key();
        MessageRef::envelope(
            Arc::new(Selective {
                payload,
                expose_on_handler: expose,
            }),
            key,
        )
    }

    #[test]
    fn test_envelope_keeps_payload_key() {
        let enveloped = make_selective(true);
        assert_eq!(enveloped.key(), TypeKey::immutable::<Inner>());
        assert!(enveloped.is_envelope());
    }

    #[test]
    fn test_exposing_envelope_yields_payload() {
        let enveloped = make_selective(true);
        let exposed = payload_for_handler(&enveloped).unwrap();
        assert_eq!(exposed.downcast_ref::<Inner>().map(|i| i.value), Some(17));
    }

    #[test]
    fn test_suppressing_envelope_yields_none() {
        let enveloped = make_selective(false);
        assert!(payload_for_handler(&enveloped).is_none());
        // Inspection context is still allowed by this envelope.
        assert!(payload_for_transformation(&enveloped).is_some());
    }

    #[test]
    fn test_individual_trace_envelope_exposes_always() {
        let enveloped = IndividualTraceEnvelope::wrap(Inner { value: 3 });
        assert!(enveloped
            .as_envelope()
            .map(|e| e.individual_trace())
            .unwrap_or(false));
        let exposed = payload_for_handler(&enveloped).unwrap();
        assert_eq!(exposed.downcast_ref::<Inner>().map(|i| i.value), Some(3));
    }

    #[test]
    fn test_plain_message_passes_through() {
        let msg = MessageRef::message(Inner { value: 8 });
        let exposed = payload_for_handler(&msg).unwrap();
        assert_eq!(exposed.downcast_ref::<Inner>().map(|i| i.value), Some(8));
    }
}
