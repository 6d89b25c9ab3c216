// Layer 1: Standard library imports
use std::any::Any;
use std::fmt;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use parking_lot::Mutex;

// Layer 3: Internal module imports
use super::envelope::Envelope;
use super::traits::{Message, Signal, TypeKey};

/// Shared-ownership handle to one message instance.
///
/// Cloning is cheap (an `Arc` bump). The handle carries the dispatch key,
/// so delivery never needs a separate type argument. Signals are a handle
/// with no payload at all.
#[derive(Clone)]
pub struct MessageRef {
    key: TypeKey,
    payload: Payload,
}

#[derive(Clone)]
pub(crate) enum Payload {
    /// A signal: type only, no instance.
    Signal,
    /// Shared immutable instance.
    Immutable(Arc<dyn Any + Send + Sync>),
    /// Mutable instance, taken by value by its single consumer.
    Mutable(Arc<Mutex<Option<Box<dyn Any + Send>>>>),
    /// An envelope wrapping another message.
    Envelope(Arc<dyn Envelope>),
}

impl MessageRef {
    /// Wrap an immutable message.
    pub fn message<M: Message>(message: M) -> Self {
        Self {
            key: TypeKey::immutable::<M>(),
            payload: Payload::Immutable(Arc::new(message)),
        }
    }

    /// Wrap a mutable message.
    ///
    /// The instance will be handed out by value to the single consumer via
    /// [`MessageRef::take_mutable`]; after that the reference is empty.
    pub fn mutable_message<M: Message>(message: M) -> Self {
        Self {
            key: TypeKey::mutable::<M>(),
            payload: Payload::Mutable(Arc::new(Mutex::new(Some(Box::new(message))))),
        }
    }

    /// Build the payload-free reference for signal type `S`.
    pub fn signal<S: Signal>() -> Self {
        Self {
            key: TypeKey::signal::<S>(),
            payload: Payload::Signal,
        }
    }

    /// Wrap an envelope. The envelope is dispatched under the key of the
    /// payload it carries, so subscribers of the payload type receive it.
    pub fn envelope(envelope: Arc<dyn Envelope>, payload_key: TypeKey) -> Self {
        Self {
            key: payload_key,
            payload: Payload::Envelope(envelope),
        }
    }

    /// The dispatch key of this message.
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// True when this reference represents a signal.
    pub fn is_signal(&self) -> bool {
        matches!(self.payload, Payload::Signal)
    }

    /// True when this reference carries an envelope.
    pub fn is_envelope(&self) -> bool {
        matches!(self.payload, Payload::Envelope(_))
    }

    /// The envelope, when this reference carries one.
    pub fn as_envelope(&self) -> Option<&Arc<dyn Envelope>> {
        match &self.payload {
            Payload::Envelope(envelope) => Some(envelope),
            _ => None,
        }
    }

    /// Borrow the immutable payload as `M`.
    ///
    /// Returns `None` for signals, envelopes, mutable payloads and type
    /// mismatches.
    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        match &self.payload {
            Payload::Immutable(any) => any.downcast_ref::<M>(),
            _ => None,
        }
    }

    /// Take the mutable payload out of the reference.
    ///
    /// The first successful call returns the instance; any later call (or a
    /// call on a non-mutable reference) returns `None`.
    pub fn take_mutable<M: Message>(&self) -> Option<Box<M>> {
        match &self.payload {
            Payload::Mutable(slot) => {
                let mut guard = slot.lock();
                match guard.take() {
                    Some(boxed) => match boxed.downcast::<M>() {
                        Ok(typed) => Some(typed),
                        Err(other) => {
                            // Wrong type requested: put the instance back.
                            *guard = Some(other);
                            None
                        }
                    },
                    None => None,
                }
            }
            _ => None,
        }
    }
}

impl fmt::Debug for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.payload {
            Payload::Signal => "signal",
            Payload::Immutable(_) => "message",
            Payload::Mutable(_) => "mutable_message",
            Payload::Envelope(_) => "envelope",
        };
        f.debug_struct("MessageRef")
            .field("kind", &kind)
            .field("type", &self.key.type_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Mutability;

    #[derive(Debug, PartialEq)]
    struct Greeting {
        text: String,
    }

    #[derive(Debug)]
    struct Tick;
    impl Signal for Tick {}

    #[test]
    fn test_immutable_roundtrip() {
        let msg = MessageRef::message(Greeting {
            text: "hello".to_string(),
        });
        assert_eq!(msg.key().mutability(), Mutability::Immutable);
        assert_eq!(
            msg.downcast_ref::<Greeting>().map(|g| g.text.as_str()),
            Some("hello")
        );
    }

    #[test]
    fn test_downcast_wrong_type_is_none() {
        let msg = MessageRef::message(Greeting {
            text: "hello".to_string(),
        });
        assert!(msg.downcast_ref::<String>().is_none());
    }

    #[test]
    fn test_signal_has_no_payload() {
        let msg = MessageRef::signal::<Tick>();
        assert!(msg.is_signal());
        assert!(msg.downcast_ref::<Tick>().is_none());
    }

    #[test]
    fn test_mutable_taken_exactly_once() {
        let msg = MessageRef::mutable_message(Greeting {
            text: "once".to_string(),
        });
        let clone = msg.clone();

        let taken = msg.take_mutable::<Greeting>();
        assert_eq!(taken.map(|g| g.text), Some("once".to_string()));
        assert!(clone.take_mutable::<Greeting>().is_none());
    }

    #[test]
    fn test_mutable_wrong_type_keeps_instance() {
        let msg = MessageRef::mutable_message(Greeting {
            text: "kept".to_string(),
        });
        assert!(msg.take_mutable::<String>().is_none());
        assert!(msg.take_mutable::<Greeting>().is_some());
    }

    #[test]
    fn test_debug_names_the_type() {
        let msg = MessageRef::message(42u32);
        let text = format!("{msg:?}");
        assert!(text.contains("u32"));
    }
}
