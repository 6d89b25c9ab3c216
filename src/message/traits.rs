// Layer 1: Standard library imports
use std::any::{Any, TypeId};
use std::fmt::Debug;

/// Any value that can travel through a mailbox.
///
/// Implemented automatically for every eligible type; there is nothing to
/// derive. The bounds mirror what delivery actually needs: messages cross
/// threads (`Send`), are shared between subscribers (`Sync`) and show up in
/// trace output (`Debug`).
///
/// # Example
/// ```rust
/// use agentry::message::Message;
///
/// #[derive(Debug)]
/// struct OrderPlaced {
///     order_id: u64,
/// }
///
/// fn assert_message<M: Message>() {}
/// assert_message::<OrderPlaced>();
/// ```
pub trait Message: Any + Send + Sync + Debug + 'static {}

impl<T> Message for T where T: Any + Send + Sync + Debug + 'static {}

/// Marker for payload-free notifications.
///
/// A signal is identified by its type alone; no instance is ever created or
/// delivered. Implement this for an empty marker type:
///
/// ```rust
/// use agentry::message::Signal;
///
/// struct Tick;
/// impl Signal for Tick {}
/// ```
pub trait Signal: 'static {}

/// Mutability tag carried by every message reference.
///
/// A mutable message has at most one live consumer at any moment: it is
/// delivered by value, and subscribing to a mutable type on a plain MPMC
/// mailbox fails (only single-consumer destinations qualify).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutability {
    /// Shared between any number of subscribers.
    Immutable,
    /// Delivered by value to exactly one consumer.
    Mutable,
}

/// Dispatch key: the pair (message type, mutability) plus the type name for
/// diagnostics.
///
/// Subscriptions, delivery filters and message limits are all keyed by this
/// value. The name participates in equality, which is harmless: it is
/// uniquely determined by the `TypeId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    mutability: Mutability,
    name: &'static str,
}

impl TypeKey {
    /// Key of an immutable message of type `M`.
    pub fn immutable<M: Message>() -> Self {
        Self {
            id: TypeId::of::<M>(),
            mutability: Mutability::Immutable,
            name: std::any::type_name::<M>(),
        }
    }

    /// Key of a mutable message of type `M`.
    pub fn mutable<M: Message>() -> Self {
        Self {
            id: TypeId::of::<M>(),
            mutability: Mutability::Mutable,
            name: std::any::type_name::<M>(),
        }
    }

    /// Key of the signal type `S`.
    pub fn signal<S: Signal>() -> Self {
        Self {
            id: TypeId::of::<S>(),
            mutability: Mutability::Immutable,
            name: std::any::type_name::<S>(),
        }
    }

    /// The mutability half of the key.
    pub fn mutability(&self) -> Mutability {
        self.mutability
    }

    /// Human-readable type name for diagnostics and tracing.
    pub fn type_name(&self) -> &'static str {
        self.name
    }

    /// The raw `TypeId` half of the key.
    pub fn type_id(&self) -> TypeId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Sample;

    struct Tick;
    impl Signal for Tick {}

    #[test]
    fn test_immutable_and_mutable_keys_differ() {
        assert_ne!(TypeKey::immutable::<Sample>(), TypeKey::mutable::<Sample>());
    }

    #[test]
    fn test_same_key_is_equal() {
        assert_eq!(TypeKey::immutable::<Sample>(), TypeKey::immutable::<Sample>());
    }

    #[test]
    fn test_signal_key_is_immutable() {
        let key = TypeKey::signal::<Tick>();
        assert_eq!(key.mutability(), Mutability::Immutable);
    }

    #[test]
    fn test_type_name_is_meaningful() {
        let key = TypeKey::immutable::<Sample>();
        assert!(key.type_name().contains("Sample"));
    }

    #[test]
    fn test_blanket_message_impl() {
        fn assert_message<M: Message>() {}
        assert_message::<String>();
        assert_message::<Vec<u8>>();
    }
}
