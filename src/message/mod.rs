//! Message model: marker traits, shared references, envelopes.
//!
//! Three kinds of message travel through mailboxes:
//!
//! - **Plain messages** — any `Send + Sync + Debug` value, shared between
//!   subscribers behind an [`MessageRef`].
//! - **Signals** — payload-free notifications identified by type only; a
//!   signal delivery carries no instance at all.
//! - **Envelopes** — messages wrapping another message, intercepting the
//!   moment a handler is about to run (see [`Envelope`]).
//!
//! Mutability is part of the dispatch key: an immutable and a mutable
//! message of the same Rust type are different subscription targets, and a
//! mutable message is handed to exactly one consumer, by value.

pub mod envelope;
pub mod refs;
pub mod traits;

pub use envelope::{AccessContext, Envelope, EnvelopeInvoker, IndividualTraceEnvelope};
pub use refs::MessageRef;
pub use traits::{Message, Mutability, Signal, TypeKey};
