//! Mailboxes: named and anonymous message destinations.
//!
//! Two base kinds exist. MPMC mailboxes ([`LocalMbox`]) fan deliveries out
//! to every subscriber of the message type, in subscription order, with
//! optional per-subscriber delivery filters. MPSC mailboxes ([`DirectMbox`])
//! belong to exactly one agent — its "direct mailbox" — and refuse foreign
//! subscribers. [`UniqueSubscribersMbox`] is the MPMC-creatable variant
//! that caps each message type at one subscriber, which is what makes
//! mutable-message subscriptions legal on it.
//!
//! Mailboxes are handed around as [`MboxRef`] trait objects; message
//! chains and user-supplied custom mailboxes implement the same
//! [`Mailbox`] trait.

pub mod registry;
pub mod traits;

mod direct;
mod local;
mod unique;

pub use direct::DirectMbox;
pub use local::LocalMbox;
pub use registry::{NamedMboxRegistry, DEFAULT_NAMESPACE};
pub use traits::{DeliveryMode, FilterRef, Mailbox, MailboxKind, MboxRef};
pub use unique::UniqueSubscribersMbox;
