//! The timer service: delayed and periodic message delivery.
//!
//! One dedicated thread per environment arms and fires timers. Firing
//! delivers the stored message to its target mailbox in non-blocking mode;
//! a periodic timer then re-arms itself for the next period regardless of
//! the delivery outcome.
//!
//! Cancellation goes through [`TimerHandle`]: `release()` is race-free
//! (once it returns, the message will not be delivered again), dropping an
//! undetached handle releases implicitly, and `detach()` turns a timer
//! into fire-and-forget.
//!
//! Three queue backends exist — [`TimerFactory::Heap`] (default),
//! [`TimerFactory::List`] and [`TimerFactory::Wheel`] — selectable through
//! the environment params. They trade arming cost against firing cost;
//! semantics are identical.

mod handle;
mod queues;
mod service;

pub use handle::TimerHandle;
pub use service::TimerFactory;

pub(crate) use service::TimerService;
