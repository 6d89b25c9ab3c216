//! The send function family.
//!
//! Plain sends deliver synchronously on the calling thread (the handler
//! runs later, on the receiver's dispatcher). Delayed and periodic sends
//! go through the environment's timer service; a periodic send returns the
//! [`TimerHandle`] that keeps it alive — dropping the handle cancels the
//! timer, so it must be stored.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 3: Internal module imports
use crate::error::Result;
use crate::mailbox::{DeliveryMode, Mailbox, MboxRef};
use crate::message::{Message, MessageRef, Signal};
use crate::timer::TimerHandle;

/// Deliver `message` to `target`.
pub fn send<M: Message>(target: &MboxRef, message: M) -> Result<()> {
    target.deliver(DeliveryMode::Ordinary, MessageRef::message(message), 0)
}

/// Deliver the signal `S` to `target`.
pub fn send_signal<S: Signal>(target: &MboxRef) -> Result<()> {
    target.deliver(DeliveryMode::Ordinary, MessageRef::signal::<S>(), 0)
}

/// Deliver `message` to `target` as a mutable message.
///
/// The destination must be a single-consumer one (a direct mailbox, a
/// unique-subscribers mailbox or a chain); plain MPMC mailboxes refuse
/// mutable subscriptions, so the delivery will find no subscriber there.
pub fn send_mutable<M: Message>(target: &MboxRef, message: M) -> Result<()> {
    target.deliver(
        DeliveryMode::Ordinary,
        MessageRef::mutable_message(message),
        0,
    )
}

/// Deliver a prebuilt reference; used by transformers and tests.
pub fn send_ref(target: &MboxRef, message: MessageRef) -> Result<()> {
    target.deliver(DeliveryMode::Ordinary, message, 0)
}

/// Deliver `message` to `target` after `delay`. Fire-and-forget.
pub fn send_delayed<M: Message>(target: &MboxRef, delay: Duration, message: M) -> Result<()> {
    let env = target.environment();
    env.schedule_timer_detached(delay, MessageRef::message(message), target.clone())
}

/// Deliver the signal `S` to `target` after `delay`. Fire-and-forget.
pub fn send_signal_delayed<S: Signal>(target: &MboxRef, delay: Duration) -> Result<()> {
    let env = target.environment();
    env.schedule_timer_detached(delay, MessageRef::signal::<S>(), target.clone())
}

/// Deliver `message` to `target` after `delay` and then every `period`.
///
/// The returned handle must be kept: dropping it cancels the timer.
#[must_use = "dropping the handle cancels the periodic timer"]
pub fn send_periodic<M: Message>(
    target: &MboxRef,
    delay: Duration,
    period: Duration,
    message: M,
) -> Result<TimerHandle> {
    let env = target.environment();
    env.schedule_timer_ref(
        delay,
        Some(period),
        MessageRef::message(message),
        target.clone(),
    )
}

/// Periodic delivery of the signal `S`.
#[must_use = "dropping the handle cancels the periodic timer"]
pub fn send_signal_periodic<S: Signal>(
    target: &MboxRef,
    delay: Duration,
    period: Duration,
) -> Result<TimerHandle> {
    let env = target.environment();
    env.schedule_timer_ref(delay, Some(period), MessageRef::signal::<S>(), target.clone())
}
