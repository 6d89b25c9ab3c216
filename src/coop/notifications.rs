//! Standard coop notificators posting typed messages to a mailbox.
//!
//! Instead of writing a closure by hand, an application that only wants to
//! hear about a coop's registration or destruction can attach one of these
//! and subscribe to [`CoopRegistered`] / [`CoopDeregistered`] on the given
//! mailbox.

// Layer 3: Internal module imports
use super::inner::DeregReason;
use crate::environment::Environment;
use crate::mailbox::MboxRef;
use crate::send::send;
use crate::util::CoopId;

/// Message posted by [`make_coop_reg_notificator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoopRegistered {
    /// The registered coop.
    pub coop: CoopId,
}

/// Message posted by [`make_coop_dereg_notificator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoopDeregistered {
    /// The destroyed coop.
    pub coop: CoopId,
    /// The reason its deregistration was started with.
    pub reason: DeregReason,
}

/// Notificator sending [`CoopRegistered`] to `mbox`.
pub fn make_coop_reg_notificator(
    mbox: MboxRef,
) -> impl Fn(&Environment, CoopId) + Send + Sync + 'static {
    move |_env, coop| {
        if let Err(error) = send(&mbox, CoopRegistered { coop }) {
            tracing::warn!(%coop, %error, "coop reg notification not delivered");
        }
    }
}

/// Notificator sending [`CoopDeregistered`] to `mbox`.
pub fn make_coop_dereg_notificator(
    mbox: MboxRef,
) -> impl Fn(&Environment, CoopId, DeregReason) + Send + Sync + 'static {
    move |_env, coop, reason| {
        if let Err(error) = send(&mbox, CoopDeregistered { coop, reason }) {
            tracing::warn!(%coop, %error, "coop dereg notification not delivered");
        }
    }
}
