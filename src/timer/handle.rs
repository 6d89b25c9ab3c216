// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use parking_lot::Mutex;

// Layer 3: Internal module imports
use crate::mailbox::MboxRef;
use crate::message::MessageRef;

pub(crate) struct TimerEntry {
    /// The fire lock: firing delivers while holding it, cancellation takes
    /// it to flip the flag. After `cancel` returns no further delivery can
    /// start.
    cancelled: Mutex<bool>,
    pub(crate) message: MessageRef,
    pub(crate) target: MboxRef,
    pub(crate) period: Option<Duration>,
}

impl TimerEntry {
    pub(crate) fn new(message: MessageRef, target: MboxRef, period: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            cancelled: Mutex::new(false),
            message,
            target,
            period,
        })
    }

    pub(crate) fn cancel(&self) {
        *self.cancelled.lock() = true;
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        *self.cancelled.lock()
    }

    /// Run `deliver` unless cancelled, holding the fire lock throughout.
    /// Returns false when the entry was already cancelled.
    pub(crate) fn fire_with(&self, deliver: impl FnOnce()) -> bool {
        let guard = self.cancelled.lock();
        if *guard {
            return false;
        }
        deliver();
        true
    }
}

/// Opaque token of one scheduled timer.
///
/// Dropping the handle cancels the timer unless it was detached first; an
/// explicit [`TimerHandle::release`] cancels immediately and is race-free
/// with respect to concurrent firing.
pub struct TimerHandle {
    entry: Arc<TimerEntry>,
    detached: bool,
}

impl TimerHandle {
    pub(crate) fn new(entry: Arc<TimerEntry>) -> Self {
        Self {
            entry,
            detached: false,
        }
    }

    /// Cancel the timer. After this returns, the associated message will
    /// not be delivered again.
    pub fn release(&self) {
        self.entry.cancel();
    }

    /// True when the timer can still fire.
    pub fn is_active(&self) -> bool {
        !self.entry.is_cancelled()
    }

    /// Give the timer up without cancelling it (fire-and-forget).
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if !self.detached {
            self.entry.cancel();
        }
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("active", &self.is_active())
            .field("periodic", &self.entry.period.is_some())
            .finish()
    }
}
