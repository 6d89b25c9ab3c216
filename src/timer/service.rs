// Layer 1: Standard library imports
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

// Layer 2: Third-party crate imports
use parking_lot::{Condvar, Mutex};

// Layer 3: Internal module imports
use super::handle::{TimerEntry, TimerHandle};
use super::queues::{Armed, HeapTimerQueue, ListTimerQueue, TimerQueue, WheelTimerQueue};
use crate::mailbox::{DeliveryMode, Mailbox, MboxRef};
use crate::message::MessageRef;

/// Which data structure backs the timer thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerFactory {
    /// Binary heap; the default. Good general-purpose choice.
    Heap,
    /// Linear list; cheapest for a handful of timers.
    List,
    /// Hashed timing wheel; constant arming cost for timer-heavy loads,
    /// at the price of one wakeup per 10 ms tick while timers exist.
    Wheel,
}

impl Default for TimerFactory {
    fn default() -> Self {
        Self::Heap
    }
}

struct TimerInner {
    queue: Box<dyn TimerQueue>,
    closed: bool,
    single_shot_armed: usize,
    periodic_armed: usize,
}

struct TimerShared {
    inner: Mutex<TimerInner>,
    signal: Condvar,
}

/// The per-environment timer thread.
pub(crate) struct TimerService {
    shared: Arc<TimerShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TimerService {
    pub(crate) fn start(factory: TimerFactory) -> Self {
        let queue: Box<dyn TimerQueue> = match factory {
            TimerFactory::Heap => Box::new(HeapTimerQueue::new()),
            TimerFactory::List => Box::new(ListTimerQueue::new()),
            TimerFactory::Wheel => Box::new(WheelTimerQueue::new(Instant::now())),
        };
        let shared = Arc::new(TimerShared {
            inner: Mutex::new(TimerInner {
                queue,
                closed: false,
                single_shot_armed: 0,
                periodic_armed: 0,
            }),
            signal: Condvar::new(),
        });

        let thread = std::thread::Builder::new()
            .name("agentry-timer".to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                move || timer_loop(shared)
            })
            .ok();

        Self {
            shared,
            thread: Mutex::new(thread),
        }
    }

    /// Arm a timer. `period = None` is single-shot.
    pub(crate) fn schedule(
        &self,
        delay: Duration,
        period: Option<Duration>,
        message: MessageRef,
        target: MboxRef,
    ) -> TimerHandle {
        let entry = TimerEntry::new(message, target, period);
        let handle = TimerHandle::new(Arc::clone(&entry));

        let mut inner = self.shared.inner.lock();
        if !inner.closed {
            match period {
                Some(_) => inner.periodic_armed += 1,
                None => inner.single_shot_armed += 1,
            }
            inner.queue.push(Armed {
                at: Instant::now() + delay,
                entry,
            });
            drop(inner);
            self.shared.signal.notify_one();
        }
        handle
    }

    /// Pending-timer counts `(single_shot, periodic)` for stats.
    pub(crate) fn armed_counts(&self) -> (usize, usize) {
        let inner = self.shared.inner.lock();
        (inner.single_shot_armed, inner.periodic_armed)
    }

    /// Stop the timer thread. Already-armed timers are dropped unfired.
    pub(crate) fn shutdown(&self) {
        {
            let mut inner = self.shared.inner.lock();
            inner.closed = true;
        }
        self.shared.signal.notify_all();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn timer_loop(shared: Arc<TimerShared>) {
    loop {
        let due = {
            let mut inner = shared.inner.lock();
            loop {
                if inner.closed {
                    return;
                }
                let now = Instant::now();
                match inner.queue.next_deadline() {
                    Some(deadline) if deadline <= now => {
                        break inner.queue.pop_due(now);
                    }
                    Some(deadline) => {
                        shared.signal.wait_until(&mut inner, deadline);
                    }
                    None => {
                        shared.signal.wait(&mut inner);
                    }
                }
            }
        };

        for armed in due {
            let entry = armed.entry;
            // Delivery happens under the entry's fire lock, which is what
            // makes `TimerHandle::release` race-free. The timer thread
            // must never block or fail: delivery is non-blocking and
            // errors are only logged.
            let fired = entry.fire_with(|| {
                if let Err(error) =
                    entry
                        .target
                        .deliver(DeliveryMode::NonBlocking, entry.message.clone(), 0)
                {
                    tracing::warn!(
                        msg_type = entry.message.key().type_name(),
                        %error,
                        "timer delivery failed"
                    );
                }
            });

            let mut inner = shared.inner.lock();
            match entry.period {
                Some(period) if fired && !inner.closed => {
                    // Periodic timers re-arm regardless of what the target
                    // mailbox did with the message.
                    inner.queue.push(Armed {
                        at: armed.at + period,
                        entry,
                    });
                }
                Some(_) => inner.periodic_armed = inner.periodic_armed.saturating_sub(1),
                None => inner.single_shot_armed = inner.single_shot_armed.saturating_sub(1),
            }
        }
    }
}
