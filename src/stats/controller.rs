// Layer 1: Standard library imports
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::Utc;
use parking_lot::{Condvar, Mutex};

// Layer 3: Internal module imports
use super::messages::{DistributionFinished, DistributionStarted, Quantity};
use crate::mailbox::MboxRef;
use crate::send::send;

/// A provider of runtime quantities.
pub trait StatsSource: Send + Sync + 'static {
    /// Post every quantity this source knows about.
    fn distribute(&self, out: &mut dyn FnMut(Quantity));
}

struct ControllerState {
    running: bool,
    period: Duration,
    thread: Option<JoinHandle<()>>,
}

struct ControllerShared {
    state: Mutex<ControllerState>,
    signal: Condvar,
    sources: Mutex<Vec<Arc<dyn StatsSource>>>,
    mbox: Mutex<Option<MboxRef>>,
}

/// Switchable periodic distributor of runtime quantities.
pub struct StatsController {
    shared: Arc<ControllerShared>,
}

impl StatsController {
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            shared: Arc::new(ControllerShared {
                state: Mutex::new(ControllerState {
                    running: false,
                    period,
                    thread: None,
                }),
                signal: Condvar::new(),
                sources: Mutex::new(Vec::new()),
                mbox: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn set_mbox(&self, mbox: MboxRef) {
        *self.shared.mbox.lock() = Some(mbox);
    }

    /// The mailbox distribution messages go to.
    pub fn mbox(&self) -> Option<MboxRef> {
        self.shared.mbox.lock().clone()
    }

    /// Add a source. Sources live as long as the controller.
    pub fn register_source(&self, source: Arc<dyn StatsSource>) {
        self.shared.sources.lock().push(source);
    }

    /// Change the distribution period; effective from the next wakeup.
    pub fn set_period(&self, period: Duration) {
        self.shared.state.lock().period = period;
        self.shared.signal.notify_all();
    }

    /// Start periodic distribution. No-op when already running.
    pub fn turn_on(&self) {
        let mut state = self.shared.state.lock();
        if state.running {
            return;
        }
        state.running = true;
        let shared = Arc::clone(&self.shared);
        state.thread = std::thread::Builder::new()
            .name("agentry-stats".to_string())
            .spawn(move || distribution_loop(shared))
            .ok();
    }

    /// Stop periodic distribution and join the worker. No-op when off.
    pub fn turn_off(&self) {
        let thread = {
            let mut state = self.shared.state.lock();
            if !state.running {
                return;
            }
            state.running = false;
            state.thread.take()
        };
        self.shared.signal.notify_all();
        if let Some(thread) = thread {
            let _ = thread.join();
        }
    }

    /// Run one distribution pass synchronously, regardless of the worker.
    pub fn distribute_once(&self) {
        distribute(&self.shared);
    }
}

fn distribution_loop(shared: Arc<ControllerShared>) {
    loop {
        {
            let mut state = shared.state.lock();
            if !state.running {
                return;
            }
            let period = state.period;
            shared.signal.wait_for(&mut state, period);
            if !state.running {
                return;
            }
        }
        distribute(&shared);
    }
}

fn distribute(shared: &Arc<ControllerShared>) {
    let Some(mbox) = shared.mbox.lock().clone() else {
        return;
    };
    let sources: Vec<Arc<dyn StatsSource>> = shared.sources.lock().clone();

    let _ = send(&mbox, DistributionStarted { at: Utc::now() });
    for source in &sources {
        source.distribute(&mut |quantity| {
            let _ = send(&mbox, quantity);
        });
    }
    let _ = send(
        &mbox,
        DistributionFinished {
            at: Utc::now(),
            sources: sources.len(),
        },
    );
}
