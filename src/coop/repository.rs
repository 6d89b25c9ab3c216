// Layer 1: Standard library imports
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

// Layer 2: Third-party crate imports
use parking_lot::{Condvar, Mutex};

// Layer 3: Internal module imports
use super::inner::{CoopInner, DeregReason};
use crate::util::CoopId;

struct ChainShared {
    queue: Mutex<ChainQueue>,
    signal: Condvar,
}

struct ChainQueue {
    coops: VecDeque<Arc<CoopInner>>,
    closed: bool,
}

/// The repository of live coops plus the final-dereg chain.
///
/// Destruction of deregistered coops is centralized on one drainer
/// thread: agent teardown can join dedicated worker threads and run user
/// destructors, neither of which may happen on a dispatcher worker that
/// other agents still depend on. The chain also preserves child-before-
/// parent unwinding.
pub(crate) struct CoopRepository {
    next_id: AtomicU64,
    coops: Mutex<HashMap<CoopId, Arc<CoopInner>>>,
    roots: Mutex<HashMap<CoopId, Arc<CoopInner>>>,
    live: AtomicUsize,
    chain: Arc<ChainShared>,
    drainer: Mutex<Option<JoinHandle<()>>>,
}

impl CoopRepository {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            coops: Mutex::new(HashMap::new()),
            roots: Mutex::new(HashMap::new()),
            live: AtomicUsize::new(0),
            chain: Arc::new(ChainShared {
                queue: Mutex::new(ChainQueue {
                    coops: VecDeque::new(),
                    closed: false,
                }),
                signal: Condvar::new(),
            }),
            drainer: Mutex::new(None),
        }
    }

    /// Start the final-dereg drainer thread.
    pub(crate) fn start_drainer(&self) {
        let chain = Arc::clone(&self.chain);
        let handle = std::thread::Builder::new()
            .name("agentry-final-dereg".to_string())
            .spawn(move || loop {
                let coop = {
                    let mut queue = chain.queue.lock();
                    loop {
                        if let Some(coop) = queue.coops.pop_front() {
                            break Some(coop);
                        }
                        if queue.closed {
                            break None;
                        }
                        chain.signal.wait(&mut queue);
                    }
                };
                match coop {
                    Some(coop) => coop.finalize(),
                    None => return,
                }
            })
            .ok();
        *self.drainer.lock() = handle;
    }

    /// Close the chain and join the drainer. Pending coops are drained
    /// first.
    pub(crate) fn shutdown_drainer(&self) {
        {
            let mut queue = self.chain.queue.lock();
            queue.closed = true;
        }
        self.chain.signal.notify_all();
        if let Some(handle) = self.drainer.lock().take() {
            let _ = handle.join();
        }
    }

    pub(crate) fn next_id(&self) -> CoopId {
        CoopId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn add(&self, coop: Arc<CoopInner>, is_root: bool) {
        self.coops.lock().insert(coop.id(), Arc::clone(&coop));
        if is_root {
            self.roots.lock().insert(coop.id(), coop);
        }
        self.live.fetch_add(1, Ordering::AcqRel);
    }

    /// Hand a fully-drained coop to the drainer.
    pub(crate) fn enqueue_final(&self, coop: Arc<CoopInner>) {
        let mut queue = self.chain.queue.lock();
        if queue.closed {
            // Shutdown already passed the drain point; finalize inline.
            drop(queue);
            coop.finalize();
            return;
        }
        queue.coops.push_back(coop);
        drop(queue);
        self.chain.signal.notify_one();
    }

    /// Forget a destroyed coop. Called from `finalize`.
    pub(crate) fn coop_destroyed(&self, id: CoopId) {
        self.coops.lock().remove(&id);
        self.roots.lock().remove(&id);
        self.live.fetch_sub(1, Ordering::AcqRel);
    }

    /// Begin deregistration of every root coop.
    pub(crate) fn dereg_all_roots(&self, reason: DeregReason) {
        let roots: Vec<Arc<CoopInner>> = self.roots.lock().values().cloned().collect();
        for root in roots {
            root.start_dereg(reason);
        }
    }

    /// Number of coops that are registered and not yet destroyed.
    pub(crate) fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Total number of agents across live coops.
    pub(crate) fn total_agent_count(&self) -> usize {
        self.coops.lock().values().map(|c| c.agent_count()).sum()
    }

    /// Length of the final-dereg chain right now.
    pub(crate) fn final_chain_len(&self) -> usize {
        self.chain.queue.lock().coops.len()
    }
}
