//! The event-queue protocol between mailboxes, agents and dispatchers.
//!
//! Delivery produces an [`ExecutionDemand`]; the agent's bound
//! [`EventQueue`] accepts it from any thread; a dispatcher worker dequeues
//! and executes it. Every dispatcher implements [`EventQueue`] on behalf of
//! the agents it hosts — the trait is the only coupling between the two
//! sides.

pub mod demand;
pub mod demand_queue;

pub use demand::{DemandKind, ExecutionDemand};
pub use demand_queue::DemandQueue;

/// Push point a dispatcher exposes for one agent.
///
/// `push` must be safe to call from any thread. The binding of an agent to
/// its queue is installed once per coop registration and never changes
/// mid-life.
pub trait EventQueue: Send + Sync + 'static {
    /// Enqueue one demand.
    fn push(&self, demand: ExecutionDemand);

    /// Enqueue the final demand of an agent.
    ///
    /// Dispatchers that maintain a reserved lane for finish demands
    /// override this; the default just pushes.
    fn push_finish(&self, demand: ExecutionDemand) {
        self.push(demand);
    }
}
