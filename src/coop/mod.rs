//! Coops: lifetime groups of agents.
//!
//! Agents are registered and deregistered as a group. Registration is a
//! two-phase transaction (binder preallocation, then noexcept binding);
//! deregistration is a chain: children first, then per-agent queue drain
//! through `so_evt_finish`, then destruction on the dedicated final-dereg
//! drainer thread — never on a dispatcher worker.

pub mod notifications;
pub mod repository;

mod builder;
mod inner;

pub use builder::{Coop, CoopHandle};
pub use inner::DeregReason;
pub use notifications::{
    make_coop_dereg_notificator, make_coop_reg_notificator, CoopDeregistered, CoopRegistered,
};

pub(crate) use inner::{register_coop, CoopInner};
pub(crate) use repository::CoopRepository;

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 3: Internal module imports
use crate::environment::Environment;
use crate::util::CoopId;

/// Notificator fired right after a coop becomes registered.
pub type RegNotificator = Arc<dyn Fn(&Environment, CoopId) + Send + Sync>;

/// Notificator fired while a deregistered coop is destroyed.
pub type DeregNotificator = Arc<dyn Fn(&Environment, CoopId, DeregReason) + Send + Sync>;
