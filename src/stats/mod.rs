//! Run-time monitoring: periodic distribution of runtime quantities.
//!
//! When turned on, the stats controller wakes on its period, brackets the
//! pass with [`DistributionStarted`] / [`DistributionFinished`] messages on
//! the stats mailbox, and asks every registered [`StatsSource`] to post its
//! [`Quantity`] values in between. The environment registers one built-in
//! source covering the coop repository, the timer service and every
//! dispatcher; applications add their own with
//! [`StatsController::register_source`].

pub mod controller;
pub mod messages;

pub use controller::{StatsController, StatsSource};
pub use messages::{DistributionFinished, DistributionStarted, Quantity};
