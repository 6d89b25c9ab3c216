//! The agent model: user-facing trait, context, hierarchical states,
//! subscription storage and the runtime cell.
//!
//! A user type implements [`Agent`] and is handed to
//! [`Coop::add_agent`](crate::coop::Coop::add_agent). The runtime wraps it
//! in an [`AgentCell`](cell::AgentCell): the cell owns the subscription
//! storage, the state tree, the bound event queue and the per-type message
//! limits, and drives the lifecycle `so_define_agent` → `so_evt_start` →
//! events → `so_evt_finish`.
//!
//! Everything the agent does at run time goes through the
//! [`AgentContext`](context::AgentContext) passed into hooks and handlers:
//! subscribing, changing state, installing delivery filters, deregistering
//! the coop.

pub mod cell;
pub mod context;
pub mod options;
pub mod state;
pub mod subscriptions;
pub mod traits;

pub use context::{AgentContext, StateBuilder, SubscriptionBuilder};
pub use options::AgentOptions;
pub use state::State;
pub use traits::{Agent, ExceptionReaction, IntoHandlerResult};
