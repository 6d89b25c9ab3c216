//! # agentry - In-Process Agent Runtime
//!
//! A runtime for building concurrent applications out of lightweight
//! agents that communicate exclusively by asynchronous message passing.
//! An application declares agents (finite-state objects), groups them into
//! coops for lifetime management, sends messages through mailboxes, and
//! selects execution policies via dispatchers. The runtime guarantees
//! per-consumer delivery ordering, provides backpressure through per-agent
//! message limits, and coordinates the full lifecycle from coop
//! registration through deregistration of arbitrarily nested hierarchies.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use agentry::prelude::*;
//!
//! #[derive(Debug)]
//! struct Line(String);
//!
//! struct Printer;
//!
//! impl Agent for Printer {
//!     fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
//!         ctx.so_subscribe_self()
//!             .event(|_this: &mut Self, line: &Line| println!("{}", line.0))?;
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> agentry::Result<()> {
//!     Environment::launch(|env| {
//!         let mut coop = env.make_coop();
//!         let printer = coop.add_agent(Printer);
//!         env.register_coop(coop)?;
//!
//!         send(&printer, Line("hello".into()))?;
//!         Ok(())
//!     })
//! }
//! ```
//!
//! # Core Concepts
//!
//! - **Agent** — a single-threaded actor owning a hierarchical state
//!   machine and its subscriptions. All of its events run serialized,
//!   except thread-safe handlers under [`dispatcher::AdvThreadPoolDispatcher`].
//! - **Coop** — a lifetime group of agents, registered and deregistered as
//!   one transaction; coops nest into parent/child hierarchies.
//! - **Mailbox** — a named or anonymous destination; MPMC with fan-out and
//!   delivery filters, or MPSC bound to one agent.
//! - **Dispatcher** — worker threads plus queues; from a single shared
//!   thread up to priority-aware pools.
//! - **Environment** — the container owning the mailbox registry, timer
//!   service, coop repository, dispatchers, stats and tracing.
//!
//! # Module Organization
//!
//! ## Core
//! - [`agent`] - the agent trait, context, states and subscriptions
//! - [`message`] - message model, signals, mutability, envelopes
//! - [`mailbox`] - MPMC/MPSC mailboxes and the named registry
//! - [`mchain`] - message chains bridging agents and plain threads
//! - [`sink`] - delivery endpoints and message limits
//! - [`queue`] - the event-queue protocol between mailboxes and dispatchers
//!
//! ## Execution
//! - [`dispatcher`] - the dispatcher family and binder protocol
//! - [`coop`] - coops, registration transaction, final-dereg chain
//! - [`environment`] - the environment, stop coordination, wrapped env
//! - [`timer`] - delayed and periodic delivery
//!
//! ## Observation
//! - [`stats`] - pluggable stat sources and periodic distribution
//! - [`msg_tracing`] - message-delivery tracing with filters

pub mod agent;
pub mod coop;
pub mod dispatcher;
pub mod environment;
pub mod error;
pub mod mailbox;
pub mod mchain;
pub mod message;
pub mod msg_tracing;
pub mod prelude;
pub mod priority;
pub mod queue;
pub mod request;
pub mod send;
pub mod sink;
pub mod stats;
pub mod timer;
pub mod util;

// Re-export commonly used types
pub use agent::{Agent, AgentContext, AgentOptions, ExceptionReaction, State};
pub use coop::{Coop, CoopHandle, DeregReason};
pub use dispatcher::{BinderRef, Dispatcher, DispatcherBinder};
pub use environment::{EnvParams, Environment, StopGuard, WrappedEnv};
pub use error::{AgentError, Result, RuntimeError};
pub use mailbox::{DeliveryMode, Mailbox, MailboxKind, MboxRef};
pub use message::{Envelope, Message, MessageRef, Mutability, Signal, TypeKey};
pub use priority::Priority;
pub use request::{request_future, request_value, ReplyFuture, Request};
pub use send::{
    send, send_delayed, send_mutable, send_periodic, send_signal, send_signal_delayed,
    send_signal_periodic,
};
pub use sink::{MessageLimit, MessageSink, OverlimitReaction, TransformedMessage};
pub use timer::{TimerFactory, TimerHandle};
