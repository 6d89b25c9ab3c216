//! Convenience re-exports for application code.
//!
//! ```rust
//! use agentry::prelude::*;
//! ```

pub use crate::agent::traits::AgentResult;
pub use crate::agent::{Agent, AgentContext, AgentOptions, ExceptionReaction, State};
pub use crate::coop::{Coop, CoopHandle, DeregReason};
pub use crate::dispatcher::{
    ActiveGroupDispatcher, ActiveObjDispatcher, AdvThreadPoolDispatcher, AdvThreadPoolParams,
    DispatcherParams, NefOneThreadDispatcher, OneThreadDispatcher, PoolFifo,
    PrioDedicatedThreadsDispatcher, QuotedRoundRobinDispatcher, Quotes,
    StrictlyOrderedDispatcher, ThreadPoolDispatcher, ThreadPoolParams,
};
pub use crate::environment::{EnvParams, Environment, StopGuard, WrappedEnv};
pub use crate::error::{AgentError, Result, RuntimeError};
pub use crate::mailbox::{MailboxKind, MboxRef};
pub use crate::mchain::{CloseMode, MChain, MChainParams, OverflowReaction};
pub use crate::message::{Message, Signal};
pub use crate::priority::Priority;
pub use crate::request::{request_future, request_value, Request};
pub use crate::send::{
    send, send_delayed, send_mutable, send_periodic, send_signal, send_signal_delayed,
    send_signal_periodic,
};
pub use crate::sink::{MessageLimit, TransformedMessage};
pub use crate::timer::{TimerFactory, TimerHandle};
