//! Message sinks: the endpoints mailboxes deliver into.
//!
//! A sink binds one subscriber agent to a per-type runtime. The plain sink
//! forwards every delivery straight into the agent's event queue; the
//! limit-tracking sink first consults a control block `{limit, count,
//! reaction}` and runs the configured overlimit reaction on the sender's
//! thread when the receiver is saturated.

pub mod limits;
pub mod traits;

mod agent_sink;

pub use agent_sink::AgentSink;
pub use limits::{
    LimitControlBlock, MessageLimit, OverlimitReaction, TransformedMessage, MAX_REDIRECTION_DEPTH,
};
pub use traits::{MessageSink, SinkRef};
