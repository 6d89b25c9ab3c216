//! Crate-level error taxonomy.
//!
//! Every synchronous boundary error the runtime can report is a variant of
//! [`RuntimeError`]. Failures produced by user code inside event handlers
//! and lifecycle hooks are a different thing: they travel as [`AgentError`]
//! values and are routed through the exception-reaction machinery instead
//! of being returned to a caller.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::util::{AgentId, CoopId, MailboxId};

/// Failure reported by user code from a handler or a lifecycle hook.
///
/// The runtime does not interpret the payload; it hands it to the error
/// logger and then applies the agent's exception reaction.
pub type AgentError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// All synchronous errors surfaced by the runtime.
///
/// # Design Principles
///
/// - **Contextual**: each variant carries the ids needed for debugging.
/// - **Structured**: `thiserror` derives the `Error` implementation.
/// - **Flat**: one enum, because operations routinely cross subsystem
///   boundaries (a subscription touches mailboxes, sinks and agents).
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A name (mailbox, group, dispatcher) was empty.
    #[error("Name must not be empty")]
    EmptyName,

    /// No mailbox registered under the given pair.
    #[error("Mailbox not found: {namespace}/{name}")]
    MailboxNotFound {
        /// Namespace the lookup ran in.
        namespace: String,
        /// Name that was looked up.
        name: String,
    },

    /// A subscription for the same (mailbox, type, state) already exists.
    #[error("Duplicate subscription: mbox={mbox}, type={type_name}, state={state}")]
    SubscriptionDuplicate {
        /// Target mailbox id.
        mbox: MailboxId,
        /// Message type name.
        type_name: &'static str,
        /// State name the subscription was attempted in.
        state: String,
    },

    /// Mutable messages cannot be subscribed to from a plain MPMC mailbox.
    #[error("Subscription to a mutable message from MPMC mailbox {mbox} (type {type_name})")]
    SubscriptionToMutableFromMpmcMbox {
        /// Offending mailbox id.
        mbox: MailboxId,
        /// Message type name.
        type_name: &'static str,
    },

    /// Only the owner agent may subscribe to an MPSC mailbox.
    #[error("Agent {subscriber} is not the owner of MPSC mailbox {mbox}")]
    IllegalSubscriberForMpscMbox {
        /// Offending mailbox id.
        mbox: MailboxId,
        /// The foreign subscriber.
        subscriber: AgentId,
    },

    /// A unique-subscribers mailbox already has a subscriber for the type.
    #[error("Mailbox {mbox} already has a subscriber for type {type_name}")]
    UniqueSubscriberClash {
        /// Offending mailbox id.
        mbox: MailboxId,
        /// Message type name.
        type_name: &'static str,
    },

    /// The mailbox kind does not support subscriptions at all.
    #[error("Mailbox {mbox} does not support subscriptions")]
    SubscriptionNotSupported {
        /// Offending mailbox id.
        mbox: MailboxId,
    },

    /// Delivery filters are an MPMC-only feature.
    #[error("Delivery filters are not applicable to MPSC mailbox {mbox}")]
    DeliveryFilterOnMpscMbox {
        /// Offending mailbox id.
        mbox: MailboxId,
    },

    /// The operation is legal only on the agent's working thread.
    #[error("Operation on agent {agent} is permitted only on its working thread")]
    NotOnWorkingThread {
        /// The agent whose invariant was violated.
        agent: AgentId,
    },

    /// Named dispatchers can be installed only before the environment starts.
    #[error("Dispatcher {name:?} cannot be added after the environment start")]
    DispatcherAfterStart {
        /// The dispatcher name.
        name: String,
    },

    /// No dispatcher registered under the name.
    #[error("Dispatcher not found: {name:?}")]
    DispatcherNotFound {
        /// The name that was looked up.
        name: String,
    },

    /// A transfer_to_state chain revisited a state without consuming the message.
    #[error("transfer_to_state loop for agent {agent} (type {type_name}, state {state})")]
    TransferToStateLoop {
        /// The agent running the chain.
        agent: AgentId,
        /// Message type being transferred.
        type_name: &'static str,
        /// State at which the loop was detected.
        state: String,
    },

    /// A composite state has no initial substate designated.
    #[error("State {state:?} is composite but has no initial substate")]
    InitialSubstateMissing {
        /// The composite state name.
        state: String,
    },

    /// Message-limit overflow with a throwing reaction.
    #[error("Message limit exceeded: agent={agent}, type={type_name}, limit={limit}")]
    MessageLimitExceeded {
        /// The receiver agent.
        agent: AgentId,
        /// Message type name.
        type_name: &'static str,
        /// The configured limit.
        limit: usize,
    },

    /// The redirect/transform chain became deeper than the fixed cap.
    #[error("Overlimit redirection depth exceeded ({depth} > {max}) for type {type_name}")]
    RedirectionDepthExceeded {
        /// Depth reached.
        depth: u32,
        /// The cap.
        max: u32,
        /// Message type name.
        type_name: &'static str,
    },

    /// `so_define_agent` failed during coop registration.
    #[error("so_define_agent failed for agent {agent}: {message}")]
    AgentDefinitionFailed {
        /// The agent whose definition hook failed.
        agent: AgentId,
        /// The rendered hook error.
        message: String,
    },

    /// The coop is not in the registered state for the attempted operation.
    #[error("Coop {coop} is not in the registered state")]
    CoopNotInRegisteredState {
        /// The offending coop id.
        coop: CoopId,
    },

    /// New registrations are refused once the final shutdown phase begins.
    #[error("Coop registration rejected: environment stop is in progress")]
    StopInProgress,

    /// Message chain is closed.
    #[error("Message chain {mbox} is closed")]
    MChainClosed {
        /// The chain's mailbox id.
        mbox: MailboxId,
    },

    /// Bounded message chain is full and the overflow reaction throws.
    #[error("Message chain {mbox} is full (capacity {capacity})")]
    MChainFull {
        /// The chain's mailbox id.
        mbox: MailboxId,
        /// Configured capacity.
        capacity: usize,
    },

    /// Timed receive or request wait ran out of time.
    #[error("Timed out after {timeout:?}")]
    Timeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The reply side of a request was dropped without answering.
    #[error("Request was dropped without a reply")]
    NoReply,

    /// An envelope refused to expose its payload.
    #[error("Envelope did not expose a payload (type {type_name})")]
    EnvelopePayloadMissing {
        /// Expected payload type name.
        type_name: &'static str,
    },

    /// A handler was registered for a different agent type than the receiver.
    #[error("Handler downcast failed: agent {agent} is not a {expected}")]
    AgentTypeMismatch {
        /// The receiver agent.
        agent: AgentId,
        /// The type the handler was written for.
        expected: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RuntimeError>();
    }

    #[test]
    fn test_error_is_std_error() {
        let err = RuntimeError::EmptyName;
        let _: &dyn std::error::Error = &err;
    }

    #[test]
    fn test_mailbox_not_found_display() {
        let err = RuntimeError::MailboxNotFound {
            namespace: "ns".to_string(),
            name: "orders".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("ns"));
        assert!(text.contains("orders"));
    }

    #[test]
    fn test_mutable_subscription_display() {
        let err = RuntimeError::SubscriptionToMutableFromMpmcMbox {
            mbox: MailboxId::from_raw(5),
            type_name: "Ping",
        };
        let text = err.to_string();
        assert!(text.contains("mutable"));
        assert!(text.contains("Ping"));
    }

    #[test]
    fn test_redirection_depth_display() {
        let err = RuntimeError::RedirectionDepthExceeded {
            depth: 33,
            max: 32,
            type_name: "Job",
        };
        let text = err.to_string();
        assert!(text.contains("33"));
        assert!(text.contains("32"));
    }

    #[test]
    fn test_limit_exceeded_display() {
        let err = RuntimeError::MessageLimitExceeded {
            agent: AgentId::from_raw(9),
            type_name: "Req",
            limit: 4,
        };
        assert!(err.to_string().contains("limit=4"));
    }

    #[test]
    fn test_coop_state_display() {
        let err = RuntimeError::CoopNotInRegisteredState {
            coop: CoopId::from_raw(2),
        };
        assert!(err.to_string().contains("Coop 2"));
    }
}
