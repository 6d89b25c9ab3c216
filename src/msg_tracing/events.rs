// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One step of a message delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStep {
    /// A demand was pushed into a subscriber's event queue.
    PushEvent,
    /// Delivery found no subscriber for the message type.
    NoSubscribers,
    /// A delivery filter rejected the message for one subscriber.
    FilteredOut,
    /// Overlimit reaction: the message was dropped.
    OverlimitDrop,
    /// Overlimit reaction: the message was redirected to another mailbox.
    OverlimitRedirect,
    /// Overlimit reaction: the message was transformed and re-sent.
    OverlimitTransform,
    /// The redirect/transform chain exceeded the depth cap.
    RedirectionDepthExceeded,
    /// The receiver located a matching event handler.
    HandlerFound,
    /// The receiver found no handler on the current state path.
    HandlerNotFound,
    /// The receiver fell back to a deadletter handler.
    DeadletterHandlerFound,
    /// A transfer_to_state entry redirected dispatch to another state.
    TransferToState,
}

/// One record of the delivery trace stream.
///
/// Serializes to a flat JSON object; the stdout tracer writes one object
/// per line.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    /// When the step happened.
    pub timestamp: DateTime<Utc>,
    /// Which step this is.
    pub step: TraceStep,
    /// Raw id of the mailbox involved.
    pub mbox_id: u64,
    /// Message type name.
    pub msg_type: &'static str,
    /// Raw id of the receiver agent, when one is involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<u64>,
    /// Redirect/transform depth at this step.
    pub depth: u32,
    /// True when the message asked for individual tracing.
    pub individual: bool,
}

impl TraceEvent {
    pub(crate) fn new(step: TraceStep, mbox_id: u64, msg_type: &'static str) -> Self {
        Self {
            timestamp: Utc::now(),
            step,
            mbox_id,
            msg_type,
            agent_id: None,
            depth: 0,
            individual: false,
        }
    }

    pub(crate) fn with_agent(mut self, agent_id: u64) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub(crate) fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_to_json() {
        let event = TraceEvent::new(TraceStep::PushEvent, 4, "Ping").with_agent(2);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"push_event\""));
        assert!(json.contains("\"mbox_id\":4"));
        assert!(json.contains("\"agent_id\":2"));
    }

    #[test]
    fn test_missing_agent_is_omitted() {
        let event = TraceEvent::new(TraceStep::NoSubscribers, 1, "Ping");
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("agent_id"));
    }

    #[test]
    fn test_builder_sets_depth() {
        let event = TraceEvent::new(TraceStep::OverlimitRedirect, 1, "Ping").with_depth(3);
        assert_eq!(event.depth, 3);
    }
}
