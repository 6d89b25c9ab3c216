// Layer 1: Standard library imports
use std::fmt;
use std::sync::Arc;

// Layer 3: Internal module imports
use crate::agent::cell::AgentCell;
use crate::message::MessageRef;
use crate::priority::Priority;
use crate::sink::LimitControlBlock;
use crate::util::MailboxId;

/// What a demand asks the agent to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemandKind {
    /// Run `so_evt_start`; the first demand of every agent.
    Start,
    /// Dispatch one message event.
    Event,
    /// Run `so_evt_finish`; the last demand of every agent.
    Finish,
}

/// The queued record describing one event to be executed.
pub struct ExecutionDemand {
    pub(crate) agent: Arc<AgentCell>,
    pub(crate) limit: Option<Arc<LimitControlBlock>>,
    pub(crate) mbox_id: MailboxId,
    pub(crate) message: Option<MessageRef>,
    pub(crate) kind: DemandKind,
    pub(crate) priority: Priority,
}

impl ExecutionDemand {
    /// Demand dispatching one message event.
    pub(crate) fn event(
        agent: Arc<AgentCell>,
        limit: Option<Arc<LimitControlBlock>>,
        mbox_id: MailboxId,
        message: MessageRef,
        priority: Priority,
    ) -> Self {
        Self {
            agent,
            limit,
            mbox_id,
            message: Some(message),
            kind: DemandKind::Event,
            priority,
        }
    }

    /// The `so_evt_start` pseudo-demand.
    pub(crate) fn start(agent: Arc<AgentCell>) -> Self {
        let mbox_id = agent.direct_mbox_id();
        let priority = agent.priority();
        Self {
            agent,
            limit: None,
            mbox_id,
            message: None,
            kind: DemandKind::Start,
            priority,
        }
    }

    /// The `so_evt_finish` pseudo-demand.
    pub(crate) fn finish(agent: Arc<AgentCell>) -> Self {
        let mbox_id = agent.direct_mbox_id();
        let priority = agent.priority();
        Self {
            agent,
            limit: None,
            mbox_id,
            message: None,
            kind: DemandKind::Finish,
            priority,
        }
    }

    /// The demand's priority (the sink's, usually the agent's own).
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// The kind of work the demand carries.
    pub fn kind(&self) -> DemandKind {
        self.kind
    }

    /// Execute the demand on the current thread with exclusive access to
    /// the agent.
    pub fn execute(self) {
        let agent = Arc::clone(&self.agent);
        agent.exec_demand(self);
    }
}

impl fmt::Debug for ExecutionDemand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionDemand")
            .field("agent", &self.agent.id())
            .field("kind", &self.kind)
            .field("mbox", &self.mbox_id)
            .field("priority", &self.priority)
            .finish()
    }
}
