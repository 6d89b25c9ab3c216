// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 3: Internal module imports
use super::limits::{LimitControlBlock, OverlimitReaction, MAX_REDIRECTION_DEPTH};
use super::traits::MessageSink;
use crate::agent::cell::AgentCell;
use crate::error::Result;
use crate::mailbox::{DeliveryMode, Mailbox};
use crate::message::envelope;
use crate::message::MessageRef;
use crate::msg_tracing::{TraceEvent, TraceStep};
use crate::priority::Priority;
use crate::util::{AgentId, MailboxId};

/// Sink forwarding deliveries into one agent's event queue.
///
/// With a limit control block attached, every delivery first tries to
/// account a slot; overlimit deliveries run the configured reaction on the
/// sender's thread instead of queuing.
pub struct AgentSink {
    agent: Arc<AgentCell>,
    limit: Option<Arc<LimitControlBlock>>,
    priority: Priority,
}

impl AgentSink {
    /// Plain sink: no limit, demands carry the agent's own priority.
    pub(crate) fn new(agent: Arc<AgentCell>, limit: Option<Arc<LimitControlBlock>>) -> Self {
        let priority = agent.priority();
        Self {
            agent,
            limit,
            priority,
        }
    }

    /// Sink with an explicit demand priority.
    ///
    /// The default is the agent's own priority; this override exists for
    /// custom bindings that feed a priority dispatcher on behalf of an
    /// agent running elsewhere.
    pub fn with_priority(
        agent: Arc<AgentCell>,
        limit: Option<Arc<LimitControlBlock>>,
        priority: Priority,
    ) -> Self {
        Self {
            agent,
            limit,
            priority,
        }
    }
}

impl MessageSink for AgentSink {
    fn sink_id(&self) -> AgentId {
        self.agent.id()
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn push_event(
        &self,
        mode: DeliveryMode,
        mbox_id: MailboxId,
        message: MessageRef,
        depth: u32,
    ) -> Result<()> {
        match &self.limit {
            None => {
                push_demand(&self.agent, None, mbox_id, message, self.priority);
                Ok(())
            }
            Some(block) => {
                if block.try_acquire() {
                    push_demand(
                        &self.agent,
                        Some(Arc::clone(block)),
                        mbox_id,
                        message,
                        self.priority,
                    );
                    Ok(())
                } else {
                    run_overlimit_reaction(&self.agent, block, mode, mbox_id, &message, depth)
                }
            }
        }
    }
}

fn push_demand(
    agent: &Arc<AgentCell>,
    limit: Option<Arc<LimitControlBlock>>,
    mbox_id: MailboxId,
    message: MessageRef,
    priority: Priority,
) {
    let hub = agent.tracing_hub();
    hub.emit(&message, || {
        TraceEvent::new(TraceStep::PushEvent, mbox_id.raw(), message.key().type_name())
            .with_agent(agent.id().raw())
    });

    if !agent.enqueue_event(limit.clone(), mbox_id, message, priority) {
        // The agent is already past its finish demand; the delivery is
        // silently discarded and the accounted slot given back.
        if let Some(block) = limit {
            block.release();
        }
    }
}

/// Execute the overlimit reaction for one delivery.
///
/// Runs on the sender's thread. Reactions that send the message onward do
/// so in non-blocking mode with an incremented depth; the depth cap turns
/// would-be infinite chains into a warning plus a drop.
fn run_overlimit_reaction(
    agent: &Arc<AgentCell>,
    block: &Arc<LimitControlBlock>,
    _mode: DeliveryMode,
    mbox_id: MailboxId,
    message: &MessageRef,
    depth: u32,
) -> Result<()> {
    let hub = agent.tracing_hub();
    let type_name = message.key().type_name();

    match block.reaction() {
        OverlimitReaction::Drop => {
            hub.emit(message, || {
                TraceEvent::new(TraceStep::OverlimitDrop, mbox_id.raw(), type_name)
                    .with_agent(agent.id().raw())
                    .with_depth(depth)
            });
            Ok(())
        }
        OverlimitReaction::AbortApp => {
            eprintln!(
                "agentry: message limit exceeded for agent {} (type {type_name}, limit {}); aborting",
                agent.id(),
                block.limit()
            );
            std::process::abort();
        }
        OverlimitReaction::RedirectTo(target_fn) => {
            if depth >= MAX_REDIRECTION_DEPTH {
                return drop_on_depth_overflow(agent, hub, mbox_id, message, depth);
            }
            hub.emit(message, || {
                TraceEvent::new(TraceStep::OverlimitRedirect, mbox_id.raw(), type_name)
                    .with_agent(agent.id().raw())
                    .with_depth(depth)
            });
            let target = target_fn();
            if let Err(error) =
                target.deliver(DeliveryMode::NonBlocking, message.clone(), depth + 1)
            {
                tracing::warn!(
                    msg_type = type_name,
                    %error,
                    "overlimit redirect delivery failed"
                );
            }
            Ok(())
        }
        OverlimitReaction::Transform(transformer) => {
            if depth >= MAX_REDIRECTION_DEPTH {
                return drop_on_depth_overflow(agent, hub, mbox_id, message, depth);
            }
            let Some(payload) = envelope::payload_for_transformation(message) else {
                return Ok(());
            };
            match transformer(&payload) {
                Some(transformed) => {
                    hub.emit(message, || {
                        TraceEvent::new(TraceStep::OverlimitTransform, mbox_id.raw(), type_name)
                            .with_agent(agent.id().raw())
                            .with_depth(depth)
                    });
                    if let Err(error) = transformed.mbox.deliver(
                        DeliveryMode::NonBlocking,
                        transformed.message,
                        depth + 1,
                    ) {
                        tracing::warn!(
                            msg_type = type_name,
                            %error,
                            "overlimit transform delivery failed"
                        );
                    }
                    Ok(())
                }
                None => Ok(()),
            }
        }
        OverlimitReaction::LogThenAbort(logger) => {
            logger(message);
            std::process::abort();
        }
    }
}

fn drop_on_depth_overflow(
    agent: &Arc<AgentCell>,
    hub: Arc<crate::msg_tracing::TracingHub>,
    mbox_id: MailboxId,
    message: &MessageRef,
    depth: u32,
) -> Result<()> {
    tracing::warn!(
        agent = agent.id().raw(),
        msg_type = message.key().type_name(),
        depth,
        max = MAX_REDIRECTION_DEPTH,
        "overlimit reaction chain too deep; message dropped"
    );
    hub.emit(message, || {
        TraceEvent::new(
            TraceStep::RedirectionDepthExceeded,
            mbox_id.raw(),
            message.key().type_name(),
        )
        .with_agent(agent.id().raw())
        .with_depth(depth)
    });
    Ok(())
}
