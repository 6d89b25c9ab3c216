// Layer 3: Internal module imports
use crate::util::{AgentId, CoopId};

/// Receiver of handler and hook failures.
///
/// The logger sees every agent error before the exception reaction runs,
/// whatever that reaction is. Implementations must not panic.
pub trait ErrorLogger: Send + Sync + 'static {
    /// Record one failure.
    fn log(&self, error: &(dyn std::error::Error + 'static), agent: AgentId, coop: Option<CoopId>);
}

/// Default logger: a structured `tracing` error record.
pub struct TracingErrorLogger;

impl ErrorLogger for TracingErrorLogger {
    fn log(&self, error: &(dyn std::error::Error + 'static), agent: AgentId, coop: Option<CoopId>) {
        match coop {
            Some(coop) => tracing::error!(
                agent = agent.raw(),
                coop = coop.raw(),
                %error,
                "agent event failure"
            ),
            None => tracing::error!(agent = agent.raw(), %error, "agent event failure"),
        }
    }
}
