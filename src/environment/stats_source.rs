// Layer 3: Internal module imports
use super::env::WeakEnvironment;
use crate::stats::{Quantity, StatsSource};

/// Built-in stats source: coop repository, timer service, dispatchers.
pub(crate) struct EnvStatsSource {
    env: WeakEnvironment,
}

impl EnvStatsSource {
    pub(crate) fn new(env: WeakEnvironment) -> Self {
        Self { env }
    }
}

impl StatsSource for EnvStatsSource {
    fn distribute(&self, out: &mut dyn FnMut(Quantity)) {
        let Some(env) = self.env.upgrade() else {
            return;
        };

        let repo = env.coop_repository();
        out(Quantity::new("coop_repository", "/coop.reg.count", repo.live_count()));
        out(Quantity::new(
            "coop_repository",
            "/agent.count",
            repo.total_agent_count(),
        ));
        out(Quantity::new(
            "coop_repository",
            "/coop.final.dereg.count",
            repo.final_chain_len(),
        ));

        let (single_shot, periodic) = env.timer_counts();
        out(Quantity::new("timer_thread", "/single_shot.count", single_shot));
        out(Quantity::new("timer_thread", "/periodic.count", periodic));

        for dispatcher in env.dispatchers_snapshot() {
            dispatcher.queue_stats(&mut |name, len| {
                out(Quantity::new(format!("disp/{name}"), "/demands.count", len));
            });
            dispatcher.activity_stats(&mut |name, snapshot| {
                out(Quantity::new(
                    format!("disp/{name}"),
                    "/thread.activity.work.count",
                    usize::try_from(snapshot.work.count).unwrap_or(usize::MAX),
                ));
                out(Quantity::new(
                    format!("disp/{name}"),
                    "/thread.activity.wait.count",
                    usize::try_from(snapshot.wait.count).unwrap_or(usize::MAX),
                ));
            });
        }
    }
}
