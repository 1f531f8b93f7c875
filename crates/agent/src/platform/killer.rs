use std::time::Duration;

use tracing::warn;

use super::AgentKiller;

/// Exits the process after a delay; the process supervisor brings the agent back.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessAgentKiller;

impl AgentKiller for ProcessAgentKiller {
    fn kill_after(&self, delay: Duration) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            warn!(?delay, "exiting agent to pick up network changes");
            std::process::exit(0);
        });
    }
}
