use async_trait::async_trait;
use tracing::{info, warn};

use super::cmd::run_checked;
use super::JobSupervisor;

/// Job supervision through the `monit` CLI.
#[derive(Debug, Clone)]
pub struct MonitJobSupervisor {
    monit: String,
}

impl Default for MonitJobSupervisor {
    fn default() -> Self {
        Self::new("monit")
    }
}

impl MonitJobSupervisor {
    pub fn new(monit: impl Into<String>) -> Self {
        Self {
            monit: monit.into(),
        }
    }

    async fn monit(&self, args: &[&str]) -> anyhow::Result<String> {
        info!(?args, "monit");
        run_checked(&self.monit, args).await
    }
}

#[async_trait]
impl JobSupervisor for MonitJobSupervisor {
    async fn start(&self) -> anyhow::Result<()> {
        self.monit(&["start", "all"]).await.map(drop)
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.monit(&["stop", "all"]).await.map(drop)
    }

    async fn unmonitor(&self) -> anyhow::Result<()> {
        self.monit(&["unmonitor", "all"]).await.map(drop)
    }

    async fn reload(&self) -> anyhow::Result<()> {
        self.monit(&["reload"]).await.map(drop)
    }

    async fn status(&self) -> String {
        match run_checked(&self.monit, ["summary"]).await {
            Ok(out) => summary_status(&out).to_string(),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "monit summary failed");
                "unknown".to_string()
            }
        }
    }
}

/// `running` when every process in a `monit summary` is running, else `failing`.
fn summary_status(summary: &str) -> &'static str {
    let failing = summary
        .lines()
        .filter(|l| l.trim_start().starts_with("Process"))
        .any(|l| !l.contains("running"));
    if failing {
        "failing"
    } else {
        "running"
    }
}
