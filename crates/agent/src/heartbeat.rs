//! Periodic heartbeats carrying job state and host vitals.

use std::sync::Arc;
use std::time::Duration;

use agent_core::Heartbeat;
use anyhow::Context;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::platform::{JobSupervisor, Notifier, Platform, SpecService};
use crate::registry::AgentDeps;

pub struct Heartbeater {
    specs: Arc<dyn SpecService>,
    supervisor: Arc<dyn JobSupervisor>,
    platform: Arc<dyn Platform>,
    notifier: Arc<dyn Notifier>,
}

impl Heartbeater {
    pub fn new(deps: &AgentDeps) -> Self {
        Self {
            specs: Arc::clone(&deps.specs),
            supervisor: Arc::clone(&deps.supervisor),
            platform: Arc::clone(&deps.platform),
            notifier: Arc::clone(&deps.notifier),
        }
    }

    /// Build the current heartbeat and send it.
    pub async fn beat(&self) -> anyhow::Result<Heartbeat> {
        let spec = self.specs.get().await.context("Getting current spec")?;
        let beat = Heartbeat {
            job: spec.job.as_ref().map(|j| j.name.clone()).filter(|n| !n.is_empty()),
            index: spec.index,
            job_state: self.supervisor.status().await,
            vitals: self.platform.vitals().await.context("Building heartbeat vitals")?,
            ntp: self.platform.ntp_info().await,
        };
        self.notifier
            .heartbeat(&beat)
            .await
            .context("Sending heartbeat")?;
        Ok(beat)
    }

    /// Send a heartbeat every `every`, starting immediately. Failures are logged and the
    /// loop carries on.
    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        info!(interval_secs = every.as_secs(), "heartbeats enabled");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = self.beat().await {
                    warn!(error = %format!("{e:#}"), "heartbeat failed");
                }
            }
        })
    }
}
