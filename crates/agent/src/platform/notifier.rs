use std::sync::Arc;
use std::time::Duration;

use agent_core::Heartbeat;
use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::{Notifier, SettingsService};

#[derive(Debug, Serialize)]
struct Notice<'a, T: Serialize> {
    method: &'static str,
    agent_id: &'a str,
    #[serde(flatten)]
    body: T,
}

/// Posts lifecycle notifications to the orchestrator's message bus endpoint.
pub struct HttpNotifier {
    client: reqwest::Client,
    url: Option<String>,
    settings: Arc<dyn SettingsService>,
}

impl HttpNotifier {
    /// With no `url` notifications are skipped.
    pub fn new(url: Option<String>, settings: Arc<dyn SettingsService>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Building HTTP client")?;
        Ok(Self {
            client,
            url,
            settings,
        })
    }

    async fn post<T: Serialize + Send + Sync>(&self, method: &'static str, body: T) -> anyhow::Result<()> {
        let Some(url) = &self.url else {
            debug!(method, "no notification endpoint configured; skipping");
            return Ok(());
        };
        let settings = self.settings.settings().await?;
        self.client
            .post(url)
            .json(&Notice {
                method,
                agent_id: &settings.agent_id,
                body,
            })
            .send()
            .await
            .with_context(|| format!("Sending {method} notification"))?
            .error_for_status()
            .with_context(|| format!("{method} notification rejected"))?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify_shutdown(&self) -> anyhow::Result<()> {
        info!(url = ?self.url, "sending shutdown notification");
        self.post("shutdown", serde_json::Map::new()).await
    }

    async fn heartbeat(&self, beat: &Heartbeat) -> anyhow::Result<()> {
        debug!(job_state = %beat.job_state, "sending heartbeat");
        self.post("heartbeat", beat).await
    }
}
