use std::sync::Arc;

use agent_core::{StateEnvelope, Variadic};
use anyhow::Context;
use async_trait::async_trait;

use crate::action::TypedAction;
use crate::platform::{JobSupervisor, Platform, SettingsService, SpecService};

const BOSH_PROTOCOL: &str = "1";

/// Current spec plus agent identity and job health; vitals with `"full"`.
pub struct GetStateAction {
    settings: Arc<dyn SettingsService>,
    specs: Arc<dyn SpecService>,
    supervisor: Arc<dyn JobSupervisor>,
    platform: Arc<dyn Platform>,
}

impl GetStateAction {
    pub fn new(
        settings: Arc<dyn SettingsService>,
        specs: Arc<dyn SpecService>,
        supervisor: Arc<dyn JobSupervisor>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self {
            settings,
            specs,
            supervisor,
            platform,
        }
    }
}

#[async_trait]
impl TypedAction for GetStateAction {
    const NAME: &'static str = "get_state";
    const ASYNCHRONOUS: bool = false;

    type Args = Variadic<String>;
    type Output = StateEnvelope;

    async fn execute(&self, format: Variadic<String>) -> anyhow::Result<StateEnvelope> {
        let settings = self.settings.settings().await.context("Getting settings")?;
        let spec = self.specs.get().await.context("Getting current spec")?;

        let vitals = if format.first().map(String::as_str) == Some("full") {
            Some(self.platform.vitals().await.context("Building full vitals")?)
        } else {
            None
        };

        Ok(StateEnvelope {
            spec,
            agent_id: settings.agent_id,
            bosh_protocol: BOSH_PROTOCOL.to_string(),
            job_state: self.supervisor.status().await,
            vm: settings.vm,
            ntp: self.platform.ntp_info().await,
            vitals,
        })
    }
}
