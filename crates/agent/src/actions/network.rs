use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use crate::action::TypedAction;
use crate::platform::{AgentKiller, Platform, SettingsService};

async fn prepare_for_network_change(
    settings: &dyn SettingsService,
    platform: &dyn Platform,
) -> anyhow::Result<()> {
    settings
        .invalidate()
        .await
        .context("Invalidating settings")?;
    platform
        .prepare_for_network_change()
        .await
        .context("Preparing for network change")
}

pub struct PrepareNetworkChangeAction {
    settings: Arc<dyn SettingsService>,
    platform: Arc<dyn Platform>,
}

impl PrepareNetworkChangeAction {
    pub fn new(settings: Arc<dyn SettingsService>, platform: Arc<dyn Platform>) -> Self {
        Self { settings, platform }
    }
}

#[async_trait]
impl TypedAction for PrepareNetworkChangeAction {
    const NAME: &'static str = "prepare_network_change";
    const ASYNCHRONOUS: bool = false;

    type Args = ();
    type Output = bool;

    async fn execute(&self, _args: ()) -> anyhow::Result<bool> {
        prepare_for_network_change(self.settings.as_ref(), self.platform.as_ref()).await?;
        Ok(true)
    }
}

pub struct PrepareConfigureNetworksAction {
    settings: Arc<dyn SettingsService>,
    platform: Arc<dyn Platform>,
}

impl PrepareConfigureNetworksAction {
    pub fn new(settings: Arc<dyn SettingsService>, platform: Arc<dyn Platform>) -> Self {
        Self { settings, platform }
    }
}

#[async_trait]
impl TypedAction for PrepareConfigureNetworksAction {
    const NAME: &'static str = "prepare_configure_networks";
    const ASYNCHRONOUS: bool = false;

    type Args = ();
    type Output = &'static str;

    async fn execute(&self, _args: ()) -> anyhow::Result<&'static str> {
        prepare_for_network_change(self.settings.as_ref(), self.platform.as_ref()).await?;
        Ok("ok")
    }
}

/// Restart the agent after a delay so it comes back up on the new network settings.
pub struct ConfigureNetworksAction {
    killer: Arc<dyn AgentKiller>,
    delay: Duration,
}

impl ConfigureNetworksAction {
    pub fn new(killer: Arc<dyn AgentKiller>, delay: Duration) -> Self {
        Self { killer, delay }
    }
}

#[async_trait]
impl TypedAction for ConfigureNetworksAction {
    const NAME: &'static str = "configure_networks";
    const ASYNCHRONOUS: bool = true;

    type Args = ();
    type Output = &'static str;

    async fn execute(&self, _args: ()) -> anyhow::Result<&'static str> {
        info!(delay = ?self.delay, "scheduling agent restart for network reconfiguration");
        self.killer.kill_after(self.delay);
        Ok("ok")
    }
}
