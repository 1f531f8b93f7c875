use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::action::TypedAction;
use crate::platform::{Platform, SettingsService};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SshParams {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub user_regex: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SshResult {
    pub command: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// Create or remove temporary ssh users.
pub struct SshAction {
    settings: Arc<dyn SettingsService>,
    platform: Arc<dyn Platform>,
}

impl SshAction {
    pub fn new(settings: Arc<dyn SettingsService>, platform: Arc<dyn Platform>) -> Self {
        Self { settings, platform }
    }

    async fn setup(&self, params: SshParams) -> anyhow::Result<SshResult> {
        let user = params.user.context("Missing user for ssh setup")?;
        let key = params
            .public_key
            .context("Missing public_key for ssh setup")?;
        self.platform
            .setup_ssh(&user, &key)
            .await
            .context("Setting ssh")?;

        let settings = self.settings.settings().await.context("Getting settings")?;
        Ok(SshResult {
            command: "setup".into(),
            status: "success".into(),
            ip: settings.default_ip().map(str::to_string),
        })
    }

    async fn cleanup(&self, params: SshParams) -> anyhow::Result<SshResult> {
        let pattern = params
            .user_regex
            .context("Missing user_regex for ssh cleanup")?;
        self.platform
            .delete_ephemeral_users_matching(&pattern)
            .await
            .context("Ssh Cleanup: Deleting Ephemeral Users")?;
        Ok(SshResult {
            command: "cleanup".into(),
            status: "success".into(),
            ip: None,
        })
    }
}

#[async_trait]
impl TypedAction for SshAction {
    const NAME: &'static str = "ssh";
    const ASYNCHRONOUS: bool = false;

    type Args = (String, SshParams);
    type Output = SshResult;

    async fn execute(&self, args: (String, SshParams)) -> anyhow::Result<SshResult> {
        let (cmd, params) = args;
        match cmd.as_str() {
            "setup" => self.setup(params).await,
            "cleanup" => self.cleanup(params).await,
            other => anyhow::bail!("Unknown command {other}"),
        }
    }
}
