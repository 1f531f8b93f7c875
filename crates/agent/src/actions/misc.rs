use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;

use crate::action::TypedAction;
use crate::platform::{DirProvider, JobSupervisor};

pub struct PingAction;

#[async_trait]
impl TypedAction for PingAction {
    const NAME: &'static str = "ping";
    const ASYNCHRONOUS: bool = false;

    type Args = ();
    type Output = &'static str;

    async fn execute(&self, _args: ()) -> anyhow::Result<&'static str> {
        Ok("pong")
    }
}

pub struct StartAction {
    supervisor: Arc<dyn JobSupervisor>,
}

impl StartAction {
    pub fn new(supervisor: Arc<dyn JobSupervisor>) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl TypedAction for StartAction {
    const NAME: &'static str = "start";
    const ASYNCHRONOUS: bool = false;

    type Args = ();
    type Output = &'static str;

    async fn execute(&self, _args: ()) -> anyhow::Result<&'static str> {
        self.supervisor.start().await.context("Starting jobs")?;
        Ok("started")
    }
}

pub struct StopAction {
    supervisor: Arc<dyn JobSupervisor>,
}

impl StopAction {
    pub fn new(supervisor: Arc<dyn JobSupervisor>) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl TypedAction for StopAction {
    const NAME: &'static str = "stop";
    const ASYNCHRONOUS: bool = false;

    type Args = ();
    type Output = &'static str;

    async fn execute(&self, _args: ()) -> anyhow::Result<&'static str> {
        self.supervisor.stop().await.context("Stopping jobs")?;
        Ok("stopped")
    }
}

/// The apply spec baked into the image for a release, returned verbatim.
pub struct ReleaseApplySpecAction {
    dirs: DirProvider,
}

impl ReleaseApplySpecAction {
    pub fn new(dirs: DirProvider) -> Self {
        Self { dirs }
    }
}

#[async_trait]
impl TypedAction for ReleaseApplySpecAction {
    const NAME: &'static str = "release_apply_spec";
    const ASYNCHRONOUS: bool = false;

    type Args = ();
    type Output = Value;

    async fn execute(&self, _args: ()) -> anyhow::Result<Value> {
        let path = self.dirs.release_apply_spec_path();
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Opening release apply spec {}", path.display()))?;
        serde_json::from_slice(&bytes).context("Parsing release apply spec")
    }
}
