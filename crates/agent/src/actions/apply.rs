use std::sync::Arc;

use agent_core::ApplySpec;
use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use crate::action::TypedAction;
use crate::platform::{Applier, SpecService};

/// Converge the VM to a desired spec and remember it as current.
pub struct ApplyAction {
    applier: Arc<dyn Applier>,
    specs: Arc<dyn SpecService>,
}

impl ApplyAction {
    pub fn new(applier: Arc<dyn Applier>, specs: Arc<dyn SpecService>) -> Self {
        Self { applier, specs }
    }
}

#[async_trait]
impl TypedAction for ApplyAction {
    const NAME: &'static str = "apply";
    const ASYNCHRONOUS: bool = true;
    const PERSISTENT: bool = true;

    type Args = (ApplySpec,);
    type Output = &'static str;

    async fn execute(&self, args: (ApplySpec,)) -> anyhow::Result<&'static str> {
        let (desired,) = args;
        // A spec without a configuration hash only records deployment metadata.
        if desired.config_hash().is_some() {
            let current = self.specs.get().await.context("Getting current spec")?;
            self.applier
                .apply(&current, &desired)
                .await
                .context("Applying")?;
        } else {
            info!("apply spec has no configuration hash; persisting only");
        }
        self.specs
            .set(&desired)
            .await
            .context("Persisting apply spec")?;
        Ok("applied")
    }

    async fn resume(&self, args: (ApplySpec,)) -> anyhow::Result<&'static str> {
        self.execute(args).await
    }
}

/// Fetch everything a spec needs ahead of an apply.
pub struct PrepareAction {
    applier: Arc<dyn Applier>,
}

impl PrepareAction {
    pub fn new(applier: Arc<dyn Applier>) -> Self {
        Self { applier }
    }
}

#[async_trait]
impl TypedAction for PrepareAction {
    const NAME: &'static str = "prepare";
    const ASYNCHRONOUS: bool = true;

    type Args = (ApplySpec,);
    type Output = &'static str;

    async fn execute(&self, args: (ApplySpec,)) -> anyhow::Result<&'static str> {
        let (desired,) = args;
        self.applier
            .prepare(&desired)
            .await
            .context("Preparing desired spec")?;
        Ok("prepared")
    }
}
