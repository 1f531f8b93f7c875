use std::sync::Arc;

use agent_core::ErrandResult;
use anyhow::Context;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::action::TypedAction;
use crate::platform::{ErrandRunner, SpecService};

/// Run the job's errand script. Cancelling kills the script.
pub struct RunErrandAction {
    specs: Arc<dyn SpecService>,
    runner: Arc<dyn ErrandRunner>,
    cancel: CancellationToken,
}

impl RunErrandAction {
    pub fn new(specs: Arc<dyn SpecService>, runner: Arc<dyn ErrandRunner>) -> Self {
        Self {
            specs,
            runner,
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl TypedAction for RunErrandAction {
    const NAME: &'static str = "run_errand";
    const ASYNCHRONOUS: bool = true;

    type Args = ();
    type Output = ErrandResult;

    async fn execute(&self, _args: ()) -> anyhow::Result<ErrandResult> {
        let spec = self.specs.get().await.context("Getting current spec")?;
        let template = spec
            .job_template()
            .context("At least one job template is required to run an errand")?;
        self.runner
            .run(template, self.cancel.child_token())
            .await
            .context("Running errand script")
    }

    fn cancel(&self) -> anyhow::Result<()> {
        info!("cancelling errand");
        self.cancel.cancel();
        Ok(())
    }
}
