use std::sync::Arc;

use agent_core::{
    bind_at, bind_rest, check_arity, ActionArgs, ApplySpec, BindError, DrainError, DrainParams,
    DrainResult, DrainType, Variadic,
};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::action::TypedAction;
use crate::platform::{DrainScriptProvider, JobSupervisor, Notifier, SpecService};

/// `(drain_type, new_spec...)`. An update drain must carry the new spec.
#[derive(Debug, Clone)]
pub struct DrainArgs {
    pub drain_type: DrainType,
    pub new_spec: Option<ApplySpec>,
}

impl ActionArgs for DrainArgs {
    const REQUIRED: usize = 1;

    fn bind(args: &[Value]) -> Result<Self, BindError> {
        check_arity(Self::REQUIRED, args.len())?;
        let drain_type: DrainType = bind_at(args, 0)?;
        let specs: Variadic<ApplySpec> = bind_rest(args, 1)?;
        if drain_type == DrainType::Update && specs.is_empty() {
            return Err(BindError::InsufficientArguments {
                expected: 2,
                actual: args.len(),
            });
        }
        Ok(Self {
            drain_type,
            new_spec: specs.into_inner().into_iter().next(),
        })
    }
}

pub struct DrainAction {
    specs: Arc<dyn SpecService>,
    scripts: Arc<dyn DrainScriptProvider>,
    notifier: Arc<dyn Notifier>,
    supervisor: Arc<dyn JobSupervisor>,
}

impl DrainAction {
    pub fn new(
        specs: Arc<dyn SpecService>,
        scripts: Arc<dyn DrainScriptProvider>,
        notifier: Arc<dyn Notifier>,
        supervisor: Arc<dyn JobSupervisor>,
    ) -> Self {
        Self {
            specs,
            scripts,
            notifier,
            supervisor,
        }
    }
}

#[async_trait]
impl TypedAction for DrainAction {
    const NAME: &'static str = "drain";
    const ASYNCHRONOUS: bool = true;

    type Args = DrainArgs;
    type Output = u64;

    async fn execute(&self, args: DrainArgs) -> anyhow::Result<u64> {
        let current = self.specs.get().await.context("Getting current spec")?;

        let template = current.job_template().unwrap_or_default();
        if template.is_empty() || !self.scripts.exists(template) {
            if args.drain_type == DrainType::Status {
                return Err(DrainError::ScriptNotFound(template.to_string()).into());
            }
            info!(template, "no drain script; nothing to drain");
            return Ok(0);
        }

        let params = match (args.drain_type, &args.new_spec) {
            (DrainType::Update, Some(new_spec)) => DrainParams::for_update(&current, new_spec),
            (DrainType::Update, None) => anyhow::bail!("Drain update requires new spec"),
            (DrainType::Shutdown, _) => {
                self.notifier
                    .notify_shutdown()
                    .await
                    .context("Notifying shutdown")?;
                DrainParams::for_shutdown()
            }
            (DrainType::Status, _) => DrainParams::for_status(),
        };

        if args.drain_type != DrainType::Status {
            self.supervisor
                .unmonitor()
                .await
                .context("Unmonitoring services")?;
        }

        info!(
            template,
            job_change = %params.job_change,
            hash_change = %params.hash_change,
            updated_packages = ?params.updated_packages,
            "draining job"
        );
        let raw = self
            .scripts
            .run(template, &params)
            .await
            .context("Running drain script")?;
        let result = DrainResult::from_script_value(raw)?;
        Ok(result.value())
    }
}
