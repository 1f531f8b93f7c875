use std::sync::Arc;

use agent_core::{bind_at, bind_rest, check_arity, ActionArgs, BindError, Variadic};
use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::action::TypedAction;
use crate::platform::{Blobstore, DirProvider, Platform};

const DEFAULT_FILTER: &str = "**/*";

/// `(log_type, filters?)`. Filters may be omitted or `null`.
#[derive(Debug, Clone)]
pub struct FetchLogsArgs {
    pub log_type: String,
    pub filters: Vec<String>,
}

impl ActionArgs for FetchLogsArgs {
    const REQUIRED: usize = 1;

    fn bind(args: &[Value]) -> Result<Self, BindError> {
        check_arity(Self::REQUIRED, args.len())?;
        let log_type = bind_at(args, 0)?;
        let rest: Variadic<Option<Vec<String>>> = bind_rest(args, 1)?;
        Ok(Self {
            log_type,
            filters: rest.into_inner().into_iter().next().flatten().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct LogsResult {
    pub blobstore_id: String,
}

/// Bundle job or agent logs into the blobstore.
pub struct FetchLogsAction {
    platform: Arc<dyn Platform>,
    blobstore: Arc<dyn Blobstore>,
    dirs: DirProvider,
}

impl FetchLogsAction {
    pub fn new(platform: Arc<dyn Platform>, blobstore: Arc<dyn Blobstore>, dirs: DirProvider) -> Self {
        Self {
            platform,
            blobstore,
            dirs,
        }
    }
}

#[async_trait]
impl TypedAction for FetchLogsAction {
    const NAME: &'static str = "fetch_logs";
    const ASYNCHRONOUS: bool = true;

    type Args = FetchLogsArgs;
    type Output = LogsResult;

    async fn execute(&self, args: FetchLogsArgs) -> anyhow::Result<LogsResult> {
        let FetchLogsArgs { log_type, filters } = args;
        let dir = match log_type.as_str() {
            "job" => self.dirs.logs_dir(),
            "agent" => self.dirs.agent_logs_dir(),
            other => anyhow::bail!("Invalid log type {other}"),
        };
        let filters = if filters.is_empty() {
            vec![DEFAULT_FILTER.to_string()]
        } else {
            filters
        };

        info!(%log_type, ?filters, "collecting logs");
        let tarball = self
            .platform
            .compress_files_in_dir(&dir, &filters)
            .await
            .context("Making logs tarball")?;

        let uploaded = self.blobstore.create(&tarball).await;
        if let Err(e) = tokio::fs::remove_file(&tarball).await {
            warn!(path = %tarball.display(), error = %e, "failed to remove logs tarball");
        }
        let blob = uploaded.context("Create file on blobstore")?;
        Ok(LogsResult {
            blobstore_id: blob.blobstore_id,
        })
    }
}
