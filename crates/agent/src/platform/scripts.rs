//! Job-author scripts shipped inside job templates.

use std::path::PathBuf;

use agent_core::drain::parse_script_value;
use agent_core::{DrainParams, ErrandResult};
use anyhow::Context;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::cmd::{command, run_cancellable, run_cmd};
use super::{DrainScriptProvider, ErrandRunner};

/// `<jobs>/<template>/bin/drain <job_change> <hash_change> [updated packages...]`.
#[derive(Debug, Clone)]
pub struct JobDrainScriptProvider {
    jobs_dir: PathBuf,
}

impl JobDrainScriptProvider {
    pub fn new(jobs_dir: impl Into<PathBuf>) -> Self {
        Self {
            jobs_dir: jobs_dir.into(),
        }
    }

    fn script_path(&self, template: &str) -> PathBuf {
        self.jobs_dir.join(template).join("bin").join("drain")
    }
}

#[async_trait]
impl DrainScriptProvider for JobDrainScriptProvider {
    fn exists(&self, template: &str) -> bool {
        self.script_path(template).is_file()
    }

    async fn run(&self, template: &str, params: &DrainParams) -> anyhow::Result<i64> {
        let script = self.script_path(template);
        let program = script.to_string_lossy().to_string();
        info!(script = %program, args = ?params.script_args(), "running drain script");

        let out = run_cmd(command(&program, params.script_args())).await?;
        if !out.success() {
            anyhow::bail!(
                "Drain script exited with {}: {}",
                out.exit_code,
                out.stderr.trim()
            );
        }
        Ok(parse_script_value(&out.stdout)?)
    }
}

/// `<jobs>/<template>/bin/run`, killed when the errand is cancelled.
#[derive(Debug, Clone)]
pub struct JobErrandRunner {
    jobs_dir: PathBuf,
}

impl JobErrandRunner {
    pub fn new(jobs_dir: impl Into<PathBuf>) -> Self {
        Self {
            jobs_dir: jobs_dir.into(),
        }
    }
}

#[async_trait]
impl ErrandRunner for JobErrandRunner {
    async fn run(&self, template: &str, cancel: CancellationToken) -> anyhow::Result<ErrandResult> {
        let job_dir = self.jobs_dir.join(template);
        let script = job_dir.join("bin").join("run");
        let program = script.to_string_lossy().to_string();
        info!(script = %program, "running errand");

        let no_args: [&str; 0] = [];
        let out = run_cancellable(command(&program, no_args), &job_dir, cancel)
            .await
            .context("Running errand script")?;
        Ok(ErrandResult {
            stdout: out.stdout,
            stderr: out.stderr,
            exit_code: out.exit_code,
        })
    }
}
