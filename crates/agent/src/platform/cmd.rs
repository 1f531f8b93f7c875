use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Captured output of a finished command.
#[derive(Debug, Clone, Default)]
pub(crate) struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
    /// `-1` when the process was killed by a signal.
    pub exit_code: i32,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub(crate) fn command<I, S>(program: &str, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Run to completion and capture output regardless of exit status.
pub(crate) async fn run_cmd(mut cmd: Command) -> anyhow::Result<CmdOutput> {
    let program = format!("{:?}", cmd.as_std().get_program());
    debug!(program = %program, "running command");
    let out = cmd
        .output()
        .await
        .with_context(|| format!("Running command {program}"))?;
    Ok(CmdOutput {
        stdout: String::from_utf8_lossy(&out.stdout).to_string(),
        stderr: String::from_utf8_lossy(&out.stderr).to_string(),
        exit_code: out.status.code().unwrap_or(-1),
    })
}

/// Run `program args...` and fail on a non-zero exit, returning stdout.
pub(crate) async fn run_checked<I, S>(program: &str, args: I) -> anyhow::Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    let out = run_cmd(command(program, &args)).await?;
    if !out.success() {
        let rendered: Vec<_> = args.iter().map(|a| a.as_ref().to_string_lossy()).collect();
        anyhow::bail!(
            "command failed: {} {:?} (exit={}): {}",
            program,
            rendered,
            out.exit_code,
            out.stderr.trim()
        );
    }
    Ok(out.stdout)
}

/// Run `script` in `cwd`, killing it if `cancel` fires first.
pub(crate) async fn run_cancellable(
    mut cmd: Command,
    cwd: &Path,
    cancel: CancellationToken,
) -> anyhow::Result<CmdOutput> {
    let program = format!("{:?}", cmd.as_std().get_program());
    let mut child = cmd
        .current_dir(cwd)
        .spawn()
        .with_context(|| format!("Spawning {program}"))?;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let out_fut = async {
        let mut buf = Vec::new();
        if let Some(ref mut s) = stdout {
            if let Err(e) = s.read_to_end(&mut buf).await {
                debug!(error = %e, "stdout closed early");
            }
        }
        buf
    };
    let err_fut = async {
        let mut buf = Vec::new();
        if let Some(ref mut s) = stderr {
            if let Err(e) = s.read_to_end(&mut buf).await {
                debug!(error = %e, "stderr closed early");
            }
        }
        buf
    };

    tokio::select! {
        (out, err, status) = async { tokio::join!(out_fut, err_fut, child.wait()) } => {
            let status = status.with_context(|| format!("Waiting for {program}"))?;
            Ok(CmdOutput {
                stdout: String::from_utf8_lossy(&out).to_string(),
                stderr: String::from_utf8_lossy(&err).to_string(),
                exit_code: status.code().unwrap_or(-1),
            })
        }
        _ = cancel.cancelled() => {
            kill(&mut child, &program).await;
            anyhow::bail!("{program} was cancelled")
        }
    }
}

async fn kill(child: &mut Child, program: &str) {
    if let Err(e) = child.kill().await {
        tracing::warn!(program = %program, error = %e, "failed to kill process");
    }
}
