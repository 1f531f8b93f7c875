//! Collaborators the actions consume, as narrow traits, plus their local implementations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use agent_core::{
    ApplySpec, BlobRef, CompileDependencies, DrainParams, ErrandResult, Heartbeat, NtpInfo,
    PackageSpec, Settings, Vitals,
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

mod applier;
mod archive;
mod blobstore;
mod cmd;
mod compiler;
mod dirs;
mod files;
mod killer;
mod linux;
mod notifier;
mod scripts;
mod supervisor;

pub use applier::BlobApplier;
pub use blobstore::{sha1_file, LocalBlobstore};
pub use compiler::PackageCompiler;
pub use dirs::DirProvider;
pub use files::{FileSettingsService, FileSpecService};
pub use killer::ProcessAgentKiller;
pub use linux::LinuxPlatform;
pub use notifier::HttpNotifier;
pub use scripts::{JobDrainScriptProvider, JobErrandRunner};
pub use supervisor::MonitJobSupervisor;

/// Persistence of the currently applied spec.
#[async_trait]
pub trait SpecService: Send + Sync {
    /// The current spec; an agent that never applied anything has an empty one.
    async fn get(&self) -> anyhow::Result<ApplySpec>;
    async fn set(&self, spec: &ApplySpec) -> anyhow::Result<()>;
}

#[async_trait]
pub trait SettingsService: Send + Sync {
    /// Cached settings, loaded on first use.
    async fn settings(&self) -> anyhow::Result<Settings>;
    /// Reload from the source and replace the cache.
    async fn refresh(&self) -> anyhow::Result<Settings>;
    /// Drop the cache so the next read reloads.
    async fn invalidate(&self) -> anyhow::Result<()>;
}

/// OS primitives.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn mount_persistent_disk(&self, device: &str, mount_point: &Path) -> anyhow::Result<()>;
    /// Returns `false` when the device was not mounted.
    async fn unmount_persistent_disk(&self, device: &str) -> anyhow::Result<bool>;
    async fn is_persistent_disk_mounted(&self, device: &str) -> anyhow::Result<bool>;
    async fn is_mount_point(&self, path: &Path) -> anyhow::Result<bool>;
    async fn migrate_persistent_disk(&self, from: &Path, to: &Path) -> anyhow::Result<()>;

    async fn setup_ssh(&self, user: &str, public_key: &str) -> anyhow::Result<()>;
    async fn delete_ephemeral_users_matching(&self, pattern: &str) -> anyhow::Result<()>;

    /// Tarball of the files under `dir` matching any of `filters`.
    async fn compress_files_in_dir(&self, dir: &Path, filters: &[String]) -> anyhow::Result<PathBuf>;

    async fn prepare_for_network_change(&self) -> anyhow::Result<()>;

    async fn vitals(&self) -> anyhow::Result<Vitals>;
    async fn ntp_info(&self) -> NtpInfo;
}

#[async_trait]
pub trait Blobstore: Send + Sync {
    /// Local path of the blob, after checking its SHA-1 when one is given.
    async fn get(&self, blob_id: &str, sha1: &str) -> anyhow::Result<PathBuf>;
    /// Store a copy of `path`, returning its id and digest.
    async fn create(&self, path: &Path) -> anyhow::Result<BlobRef>;
}

/// Installs packages and job templates.
#[async_trait]
pub trait Applier: Send + Sync {
    async fn prepare(&self, desired: &ApplySpec) -> anyhow::Result<()>;
    async fn apply(&self, current: &ApplySpec, desired: &ApplySpec) -> anyhow::Result<()>;
}

#[async_trait]
pub trait JobSupervisor: Send + Sync {
    async fn start(&self) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;
    async fn unmonitor(&self) -> anyhow::Result<()>;
    async fn reload(&self) -> anyhow::Result<()>;
    /// `running`, `failing` or `unknown`.
    async fn status(&self) -> String;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_shutdown(&self) -> anyhow::Result<()>;
    async fn heartbeat(&self, beat: &Heartbeat) -> anyhow::Result<()>;
}

#[async_trait]
pub trait DrainScriptProvider: Send + Sync {
    fn exists(&self, template: &str) -> bool;
    /// Run the script and return its raw numeric output.
    async fn run(&self, template: &str, params: &DrainParams) -> anyhow::Result<i64>;
}

#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(
        &self,
        package: &PackageSpec,
        deps: &CompileDependencies,
    ) -> anyhow::Result<BlobRef>;
}

#[async_trait]
pub trait ErrandRunner: Send + Sync {
    /// Kills the script once `cancel` fires.
    async fn run(&self, template: &str, cancel: CancellationToken) -> anyhow::Result<ErrandResult>;
}

/// Terminates the agent process so its supervisor restarts it.
pub trait AgentKiller: Send + Sync {
    fn kill_after(&self, delay: Duration);
}
