use std::path::Path;
use std::sync::Arc;

use agent_core::{ApplySpec, BlobRef};
use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, info};

use super::dirs::path_segment;
use super::{archive, Applier, Blobstore, DirProvider, JobSupervisor};

/// Installs package and job blobs under versioned directories and links them into place.
pub struct BlobApplier {
    blobstore: Arc<dyn Blobstore>,
    supervisor: Arc<dyn JobSupervisor>,
    dirs: DirProvider,
}

impl BlobApplier {
    pub fn new(
        blobstore: Arc<dyn Blobstore>,
        supervisor: Arc<dyn JobSupervisor>,
        dirs: DirProvider,
    ) -> Self {
        Self {
            blobstore,
            supervisor,
            dirs,
        }
    }

    /// Every blob the spec needs, as `(kind, name, version, blob)`. Names and versions
    /// become directories, so each must be a single path segment.
    fn bundles(spec: &ApplySpec) -> anyhow::Result<Vec<(&'static str, String, String, BlobRef)>> {
        let mut out: Vec<_> = spec
            .packages
            .values()
            .map(|p| ("packages", p.name.clone(), p.version.clone(), p.blob()))
            .collect();
        if let Some(job) = &spec.job {
            out.extend(job.templates.iter().map(|t| {
                (
                    "jobs",
                    t.name.clone(),
                    t.version.clone(),
                    BlobRef {
                        blobstore_id: t.blobstore_id.clone(),
                        sha1: t.sha1.clone(),
                    },
                )
            }));
        }
        for (kind, name, version, _) in &out {
            let what = if *kind == "jobs" { "job" } else { "package" };
            path_segment(&format!("{what} name"), name)?;
            path_segment(&format!("{what} version"), version)?;
        }
        Ok(out)
    }

    async fn install(&self, kind: &str, name: &str, version: &str, blob: &BlobRef) -> anyhow::Result<()> {
        let target = self.dirs.data_dir().join(kind).join(name).join(version);
        if !tokio::fs::try_exists(&target).await.unwrap_or(false) {
            install_blob(self.blobstore.as_ref(), blob, &target)
                .await
                .with_context(|| format!("Installing {kind} {name}/{version}"))?;
        } else {
            debug!(kind, name, version, "already installed");
        }
        let link = self.dirs.base_dir().join(kind).join(name);
        relink(&target, &link).await
    }
}

#[async_trait]
impl Applier for BlobApplier {
    async fn prepare(&self, desired: &ApplySpec) -> anyhow::Result<()> {
        for (kind, name, version, blob) in Self::bundles(desired)? {
            self.blobstore
                .get(&blob.blobstore_id, &blob.sha1)
                .await
                .with_context(|| format!("Fetching {kind} {name}/{version}"))?;
        }
        Ok(())
    }

    async fn apply(&self, current: &ApplySpec, desired: &ApplySpec) -> anyhow::Result<()> {
        info!(
            from = current.config_hash().unwrap_or("-"),
            to = desired.config_hash().unwrap_or("-"),
            "applying spec"
        );
        for (kind, name, version, blob) in Self::bundles(desired)? {
            self.install(kind, &name, &version, &blob).await?;
        }
        self.supervisor.reload().await.context("Reloading job supervisor")
    }
}

/// Fetch `blob` and extract it into `target`, replacing any partial install.
pub(crate) async fn install_blob(
    blobstore: &dyn Blobstore,
    blob: &BlobRef,
    target: &Path,
) -> anyhow::Result<()> {
    let tarball = blobstore.get(&blob.blobstore_id, &blob.sha1).await?;
    if tokio::fs::try_exists(target).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(target).await?;
    }
    tokio::fs::create_dir_all(target)
        .await
        .with_context(|| format!("Creating {}", target.display()))?;
    archive::unpack(&tarball, target)
        .await
        .context("Extracting blob")
}

/// Point `link` at `target`, replacing an existing link.
pub(crate) async fn relink(target: &Path, link: &Path) -> anyhow::Result<()> {
    if let Some(parent) = link.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    match tokio::fs::symlink_metadata(link).await {
        Ok(_) => tokio::fs::remove_file(link)
            .await
            .with_context(|| format!("Removing {}", link.display()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("Inspecting {}", link.display())),
    }
    tokio::fs::symlink(target, link)
        .await
        .with_context(|| format!("Linking {} -> {}", link.display(), target.display()))
}
