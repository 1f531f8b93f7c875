use std::sync::Arc;

use agent_core::{BlobRef, CompileDependencies, PackageSpec};
use anyhow::Context;
use async_trait::async_trait;
use tracing::{info, warn};
use ulid::Ulid;

use super::applier::{install_blob, relink};
use super::cmd::{command, run_cmd};
use super::dirs::path_segment;
use super::{archive, Blobstore, Compiler, DirProvider};

/// Compiles a source package with its `packaging` script.
pub struct PackageCompiler {
    blobstore: Arc<dyn Blobstore>,
    dirs: DirProvider,
}

impl PackageCompiler {
    pub fn new(blobstore: Arc<dyn Blobstore>, dirs: DirProvider) -> Self {
        Self { blobstore, dirs }
    }
}

#[async_trait]
impl Compiler for PackageCompiler {
    async fn compile(
        &self,
        package: &PackageSpec,
        deps: &CompileDependencies,
    ) -> anyhow::Result<BlobRef> {
        let name = path_segment("package name", &package.name)?;
        let version = path_segment("package version", &package.version)?;
        for dep in deps.values() {
            path_segment("dependency name", &dep.name)?;
            path_segment("dependency version", &dep.version)?;
        }
        info!(name, version, deps = deps.len(), "compiling package");

        for dep in deps.values() {
            let target = self
                .dirs
                .installed_packages_dir()
                .join(&dep.name)
                .join(&dep.version);
            let blob = BlobRef {
                blobstore_id: dep.blobstore_id.clone(),
                sha1: dep.sha1.clone(),
            };
            install_blob(self.blobstore.as_ref(), &blob, &target)
                .await
                .with_context(|| format!("Installing dependency {}", dep.name))?;
            relink(&target, &self.dirs.packages_dir().join(&dep.name)).await?;
        }

        let compile_dir = self.dirs.compile_dir().join(name);
        install_blob(self.blobstore.as_ref(), &package.blob(), &compile_dir)
            .await
            .context("Fetching package source")?;

        let install_dir = self.dirs.installed_packages_dir().join(name).join(version);
        if tokio::fs::try_exists(&install_dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&install_dir).await?;
        }
        tokio::fs::create_dir_all(&install_dir).await?;
        relink(&install_dir, &self.dirs.packages_dir().join(name)).await?;

        if compile_dir.join("packaging").is_file() {
            let mut cmd = command("bash", ["-x", "packaging"]);
            cmd.current_dir(&compile_dir)
                .env("BOSH_COMPILE_TARGET", &compile_dir)
                .env("BOSH_INSTALL_TARGET", &install_dir)
                .env("BOSH_PACKAGE_NAME", &package.name)
                .env("BOSH_PACKAGE_VERSION", &package.version);
            let out = run_cmd(cmd).await?;
            if !out.success() {
                anyhow::bail!(
                    "Packaging script for {} exited with {}: {}",
                    package.name,
                    out.exit_code,
                    out.stderr.trim()
                );
            }
        }

        let tmp = self.dirs.tmp_dir();
        tokio::fs::create_dir_all(&tmp).await?;
        let tarball = tmp.join(format!("compiled-{}.tgz", Ulid::new()));
        archive::pack_dir(&install_dir, &tarball)
            .await
            .context("Compressing compiled package")?;

        let uploaded = self.blobstore.create(&tarball).await;
        if let Err(e) = tokio::fs::remove_file(&tarball).await {
            warn!(path = %tarball.display(), error = %e, "failed to remove compiled tarball");
        }
        if let Err(e) = tokio::fs::remove_dir_all(&compile_dir).await {
            warn!(path = %compile_dir.display(), error = %e, "failed to remove compile dir");
        }
        uploaded.context("Uploading compiled package")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::LocalBlobstore;
    use agent_core::CompileDependency;

    fn package(name: &str, version: &str) -> PackageSpec {
        PackageSpec {
            name: name.into(),
            version: version.into(),
            sha1: String::new(),
            blobstore_id: "src".into(),
        }
    }

    #[tokio::test]
    async fn escaping_names_leave_the_filesystem_alone() {
        let dir = tempfile::tempdir().unwrap();
        let victim = dir.path().join("victim");
        std::fs::create_dir_all(&victim).unwrap();
        std::fs::write(victim.join("precious.txt"), "keep").unwrap();

        let base = dir.path().join("base");
        let compiler = PackageCompiler::new(
            Arc::new(LocalBlobstore::new(base.join("blobs"))),
            DirProvider::new(&base),
        );
        let no_deps = CompileDependencies::new();

        let abs = victim.to_string_lossy().to_string();
        let err = compiler.compile(&package(&abs, "1"), &no_deps).await.unwrap_err();
        assert_eq!(err.to_string(), format!("Invalid package name '{abs}'"));

        let err = compiler
            .compile(&package("ruby", "../../../victim"), &no_deps)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid package version '../../../victim'");

        let mut deps = CompileDependencies::new();
        deps.insert(
            "libyaml".into(),
            CompileDependency {
                name: "..".into(),
                version: "0.1".into(),
                ..CompileDependency::default()
            },
        );
        let err = compiler.compile(&package("ruby", "2.7"), &deps).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid dependency name '..'");

        assert!(victim.join("precious.txt").exists());
        assert!(!base.join("data").exists());
    }
}
