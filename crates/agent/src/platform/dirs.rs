use std::path::{Component, Path, PathBuf};

/// Well-known locations under the agent's base directory.
#[derive(Debug, Clone)]
pub struct DirProvider {
    base: PathBuf,
}

impl DirProvider {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn bosh_dir(&self) -> PathBuf {
        self.base.join("bosh")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.bosh_dir().join("settings.json")
    }

    pub fn spec_path(&self) -> PathBuf {
        self.bosh_dir().join("spec.json")
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.bosh_dir().join("tasks.json")
    }

    pub fn release_apply_spec_path(&self) -> PathBuf {
        self.base.join("micro").join("apply_spec.json")
    }

    /// Enabled job templates (`<jobs>/<template>/bin/...`).
    pub fn jobs_dir(&self) -> PathBuf {
        self.base.join("jobs")
    }

    /// Enabled packages (`<packages>/<name>`).
    pub fn packages_dir(&self) -> PathBuf {
        self.base.join("packages")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.base.join("data")
    }

    /// Versioned install roots that the `jobs` and `packages` links point into.
    pub fn installed_jobs_dir(&self) -> PathBuf {
        self.data_dir().join("jobs")
    }

    pub fn installed_packages_dir(&self) -> PathBuf {
        self.data_dir().join("packages")
    }

    pub fn compile_dir(&self) -> PathBuf {
        self.data_dir().join("compile")
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.data_dir().join("blobs")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.data_dir().join("tmp")
    }

    /// Persistent disk mount point.
    pub fn store_dir(&self) -> PathBuf {
        self.base.join("store")
    }

    /// Where a second persistent disk is mounted while data is migrated onto it.
    pub fn store_migration_dir(&self) -> PathBuf {
        self.base.join("store_migration_target")
    }

    /// Job logs.
    pub fn logs_dir(&self) -> PathBuf {
        self.base.join("sys").join("log")
    }

    pub fn agent_logs_dir(&self) -> PathBuf {
        self.bosh_dir().join("log")
    }

    pub fn ssh_home_dir(&self) -> PathBuf {
        self.base.join("bosh_ssh")
    }
}

/// `value` as exactly one plain path component, for names and versions taken from directives.
pub(crate) fn path_segment<'a>(what: &str, value: &'a str) -> anyhow::Result<&'a str> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !value.contains(['/', '\\']) => Ok(value),
        _ => anyhow::bail!("Invalid {what} '{value}'"),
    }
}
