use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::action::TypedAction;
use crate::platform::{DirProvider, Platform, SettingsService};

fn disk_not_found(volume_id: &str) -> anyhow::Error {
    anyhow::anyhow!("Persistent disk with volume id '{volume_id}' could not be found")
}

/// Volume ids of the persistent disks currently mounted.
pub struct ListDiskAction {
    settings: Arc<dyn SettingsService>,
    platform: Arc<dyn Platform>,
}

impl ListDiskAction {
    pub fn new(settings: Arc<dyn SettingsService>, platform: Arc<dyn Platform>) -> Self {
        Self { settings, platform }
    }
}

#[async_trait]
impl TypedAction for ListDiskAction {
    const NAME: &'static str = "list_disk";
    const ASYNCHRONOUS: bool = false;

    type Args = ();
    type Output = Vec<String>;

    async fn execute(&self, _args: ()) -> anyhow::Result<Vec<String>> {
        let settings = self.settings.settings().await.context("Getting settings")?;
        let mut mounted = Vec::new();
        for (volume_id, device) in &settings.disks.persistent {
            if self
                .platform
                .is_persistent_disk_mounted(device)
                .await
                .with_context(|| format!("Checking whether {device} is mounted"))?
            {
                mounted.push(volume_id.clone());
            }
        }
        Ok(mounted)
    }
}

pub struct MountDiskAction {
    settings: Arc<dyn SettingsService>,
    platform: Arc<dyn Platform>,
    dirs: DirProvider,
}

impl MountDiskAction {
    pub fn new(
        settings: Arc<dyn SettingsService>,
        platform: Arc<dyn Platform>,
        dirs: DirProvider,
    ) -> Self {
        Self {
            settings,
            platform,
            dirs,
        }
    }
}

#[async_trait]
impl TypedAction for MountDiskAction {
    const NAME: &'static str = "mount_disk";
    const ASYNCHRONOUS: bool = true;

    type Args = (String,);
    type Output = Map<String, Value>;

    async fn execute(&self, args: (String,)) -> anyhow::Result<Map<String, Value>> {
        let (volume_id,) = args;
        // The disk was just attached, so the cached settings do not know it yet.
        let settings = self.settings.refresh().await.context("Refreshing settings")?;
        let device = settings
            .persistent_disk_path(&volume_id)
            .ok_or_else(|| disk_not_found(&volume_id))?;

        let store = self.dirs.store_dir();
        let mount_point = if self
            .platform
            .is_mount_point(&store)
            .await
            .context("Checking store mount point")?
        {
            self.dirs.store_migration_dir()
        } else {
            store
        };

        info!(%volume_id, device, mount_point = %mount_point.display(), "mounting disk");
        self.platform
            .mount_persistent_disk(device, &mount_point)
            .await
            .context("Mounting persistent disk")?;
        Ok(Map::new())
    }
}

#[derive(Debug, Serialize)]
pub struct UnmountResult {
    pub message: String,
}

pub struct UnmountDiskAction {
    settings: Arc<dyn SettingsService>,
    platform: Arc<dyn Platform>,
}

impl UnmountDiskAction {
    pub fn new(settings: Arc<dyn SettingsService>, platform: Arc<dyn Platform>) -> Self {
        Self { settings, platform }
    }
}

#[async_trait]
impl TypedAction for UnmountDiskAction {
    const NAME: &'static str = "unmount_disk";
    const ASYNCHRONOUS: bool = true;

    type Args = (String,);
    type Output = UnmountResult;

    async fn execute(&self, args: (String,)) -> anyhow::Result<UnmountResult> {
        let (volume_id,) = args;
        let settings = self.settings.settings().await.context("Getting settings")?;
        let device = settings
            .persistent_disk_path(&volume_id)
            .ok_or_else(|| disk_not_found(&volume_id))?;

        let unmounted = self
            .platform
            .unmount_persistent_disk(device)
            .await
            .context("Unmounting persistent disk")?;
        let message = if unmounted {
            format!("Unmounted partition of {device}")
        } else {
            format!("Partition of {device} is not mounted")
        };
        Ok(UnmountResult { message })
    }
}

/// Move data from the current persistent disk onto the one mounted for migration.
pub struct MigrateDiskAction {
    platform: Arc<dyn Platform>,
    dirs: DirProvider,
}

impl MigrateDiskAction {
    pub fn new(platform: Arc<dyn Platform>, dirs: DirProvider) -> Self {
        Self { platform, dirs }
    }
}

#[async_trait]
impl TypedAction for MigrateDiskAction {
    const NAME: &'static str = "migrate_disk";
    const ASYNCHRONOUS: bool = true;

    type Args = ();
    type Output = Map<String, Value>;

    async fn execute(&self, _args: ()) -> anyhow::Result<Map<String, Value>> {
        self.platform
            .migrate_persistent_disk(&self.dirs.store_dir(), &self.dirs.store_migration_dir())
            .await
            .context("Migrating persistent disk")?;
        Ok(Map::new())
    }
}
