use std::path::{Path, PathBuf};

use agent_core::{ApplySpec, Settings};
use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use super::{SettingsService, SpecService};

/// Current apply spec as a JSON file.
#[derive(Debug, Clone)]
pub struct FileSpecService {
    path: PathBuf,
}

impl FileSpecService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SpecService for FileSpecService {
    async fn get(&self) -> anyhow::Result<ApplySpec> {
        Ok(read_json_opt(&self.path).await?.unwrap_or_default())
    }

    async fn set(&self, spec: &ApplySpec) -> anyhow::Result<()> {
        write_json(&self.path, spec).await
    }
}

/// Settings read from a JSON file and cached in memory.
pub struct FileSettingsService {
    path: PathBuf,
    cache: RwLock<Option<Settings>>,
}

impl FileSettingsService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    async fn load(&self) -> anyhow::Result<Settings> {
        read_json_opt(&self.path)
            .await?
            .with_context(|| format!("Settings file {} does not exist", self.path.display()))
    }
}

#[async_trait]
impl SettingsService for FileSettingsService {
    async fn settings(&self) -> anyhow::Result<Settings> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            return Ok(cached.clone());
        }
        self.refresh().await
    }

    async fn refresh(&self) -> anyhow::Result<Settings> {
        let settings = self.load().await?;
        *self.cache.write().await = Some(settings.clone());
        Ok(settings)
    }

    async fn invalidate(&self) -> anyhow::Result<()> {
        info!(path = %self.path.display(), "invalidating cached settings");
        *self.cache.write().await = None;
        Ok(())
    }
}

pub(crate) async fn read_json_opt<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .with_context(|| format!("Parsing {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Reading {}", path.display())),
    }
}

pub(crate) async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Creating {}", parent.display()))?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(value)?)
        .await
        .with_context(|| format!("Writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Replacing {}", path.display()))?;
    Ok(())
}
