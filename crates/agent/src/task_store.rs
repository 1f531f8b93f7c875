use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_core::TaskId;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

/// A persistent action that was still running when it was recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub method: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

/// JSON file of in-flight persistent tasks.
///
/// Writes go through a temp file and rename, so a crash leaves either the old or the new
/// list on disk.
#[derive(Debug, Clone)]
pub struct TaskStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> anyhow::Result<Vec<TaskRecord>> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    pub async fn add(&self, record: TaskRecord) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.read().await?;
        records.retain(|r| r.task_id != record.task_id);
        records.push(record);
        self.write(&records).await
    }

    pub async fn remove(&self, task_id: &str) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.read().await?;
        let before = records.len();
        records.retain(|r| r.task_id != task_id);
        if records.len() == before {
            return Ok(());
        }
        self.write(&records).await
    }

    async fn read(&self) -> anyhow::Result<Vec<TaskRecord>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Parsing task records {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).with_context(|| format!("Reading {}", self.path.display())),
        }
    }

    async fn write(&self, records: &[TaskRecord]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Creating {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(records)?;
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("Writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Replacing {}", self.path.display()))?;
        Ok(())
    }
}
