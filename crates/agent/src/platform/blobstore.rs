use std::path::{Path, PathBuf};

use agent_core::BlobRef;
use anyhow::Context;
use async_trait::async_trait;
use sha1::{Digest, Sha1};
use tokio::io::AsyncReadExt;
use ulid::Ulid;

use super::Blobstore;

/// Directory-backed blobstore. Blob ids are ULIDs.
#[derive(Debug, Clone)]
pub struct LocalBlobstore {
    dir: PathBuf,
}

impl LocalBlobstore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn blob_path(&self, blob_id: &str) -> anyhow::Result<PathBuf> {
        if blob_id.is_empty() || blob_id.contains(['/', '\\']) || blob_id.starts_with('.') {
            anyhow::bail!("Invalid blob id '{blob_id}'");
        }
        Ok(self.dir.join(blob_id))
    }
}

#[async_trait]
impl Blobstore for LocalBlobstore {
    async fn get(&self, blob_id: &str, sha1: &str) -> anyhow::Result<PathBuf> {
        let path = self.blob_path(blob_id)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            anyhow::bail!("Blob '{blob_id}' not found");
        }
        if !sha1.is_empty() {
            let actual = sha1_file(&path).await?;
            if !actual.eq_ignore_ascii_case(sha1) {
                anyhow::bail!("SHA1 mismatch for blob '{blob_id}': expected {sha1}, got {actual}");
            }
        }
        Ok(path)
    }

    async fn create(&self, path: &Path) -> anyhow::Result<BlobRef> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Creating blobstore dir {}", self.dir.display()))?;
        let blobstore_id = Ulid::new().to_string();
        let sha1 = sha1_file(path).await?;
        tokio::fs::copy(path, self.dir.join(&blobstore_id))
            .await
            .with_context(|| format!("Storing {}", path.display()))?;
        Ok(BlobRef { blobstore_id, sha1 })
    }
}

/// Hex SHA-1 of a file's content.
pub async fn sha1_file(path: &Path) -> anyhow::Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Opening {}", path.display()))?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
