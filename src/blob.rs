//! Byte storage for uploaded files. The room store only ever holds a
//! [`BlobRef`]; actual bytes live behind this trait.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

/// Opaque handle to stored bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BlobRef(String);

impl BlobRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn key(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn store(&self, bytes: &[u8], filename: &str, mime: &str) -> anyhow::Result<BlobRef>;
    async fn retrieve(&self, blob: &BlobRef) -> anyhow::Result<Vec<u8>>;
    async fn delete(&self, blob: &BlobRef) -> anyhow::Result<()>;
}

/// Flat-directory filesystem store; keys are `<uuid>_<original name>` so a
/// directory listing stays human-readable.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("creating upload dir {}", root.display()))?;
        Ok(Self { root })
    }

    fn path_for(&self, blob: &BlobRef) -> PathBuf {
        self.root.join(blob.key())
    }
}

/// Keeps only the final path component so a crafted filename cannot escape
/// the upload directory.
fn safe_name(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_owned())
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn store(&self, bytes: &[u8], filename: &str, _mime: &str) -> anyhow::Result<BlobRef> {
        let key = format!("{}_{}", Uuid::now_v7().simple(), safe_name(filename));
        let path = self.root.join(&key);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(BlobRef(key))
    }

    async fn retrieve(&self, blob: &BlobRef) -> anyhow::Result<Vec<u8>> {
        let path = self.path_for(blob);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))
    }

    async fn delete(&self, blob: &BlobRef) -> anyhow::Result<()> {
        let path = self.path_for(blob);
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("removing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_retrieve_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path()).unwrap();

        let blob = blobs.store(b"hello", "notes.txt", "text/plain").await.unwrap();
        assert!(blob.key().ends_with("_notes.txt"));
        assert_eq!(blobs.retrieve(&blob).await.unwrap(), b"hello");

        blobs.delete(&blob).await.unwrap();
        assert!(blobs.retrieve(&blob).await.is_err());
    }

    #[tokio::test]
    async fn filenames_cannot_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path()).unwrap();

        let blob = blobs.store(b"x", "../../etc/passwd", "text/plain").await.unwrap();
        assert!(blob.key().ends_with("_passwd"));
        assert!(dir.path().join(blob.key()).exists());
    }
}
