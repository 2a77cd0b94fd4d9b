use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::BlobError;
use crate::store::{BlobStore, validate_blob_id};

/// [`BlobStore`] that keeps each blob as a file under a root directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never observes a partially written blob.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, blob_id: &str) -> Result<PathBuf, BlobError> {
        validate_blob_id(blob_id)?;
        Ok(self.root.join(blob_id))
    }
}

fn storage(e: &std::io::Error) -> BlobError {
    BlobError::Storage(e.to_string())
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, blob_id: &str, content_type: &str, data: Bytes) -> Result<(), BlobError> {
        let path = self.path_for(blob_id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| storage(&e))?;
        }
        let tmp = path.with_extension(format!("partial-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, &data).await.map_err(|e| storage(&e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(storage(&e));
        }
        debug!(blob_id, content_type, bytes = data.len(), "blob written");
        Ok(())
    }

    async fn get(&self, blob_id: &str) -> Result<Bytes, BlobError> {
        let path = self.path_for(blob_id)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(BlobError::NotFound(blob_id.to_owned()))
            }
            Err(e) => Err(storage(&e)),
        }
    }

    async fn delete(&self, blob_id: &str) -> Result<bool, BlobError> {
        let path = self.path_for(blob_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage(&e)),
        }
    }

    async fn exists(&self, blob_id: &str) -> Result<bool, BlobError> {
        let path = self.path_for(blob_id)?;
        tokio::fs::try_exists(&path).await.map_err(|e| storage(&e))
    }
}
