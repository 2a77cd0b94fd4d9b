use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::error::BlobError;
use crate::store::{BlobStore, validate_blob_id};

/// In-process [`BlobStore`] for development and tests.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, (String, Bytes)>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Content type recorded for `blob_id`, if stored.
    pub fn content_type(&self, blob_id: &str) -> Option<String> {
        self.blobs.get(blob_id).map(|b| b.0.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, blob_id: &str, content_type: &str, data: Bytes) -> Result<(), BlobError> {
        validate_blob_id(blob_id)?;
        self.blobs
            .insert(blob_id.to_owned(), (content_type.to_owned(), data));
        Ok(())
    }

    async fn get(&self, blob_id: &str) -> Result<Bytes, BlobError> {
        self.blobs
            .get(blob_id)
            .map(|b| b.1.clone())
            .ok_or_else(|| BlobError::NotFound(blob_id.to_owned()))
    }

    async fn delete(&self, blob_id: &str) -> Result<bool, BlobError> {
        Ok(self.blobs.remove(blob_id).is_some())
    }

    async fn exists(&self, blob_id: &str) -> Result<bool, BlobError> {
        Ok(self.blobs.contains_key(blob_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete() {
        let store = MemoryBlobStore::new();
        store
            .put("tenants/a/x.mp4", "video/mp4", Bytes::from_static(b"abc"))
            .await
            .unwrap();
        assert!(store.exists("tenants/a/x.mp4").await.unwrap());
        assert_eq!(store.get("tenants/a/x.mp4").await.unwrap(), Bytes::from_static(b"abc"));
        assert_eq!(store.content_type("tenants/a/x.mp4").as_deref(), Some("video/mp4"));

        assert!(store.delete("tenants/a/x.mp4").await.unwrap());
        assert!(!store.delete("tenants/a/x.mp4").await.unwrap());
        assert!(matches!(
            store.get("tenants/a/x.mp4").await,
            Err(BlobError::NotFound(_))
        ));
    }
}
