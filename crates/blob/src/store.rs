use async_trait::async_trait;
use bytes::Bytes;

use crate::error::BlobError;

/// Physical storage for file bytes, addressed by an opaque blob id.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `blob_id`, replacing any previous content.
    async fn put(&self, blob_id: &str, content_type: &str, data: Bytes) -> Result<(), BlobError>;

    /// Fetch the content of `blob_id`, or [`BlobError::NotFound`].
    async fn get(&self, blob_id: &str) -> Result<Bytes, BlobError>;

    /// Delete a blob. Returns `true` if it existed.
    async fn delete(&self, blob_id: &str) -> Result<bool, BlobError>;

    async fn exists(&self, blob_id: &str) -> Result<bool, BlobError>;
}

/// Reject ids that are empty, absolute, or contain `.`/`..`/empty segments.
pub fn validate_blob_id(blob_id: &str) -> Result<(), BlobError> {
    let bad = blob_id.is_empty()
        || blob_id.starts_with('/')
        || blob_id.contains('\\')
        || blob_id
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(BlobError::InvalidId(blob_id.to_owned()));
    }
    Ok(())
}
