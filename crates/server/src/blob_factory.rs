use std::sync::Arc;

use tally_blob::{BlobStore, FsBlobStore, MemoryBlobStore};

use crate::config::BlobConfig;
use crate::error::ServerError;

/// Construct the blob store holding file bytes.
pub async fn create_blob_store(config: &BlobConfig) -> Result<Arc<dyn BlobStore>, ServerError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryBlobStore::new())),
        "filesystem" => {
            let root = config.root.as_ref().ok_or_else(|| {
                ServerError::Config("filesystem blob backend requires [blob] root".into())
            })?;
            tokio::fs::create_dir_all(root).await?;
            Ok(Arc::new(FsBlobStore::new(root.clone())))
        }
        other => Err(ServerError::Config(format!("unknown blob backend: {other}"))),
    }
}
