use bytes::Bytes;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use tally_core::{FileDescriptor, QuotaStatus, UploadReceipt};

use crate::{Error, MeteringClient};

fn encode(filename: &str) -> String {
    utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string()
}

impl MeteringClient {
    pub async fn storage_status(&self) -> Result<QuotaStatus, Error> {
        let req = self.client.get(self.url("/v1/storage/status"));
        Self::json(self.send(req, None).await?).await
    }

    pub async fn list_files(&self) -> Result<Vec<FileDescriptor>, Error> {
        let req = self.client.get(self.url("/v1/storage/files"));
        Self::json(self.send(req, None).await?).await
    }

    /// Upload `data` as `filename`. The server validates and meters it.
    pub async fn upload(&self, filename: &str, data: Bytes) -> Result<UploadReceipt, Error> {
        let path = format!("/v1/storage/upload/{}", encode(filename));
        let req = self.client.post(self.url(&path)).body(data);
        Self::json(self.send(req, None).await?).await
    }

    pub async fn download(&self, filename: &str) -> Result<Bytes, Error> {
        let path = format!("/v1/storage/download/{}", encode(filename));
        let response = self.send(self.client.get(self.url(&path)), None).await?;
        response
            .bytes()
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }

    pub async fn delete_file(&self, filename: &str) -> Result<FileDescriptor, Error> {
        let path = format!("/v1/storage/files/{}", encode(filename));
        let req = self.client.delete(self.url(&path));
        Self::json(self.send(req, None).await?).await
    }
}
