//! Archive upload.
//!
//! [`HttpUploader`] posts the finished archive as a multipart form to
//! the task's `upload_url`, together with the request metadata.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::types::Metadata;
use reqwest::multipart::{Form, Part};

use crate::error::WriterError;

/// File name given to the archive part of the upload.
pub const ARCHIVE_FILE_NAME: &str = "relay-output.tar.gz";

/// Content type of the archive part.
const ARCHIVE_CONTENT_TYPE: &str = "application/gzip";

/// Upload timeout for a single archive.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Destination for finished archives.
#[async_trait]
pub trait ArchiveUploader: Send + Sync {
    /// Upload `archive` to `url`. Returns the upload service's response,
    /// which is recorded as the task output.
    async fn upload(
        &self,
        url: &str,
        archive: Vec<u8>,
        metadata: &Metadata,
    ) -> Result<serde_json::Value, WriterError>;
}

/// Multipart HTTP uploader.
pub struct HttpUploader {
    client: reqwest::Client,
}

impl HttpUploader {
    pub fn new() -> Result<Self, WriterError> {
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| WriterError::Upload(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArchiveUploader for HttpUploader {
    async fn upload(
        &self,
        url: &str,
        archive: Vec<u8>,
        metadata: &Metadata,
    ) -> Result<serde_json::Value, WriterError> {
        if url.is_empty() {
            return Err(WriterError::Upload("task has no upload_url".to_string()));
        }

        let size = archive.len();
        let file = Part::bytes(archive)
            .file_name(ARCHIVE_FILE_NAME)
            .mime_str(ARCHIVE_CONTENT_TYPE)
            .map_err(|e| WriterError::Upload(e.to_string()))?;
        let metadata_json = serde_json::to_string(metadata)?;
        let form = Form::new().part("file", file).text("metadata", metadata_json);

        tracing::info!(url, bytes = size, "Uploading result archive");

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| WriterError::Upload(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WriterError::Upload(e.to_string()))?;
        if !status.is_success() {
            return Err(WriterError::Upload(format!("HTTP {}: {body}", status.as_u16())));
        }

        // Upload services answer with JSON; keep anything else verbatim.
        Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
    }
}
