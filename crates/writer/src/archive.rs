//! Streamed multi-file archive sink.
//!
//! [`TarWriter`] appends every page as a regular file to an in-memory
//! gzip-compressed tar archive. On [`flush`](PageWriter::flush) the
//! archive is finalized, handed to an [`ArchiveUploader`], and the upload
//! response is recorded as the task output. On
//! [`flush_errors`](PageWriter::flush_errors) the partial archive is
//! discarded.

use std::path::{Component, Path};
use std::sync::Arc;

use async_trait::async_trait;
use flate2::{write::GzEncoder, Compression};
use relay_core::types::Metadata;
use relay_core::{StatusUpdate, TaskBackend};
use tokio::sync::Mutex;

use crate::error::WriterError;
use crate::factory::ResponseFormat;
use crate::upload::ArchiveUploader;
use crate::PageWriter;

/// Permissions for archive entries (rw-r--r--).
const FILE_MODE: u32 = 0o644;

type ArchiveBuilder = tar::Builder<GzEncoder<Vec<u8>>>;

struct ArchiveState {
    /// `None` once the writer has been flushed.
    builder: Option<ArchiveBuilder>,
    pages: usize,
}

pub struct TarWriter {
    task: Arc<dyn TaskBackend>,
    uploader: Arc<dyn ArchiveUploader>,
    upload_url: String,
    metadata: Metadata,
    state: Mutex<ArchiveState>,
}

impl TarWriter {
    pub fn new(
        task: Arc<dyn TaskBackend>,
        uploader: Arc<dyn ArchiveUploader>,
        upload_url: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        let builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        Self {
            task,
            uploader,
            upload_url: upload_url.into(),
            metadata,
            state: Mutex::new(ArchiveState {
                builder: Some(builder),
                pages: 0,
            }),
        }
    }

    /// Number of pages appended so far.
    pub async fn page_count(&self) -> usize {
        self.state.lock().await.pages
    }

    /// Take the builder out of the state, marking the writer flushed.
    async fn take_builder(&self) -> Result<(ArchiveBuilder, usize), WriterError> {
        let mut state = self.state.lock().await;
        let builder = state.builder.take().ok_or(WriterError::AlreadyFlushed)?;
        Ok((builder, state.pages))
    }

    async fn finish_and_upload(
        &self,
        builder: ArchiveBuilder,
    ) -> Result<serde_json::Value, WriterError> {
        let archive = builder.into_inner()?.finish()?;
        self.uploader
            .upload(&self.upload_url, archive, &self.metadata)
            .await
    }
}

/// Page names become archive paths: leading slashes are stripped and
/// anything that could escape the archive root is rejected.
fn entry_path(name: &str) -> Result<&str, WriterError> {
    let trimmed = name.trim_start_matches('/');
    let escapes = Path::new(trimmed)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if trimmed.is_empty() || escapes {
        return Err(WriterError::InvalidPageName(name.to_string()));
    }
    Ok(trimmed)
}

#[async_trait]
impl PageWriter for TarWriter {
    fn format(&self) -> ResponseFormat {
        ResponseFormat::Tar
    }

    async fn write(&self, name: &str, data: &[u8]) -> Result<(), WriterError> {
        let path = entry_path(name)?;

        let mut state = self.state.lock().await;
        let Some(builder) = state.builder.as_mut() else {
            tracing::warn!(page = %name, "Dropping page written after flush");
            return Err(WriterError::AlreadyFlushed);
        };

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(FILE_MODE);
        header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);
        header.set_cksum();
        builder.append_data(&mut header, path, data)?;

        state.pages += 1;
        tracing::debug!(page = %path, bytes = data.len(), pages = state.pages, "Archived page");
        Ok(())
    }

    async fn flush(&self) -> Result<(), WriterError> {
        let (builder, pages) = self.take_builder().await?;

        let response = match self.finish_and_upload(builder).await {
            Ok(response) => response,
            Err(e) => {
                // The writer is already flushed; record the failure as the
                // terminal status so the task does not stay running.
                tracing::error!(pages, error = %e, "Failed to deliver result archive");
                self.task
                    .update(StatusUpdate::CompletedWithErrors {
                        messages: vec![e.to_string()],
                    })
                    .await?;
                return Err(e);
            }
        };
        tracing::info!(pages, "Result archive uploaded");

        self.task
            .update(StatusUpdate::Completed {
                message: relay_core::status::MSG_ENDED_OK.to_string(),
                output: Some(serde_json::json!({ "pages": pages, "upload": response })),
            })
            .await?;
        Ok(())
    }

    async fn flush_errors(&self, messages: &[String]) -> Result<(), WriterError> {
        let (_discarded, pages) = self.take_builder().await?;
        tracing::info!(pages, errors = messages.len(), "Discarding partial archive");

        self.task
            .update(StatusUpdate::CompletedWithErrors {
                messages: messages.to_vec(),
            })
            .await?;
        Ok(())
    }
}
