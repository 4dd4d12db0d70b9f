//! Structured single-object sink.
//!
//! Every page is parsed as a JSON document and recorded as the task's
//! running output. The last page written wins; there is no artifact to
//! upload on flush.

use std::sync::Arc;

use async_trait::async_trait;
use relay_core::{StatusUpdate, TaskBackend};
use tokio::sync::Mutex;

use crate::error::WriterError;
use crate::factory::ResponseFormat;
use crate::PageWriter;

pub struct JsonWriter {
    task: Arc<dyn TaskBackend>,
    /// `true` once a terminal flush has been issued. Held across the
    /// backend call so writes and flushes never interleave.
    flushed: Mutex<bool>,
}

impl JsonWriter {
    pub fn new(task: Arc<dyn TaskBackend>) -> Self {
        Self {
            task,
            flushed: Mutex::new(false),
        }
    }

    async fn finish(&self, update: StatusUpdate) -> Result<(), WriterError> {
        let mut flushed = self.flushed.lock().await;
        if *flushed {
            return Err(WriterError::AlreadyFlushed);
        }
        *flushed = true;
        self.task.update(update).await?;
        Ok(())
    }
}

#[async_trait]
impl PageWriter for JsonWriter {
    fn format(&self) -> ResponseFormat {
        ResponseFormat::Json
    }

    async fn write(&self, name: &str, data: &[u8]) -> Result<(), WriterError> {
        let flushed = self.flushed.lock().await;
        if *flushed {
            tracing::warn!(page = %name, "Dropping page written after flush");
            return Err(WriterError::AlreadyFlushed);
        }

        let output: serde_json::Value = serde_json::from_slice(data)?;
        tracing::debug!(page = %name, bytes = data.len(), "Recording JSON page");
        self.task.update(StatusUpdate::Progress { output }).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), WriterError> {
        self.finish(StatusUpdate::completed()).await
    }

    async fn flush_errors(&self, messages: &[String]) -> Result<(), WriterError> {
        self.finish(StatusUpdate::CompletedWithErrors {
            messages: messages.to_vec(),
        })
        .await
    }
}
