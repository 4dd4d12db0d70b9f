//! Sink selection.
//!
//! The task's `response_format` is matched case-insensitively against a
//! closed set of strategies. Anything else fails before a single job is
//! dispatched.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use relay_core::types::Metadata;
use relay_core::{RequestInput, TaskBackend};

use crate::archive::TarWriter;
use crate::error::WriterError;
use crate::json::JsonWriter;
use crate::upload::ArchiveUploader;
use crate::PageWriter;

/// Supported output strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Streamed multi-file archive, uploaded on flush.
    Tar,
    /// Structured single-object output recorded on the task.
    Json,
}

impl ResponseFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::Json => "json",
        }
    }
}

impl FromStr for ResponseFormat {
    type Err = WriterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tar" => Ok(Self::Tar),
            "json" => Ok(Self::Json),
            _ => Err(WriterError::InvalidFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the output sink for one request.
pub trait PageWriterFactory: Send + Sync {
    fn make_page_writer(
        &self,
        input: &RequestInput,
        task: Arc<dyn TaskBackend>,
        metadata: Metadata,
    ) -> Result<Arc<dyn PageWriter>, WriterError>;
}

/// Factory for the built-in [`TarWriter`] and [`JsonWriter`].
pub struct DefaultPageWriterFactory {
    uploader: Arc<dyn ArchiveUploader>,
}

impl DefaultPageWriterFactory {
    pub fn new(uploader: Arc<dyn ArchiveUploader>) -> Self {
        Self { uploader }
    }
}

impl PageWriterFactory for DefaultPageWriterFactory {
    fn make_page_writer(
        &self,
        input: &RequestInput,
        task: Arc<dyn TaskBackend>,
        metadata: Metadata,
    ) -> Result<Arc<dyn PageWriter>, WriterError> {
        let writer: Arc<dyn PageWriter> = match input.response_format.parse()? {
            ResponseFormat::Tar => Arc::new(TarWriter::new(
                task,
                Arc::clone(&self.uploader),
                input.upload_url.clone(),
                metadata,
            )),
            ResponseFormat::Json => Arc::new(JsonWriter::new(task)),
        };
        Ok(writer)
    }
}
