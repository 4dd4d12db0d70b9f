use relay_core::TaskError;

/// Errors produced by page writers and the writer factory.
#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    /// The requested response format is not one of `tar` or `json`.
    #[error("Invalid response format {0}")]
    InvalidFormat(String),

    /// A page handed to the JSON writer is not well-formed JSON.
    #[error("Page is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Building or finalizing the archive failed.
    #[error("Archive error: {0}")]
    Archive(#[from] std::io::Error),

    /// A page name cannot be stored in the archive.
    #[error("Invalid page name: {0:?}")]
    InvalidPageName(String),

    /// Uploading the finished archive failed.
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Recording a status update failed.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// The writer has already been flushed.
    #[error("Writer already flushed")]
    AlreadyFlushed,
}
