/// Errors from the task-state backend.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The backend could not be reached (network, DNS, TLS, etc.).
    #[error("Task backend request failed: {0}")]
    Transport(String),

    /// The backend answered with a non-2xx status code.
    #[error("Task backend returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The task description could not be decoded.
    #[error("Invalid task description: {0}")]
    Decode(String),
}

/// Errors from the remote-work executor.
///
/// The executor reports a human-readable copy of each failure on the
/// error channel itself; this value only travels back to the worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    #[error("Unsupported job method: {0}")]
    UnsupportedMethod(String),

    #[error("Remote call failed: {0}")]
    Remote(String),

    /// The dispatcher or request processor stopped listening.
    #[error("Request channels closed")]
    ChannelClosed,

    #[error("Work cancelled by shutdown")]
    Cancelled,
}
