//! Output sinks for request results.
//!
//! A [`PageWriter`] accumulates result pages while a request runs and,
//! once the request is over, records the terminal status through the
//! task-state backend. Two strategies exist, selected by the task's
//! `response_format`:
//!
//! - [`JsonWriter`] -- each page is a JSON document recorded as the
//!   task's running output.
//! - [`TarWriter`] -- pages are streamed into a gzip-compressed tar
//!   archive that is uploaded on flush.
//!
//! [`DefaultPageWriterFactory`] picks the strategy.

pub mod archive;
pub mod error;
pub mod factory;
pub mod json;
pub mod upload;

use async_trait::async_trait;

pub use archive::TarWriter;
pub use error::WriterError;
pub use factory::{DefaultPageWriterFactory, PageWriterFactory, ResponseFormat};
pub use json::JsonWriter;
pub use upload::{ArchiveUploader, HttpUploader};

/// Sink for result pages.
///
/// Implementations serialize their own state: `write` may be called by
/// the dispatcher while the request processor calls one of the flush
/// methods. After a flush every further call fails with
/// [`WriterError::AlreadyFlushed`].
#[async_trait]
pub trait PageWriter: Send + Sync {
    /// Which strategy this writer implements.
    fn format(&self) -> ResponseFormat;

    /// Accept one result page.
    async fn write(&self, name: &str, data: &[u8]) -> Result<(), WriterError>;

    /// Success path: finalize output and record completion.
    async fn flush(&self) -> Result<(), WriterError>;

    /// Error path: record completion with the collected error messages.
    async fn flush_errors(&self, messages: &[String]) -> Result<(), WriterError>;
}
