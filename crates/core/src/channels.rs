//! Sender half of the per-request channel set.
//!
//! [`WorkChannels`] is cloned into every worker and handed to the
//! remote-work executor. It lets the executor push result [`Page`]s
//! towards the output sink, report free-form error messages to the
//! request processor, and observe the shared shutdown token.
//!
//! When the receiving side has gone away (the dispatcher stopped on
//! shutdown, or the request already finalized), sends fail with
//! [`WorkError::ChannelClosed`] instead of blocking forever.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::WorkError;

/// A named chunk of result data destined for the output sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub name: String,
    pub data: Vec<u8>,
}

impl Page {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Channels shared by every worker of one request.
#[derive(Debug, Clone)]
pub struct WorkChannels {
    response_tx: mpsc::Sender<Page>,
    error_tx: mpsc::Sender<String>,
    shutdown: CancellationToken,
}

impl WorkChannels {
    pub fn new(
        response_tx: mpsc::Sender<Page>,
        error_tx: mpsc::Sender<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            response_tx,
            error_tx,
            shutdown,
        }
    }

    /// Forward a result page to the dispatcher.
    pub async fn send_page(&self, page: Page) -> Result<(), WorkError> {
        self.response_tx
            .send(page)
            .await
            .map_err(|_| WorkError::ChannelClosed)
    }

    /// Report a job failure to the request processor.
    pub async fn report_error(&self, message: impl Into<String>) -> Result<(), WorkError> {
        self.error_tx
            .send(message.into())
            .await
            .map_err(|_| WorkError::ChannelClosed)
    }

    /// Token cancelled when the request is shutting down.
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }
}
