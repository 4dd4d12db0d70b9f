//! The per-request channel set.
//!
//! [`channel_set`] allocates every conduit one request needs and splits
//! them between the two owners:
//!
//! | Conduit    | Writer                 | Reader            |
//! |------------|------------------------|-------------------|
//! | dispatch   | request processor      | dispatcher        |
//! | response   | executor (via workers) | dispatcher        |
//! | finished   | workers                | dispatcher        |
//! | error      | executor (via workers) | request processor |
//! | done       | dispatcher             | request processor |
//! | shutdown   | request processor      | everyone          |
//!
//! Nothing here outlives the request. Dropping either side closes the
//! conduits it owns, so a blocked peer is released instead of hanging.

use relay_core::{JobParam, Page, WorkChannels};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// The dispatch conduit holds a single job, so submission is paced by
/// the dispatcher's consumption.
const DISPATCH_CAPACITY: usize = 1;

/// Buffered pages in flight between the executor and the sink.
const RESPONSE_CAPACITY: usize = 16;

/// Buffered error messages in flight to the request processor.
const ERROR_CAPACITY: usize = 16;

/// Why the dispatcher loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchExit {
    /// Every started job signalled completion.
    Drained,
    /// The shutdown token was cancelled first.
    Shutdown,
}

/// Terminal report sent once by the dispatcher on the done conduit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub exit: DispatchExit,
    pub started: usize,
    pub finished: usize,
}

/// The request processor's half.
#[derive(Debug)]
pub struct ProcessorChannels {
    pub dispatch_tx: mpsc::Sender<JobParam>,
    pub error_rx: mpsc::Receiver<String>,
    pub done_rx: oneshot::Receiver<DispatchSummary>,
}

/// The dispatcher's half.
#[derive(Debug)]
pub struct DispatcherChannels {
    pub dispatch_rx: mpsc::Receiver<JobParam>,
    pub response_rx: mpsc::Receiver<Page>,
    pub finished_tx: mpsc::UnboundedSender<()>,
    pub finished_rx: mpsc::UnboundedReceiver<()>,
    /// Cloned into every worker.
    pub work: WorkChannels,
    pub shutdown: CancellationToken,
    pub done_tx: oneshot::Sender<DispatchSummary>,
}

/// Allocate a fresh channel set observing `shutdown`.
pub fn channel_set(shutdown: CancellationToken) -> (ProcessorChannels, DispatcherChannels) {
    let (dispatch_tx, dispatch_rx) = mpsc::channel(DISPATCH_CAPACITY);
    let (response_tx, response_rx) = mpsc::channel(RESPONSE_CAPACITY);
    let (error_tx, error_rx) = mpsc::channel(ERROR_CAPACITY);
    // Unbounded so the completion signal can be sent from a drop guard.
    let (finished_tx, finished_rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = oneshot::channel();

    let processor = ProcessorChannels {
        dispatch_tx,
        error_rx,
        done_rx,
    };
    let dispatcher = DispatcherChannels {
        dispatch_rx,
        response_rx,
        finished_tx,
        finished_rx,
        work: WorkChannels::new(response_tx, error_tx, shutdown.clone()),
        shutdown,
        done_tx,
    };

    (processor, dispatcher)
}
