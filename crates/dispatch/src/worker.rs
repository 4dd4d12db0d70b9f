//! Single-job worker.

use std::sync::Arc;

use relay_core::{JobParam, WorkChannels, WorkHandler};
use tokio::sync::mpsc;

/// Sends exactly one completion signal when dropped.
///
/// Dropping happens on every exit path of the worker body, including an
/// executor error and a panic unwinding the spawned task.
struct CompletionGuard {
    finished_tx: mpsc::UnboundedSender<()>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        // Fails only if the dispatcher already stopped counting.
        let _ = self.finished_tx.send(());
    }
}

/// Run one job through the executor, then signal completion.
///
/// Executor errors are logged here but never forwarded; the executor
/// reports its own errors on the error channel.
pub async fn run_worker(
    job: JobParam,
    handler: Arc<dyn WorkHandler>,
    channels: WorkChannels,
    finished_tx: mpsc::UnboundedSender<()>,
) {
    let _completion = CompletionGuard { finished_tx };
    tracing::info!("Worker starting");

    match handler.start_work(&job, &channels).await {
        Ok(()) => tracing::info!("Worker finished"),
        Err(e) => tracing::warn!(error = %e, "Worker finished with error"),
    }
}
