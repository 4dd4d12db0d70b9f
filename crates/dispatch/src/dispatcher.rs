//! Per-request dispatcher loop.
//!
//! One [`Dispatcher`] runs per request as its own task. It races four
//! event sources:
//!
//! 1. shutdown -- stop immediately, abandoning in-flight workers;
//! 2. a result page -- forward it to the output sink;
//! 3. a completion signal -- count it;
//! 4. a new job -- spawn a worker for it (no concurrency limit).
//!
//! When none of these has produced an event and the processor has
//! closed the dispatch conduit, the loop stops once every started job
//! has signalled completion. A summary is sent on the done conduit on
//! every exit path.

use std::sync::Arc;

use relay_core::WorkHandler;
use relay_writer::PageWriter;
use tracing::Instrument;

use crate::channels::{DispatchExit, DispatchSummary, DispatcherChannels};
use crate::worker::run_worker;

pub struct Dispatcher {
    writer: Arc<dyn PageWriter>,
    handler: Arc<dyn WorkHandler>,
}

impl Dispatcher {
    pub fn new(writer: Arc<dyn PageWriter>, handler: Arc<dyn WorkHandler>) -> Self {
        Self { writer, handler }
    }

    /// Run until all started jobs finish or shutdown is requested.
    pub async fn run(self, channels: DispatcherChannels) -> DispatchSummary {
        let DispatcherChannels {
            mut dispatch_rx,
            mut response_rx,
            finished_tx,
            mut finished_rx,
            work,
            shutdown,
            done_tx,
        } = channels;

        let mut started = 0usize;
        let mut finished = 0usize;
        let mut accepting = true;

        let exit = loop {
            tokio::select! {
                // Pages are polled before completions: a worker sends its
                // pages before its completion signal, so they are always
                // forwarded first.
                biased;

                _ = shutdown.cancelled() => {
                    tracing::info!(started, finished, "Dispatcher shutting down");
                    break DispatchExit::Shutdown;
                }
                Some(page) = response_rx.recv() => {
                    self.forward(&page.name, &page.data).await;
                }
                Some(()) = finished_rx.recv() => {
                    finished += 1;
                    tracing::debug!(started, finished, "Job finished");
                }
                job = dispatch_rx.recv(), if accepting => match job {
                    Some(job) => {
                        started += 1;
                        tracing::info!(method = %job.method, href = %job.href_slug, "Job received");
                        let span = tracing::info_span!(
                            "worker",
                            method = %job.method,
                            href = %job.href_slug,
                        );
                        tokio::spawn(
                            run_worker(
                                job,
                                Arc::clone(&self.handler),
                                work.clone(),
                                finished_tx.clone(),
                            )
                            .instrument(span),
                        );
                    }
                    None => {
                        tracing::debug!(started, "All jobs submitted");
                        accepting = false;
                    }
                },
            }

            if !accepting && started > 0 && finished == started {
                break DispatchExit::Drained;
            }
        };

        if exit == DispatchExit::Drained {
            // A final page may have become visible only after the last
            // completion signal was received.
            while let Ok(page) = response_rx.try_recv() {
                self.forward(&page.name, &page.data).await;
            }
            tracing::info!(started, "All workers finished");
        }

        let summary = DispatchSummary {
            exit,
            started,
            finished,
        };
        // The processor may have stopped waiting (deadline or shutdown).
        let _ = done_tx.send(summary);
        summary
    }

    /// Write failures are logged and otherwise ignored.
    async fn forward(&self, name: &str, data: &[u8]) {
        tracing::info!(page = %name, bytes = data.len(), "Page received");
        if let Err(e) = self.writer.write(name, data).await {
            tracing::warn!(page = %name, error = %e, "Failed to write page");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
