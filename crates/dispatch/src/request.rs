//! Request processing: one task, start to finish.
//!
//! [`RequestProcessor::process`] runs the whole lifecycle of a task:
//!
//! 1. fetch the task description;
//! 2. build the output sink for its `response_format`;
//! 3. allocate the channel set, guarded so every conduit is released
//!    on every exit path;
//! 4. start the [`Dispatcher`];
//! 5. mark the task running;
//! 6. submit every job in list order;
//! 7. wait for the dispatcher, collecting errors, until it finishes, the
//!    deadline passes, or shutdown is requested;
//! 8. flush the sink: `flush_errors` if any error arrived, `flush`
//!    otherwise.
//!
//! Failures in steps 1, 2 and 5 abort the request before any job runs
//! and are returned as [`RequestError`]; the task is left in whatever
//! state the backend last recorded.

use std::sync::Arc;
use std::time::Duration;

use relay_core::types::Metadata;
use relay_core::{StatusUpdate, TaskBackend, TaskError, WorkHandler};
use relay_writer::{PageWriter, PageWriterFactory, WriterError};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::channels::{channel_set, DispatchExit, DispatchSummary, ProcessorChannels};
use crate::dispatcher::Dispatcher;

/// Overall ceiling on waiting for the workers of one request.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Setup failures. None of these dispatch a job or flush the sink.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Failed to fetch task: {0}")]
    Fetch(#[source] TaskError),

    #[error("Failed to create page writer: {0}")]
    Writer(#[from] WriterError),

    #[error("Failed to mark task running: {0}")]
    MarkRunning(#[source] TaskError),
}

/// How a request that got past setup ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Every job finished and no error was reported.
    Completed { jobs: usize },
    /// Every job finished and at least one error was reported.
    Failed { jobs: usize, errors: Vec<String> },
    /// The deadline passed first.
    TimedOut { errors: Vec<String> },
    /// Shutdown was requested first.
    ShutDown { errors: Vec<String> },
}

impl RequestOutcome {
    /// Errors collected before the request ended, in arrival order.
    pub fn errors(&self) -> &[String] {
        match self {
            Self::Completed { .. } => &[],
            Self::Failed { errors, .. }
            | Self::TimedOut { errors }
            | Self::ShutDown { errors } => errors,
        }
    }
}

/// How the outer wait ended.
enum WaitExit {
    Drained { jobs: usize },
    TimedOut,
    ShutDown,
}

pub struct RequestProcessor {
    handler: Arc<dyn WorkHandler>,
    factory: Arc<dyn PageWriterFactory>,
    wait_timeout: Duration,
}

impl RequestProcessor {
    pub fn new(handler: Arc<dyn WorkHandler>, factory: Arc<dyn PageWriterFactory>) -> Self {
        Self {
            handler,
            factory,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    /// Override the overall wait ceiling.
    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// Process the task behind `task_url`.
    ///
    /// `shutdown` is the process-wide cancellation token; cancelling it
    /// stops the dispatcher and ends the wait immediately.
    pub async fn process(
        &self,
        task_url: &str,
        task: Arc<dyn TaskBackend>,
        shutdown: &CancellationToken,
    ) -> Result<RequestOutcome, RequestError> {
        let span = tracing::info_span!(
            "request",
            request_id = %uuid::Uuid::new_v4(),
            task_url = %task_url,
        );

        async {
            let result = self.run(task_url, task, shutdown).await;
            match &result {
                Ok(outcome) => tracing::info!(?outcome, "Request finished"),
                Err(e) => tracing::error!(error = %e, "Request aborted"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        task_url: &str,
        task: Arc<dyn TaskBackend>,
        shutdown: &CancellationToken,
    ) -> Result<RequestOutcome, RequestError> {
        let description = task.get().await.map_err(RequestError::Fetch)?;
        tracing::info!(
            task_id = %description.id,
            jobs = description.input.jobs.len(),
            format = %description.input.response_format,
            "Task fetched",
        );

        let metadata = Metadata::from([("task_url".to_string(), task_url.to_string())]);
        let writer =
            self.factory
                .make_page_writer(&description.input, Arc::clone(&task), metadata)?;
        let jobs = description.input.jobs;

        // Cancelled when this function returns, whatever the path; that
        // stops a dispatcher still waiting for jobs that never come.
        let request_token = shutdown.child_token();
        let _request_guard = request_token.clone().drop_guard();
        let (channels, dispatcher_channels) = channel_set(request_token);

        let dispatcher = Dispatcher::new(Arc::clone(&writer), Arc::clone(&self.handler));
        tokio::spawn(dispatcher.run(dispatcher_channels).in_current_span());

        task.update(StatusUpdate::running_now())
            .await
            .map_err(RequestError::MarkRunning)?;

        let ProcessorChannels {
            dispatch_tx,
            mut error_rx,
            done_rx,
        } = channels;

        let job_count = jobs.len();
        for job in jobs {
            if dispatch_tx.send(job).await.is_err() {
                tracing::warn!("Dispatcher stopped before all jobs were submitted");
                break;
            }
        }
        drop(dispatch_tx);

        let mut errors = Vec::new();
        let exit = if job_count == 0 {
            tracing::info!("Task has no jobs");
            WaitExit::Drained { jobs: 0 }
        } else {
            self.wait(done_rx, &mut error_rx, &mut errors, shutdown).await
        };

        let outcome = match exit {
            WaitExit::Drained { jobs } if errors.is_empty() => RequestOutcome::Completed { jobs },
            WaitExit::Drained { jobs } => RequestOutcome::Failed { jobs, errors },
            WaitExit::TimedOut => RequestOutcome::TimedOut { errors },
            WaitExit::ShutDown => RequestOutcome::ShutDown { errors },
        };

        finalize(writer.as_ref(), outcome.errors()).await;
        Ok(outcome)
    }

    /// Race the dispatcher's done signal against errors, the deadline and
    /// shutdown. Errors are appended to `errors` in arrival order.
    async fn wait(
        &self,
        mut done_rx: oneshot::Receiver<DispatchSummary>,
        error_rx: &mut mpsc::Receiver<String>,
        errors: &mut Vec<String>,
        shutdown: &CancellationToken,
    ) -> WaitExit {
        let deadline = tokio::time::sleep(self.wait_timeout);
        tokio::pin!(deadline);

        let exit = loop {
            tokio::select! {
                Some(message) = error_rx.recv() => {
                    tracing::info!(error = %message, "Error received");
                    errors.push(message);
                }
                done = &mut done_rx => match done {
                    Ok(summary) if summary.exit == DispatchExit::Drained => {
                        tracing::info!(jobs = summary.started, "Workers finished");
                        break WaitExit::Drained { jobs: summary.started };
                    }
                    Ok(_) => {
                        tracing::info!("Dispatcher stopped by shutdown");
                        break WaitExit::ShutDown;
                    }
                    Err(_) => {
                        tracing::error!("Dispatcher exited without reporting");
                        break WaitExit::ShutDown;
                    }
                },
                _ = &mut deadline => {
                    tracing::warn!(
                        timeout_secs = self.wait_timeout.as_secs(),
                        "Timed out waiting for workers",
                    );
                    break WaitExit::TimedOut;
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown received");
                    break WaitExit::ShutDown;
                }
            }
        };

        // Errors sent before the last completion signal may still be
        // queued when the done signal wins the race.
        while let Ok(message) = error_rx.try_recv() {
            tracing::info!(error = %message, "Error received");
            errors.push(message);
        }

        exit
    }
}

/// Exactly one terminal flush. Failures are logged; the sink records
/// its own status through the task backend.
async fn finalize(writer: &dyn PageWriter, errors: &[String]) {
    let result = if errors.is_empty() {
        writer.flush().await
    } else {
        writer.flush_errors(errors).await
    };

    if let Err(e) = result {
        tracing::error!(error = %e, format = %writer.format(), "Failed to flush page writer");
    }
}
