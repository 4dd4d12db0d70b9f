//! Integration tests for the request processor.
//!
//! Every capability (task backend, executor, page writer) is replaced by
//! a hand-written fake so the tests can observe exactly which calls the
//! processor makes and in what order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use relay_core::types::Metadata;
use relay_core::{
    JobParam, Page, RequestInput, StatusUpdate, TaskBackend, TaskDescription, TaskError,
    WorkChannels, WorkError, WorkHandler,
};
use relay_dispatch::{RequestError, RequestOutcome, RequestProcessor};
use relay_writer::{
    ArchiveUploader, DefaultPageWriterFactory, PageWriter, PageWriterFactory, ResponseFormat,
    WriterError,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Task backend serving a fixed description and recording every update.
struct FakeTask {
    description: Option<TaskDescription>,
    fail_running: bool,
    updates: Mutex<Vec<StatusUpdate>>,
}

impl FakeTask {
    fn new(format: &str, jobs: Vec<JobParam>) -> Self {
        Self {
            description: Some(TaskDescription {
                id: "12345".to_string(),
                state: "pending".to_string(),
                status: "ok".to_string(),
                input: RequestInput {
                    response_format: format.to_string(),
                    upload_url: String::new(),
                    jobs,
                },
                metadata: Default::default(),
            }),
            fail_running: false,
            updates: Mutex::new(Vec::new()),
        }
    }

    fn unreachable() -> Self {
        Self {
            description: None,
            fail_running: false,
            updates: Mutex::new(Vec::new()),
        }
    }

    fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskBackend for FakeTask {
    async fn get(&self) -> Result<TaskDescription, TaskError> {
        self.description
            .clone()
            .ok_or_else(|| TaskError::Transport("connection refused".to_string()))
    }

    async fn update(&self, update: StatusUpdate) -> Result<(), TaskError> {
        if self.fail_running && matches!(update, StatusUpdate::Running { .. }) {
            return Err(TaskError::HttpStatus {
                status: 500,
                body: "boom".to_string(),
            });
        }
        self.updates.lock().unwrap().push(update);
        Ok(())
    }
}

/// Executor that emits one page per job and reports configured errors.
#[derive(Default)]
struct FakeHandler {
    calls: AtomicUsize,
    /// `(href, message)` pairs reported on the error channel.
    errors: Vec<(&'static str, &'static str)>,
    /// Page body emitted for every job.
    page: Option<&'static [u8]>,
}

#[async_trait]
impl WorkHandler for FakeHandler {
    async fn start_work(&self, job: &JobParam, channels: &WorkChannels) -> Result<(), WorkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(body) = self.page {
            channels
                .send_page(Page::new(format!("{}.json", job.href_slug), body.to_vec()))
                .await?;
        }
        for (href, message) in &self.errors {
            if job.href_slug == *href {
                channels.report_error(*message).await?;
                return Err(WorkError::Remote(message.to_string()));
            }
        }
        Ok(())
    }
}

/// Executor that optionally reports an error, then never finishes.
#[derive(Default)]
struct StuckHandler {
    error: Option<&'static str>,
}

#[async_trait]
impl WorkHandler for StuckHandler {
    async fn start_work(&self, _: &JobParam, channels: &WorkChannels) -> Result<(), WorkError> {
        if let Some(message) = self.error {
            channels.report_error(message).await?;
        }
        std::future::pending().await
    }
}

/// Executor that reports several errors in sequence for every job.
struct SequentialErrorHandler {
    messages: Vec<&'static str>,
}

#[async_trait]
impl WorkHandler for SequentialErrorHandler {
    async fn start_work(&self, _: &JobParam, channels: &WorkChannels) -> Result<(), WorkError> {
        for message in &self.messages {
            channels.report_error(*message).await?;
        }
        Ok(())
    }
}

/// Page writer recording writes and flushes.
#[derive(Default)]
struct FakeWriter {
    pages: Mutex<Vec<String>>,
    flushes: AtomicUsize,
    error_flushes: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl PageWriter for FakeWriter {
    fn format(&self) -> ResponseFormat {
        ResponseFormat::Tar
    }

    async fn write(&self, name: &str, _data: &[u8]) -> Result<(), WriterError> {
        self.pages.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn flush(&self) -> Result<(), WriterError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn flush_errors(&self, messages: &[String]) -> Result<(), WriterError> {
        self.error_flushes.lock().unwrap().push(messages.to_vec());
        Ok(())
    }
}

/// Factory handing out one shared [`FakeWriter`].
#[derive(Default)]
struct FakeFactory {
    writer: Arc<FakeWriter>,
}

impl PageWriterFactory for FakeFactory {
    fn make_page_writer(
        &self,
        _input: &RequestInput,
        _task: Arc<dyn TaskBackend>,
        _metadata: Metadata,
    ) -> Result<Arc<dyn PageWriter>, WriterError> {
        Ok(self.writer.clone())
    }
}

struct NoUpload;

#[async_trait]
impl ArchiveUploader for NoUpload {
    async fn upload(
        &self,
        _url: &str,
        _archive: Vec<u8>,
        _metadata: &Metadata,
    ) -> Result<serde_json::Value, WriterError> {
        Ok(serde_json::Value::Null)
    }
}

fn two_jobs() -> Vec<JobParam> {
    vec![
        JobParam::new("monitor", "/api/v2/jobs/7008"),
        JobParam::new("get", "/api/v2/inventories/899"),
    ]
}

// ---------------------------------------------------------------------------
// Success path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_jobs_run_once_each_and_flush_success() {
    let handler = Arc::new(FakeHandler::default());
    let factory = Arc::new(FakeFactory::default());
    let task = Arc::new(FakeTask::new("tar", two_jobs()));
    let processor = RequestProcessor::new(handler.clone(), factory.clone());

    let outcome = processor
        .process("testurl", task.clone(), &CancellationToken::new())
        .await
        .expect("request should get past setup");

    assert_eq!(outcome, RequestOutcome::Completed { jobs: 2 });
    assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    assert_eq!(factory.writer.flushes.load(Ordering::SeqCst), 1);
    assert!(factory.writer.error_flushes.lock().unwrap().is_empty());
    assert_matches!(task.updates().as_slice(), [StatusUpdate::Running { .. }]);
}

#[tokio::test]
async fn pages_from_every_job_reach_the_writer() {
    let handler = Arc::new(FakeHandler {
        page: Some(b"{}"),
        ..Default::default()
    });
    let factory = Arc::new(FakeFactory::default());
    let task = Arc::new(FakeTask::new("tar", two_jobs()));
    let processor = RequestProcessor::new(handler, factory.clone());

    processor
        .process("testurl", task, &CancellationToken::new())
        .await
        .unwrap();

    let mut pages = factory.writer.pages.lock().unwrap().clone();
    pages.sort();
    assert_eq!(
        pages,
        vec!["/api/v2/inventories/899.json", "/api/v2/jobs/7008.json"]
    );
}

#[tokio::test]
async fn running_is_recorded_before_completion() {
    let handler = Arc::new(FakeHandler {
        page: Some(br#"{"id": 1}"#),
        ..Default::default()
    });
    let factory = Arc::new(DefaultPageWriterFactory::new(Arc::new(NoUpload)));
    let task = Arc::new(FakeTask::new("json", two_jobs()));
    let processor = RequestProcessor::new(handler, factory);

    let outcome = processor
        .process("testurl", task.clone(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, RequestOutcome::Completed { jobs: 2 });

    let updates = task.updates();
    assert_matches!(updates.first(), Some(StatusUpdate::Running { .. }));
    assert_eq!(updates.last(), Some(&StatusUpdate::completed()));
    assert_eq!(updates.iter().filter(|u| u.is_terminal()).count(), 1);
}

#[tokio::test]
async fn task_without_jobs_flushes_success_immediately() {
    let handler = Arc::new(FakeHandler::default());
    let factory = Arc::new(FakeFactory::default());
    let task = Arc::new(FakeTask::new("json", Vec::new()));
    let processor = RequestProcessor::new(handler.clone(), factory.clone());

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        processor.process("testurl", task, &CancellationToken::new()),
    )
    .await
    .expect("an empty task must not wait for the deadline")
    .unwrap();

    assert_eq!(outcome, RequestOutcome::Completed { jobs: 0 });
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    assert_eq!(factory.writer.flushes.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Error path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reported_error_flushes_errors_and_records_completed_error() {
    let handler = Arc::new(FakeHandler {
        errors: vec![("/api/v2/jobs/7008", "error 1")],
        ..Default::default()
    });
    let factory = Arc::new(DefaultPageWriterFactory::new(Arc::new(NoUpload)));
    let task = Arc::new(FakeTask::new("json", two_jobs()));
    let processor = RequestProcessor::new(handler.clone(), factory);

    let outcome = processor
        .process("testurl", task.clone(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RequestOutcome::Failed {
            jobs: 2,
            errors: vec!["error 1".to_string()]
        }
    );
    assert_eq!(handler.calls.load(Ordering::SeqCst), 2);

    let last = task.updates().pop().expect("a terminal update is recorded");
    assert_eq!(
        last,
        StatusUpdate::CompletedWithErrors {
            messages: vec!["error 1".to_string()]
        }
    );
    let fields = last.to_fields();
    assert_eq!(fields["state"], "completed");
    assert_eq!(fields["status"], "error");
}

#[tokio::test]
async fn error_flush_is_used_instead_of_success_flush() {
    let handler = Arc::new(FakeHandler {
        errors: vec![
            ("/api/v2/jobs/7008", "error 1"),
            ("/api/v2/inventories/899", "error 2"),
        ],
        ..Default::default()
    });
    let factory = Arc::new(FakeFactory::default());
    let task = Arc::new(FakeTask::new("tar", two_jobs()));
    let processor = RequestProcessor::new(handler, factory.clone());

    processor
        .process("testurl", task, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(factory.writer.flushes.load(Ordering::SeqCst), 0);
    let error_flushes = factory.writer.error_flushes.lock().unwrap();
    assert_eq!(error_flushes.len(), 1);
    let mut messages = error_flushes[0].clone();
    messages.sort();
    assert_eq!(messages, vec!["error 1", "error 2"]);
}

#[tokio::test]
async fn errors_are_flushed_in_arrival_order() {
    let handler = Arc::new(SequentialErrorHandler {
        messages: vec!["error 3", "error 1", "error 2"],
    });
    let factory = Arc::new(FakeFactory::default());
    let task = Arc::new(FakeTask::new("tar", vec![JobParam::new("get", "/a")]));
    let processor = RequestProcessor::new(handler, factory.clone());

    let outcome = processor
        .process("testurl", task, &CancellationToken::new())
        .await
        .unwrap();

    let expected: Vec<String> = ["error 3", "error 1", "error 2"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(
        outcome,
        RequestOutcome::Failed {
            jobs: 1,
            errors: expected.clone()
        }
    );
    assert_eq!(*factory.writer.error_flushes.lock().unwrap(), vec![expected]);
}

#[tokio::test]
async fn malformed_json_page_does_not_fail_the_request() {
    let handler = Arc::new(FakeHandler {
        page: Some(br#"bad{"key1": "val1"}"#),
        ..Default::default()
    });
    let factory = Arc::new(DefaultPageWriterFactory::new(Arc::new(NoUpload)));
    let task = Arc::new(FakeTask::new("json", two_jobs()));
    let processor = RequestProcessor::new(handler, factory);

    let outcome = processor
        .process("testurl", task.clone(), &CancellationToken::new())
        .await
        .unwrap();

    // Write failures are not job errors.
    assert_eq!(outcome, RequestOutcome::Completed { jobs: 2 });
    assert_eq!(task.updates().last(), Some(&StatusUpdate::completed()));
}

// ---------------------------------------------------------------------------
// Setup failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_format_aborts_before_any_job() {
    let handler = Arc::new(FakeHandler::default());
    let factory = Arc::new(DefaultPageWriterFactory::new(Arc::new(NoUpload)));
    let task = Arc::new(FakeTask::new("gzip", two_jobs()));
    let processor = RequestProcessor::new(handler.clone(), factory);

    let result = processor
        .process("testurl", task.clone(), &CancellationToken::new())
        .await;

    assert_matches!(
        result,
        Err(RequestError::Writer(WriterError::InvalidFormat(f))) if f == "gzip"
    );
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    assert!(task.updates().is_empty());
}

#[tokio::test]
async fn fetch_failure_aborts_without_side_effects() {
    let handler = Arc::new(FakeHandler::default());
    let factory = Arc::new(FakeFactory::default());
    let task = Arc::new(FakeTask::unreachable());
    let processor = RequestProcessor::new(handler.clone(), factory.clone());

    let result = processor
        .process("testurl", task.clone(), &CancellationToken::new())
        .await;

    assert_matches!(result, Err(RequestError::Fetch(TaskError::Transport(_))));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    assert_eq!(factory.writer.flushes.load(Ordering::SeqCst), 0);
    assert!(task.updates().is_empty());
}

#[tokio::test]
async fn running_update_failure_aborts_before_dispatch() {
    let handler = Arc::new(FakeHandler::default());
    let factory = Arc::new(FakeFactory::default());
    let mut task = FakeTask::new("tar", two_jobs());
    task.fail_running = true;
    let processor = RequestProcessor::new(handler.clone(), factory.clone());

    let result = processor
        .process("testurl", Arc::new(task), &CancellationToken::new())
        .await;

    assert_matches!(result, Err(RequestError::MarkRunning(_)));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    assert_eq!(factory.writer.flushes.load(Ordering::SeqCst), 0);
    assert!(factory.writer.error_flushes.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Shutdown and deadline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_ends_the_wait_promptly() {
    let factory = Arc::new(FakeFactory::default());
    let task = Arc::new(FakeTask::new("tar", two_jobs()));
    let processor = RequestProcessor::new(Arc::new(StuckHandler::default()), factory.clone());

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        processor.process("testurl", task, &shutdown),
    )
    .await
    .expect("shutdown must not wait for the deadline")
    .unwrap();

    assert_eq!(outcome, RequestOutcome::ShutDown { errors: vec![] });
    assert_eq!(factory.writer.flushes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn deadline_flushes_errors_collected_so_far() {
    let factory = Arc::new(FakeFactory::default());
    let task = Arc::new(FakeTask::new("tar", vec![JobParam::new("monitor", "/a")]));
    let handler = Arc::new(StuckHandler {
        error: Some("job 1 is stuck"),
    });
    let processor =
        RequestProcessor::new(handler, factory.clone()).with_wait_timeout(Duration::from_millis(200));

    let outcome = processor
        .process("testurl", task, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RequestOutcome::TimedOut {
            errors: vec!["job 1 is stuck".to_string()]
        }
    );
    assert_eq!(factory.writer.flushes.load(Ordering::SeqCst), 0);
    assert_eq!(
        *factory.writer.error_flushes.lock().unwrap(),
        vec![vec!["job 1 is stuck".to_string()]]
    );
}

#[tokio::test]
async fn deadline_without_errors_flushes_success() {
    let factory = Arc::new(FakeFactory::default());
    let task = Arc::new(FakeTask::new("tar", two_jobs()));
    let processor = RequestProcessor::new(Arc::new(StuckHandler::default()), factory.clone())
        .with_wait_timeout(Duration::from_millis(100));

    let outcome = processor
        .process("testurl", task, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, RequestOutcome::TimedOut { errors: vec![] });
    assert_eq!(factory.writer.flushes.load(Ordering::SeqCst), 1);
}
