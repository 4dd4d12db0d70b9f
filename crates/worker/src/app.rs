use std::sync::Arc;

use anyhow::Context;
use futures::future::join_all;
use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;

use relay_dispatch::{RequestError, RequestOutcome, RequestProcessor};
use relay_task::HttpTaskBackend;
use relay_tower::TowerWorkHandler;
use relay_writer::{DefaultPageWriterFactory, HttpUploader};

use crate::config::WorkerConfig;

/// Result of processing a batch of task URLs.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Requests that got past setup, with how they ended.
    pub finished: Vec<(String, RequestOutcome)>,
    /// Requests aborted during setup.
    pub aborted: Vec<(String, RequestError)>,
}

impl BatchReport {
    pub fn has_setup_failures(&self) -> bool {
        !self.aborted.is_empty()
    }
}

/// Request processor bound to concrete HTTP capabilities.
pub struct Worker {
    processor: RequestProcessor,
    task_client: reqwest::Client,
}

impl Worker {
    pub fn from_config(config: &WorkerConfig) -> anyhow::Result<Self> {
        let handler =
            TowerWorkHandler::new(&config.tower).context("Failed to build remote API client")?;
        let uploader = HttpUploader::new().context("Failed to build upload client")?;
        let factory = DefaultPageWriterFactory::new(Arc::new(uploader));

        let mut headers = HeaderMap::new();
        if let Some((name, value)) = &config.identity_header {
            headers.insert(name.clone(), value.clone());
        }
        let task_client = relay_task::build_client(headers, config.http_timeout)
            .context("Failed to build task backend client")?;

        let processor = RequestProcessor::new(Arc::new(handler), Arc::new(factory))
            .with_wait_timeout(config.request_timeout);

        Ok(Self {
            processor,
            task_client,
        })
    }

    /// Process every task URL concurrently until each one ends.
    pub async fn run_batch(&self, task_urls: &[String], shutdown: &CancellationToken) -> BatchReport {
        let requests = task_urls.iter().map(|url| async move {
            let backend = HttpTaskBackend::with_client(self.task_client.clone(), url.as_str());
            let result = self.processor.process(url, Arc::new(backend), shutdown).await;
            (url.clone(), result)
        });

        let mut report = BatchReport::default();
        for (url, result) in join_all(requests).await {
            match result {
                Ok(outcome) => report.finished.push((url, outcome)),
                Err(e) => report.aborted.push((url, e)),
            }
        }
        report
    }
}
