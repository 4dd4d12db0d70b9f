//! HTTP executor implementation.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::{JobParam, Page, WorkChannels, WorkError, WorkHandler};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use crate::method::{is_terminal_status, page_name, JobMethod};

/// Connection settings for the remote API.
#[derive(Debug, Clone)]
pub struct TowerConfig {
    /// API root, e.g. `https://tower.example.com`.
    pub base_url: String,
    /// Bearer token sent on every request.
    pub token: Option<String>,
    /// Accept self-signed certificates.
    pub skip_verify_cert: bool,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Delay between polls of a monitored job.
    pub poll_interval: Duration,
}

impl TowerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            skip_verify_cert: false,
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TowerError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API returned a non-2xx status code.
    #[error("API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    /// The response body is not JSON.
    #[error("Invalid JSON response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid authorization token")]
    InvalidToken,
}

impl From<TowerError> for WorkError {
    fn from(e: TowerError) -> Self {
        WorkError::Remote(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// TowerWorkHandler
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct TowerWorkHandler {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
}

impl TowerWorkHandler {
    pub fn new(config: &TowerConfig) -> Result<Self, TowerError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| TowerError::InvalidToken)?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.skip_verify_cert)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            poll_interval: config.poll_interval,
        })
    }

    /// Resolve an href against the API root. Absolute URLs pass through.
    fn url(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else {
            format!("{}/{}", self.base_url, href.trim_start_matches('/'))
        }
    }

    async fn run(
        &self,
        method: JobMethod,
        job: &JobParam,
        channels: &WorkChannels,
    ) -> Result<(), WorkError> {
        match method {
            JobMethod::Get => self.get_all_pages(job, channels).await,
            JobMethod::Launch => self.launch(job, channels).await,
            JobMethod::Monitor => self.monitor(job, channels).await,
        }
    }

    /// GET the href and every `next` page after it.
    async fn get_all_pages(
        &self,
        job: &JobParam,
        channels: &WorkChannels,
    ) -> Result<(), WorkError> {
        let mut url = self.url(&job.href_slug);
        let mut page = 1;

        loop {
            let body = self.fetch(&url).await?;
            let value: serde_json::Value = serde_json::from_slice(&body).map_err(TowerError::from)?;
            channels
                .send_page(Page::new(page_name(&job.href_slug, page), body))
                .await?;

            match value.get("next").and_then(|n| n.as_str()) {
                Some(next) => {
                    url = self.url(next);
                    page += 1;
                }
                None => break,
            }
        }

        tracing::debug!(href = %job.href_slug, pages = page, "Fetched all pages");
        Ok(())
    }

    /// POST the job params and emit the created object.
    async fn launch(&self, job: &JobParam, channels: &WorkChannels) -> Result<(), WorkError> {
        let params = job
            .params
            .clone()
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));

        let response = self
            .client
            .post(self.url(&job.href_slug))
            .json(&params)
            .send()
            .await
            .map_err(TowerError::from)?;
        let body = Self::ensure_success(response).await?;

        tracing::info!(href = %job.href_slug, "Launched remote job");
        channels
            .send_page(Page::new(page_name(&job.href_slug, 1), body))
            .await
    }

    /// Poll until the job status is terminal, then emit the final object.
    async fn monitor(&self, job: &JobParam, channels: &WorkChannels) -> Result<(), WorkError> {
        let url = self.url(&job.href_slug);

        loop {
            let body = self.fetch(&url).await?;
            let value: serde_json::Value = serde_json::from_slice(&body).map_err(TowerError::from)?;
            let status = value
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or_default();

            if is_terminal_status(status) {
                tracing::info!(href = %job.href_slug, status, "Monitored job finished");
                return channels
                    .send_page(Page::new(page_name(&job.href_slug, 1), body))
                    .await;
            }

            tracing::debug!(href = %job.href_slug, status, "Monitored job still running");
            tokio::select! {
                _ = channels.shutdown().cancelled() => return Err(WorkError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TowerError> {
        let response = self.client.get(url).send().await?;
        Self::ensure_success(response).await
    }

    /// Return the body of a 2xx response, or [`TowerError::ApiError`].
    async fn ensure_success(response: reqwest::Response) -> Result<Vec<u8>, TowerError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TowerError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl WorkHandler for TowerWorkHandler {
    async fn start_work(&self, job: &JobParam, channels: &WorkChannels) -> Result<(), WorkError> {
        let result = match job.method.parse::<JobMethod>() {
            Ok(method) => self.run(method, job, channels).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(()) => {}
            // Nobody is listening any more; there is no one to report to.
            Err(WorkError::ChannelClosed) => {}
            Err(e) => {
                let message = format!("{} {}: {e}", job.method, job.href_slug);
                if channels.report_error(message).await.is_err() {
                    tracing::warn!(
                        href = %job.href_slug,
                        error = %e,
                        "Error channel closed, dropping job error",
                    );
                }
            }
        }

        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
