//! HTTP task-state backend.
//!
//! [`HttpTaskBackend`] is bound to a single task URL. It fetches the task
//! description with `GET <url>` and writes status changes with
//! `PATCH <url>`, translating each [`StatusUpdate`] to the backend's
//! open field map only at this boundary.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use relay_core::{StatusUpdate, TaskBackend, TaskDescription, TaskError};

/// Default HTTP request timeout for backend calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Task-state backend reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTaskBackend {
    client: reqwest::Client,
    task_url: String,
}

impl HttpTaskBackend {
    /// Create a backend for `task_url` with a default client.
    pub fn new(task_url: impl Into<String>) -> Result<Self, TaskError> {
        let client = build_client(HeaderMap::new(), DEFAULT_TIMEOUT)?;
        Ok(Self::with_client(client, task_url))
    }

    /// Create a backend reusing an existing [`reqwest::Client`]
    /// (connection pooling across concurrent requests).
    pub fn with_client(client: reqwest::Client, task_url: impl Into<String>) -> Self {
        Self {
            client,
            task_url: task_url.into(),
        }
    }

    // ---- private helpers ----

    /// Turn a non-2xx response into [`TaskError::HttpStatus`].
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, TaskError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TaskError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

/// Build a client that sends `headers` on every request.
///
/// Used by the worker binary to attach an identity header to all
/// backend calls.
pub fn build_client(headers: HeaderMap, timeout: Duration) -> Result<reqwest::Client, TaskError> {
    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| TaskError::Transport(e.to_string()))
}

/// Parse a single `name: value` header specification.
pub fn parse_header(line: &str) -> Result<(HeaderName, HeaderValue), TaskError> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| TaskError::Decode(format!("Header must be 'name: value', got '{line}'")))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|e| TaskError::Decode(format!("Invalid header name: {e}")))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|e| TaskError::Decode(format!("Invalid header value: {e}")))?;
    Ok((name, value))
}

#[async_trait]
impl TaskBackend for HttpTaskBackend {
    async fn get(&self) -> Result<TaskDescription, TaskError> {
        let response = self
            .client
            .get(&self.task_url)
            .send()
            .await
            .map_err(|e| TaskError::Transport(e.to_string()))?;

        let response = Self::ensure_success(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TaskError::Transport(e.to_string()))?;

        serde_json::from_slice(&bytes).map_err(|e| TaskError::Decode(e.to_string()))
    }

    async fn update(&self, update: StatusUpdate) -> Result<(), TaskError> {
        let fields = serde_json::Value::Object(update.to_fields());
        tracing::debug!(task_url = %self.task_url, state = update.state(), "Updating task");

        let response = self
            .client
            .patch(&self.task_url)
            .json(&fields)
            .send()
            .await
            .map_err(|e| TaskError::Transport(e.to_string()))?;

        Self::ensure_success(response).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_header_splits_on_first_colon() {
        let (name, value) = parse_header("x-rh-identity: abc:def").expect("valid header");
        assert_eq!(name.as_str(), "x-rh-identity");
        assert_eq!(value.to_str().unwrap(), "abc:def");
    }

    #[test]
    fn parse_header_rejects_missing_colon() {
        assert!(parse_header("no-colon-here").is_err());
    }

    #[tokio::test]
    async fn get_decodes_the_task_description() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/tasks/12345")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "id": "12345",
                    "state": "pending",
                    "status": "ok",
                    "input": {
                        "response_format": "tar",
                        "upload_url": "https://upload.local/api/ingress",
                        "jobs": [
                            {"method": "monitor", "href_slug": "/api/v2/jobs/7008/"},
                            {"method": "get", "href_slug": "/api/v2/inventories/899/"}
                        ]
                    }
                }"#,
            )
            .expect(1)
            .create_async()
            .await;

        let backend = HttpTaskBackend::new(format!("{}/api/tasks/12345", server.url()))
            .expect("client builds");
        let task = backend.get().await.expect("task should decode");

        mock.assert_async().await;
        assert_eq!(task.id, "12345");
        assert_eq!(task.input.response_format, "tar");
        assert_eq!(task.input.jobs.len(), 2);
        assert_eq!(task.input.jobs[0].method, "monitor");
        assert_eq!(task.input.jobs[1].href_slug, "/api/v2/inventories/899/");
    }

    #[tokio::test]
    async fn update_patches_the_status_fields_with_default_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/api/tasks/12345")
            .match_header("x-rh-identity", "abc123")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "state": "completed",
                "status": "error",
                "message": relay_core::status::MSG_ENDED_WITH_ERRORS,
                "output": {"errors": ["error 1"]}
            })))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let (name, value) = parse_header("x-rh-identity: abc123").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(name, value);
        let client = build_client(headers, Duration::from_secs(5)).expect("client builds");
        let backend = HttpTaskBackend::with_client(client, format!("{}/api/tasks/12345", server.url()));

        backend
            .update(StatusUpdate::CompletedWithErrors {
                messages: vec!["error 1".to_string()],
            })
            .await
            .expect("update should succeed");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_keeps_the_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PATCH", "/api/tasks/1")
            .with_status(409)
            .with_body("task already completed")
            .create_async()
            .await;

        let backend =
            HttpTaskBackend::new(format!("{}/api/tasks/1", server.url())).expect("client builds");
        let err = backend
            .update(StatusUpdate::completed())
            .await
            .expect_err("conflict should fail");

        assert!(
            matches!(&err, TaskError::HttpStatus { status: 409, body } if body == "task already completed"),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        // Port 9 (discard) is closed on CI hosts; the connection is refused.
        let backend = HttpTaskBackend::new("http://127.0.0.1:9/tasks/1").expect("client builds");
        let err = backend.get().await.expect_err("request should fail");
        assert!(matches!(err, TaskError::Transport(_)), "got {err:?}");
    }
}
