//! Task description and the task-state backend capability.
//!
//! A [`TaskDescription`] is fetched once per request via
//! [`TaskBackend::get`] and treated as immutable for the rest of the
//! request. Status changes are written back through
//! [`TaskBackend::update`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::status::StatusUpdate;

// ---------------------------------------------------------------------------
// Task description
// ---------------------------------------------------------------------------

/// One unit of remote work inside a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParam {
    /// Operation selector understood by the executor, e.g. `"get"`,
    /// `"monitor"`, `"launch"`.
    pub method: String,

    /// Target reference relative to the remote API root, e.g.
    /// `"/api/v2/inventories/899/"`.
    pub href_slug: String,

    /// Optional request body for methods that submit data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JobParam {
    pub fn new(method: impl Into<String>, href_slug: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            href_slug: href_slug.into(),
            params: None,
        }
    }
}

/// The `input` block of a task: what to run and how to report it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestInput {
    /// Output format selector (`"tar"` or `"json"`, case-insensitive).
    #[serde(default)]
    pub response_format: String,

    /// Where the archive sink uploads its artifact.
    #[serde(default)]
    pub upload_url: String,

    /// Sub-jobs, dispatched in list order.
    #[serde(default)]
    pub jobs: Vec<JobParam>,
}

/// A task as stored by the task-state backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDescription {
    pub id: String,

    #[serde(default)]
    pub state: String,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub input: RequestInput,

    /// Arbitrary backend-defined metadata, carried through untouched.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Backend capability
// ---------------------------------------------------------------------------

/// Access to the stored state of a single task.
///
/// Implementations are bound to one task (e.g. one task URL), so neither
/// method takes an identifier.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Fetch the current task description.
    async fn get(&self) -> Result<TaskDescription, TaskError>;

    /// Persist a status change.
    async fn update(&self, update: StatusUpdate) -> Result<(), TaskError>;
}
