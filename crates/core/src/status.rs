//! Typed task status updates.
//!
//! The task-state backend accepts an open map of named fields
//! (`state`, `status`, `message`, `output`). Inside the worker every
//! update is a [`StatusUpdate`] variant; [`StatusUpdate::to_fields`]
//! performs the translation at the backend boundary.

use serde_json::{json, Map, Value};

use crate::types::Timestamp;

pub const STATE_RUNNING: &str = "running";
pub const STATE_COMPLETED: &str = "completed";

pub const STATUS_OK: &str = "ok";
pub const STATUS_ERROR: &str = "error";

/// Message recorded by a successful terminal flush.
pub const MSG_ENDED_OK: &str = "Relay worker ended successfully";

/// Message recorded by a terminal flush that carries errors.
pub const MSG_ENDED_WITH_ERRORS: &str = "Relay worker ended with errors";

/// A single status change written to the task-state backend.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// The request has started dispatching jobs.
    Running { started_at: Timestamp },

    /// Intermediate output recorded while the task is still running.
    Progress { output: Value },

    /// The request finished without errors.
    Completed {
        message: String,
        output: Option<Value>,
    },

    /// The request finished and at least one job reported an error.
    CompletedWithErrors { messages: Vec<String> },
}

impl StatusUpdate {
    pub fn running_now() -> Self {
        Self::Running {
            started_at: chrono::Utc::now(),
        }
    }

    /// Successful completion with the default message and no output.
    pub fn completed() -> Self {
        Self::Completed {
            message: MSG_ENDED_OK.to_string(),
            output: None,
        }
    }

    /// The `state` field this update writes.
    pub fn state(&self) -> &'static str {
        match self {
            Self::Running { .. } | Self::Progress { .. } => STATE_RUNNING,
            Self::Completed { .. } | Self::CompletedWithErrors { .. } => STATE_COMPLETED,
        }
    }

    /// Whether this update moves the task to a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state() == STATE_COMPLETED
    }

    /// Translate into the backend's open field map.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("state".into(), Value::from(self.state()));

        match self {
            Self::Running { started_at } => {
                fields.insert(
                    "message".into(),
                    Value::from(format!("Relay worker started at {}", started_at.to_rfc3339())),
                );
            }
            Self::Progress { output } => {
                fields.insert("status".into(), Value::from(STATUS_OK));
                fields.insert("output".into(), output.clone());
            }
            Self::Completed { message, output } => {
                fields.insert("status".into(), Value::from(STATUS_OK));
                fields.insert("message".into(), Value::from(message.as_str()));
                if let Some(output) = output {
                    fields.insert("output".into(), output.clone());
                }
            }
            Self::CompletedWithErrors { messages } => {
                fields.insert("status".into(), Value::from(STATUS_ERROR));
                fields.insert("message".into(), Value::from(MSG_ENDED_WITH_ERRORS));
                fields.insert("output".into(), json!({ "errors": messages }));
            }
        }

        fields
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
