//! Shared domain types and capability traits for the relay worker.
//!
//! This crate has no internal dependencies. It defines:
//!
//! - [`task`] -- the task description fetched from the task-state backend
//!   and the [`TaskBackend`](task::TaskBackend) capability.
//! - [`status`] -- the closed [`StatusUpdate`](status::StatusUpdate) union
//!   and its translation to the backend's open field map.
//! - [`channels`] -- the sender half of the per-request channel set handed
//!   to workers and the remote-work executor.
//! - [`handler`] -- the [`WorkHandler`](handler::WorkHandler) capability.

pub mod channels;
pub mod error;
pub mod handler;
pub mod status;
pub mod task;
pub mod types;

pub use channels::{Page, WorkChannels};
pub use error::{TaskError, WorkError};
pub use handler::WorkHandler;
pub use status::StatusUpdate;
pub use task::{JobParam, RequestInput, TaskBackend, TaskDescription};
