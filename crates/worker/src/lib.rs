//! Wiring for the `relay-worker` binary.
//!
//! [`config`] reads the environment; [`app`] assembles the concrete
//! task backend, executor and sink factory around the request
//! processor and runs a batch of task URLs.

pub mod app;
pub mod config;

pub use app::{BatchReport, Worker};
pub use config::{ConfigError, WorkerConfig};
