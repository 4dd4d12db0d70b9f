//! Remote-work executor for a Tower-style REST API.
//!
//! [`TowerWorkHandler`] implements [`WorkHandler`](relay_core::WorkHandler)
//! by issuing HTTP calls against the configured API root:
//!
//! - `get` -- fetch a resource and follow `next` pagination links.
//! - `launch` -- POST the job's params and return the created object.
//! - `monitor` -- poll a job until it reaches a terminal status.
//!
//! Every response body becomes one result page.

pub mod client;
pub mod method;

pub use client::{TowerConfig, TowerError, TowerWorkHandler};
pub use method::JobMethod;
