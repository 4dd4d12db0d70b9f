//! Dispatch-and-collect engine.
//!
//! Turns the ordered job list of one task into concurrent execution:
//!
//! - [`RequestProcessor`] -- fetches the task, builds the output sink,
//!   feeds jobs to the dispatcher, collects errors under a deadline, and
//!   issues exactly one terminal flush.
//! - [`Dispatcher`] -- spawns one worker per job, forwards result pages
//!   to the sink, and counts completions until every started job is done.
//! - [`worker`] -- runs one job through the executor and always signals
//!   completion.
//!
//! All coordination happens over the per-request [`channels`] set.

pub mod channels;
pub mod dispatcher;
pub mod request;
pub mod worker;

pub use channels::{channel_set, DispatchExit, DispatchSummary};
pub use dispatcher::Dispatcher;
pub use request::{RequestError, RequestOutcome, RequestProcessor, DEFAULT_WAIT_TIMEOUT};
