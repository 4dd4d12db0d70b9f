use async_trait::async_trait;

use crate::channels::WorkChannels;
use crate::error::WorkError;
use crate::task::JobParam;

/// The remote-work executor capability.
///
/// Invoked exactly once per sub-job. Implementations push result pages
/// and human-readable error messages through `channels` themselves; the
/// returned error is informational only and is never added to the
/// request's error list by the caller.
#[async_trait]
pub trait WorkHandler: Send + Sync {
    async fn start_work(&self, job: &JobParam, channels: &WorkChannels) -> Result<(), WorkError>;
}
