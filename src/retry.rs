//! Retry knobs shared by the fetcher and the uploaders, plus the one place
//! that actually sleeps.

use std::time::Duration;

use tracing::{debug, info};

use crate::contract::{ApiResponse, DEFAULT_RETRY_AFTER_SECS};

const PROGRESS_TICK: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait applied after a 429 without a usable `Retry-After` header.
    pub default_retry_after: Duration,
    /// Extra attempts for a document upload answered with 502.
    pub server_error_retries: u32,
    /// Fixed pause before each 502 retry.
    pub server_error_backoff: Duration,
    /// Cap on 429 retries for the highlight batch; `None` keeps retrying.
    pub max_batch_rate_limit_retries: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            default_retry_after: Duration::from_secs(DEFAULT_RETRY_AFTER_SECS),
            server_error_retries: 3,
            server_error_backoff: Duration::from_secs(5),
            max_batch_rate_limit_retries: None,
        }
    }
}

impl RetryPolicy {
    /// Wait demanded by a rate-limited response.
    pub fn rate_limit_wait(&self, resp: &ApiResponse) -> Duration {
        resp.retry_after_or(self.default_retry_after)
    }
}

/// Blocks the caller for `wait`, logging progress while it does.
pub async fn wait_out(reason: &str, wait: Duration) {
    info!(reason, wait_secs = wait.as_secs(), "Waiting before retry");
    let mut remaining = wait;
    while !remaining.is_zero() {
        let step = remaining.min(PROGRESS_TICK);
        tokio::time::sleep(step).await;
        remaining -= step;
        if !remaining.is_zero() {
            debug!(reason, remaining_secs = remaining.as_secs(), "Still waiting");
        }
    }
}
