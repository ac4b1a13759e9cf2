//! Retry with exponential backoff for provider calls.

use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;

use crate::providers::ProviderError;

/// Backoff settings for retryable provider errors.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self::new(0)
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

/// Run `op`, retrying only errors where [`ProviderError::is_retryable`] holds.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    provider: &str,
    op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    op.retry(policy.backoff())
        .when(ProviderError::is_retryable)
        .notify(|err: &ProviderError, delay: Duration| {
            tracing::warn!(provider, error = %err, ?delay, "Retrying provider call");
        })
        .await
}
