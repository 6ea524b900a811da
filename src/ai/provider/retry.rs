//! Capped Retry for Inference Calls
//!
//! Wraps a provider and re-issues a completion only when the failure
//! category is retryable (rate limit, network, transient server error).
//! Auth, bad-request and token-limit failures return immediately. The
//! number of retries is bounded so a stalled upstream cannot stretch a
//! single extract call without limit.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;
use tracing::warn;

use super::{CompletionRequest, LlmProvider, LlmResponse, SharedProvider};
use crate::constants::inference;
use crate::types::{RepodocError, Result};

/// Exponential backoff bounds
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_max_retries(inference::MAX_HTTP_RETRIES)
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: usize) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(inference::BASE_DELAY_MS),
            max_delay: Duration::from_secs(inference::MAX_DELAY_SECS),
        }
    }

    /// Never retry
    pub fn none() -> Self {
        Self::with_max_retries(0)
    }

    pub(crate) fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

/// Provider decorator applying `RetryPolicy` to retryable failures
pub struct RetryingProvider {
    inner: SharedProvider,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: SharedProvider, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<LlmResponse> {
        let attempt = || async { self.inner.complete(request).await };

        attempt
            .retry(self.policy.backoff())
            .when(|err: &RepodocError| err.is_retryable_inference())
            .notify(|err: &RepodocError, wait: Duration| {
                warn!(
                    provider = %self.inner.name(),
                    wait_ms = wait.as_millis() as u64,
                    error = %err,
                    "Retryable inference failure, backing off"
                );
            })
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorCategory, LlmError};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockProvider {
        calls: AtomicU32,
        failures: u32,
        category: ErrorCategory,
    }

    impl MockProvider {
        fn failing_then_success(failures: u32, category: ErrorCategory) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
                category,
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        async fn complete(&self, _request: &CompletionRequest) -> Result<LlmResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(LlmError::with_provider(self.category, "mock failure", "mock").into());
            }
            Ok(LlmResponse::content_only("ok"))
        }

        fn name(&self) -> &str {
            "mock"
        }

        fn model(&self) -> &str {
            "mock-model"
        }
    }

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("system", "user", 10, 0.0)
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let mock = Arc::new(MockProvider::failing_then_success(2, ErrorCategory::Transient));
        let provider = RetryingProvider::new(mock.clone(), fast_policy(2));

        let response = provider.complete(&request()).await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(mock.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_capped() {
        let mock = Arc::new(MockProvider::failing_then_success(10, ErrorCategory::RateLimit));
        let provider = RetryingProvider::new(mock.clone(), fast_policy(2));

        assert!(provider.complete(&request()).await.is_err());
        assert_eq!(mock.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let mock = Arc::new(MockProvider::failing_then_success(1, ErrorCategory::Auth));
        let provider = RetryingProvider::new(mock.clone(), fast_policy(3));

        let err = provider.complete(&request()).await.unwrap_err();
        assert!(!err.is_retryable_inference());
        assert_eq!(mock.calls.load(Ordering::SeqCst), 1);
    }
}
