//! Unified Timeout and Cancellation Helpers
//!
//! Every suspension point of a run (source-host requests, inference calls,
//! the run as a whole) goes through these helpers so a stalled call surfaces
//! as `RepodocError::Timeout` and a cancelled run as `RepodocError::Cancelled`.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::ai::timeout::{TimeoutConfig, with_timeout};
//!
//! let config = TimeoutConfig::default();
//! let tree = with_timeout(config.source_request, host.list_tree(&repo, &sha), "list tree").await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::constants::{network, pipeline};
use crate::types::{RepodocError, Result};

/// Timeouts for every kind of network call in a run
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Single source-host request (default: 30 seconds)
    pub source_request: Duration,
    /// Single inference request (default: 2 minutes)
    pub llm_request: Duration,
    /// Whole run, publish included (default: 15 minutes)
    pub overall: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            source_request: Duration::from_secs(network::SOURCE_TIMEOUT_SECS),
            llm_request: Duration::from_secs(network::LLM_TIMEOUT_SECS),
            overall: Duration::from_secs(pipeline::OVERALL_TIMEOUT_SECS),
        }
    }
}

impl TimeoutConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_request: config.source.timeout(),
            llm_request: config.llm.timeout(),
            overall: Duration::from_secs(config.pipeline.overall_timeout_secs),
        }
    }
}

/// Execute an async operation with a timeout
///
/// Returns a timeout error if the operation doesn't complete within the specified duration.
/// The future is dropped on expiry, which aborts any request it holds.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(RepodocError::timeout(operation_name, timeout)),
    }
}

/// Overall deadline plus cancellation for one run
///
/// Stages race their work against the guard; whichever fires first drops
/// the work future, so in-flight requests are aborted rather than orphaned.
#[derive(Debug, Clone)]
pub struct RunGuard {
    deadline: tokio::time::Instant,
    budget: Duration,
    token: CancellationToken,
}

impl RunGuard {
    pub fn new(budget: Duration, token: CancellationToken) -> Self {
        Self {
            deadline: tokio::time::Instant::now() + budget,
            budget,
            token,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline
            .saturating_duration_since(tokio::time::Instant::now())
    }

    /// Run `future` unless the run is cancelled or out of time first
    pub async fn run<T, F>(&self, future: F, operation_name: &str) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(RepodocError::Cancelled(operation_name.to_string())),
            _ = tokio::time::sleep_until(self.deadline) => Err(RepodocError::timeout(
                format!("overall run budget exhausted during {}", operation_name),
                self.budget,
            )),
            result = future => result,
        }
    }
}
