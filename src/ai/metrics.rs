//! Inference Usage Metrics
//!
//! Counts inference calls and tokens for one run, split by stage so a run
//! report can tell the map phase from the reduce call. Safe to share across
//! the summarizer's concurrent extract calls.
//!
//! ```ignore
//! let metrics = create_shared_metrics(run_id);
//! metrics.record_response(InferenceStage::Extract, &response);
//! report.inference = metrics.summary();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::ai::provider::LlmResponse;

/// Pipeline stage an inference call belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceStage {
    /// Per-chunk extract (map)
    Extract,
    /// Single document assembly (reduce)
    Assembly,
}

#[derive(Default)]
struct StageCounters {
    calls: AtomicU32,
    failures: AtomicU32,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    latency_ms: AtomicU64,
}

/// Atomic counters for one run; recording never blocks a call
pub struct MetricsCollector {
    run_id: String,
    extract: StageCounters,
    assembly: StageCounters,
}

/// Usage totals of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSummary {
    pub run_id: String,
    /// Successful calls, both stages
    pub api_calls: u32,
    pub extract_calls: u32,
    pub assembly_calls: u32,
    /// Calls that ended in an error after HTTP-level retries
    pub failed_calls: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub avg_latency_ms: f64,
}

impl MetricsCollector {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            extract: StageCounters::default(),
            assembly: StageCounters::default(),
        }
    }

    fn stage(&self, stage: InferenceStage) -> &StageCounters {
        match stage {
            InferenceStage::Extract => &self.extract,
            InferenceStage::Assembly => &self.assembly,
        }
    }

    pub fn record_response(&self, stage: InferenceStage, response: &LlmResponse) {
        let counters = self.stage(stage);
        counters.calls.fetch_add(1, Ordering::Relaxed);
        counters
            .input_tokens
            .fetch_add(u64::from(response.usage.input_tokens), Ordering::Relaxed);
        counters
            .output_tokens
            .fetch_add(u64::from(response.usage.output_tokens), Ordering::Relaxed);
        counters
            .latency_ms
            .fetch_add(response.timing.total_ms, Ordering::Relaxed);
    }

    pub fn record_failure(&self, stage: InferenceStage) {
        self.stage(stage).failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> MetricsSummary {
        let load32 = |a: &AtomicU32| a.load(Ordering::Relaxed);
        let load64 = |a: &AtomicU64| a.load(Ordering::Relaxed);
        let (e, a) = (&self.extract, &self.assembly);

        let extract_calls = load32(&e.calls);
        let assembly_calls = load32(&a.calls);
        let api_calls = extract_calls + assembly_calls;
        let input_tokens = load64(&e.input_tokens) + load64(&a.input_tokens);
        let output_tokens = load64(&e.output_tokens) + load64(&a.output_tokens);
        let latency = load64(&e.latency_ms) + load64(&a.latency_ms);

        MetricsSummary {
            run_id: self.run_id.clone(),
            api_calls,
            extract_calls,
            assembly_calls,
            failed_calls: load32(&e.failures) + load32(&a.failures),
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            avg_latency_ms: if api_calls > 0 {
                latency as f64 / f64::from(api_calls)
            } else {
                0.0
            },
        }
    }
}

pub type SharedMetrics = Arc<MetricsCollector>;

pub fn create_shared_metrics(run_id: impl Into<String>) -> SharedMetrics {
    Arc::new(MetricsCollector::new(run_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::{ResponseMetadata, ResponseTiming, TokenUsage};

    fn response(input: u32, output: u32, latency_ms: u64) -> LlmResponse {
        LlmResponse::with_metrics(
            "extract".to_string(),
            TokenUsage {
                input_tokens: input,
                output_tokens: output,
            },
            ResponseTiming {
                total_ms: latency_ms,
            },
            ResponseMetadata {
                model: "gpt-4o-mini".to_string(),
                provider: "openai".to_string(),
            },
        )
    }

    #[test]
    fn test_stages_are_counted_separately() {
        let metrics = MetricsCollector::new("test-run");
        metrics.record_response(InferenceStage::Extract, &response(100, 50, 400));
        metrics.record_response(InferenceStage::Extract, &response(100, 50, 600));
        metrics.record_response(InferenceStage::Assembly, &response(300, 200, 2000));
        metrics.record_failure(InferenceStage::Extract);

        let summary = metrics.summary();
        assert_eq!(summary.run_id, "test-run");
        assert_eq!(summary.extract_calls, 2);
        assert_eq!(summary.assembly_calls, 1);
        assert_eq!(summary.api_calls, 3);
        assert_eq!(summary.failed_calls, 1);
        assert_eq!(summary.input_tokens, 500);
        assert_eq!(summary.total_tokens, 800);
        assert_eq!(summary.avg_latency_ms, 1000.0);
    }

    #[test]
    fn test_empty_summary_has_zero_latency() {
        let summary = MetricsCollector::new("idle").summary();
        assert_eq!(summary.api_calls, 0);
        assert_eq!(summary.avg_latency_ms, 0.0);
    }

    #[tokio::test]
    async fn test_concurrent_extracts() {
        let metrics = create_shared_metrics("concurrent");
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        metrics.record_response(InferenceStage::Extract, &response(10, 5, 1));
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let summary = metrics.summary();
        assert_eq!(summary.extract_calls, 400);
        assert_eq!(summary.output_tokens, 2000);
    }
}
