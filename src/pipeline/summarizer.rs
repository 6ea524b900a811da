//! Map phase: one extract per chunk
//!
//! Chunks are summarized concurrently with a fixed limit. Every chunk
//! produces exactly one `ChunkSummary`; a failed call becomes an error
//! summary instead of aborting the run. Output order is restored to
//! `(path, chunk_index)` regardless of completion order.

use futures::stream::{self, StreamExt};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::ai::metrics::{InferenceStage, SharedMetrics};
use crate::ai::prompt::PromptTemplates;
use crate::ai::provider::{CompletionRequest, SharedProvider};
use crate::ai::timeout::with_timeout;
use crate::config::LlmConfig;
use crate::types::{ChunkSummary, DocumentKind, TokenChunk};

/// Output budget for one extract call
#[derive(Debug, Clone, Copy)]
pub struct ExtractBudget {
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for ExtractBudget {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}

impl ExtractBudget {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_output_tokens: config.summary_max_tokens,
            temperature: config.summary_temperature,
        }
    }
}

pub struct ChunkSummarizer {
    provider: SharedProvider,
    metrics: SharedMetrics,
    budget: ExtractBudget,
    request_timeout: Duration,
    concurrency: usize,
}

impl ChunkSummarizer {
    pub fn new(
        provider: SharedProvider,
        metrics: SharedMetrics,
        budget: ExtractBudget,
        request_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            provider,
            metrics,
            budget,
            request_timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Summarize every chunk. The result has one entry per input chunk,
    /// sorted by `(path, chunk_index)`.
    #[instrument(skip_all, fields(kind = %kind, chunks = chunks.len()))]
    pub async fn summarize(&self, kind: DocumentKind, chunks: &[TokenChunk]) -> Vec<ChunkSummary> {
        let mut summaries: Vec<ChunkSummary> = stream::iter(chunks)
            .map(|chunk| self.summarize_one(kind, chunk))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        summaries.sort_by(|a, b| a.order_key().cmp(&b.order_key()));

        let errors = summaries.iter().filter(|s| s.is_error).count();
        info!(
            summarized = summaries.len() - errors,
            errors, "Chunk extraction finished"
        );
        summaries
    }

    async fn summarize_one(&self, kind: DocumentKind, chunk: &TokenChunk) -> ChunkSummary {
        let request = CompletionRequest::new(
            PromptTemplates::extract_system(kind, &chunk.path, chunk.chunk_index, chunk.total_chunks),
            PromptTemplates::extract_user(&chunk.text),
            self.budget.max_output_tokens,
            self.budget.temperature,
        );

        let started = Instant::now();
        let result = with_timeout(
            self.request_timeout,
            self.provider.complete(&request),
            "summarize chunk",
        )
        .await;

        match result {
            Ok(response) => {
                self.metrics.record_response(InferenceStage::Extract, &response);
                debug!(
                    path = %chunk.path,
                    chunk = chunk.chunk_index,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Chunk summarized"
                );
                ChunkSummary::success(chunk, response.content.trim())
            }
            Err(err) => {
                self.metrics.record_failure(InferenceStage::Extract);
                warn!(
                    path = %chunk.path,
                    chunk = chunk.chunk_index,
                    kind = %err.kind(),
                    error = %err,
                    "Chunk extraction failed, continuing"
                );
                ChunkSummary::failure(chunk, &err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::create_shared_metrics;
    use crate::pipeline::TokenChunker;
    use crate::testing::{ScriptedFailure, ScriptedProvider};
    use crate::types::ErrorCategory;
    use std::sync::Arc;

    fn chunks() -> Vec<TokenChunk> {
        let chunker = TokenChunker::new(4);
        chunker.chunk_all([
            ("src/main.rs", "fn main() { run(); }"),
            ("README.md", "# Widgets"),
            ("docs/guide.md", "Use the widget."),
        ])
    }

    fn summarizer(provider: Arc<ScriptedProvider>, timeout: Duration) -> ChunkSummarizer {
        ChunkSummarizer::new(
            provider,
            create_shared_metrics("test"),
            ExtractBudget::default(),
            timeout,
            3,
        )
    }

    #[tokio::test]
    async fn test_one_summary_per_chunk_in_key_order() {
        let provider = Arc::new(ScriptedProvider::new());
        let chunks = chunks();
        let summaries = summarizer(provider.clone(), Duration::from_secs(5))
            .summarize(DocumentKind::UserManual, &chunks)
            .await;

        assert_eq!(summaries.len(), chunks.len());
        assert_eq!(provider.extract_calls(), chunks.len());
        let keys: Vec<_> = summaries.iter().map(|s| s.order_key()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(summaries[0].path, "README.md");
        assert_eq!(summaries[0].text, "notes for README.md chunk 1 of 1");
        assert!(summaries.iter().all(|s| !s.is_error));
    }

    #[tokio::test]
    async fn test_slow_first_chunk_keeps_key_order() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .delay_when("**File**: a.md", Duration::from_millis(120))
                .delay_when("**File**: b.md", Duration::from_millis(60)),
        );
        let chunks = TokenChunker::new(100).chunk_all([
            ("a.md", "alpha"),
            ("b.md", "bravo"),
            ("c.md", "charlie"),
        ]);
        let summaries = summarizer(provider, Duration::from_secs(5))
            .summarize(DocumentKind::UserManual, &chunks)
            .await;

        let paths: Vec<_> = summaries.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["a.md", "b.md", "c.md"]);
    }

    #[tokio::test]
    async fn test_failed_chunk_becomes_error_summary() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .fail_when("docs/guide.md", ScriptedFailure::Error(ErrorCategory::BadRequest)),
        );
        let chunks = chunks();
        let summaries = summarizer(provider.clone(), Duration::from_secs(5))
            .summarize(DocumentKind::UserManual, &chunks)
            .await;

        assert_eq!(summaries.len(), chunks.len());
        let failed: Vec<_> = summaries.iter().filter(|s| s.is_error).collect();
        assert!(!failed.is_empty());
        assert!(failed.iter().all(|s| s.path == "docs/guide.md"));
        assert!(failed[0].text.contains("docs/guide.md"));
    }

    #[tokio::test]
    async fn test_hung_call_times_out_per_chunk() {
        let provider = Arc::new(
            ScriptedProvider::new().fail_when("README.md", ScriptedFailure::Hang),
        );
        let chunks = chunks();
        let summaries = summarizer(provider, Duration::from_millis(50))
            .summarize(DocumentKind::UserManual, &chunks)
            .await;

        let readme = summaries.iter().find(|s| s.path == "README.md").unwrap();
        assert!(readme.is_error);
        assert!(readme.text.contains("Timeout"));
        assert!(summaries.iter().filter(|s| !s.is_error).count() > 0);
    }
}
