//! Pipeline Orchestrator
//!
//! Sequences one synthesis run:
//!
//! ```text
//! fetch tree ─▶ select ─▶ load (bounded) ─▶ chunk ─▶ summarize (bounded)
//!     ─▶ assemble (single call) ─▶ publish (compare-and-swap)
//! ```
//!
//! and folds every stage's result into a single `PipelineOutcome`.
//! Per-file and per-chunk failures are absorbed into the `RunReport`;
//! tree-level failures, empty selections, assembly failures, the overall
//! deadline and cancellation end the run. Anything that goes wrong after
//! assembly only downgrades the outcome to `PartialSuccess`.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::ai::metrics::{MetricsSummary, SharedMetrics, create_shared_metrics};
use crate::ai::provider::SharedProvider;
use crate::ai::timeout::{RunGuard, TimeoutConfig};
use crate::config::{Config, LlmConfig, SelectionConfig, SynthesisOptions};
use crate::source::SharedSourceHost;
use crate::types::{
    Credential, ErrorKind, PublishResult, RepodocError, RepositoryRef, Result,
    SynthesizedDocument,
};

use super::assembler::{AssemblyBudget, DocumentAssembler};
use super::chunker::TokenChunker;
use super::loader::FileContentLoader;
use super::publisher::{OptimisticPublisher, PublishRequest};
use super::selector::FileSelector;
use super::summarizer::{ChunkSummarizer, ExtractBudget};
use super::tree::TreeFetcher;

// =============================================================================
// Outcome
// =============================================================================

/// What happened during one run, whatever the outcome
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub run_id: String,
    /// Commit the run read from
    pub commit_id: Option<String>,
    pub tree_entries: usize,
    pub tree_truncated: bool,
    pub selected_files: usize,
    pub loaded_files: usize,
    pub failed_files: usize,
    pub binary_rejected: usize,
    pub chunks: usize,
    pub chunk_errors: usize,
    pub inference: MetricsSummary,
    pub publish_attempts: u32,
    pub elapsed: Duration,
}

/// Three-way result of `Orchestrator::synthesize`
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Assembled and published
    FullSuccess {
        document: SynthesizedDocument,
        publish: PublishResult,
        report: RunReport,
    },
    /// Assembled but not published; the document is still returned
    PartialSuccess {
        document: SynthesizedDocument,
        publish: PublishResult,
        report: RunReport,
    },
    /// Nothing was generated
    Failure {
        error: RepodocError,
        /// Stand-in document for empty selections and failed assembly
        placeholder: Option<SynthesizedDocument>,
        report: RunReport,
    },
}

impl PipelineOutcome {
    pub fn report(&self) -> &RunReport {
        match self {
            Self::FullSuccess { report, .. }
            | Self::PartialSuccess { report, .. }
            | Self::Failure { report, .. } => report,
        }
    }

    /// Generated document, or the placeholder of a failed run
    pub fn document(&self) -> Option<&SynthesizedDocument> {
        match self {
            Self::FullSuccess { document, .. } | Self::PartialSuccess { document, .. } => {
                Some(document)
            }
            Self::Failure { placeholder, .. } => placeholder.as_ref(),
        }
    }

    pub fn publish(&self) -> Option<&PublishResult> {
        match self {
            Self::FullSuccess { publish, .. } | Self::PartialSuccess { publish, .. } => {
                Some(publish)
            }
            Self::Failure { .. } => None,
        }
    }

    /// Error kind behind a non-full outcome
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::FullSuccess { .. } => None,
            Self::PartialSuccess { publish, .. } => publish.error.as_ref().map(|e| e.kind),
            Self::Failure { error, .. } => Some(error.kind()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::FullSuccess { .. } => "full_success",
            Self::PartialSuccess { .. } => "partial_success",
            Self::Failure { .. } => "failure",
        }
    }

    pub fn is_full_success(&self) -> bool {
        matches!(self, Self::FullSuccess { .. })
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct Orchestrator {
    host: SharedSourceHost,
    provider: SharedProvider,
    selection: SelectionConfig,
    llm: LlmConfig,
    timeouts: TimeoutConfig,
}

impl Orchestrator {
    pub fn new(host: SharedSourceHost, provider: SharedProvider, config: &Config) -> Self {
        Self {
            host,
            provider,
            selection: config.selection.clone(),
            llm: config.llm.clone(),
            timeouts: TimeoutConfig::from_config(config),
        }
    }

    /// Override per-request timeouts. `overall` is ignored; it comes from the options.
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Run the whole pipeline for `repository` and publish to `target_path`.
    ///
    /// Never panics and never returns a bare error: every path ends in a
    /// `PipelineOutcome`. Invalid input fails before any network call.
    pub async fn synthesize(
        &self,
        repository: &RepositoryRef,
        credential: &Credential,
        target_path: &str,
        options: &SynthesisOptions,
        cancel: CancellationToken,
    ) -> PipelineOutcome {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "synthesize",
            run_id = %run_id,
            repository = %repository,
            kind = %options.kind
        );
        self.run(run_id, repository, credential, target_path, options, cancel)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        run_id: String,
        repository: &RepositoryRef,
        credential: &Credential,
        target_path: &str,
        options: &SynthesisOptions,
        cancel: CancellationToken,
    ) -> PipelineOutcome {
        let started = Instant::now();
        let metrics = create_shared_metrics(run_id.clone());
        let mut report = RunReport {
            run_id,
            ..Default::default()
        };

        if let Err(err) = self.check_preconditions(credential, target_path, options) {
            return finish_failure(err, None, report, &metrics, started);
        }

        let guard = RunGuard::new(options.overall_timeout, cancel);
        info!(path = %target_path, mode = %options.selection_mode, "Starting synthesis run");

        let document = match self
            .generate(repository, credential, options, &guard, &metrics, &mut report)
            .await
        {
            Ok(document) => document,
            Err(err) => {
                let placeholder = match err.kind() {
                    ErrorKind::SelectionEmpty => Some(SynthesizedDocument::placeholder(
                        repository,
                        options.kind,
                        "No readable files eligible for this document were found in the repository.",
                    )),
                    ErrorKind::AssemblyFailed => Some(SynthesizedDocument::placeholder(
                        repository,
                        options.kind,
                        "The document could not be assembled from the repository content.",
                    )),
                    _ => None,
                };
                return finish_failure(err, placeholder, report, &metrics, started);
            }
        };

        let message = options
            .commit_message
            .clone()
            .unwrap_or_else(|| options.kind.default_commit_message(repository));
        let publisher = OptimisticPublisher::new(
            self.host.clone(),
            self.timeouts.source_request,
            options.max_publish_retries,
        );
        let publish = publisher
            .publish(
                repository,
                credential,
                PublishRequest {
                    path: target_path,
                    content: &document.body,
                    message: &message,
                },
                &guard,
            )
            .await;

        report.publish_attempts = publish.attempts;
        report.inference = metrics.summary();
        report.elapsed = started.elapsed();

        if publish.success {
            info!(
                attempts = publish.attempts,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Run finished: document generated and published"
            );
            PipelineOutcome::FullSuccess {
                document,
                publish,
                report,
            }
        } else {
            warn!(
                attempts = publish.attempts,
                error = ?publish.error,
                "Run finished: document generated but not published"
            );
            PipelineOutcome::PartialSuccess {
                document,
                publish,
                report,
            }
        }
    }

    fn check_preconditions(
        &self,
        credential: &Credential,
        target_path: &str,
        options: &SynthesisOptions,
    ) -> Result<()> {
        if credential.is_blank() {
            return Err(RepodocError::MissingCredential(
                "a source-host token is required".to_string(),
            ));
        }
        if target_path.trim().is_empty() {
            return Err(RepodocError::Config("target path must not be empty".to_string()));
        }
        options.validate()
    }

    /// Everything up to and including assembly
    async fn generate(
        &self,
        repository: &RepositoryRef,
        credential: &Credential,
        options: &SynthesisOptions,
        guard: &RunGuard,
        metrics: &SharedMetrics,
        report: &mut RunReport,
    ) -> Result<SynthesizedDocument> {
        let selector = FileSelector::new(
            &self.selection,
            options.max_file_size_bytes,
            options.selection_mode,
        )?;

        let fetcher = TreeFetcher::new(self.host.clone(), self.timeouts.source_request);
        let tree = guard
            .run(fetcher.fetch(repository, credential), "fetch tree")
            .await?;
        report.commit_id = Some(tree.commit_id.clone());
        report.tree_entries = tree.entries.len();
        report.tree_truncated = tree.truncated;

        let selected = selector.select(&tree.entries);
        report.selected_files = selected.len();
        if selected.is_empty() {
            return Err(RepodocError::SelectionEmpty {
                considered: tree.entries.len(),
            });
        }

        let loader = FileContentLoader::new(
            self.host.clone(),
            self.timeouts.source_request,
            options.fetch_concurrency,
            options.binary_threshold,
        );
        let loaded = guard
            .run(
                async {
                    Ok(loader
                        .load(repository, credential, &tree.commit_id, &selected)
                        .await)
                },
                "load files",
            )
            .await?;
        report.loaded_files = loaded.loaded.len();
        report.failed_files = loaded.failed.len();
        report.binary_rejected = loaded.binary_rejected.len();

        let chunker = TokenChunker::new(options.max_tokens_per_chunk);
        let chunks = chunker.chunk_all(
            loaded
                .loaded
                .iter()
                .map(|file| (file.path.as_str(), file.raw_text.as_str())),
        );
        report.chunks = chunks.len();
        if chunks.is_empty() {
            return Err(RepodocError::SelectionEmpty {
                considered: tree.entries.len(),
            });
        }
        info!(
            files = loaded.loaded.len(),
            chunks = chunks.len(),
            "Chunked file contents"
        );

        let summarizer = ChunkSummarizer::new(
            self.provider.clone(),
            metrics.clone(),
            ExtractBudget::from_config(&self.llm),
            self.timeouts.llm_request,
            options.summarize_concurrency,
        );
        let summaries = guard
            .run(
                async { Ok(summarizer.summarize(options.kind, &chunks).await) },
                "summarize chunks",
            )
            .await?;
        report.chunk_errors = summaries.iter().filter(|s| s.is_error).count();

        let assembler = DocumentAssembler::new(
            self.provider.clone(),
            metrics.clone(),
            AssemblyBudget::from_config(&self.llm, options.assembly_input_tokens),
            self.timeouts.llm_request,
        )?;
        guard
            .run(
                assembler.assemble(repository, options.kind, &summaries),
                "assemble document",
            )
            .await
    }
}

fn finish_failure(
    error: RepodocError,
    placeholder: Option<SynthesizedDocument>,
    mut report: RunReport,
    metrics: &SharedMetrics,
    started: Instant,
) -> PipelineOutcome {
    report.inference = metrics.summary();
    report.elapsed = started.elapsed();
    error!(kind = %error.kind(), error = %error, "Run failed: nothing was generated");
    PipelineOutcome::Failure {
        error,
        placeholder,
        report,
    }
}

// =============================================================================
// Tests
// =============================================================================
