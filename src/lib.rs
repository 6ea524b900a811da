//! repodoc - Repository Content Synthesis
//!
//! Reads a hosted repository at one commit, summarizes its files with an
//! LLM in a map-reduce pass and publishes the assembled document back to
//! the branch with an optimistic compare-and-swap write.
//!
//! ## Pipeline
//!
//! tree fetch → select → load → chunk → summarize (map) → assemble (reduce) → publish
//!
//! Every run ends in a [`PipelineOutcome`]: `FullSuccess`, `PartialSuccess`
//! (generated but not published) or `Failure`.
//!
//! ## Quick Start
//!
//! ```ignore
//! use repodoc::{Config, Orchestrator, SynthesisOptions, DocumentKind, RepositoryRef, Credential};
//! use repodoc::source::GitHubHost;
//! use repodoc::ai::{ProviderConfig, create_provider};
//!
//! let config = Config::default();
//! let host = Arc::new(GitHubHost::new(&config.source)?);
//! let provider = create_provider(&ProviderConfig::from_llm_config(&config.llm))?;
//! let orchestrator = Orchestrator::new(host, provider, &config);
//!
//! let options = SynthesisOptions::from_config(&config.pipeline, DocumentKind::UserManual);
//! let outcome = orchestrator
//!     .synthesize(
//!         &RepositoryRef::parse("octo/widgets", "main")?,
//!         &Credential::new(token),
//!         "USER_MANUAL.md",
//!         &options,
//!         CancellationToken::new(),
//!     )
//!     .await;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: inference provider, prompts, tokenizer, timeouts, metrics
//! - [`source`]: source-host abstraction and the GitHub implementation
//! - [`pipeline`]: the stages and the orchestrator
//! - [`storage`]: SQLite document record store
//! - [`config`]: layered configuration

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod pipeline;
pub mod source;
pub mod storage;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader, SynthesisOptions};

// Error Types
pub use types::error::{ErrorCategory, ErrorKind, RepodocError, Result, ResultExt};

// Domain Types
pub use types::{
    Credential, DocumentKind, PublishResult, RepositoryRef, SelectionMode, SynthesizedDocument,
};

// Storage
pub use storage::{Database, DocumentStore, PoolConfig, SharedDatabase};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use pipeline::{Orchestrator, PipelineOutcome, RunReport};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    LlmProvider,
    LlmResponse,
    // Metrics
    MetricsCollector,
    SharedMetrics,
    SharedProvider,
    // Timeout
    TimeoutConfig,
    with_timeout,
};
