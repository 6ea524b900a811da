//! Synthesize Command
//!
//! Runs the pipeline for one repository, prints the outcome and records it
//! in the local document store.
//!
//! Usage:
//!   repodoc synthesize octo/widgets [--branch main] [--kind user-manual]
//!       [--target USER_MANUAL.md] [--mode curated|full] [--token $GITHUB_TOKEN]
//!
//! Exit codes: 0 published, 2 generated but not published, 1 failed.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ai::{ProviderConfig, create_provider};
use crate::cli::ui::Output;
use crate::cli::util::{open_store, runtime};
use crate::config::{Config, ConfigLoader, SynthesisOptions};
use crate::pipeline::{Orchestrator, PipelineOutcome};
use crate::source::{GitHubHost, SharedSourceHost};
use crate::storage::DocumentStore;
use crate::types::{Credential, DocumentKind, RepositoryRef, Result, SelectionMode};

pub const EXIT_FULL_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_PARTIAL_SUCCESS: u8 = 2;

/// Flags of `repodoc synthesize`; unset values fall back to the config
#[derive(Debug, Clone, Default)]
pub struct SynthesizeArgs {
    /// `owner/name`
    pub repository: String,
    pub branch: String,
    pub kind: DocumentKind,
    pub target: Option<String>,
    pub mode: Option<SelectionMode>,
    pub max_tokens_per_chunk: Option<usize>,
    pub max_file_size: Option<u64>,
    pub max_publish_retries: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub message: Option<String>,
    pub token: Option<String>,
    /// Local user the record is stored under
    pub user: String,
}

/// Merge flags over configured defaults. Returns the options and the target path.
pub fn resolve_options(config: &Config, args: &SynthesizeArgs) -> (SynthesisOptions, String) {
    let mut options = SynthesisOptions::from_config(&config.pipeline, args.kind);
    if let Some(mode) = args.mode {
        options = options.with_selection_mode(mode);
    }
    if let Some(max_tokens) = args.max_tokens_per_chunk {
        options = options.with_max_tokens_per_chunk(max_tokens);
    }
    if let Some(bytes) = args.max_file_size {
        options = options.with_max_file_size(bytes);
    }
    if let Some(retries) = args.max_publish_retries {
        options = options.with_max_publish_retries(retries);
    }
    if let Some(secs) = args.timeout_secs {
        options = options.with_overall_timeout(Duration::from_secs(secs));
    }
    if let Some(message) = &args.message {
        options = options.with_commit_message(message.clone());
    }

    let target = args
        .target
        .clone()
        .unwrap_or_else(|| args.kind.default_target_path().to_string());
    (options, target)
}

pub fn exit_code(outcome: &PipelineOutcome) -> u8 {
    match outcome {
        PipelineOutcome::FullSuccess { .. } => EXIT_FULL_SUCCESS,
        PipelineOutcome::PartialSuccess { .. } => EXIT_PARTIAL_SUCCESS,
        PipelineOutcome::Failure { .. } => EXIT_FAILURE,
    }
}

/// Run the pipeline, cancelling it on Ctrl-C
pub async fn synthesize_until_interrupted(
    orchestrator: &Orchestrator,
    repository: &RepositoryRef,
    credential: &Credential,
    target_path: &str,
    options: &SynthesisOptions,
) -> PipelineOutcome {
    let token = CancellationToken::new();
    let interrupt = token.clone();
    let listener = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            interrupt.cancel();
        }
    });

    let outcome = orchestrator
        .synthesize(repository, credential, target_path, options, token)
        .await;
    listener.abort();
    outcome
}

/// Store the outcome; a store failure never changes the run's exit code
fn record(store: Result<DocumentStore>, user: &str, target_path: &str, outcome: &PipelineOutcome) {
    let recorded = store.and_then(|store| store.record_outcome(user, target_path, outcome));
    match recorded {
        Ok(Some(record)) => debug!(id = %record.id, status = %record.status, "Recorded document"),
        Ok(None) => debug!("Nothing to record"),
        Err(e) => Output::new().warning(&format!("Could not record the outcome locally: {}", e)),
    }
}

pub fn run(args: SynthesizeArgs) -> Result<u8> {
    let config = ConfigLoader::load()?;
    config.validate()?;

    let repository = RepositoryRef::parse(&args.repository, args.branch.clone())?;
    let (options, target_path) = resolve_options(&config, &args);

    let host: SharedSourceHost = Arc::new(GitHubHost::new(&config.source)?);
    let provider = create_provider(&ProviderConfig::from_llm_config(&config.llm))?;
    let orchestrator = Orchestrator::new(host, provider, &config);
    let credential = Credential::new(args.token.clone().unwrap_or_default());

    let output = Output::new();
    output.info(&format!(
        "Synthesizing {} for {} ({} mode)",
        options.kind.label(),
        repository,
        options.selection_mode
    ));

    let outcome = runtime()?.block_on(synthesize_until_interrupted(
        &orchestrator,
        &repository,
        &credential,
        &target_path,
        &options,
    ));

    output.outcome(&outcome, &target_path);
    record(open_store(&config), &args.user, &target_path, &outcome);
    Ok(exit_code(&outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::TimeoutConfig;
    use crate::storage::{Database, PublishStatus};
    use crate::testing::{MemorySourceHost, ScriptedProvider};

    fn args(kind: DocumentKind) -> SynthesizeArgs {
        SynthesizeArgs {
            repository: "octo/widgets".to_string(),
            branch: "main".to_string(),
            kind,
            user: "alice".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_options_uses_kind_defaults() {
        let config = Config::default();
        let (options, target) = resolve_options(&config, &args(DocumentKind::Overview));

        assert_eq!(target, "OVERVIEW.md");
        assert_eq!(options.kind, DocumentKind::Overview);
        assert_eq!(options.max_tokens_per_chunk, config.pipeline.max_tokens_per_chunk);
        assert!(options.commit_message.is_none());
    }

    #[test]
    fn test_resolve_options_flags_override_config() {
        let args = SynthesizeArgs {
            target: Some("docs/MANUAL.md".to_string()),
            mode: Some(SelectionMode::Full),
            max_tokens_per_chunk: Some(500),
            max_file_size: Some(1024),
            max_publish_retries: Some(5),
            timeout_secs: Some(30),
            message: Some("docs: refresh".to_string()),
            ..args(DocumentKind::UserManual)
        };
        let (options, target) = resolve_options(&Config::default(), &args);

        assert_eq!(target, "docs/MANUAL.md");
        assert_eq!(options.selection_mode, SelectionMode::Full);
        assert_eq!(options.max_tokens_per_chunk, 500);
        assert_eq!(options.max_file_size_bytes, 1024);
        assert_eq!(options.max_publish_retries, 5);
        assert_eq!(options.overall_timeout, Duration::from_secs(30));
        assert_eq!(options.commit_message.as_deref(), Some("docs: refresh"));
    }

    #[tokio::test]
    async fn test_run_is_published_recorded_and_exits_zero() {
        let host = Arc::new(
            MemorySourceHost::new("octo", "widgets", "main", "tok")
                .with_file("README.md", "# Widgets\n\nA toolkit for widgets.")
                .with_file("src/lib.rs", "pub fn widget() -> u32 { 42 }"),
        );
        let provider = Arc::new(ScriptedProvider::new());
        let orchestrator = Orchestrator::new(host.clone(), provider, &Config::default())
            .with_timeouts(TimeoutConfig {
                source_request: Duration::from_secs(5),
                llm_request: Duration::from_secs(5),
                overall: Duration::from_secs(60),
            });

        let (options, target) = resolve_options(&Config::default(), &args(DocumentKind::UserManual));
        let outcome = synthesize_until_interrupted(
            &orchestrator,
            &host.repository(),
            &Credential::new("tok"),
            &target,
            &options,
        )
        .await;

        assert_eq!(exit_code(&outcome), EXIT_FULL_SUCCESS, "got {:?}", outcome);
        assert!(host.file_text("USER_MANUAL.md").is_some());

        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let store = DocumentStore::new(Arc::new(db));
        let record = store
            .record_outcome("alice", &target, &outcome)
            .unwrap()
            .unwrap();
        assert_eq!(record.status, PublishStatus::Published);
        assert_eq!(record.target_path, "USER_MANUAL.md");
    }

    #[tokio::test]
    async fn test_blank_token_exits_with_failure() {
        let host = Arc::new(
            MemorySourceHost::new("octo", "widgets", "main", "tok").with_file("README.md", "hi"),
        );
        let provider = Arc::new(ScriptedProvider::new());
        let orchestrator = Orchestrator::new(host.clone(), provider.clone(), &Config::default());

        let (options, target) = resolve_options(&Config::default(), &args(DocumentKind::UserManual));
        let outcome = synthesize_until_interrupted(
            &orchestrator,
            &host.repository(),
            &Credential::new(""),
            &target,
            &options,
        )
        .await;

        assert_eq!(exit_code(&outcome), EXIT_FAILURE);
        assert_eq!(host.tree_calls(), 0);
        assert_eq!(provider.total_calls(), 0);
    }
}
