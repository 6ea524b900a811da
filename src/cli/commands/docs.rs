//! Docs Command
//!
//! Inspects document records kept by previous runs and commits a stored
//! body again, for example after a run ended with a publish conflict.
//!
//! Usage:
//!   repodoc docs list [--user alice]
//!   repodoc docs show octo/widgets [--branch main] [--kind user-manual]
//!   repodoc docs publish octo/widgets [--branch main] [--kind user-manual] [--token $GITHUB_TOKEN]

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::ai::{RunGuard, TimeoutConfig};
use crate::cli::commands::synthesize::{EXIT_FULL_SUCCESS, EXIT_PARTIAL_SUCCESS};
use crate::cli::ui::Output;
use crate::cli::util::{open_store, runtime};
use crate::config::ConfigLoader;
use crate::pipeline::{OptimisticPublisher, PublishRequest};
use crate::source::{GitHubHost, SharedSourceHost};
use crate::storage::{DocumentKey, DocumentRecord, DocumentStore};
use crate::types::{
    Credential, DocumentKind, PublishResult, RepodocError, RepositoryRef, Result,
};

/// Which stored document a command addresses
#[derive(Debug, Clone)]
pub struct DocumentSelector {
    /// `owner/name`
    pub repository: String,
    pub branch: String,
    pub kind: DocumentKind,
    pub user: String,
}

impl DocumentSelector {
    pub fn key(&self) -> Result<DocumentKey> {
        let repository = RepositoryRef::parse(&self.repository, self.branch.clone())?;
        Ok(DocumentKey::new(self.user.clone(), &repository, self.kind))
    }
}

/// Flags of `repodoc docs publish`; unset values fall back to the config
#[derive(Debug, Clone)]
pub struct PublishArgs {
    pub document: DocumentSelector,
    pub message: Option<String>,
    pub max_publish_retries: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub token: Option<String>,
}

pub fn list(user: Option<&str>) -> Result<()> {
    let output = Output::new();
    let config = ConfigLoader::load()?;
    let store = open_store(&config)?;

    let records = store.list(user)?;
    if records.is_empty() {
        output.info("No documents recorded yet. Run 'repodoc synthesize <owner/name>' first.");
        return Ok(());
    }

    output.header(&format!("{} document(s)", records.len()));
    for record in &records {
        println!();
        output.record(record);
    }
    Ok(())
}

fn load_record(store: &DocumentStore, key: &DocumentKey) -> Result<DocumentRecord> {
    store.get(key)?.ok_or_else(|| {
        RepodocError::Storage(format!(
            "No {} recorded for {}@{} (user {})",
            key.kind.label(),
            key.repository,
            key.branch,
            key.owner_user
        ))
    })
}

pub fn show(document: &DocumentSelector) -> Result<()> {
    let config = ConfigLoader::load()?;
    let store = open_store(&config)?;
    let record = load_record(&store, &document.key()?)?;

    let output = Output::new();
    output.record(&record);
    output.section("Body");
    println!("{}", record.body);
    Ok(())
}

/// Commit the stored body of `key` with the compare-and-swap protocol and
/// record the result. Placeholders are never published.
pub async fn publish_record(
    store: &DocumentStore,
    publisher: &OptimisticPublisher,
    key: &DocumentKey,
    credential: &Credential,
    message: Option<&str>,
    guard: &RunGuard,
) -> Result<(DocumentRecord, PublishResult)> {
    if credential.is_blank() {
        return Err(RepodocError::MissingCredential(
            "a source-host token is required".to_string(),
        ));
    }
    let record = load_record(store, key)?;
    if record.placeholder {
        return Err(RepodocError::Storage(format!(
            "The stored {} is a placeholder from a failed run; synthesize it first",
            record.kind.label()
        )));
    }

    let repository = RepositoryRef::parse(&record.repository, record.branch.clone())?;
    let message = message
        .map(str::to_string)
        .unwrap_or_else(|| record.kind.default_commit_message(&repository));
    info!(
        repository = %repository,
        path = %record.target_path,
        status = %record.status,
        "Publishing stored document"
    );

    let publish = publisher
        .publish(
            &repository,
            credential,
            PublishRequest {
                path: &record.target_path,
                content: &record.body,
                message: &message,
            },
            guard,
        )
        .await;

    let updated = store
        .record_publish(key, &publish)?
        .ok_or_else(|| RepodocError::Storage("Document record disappeared".to_string()))?;
    Ok((updated, publish))
}

/// Exit code: 0 when committed, 2 when the body stays unpublished
pub fn publish(args: PublishArgs) -> Result<u8> {
    let config = ConfigLoader::load()?;
    config.validate()?;
    let store = open_store(&config)?;
    let key = args.document.key()?;

    let timeouts = TimeoutConfig::from_config(&config);
    let overall = args
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(timeouts.overall);
    let host: SharedSourceHost = Arc::new(GitHubHost::new(&config.source)?);
    let publisher = OptimisticPublisher::new(
        host,
        timeouts.source_request,
        args.max_publish_retries
            .unwrap_or(config.pipeline.max_publish_retries),
    );
    let credential = Credential::new(args.token.clone().unwrap_or_default());

    let (record, result) = runtime()?.block_on(async {
        let token = CancellationToken::new();
        let interrupt = token.clone();
        let listener = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        });
        let guard = RunGuard::new(overall, token);
        let published = publish_record(
            &store,
            &publisher,
            &key,
            &credential,
            args.message.as_deref(),
            &guard,
        )
        .await;
        listener.abort();
        published
    })?;

    let output = Output::new();
    if result.success {
        output.success(&format!("Published \"{}\" to {}", record.title, record.target_path));
    } else {
        output.warning(&format!(
            "Could not publish \"{}\" to {}",
            record.title, record.target_path
        ));
    }
    output.field("Attempts", result.attempts);
    output.record(&record);

    Ok(if result.success {
        EXIT_FULL_SUCCESS
    } else {
        EXIT_PARTIAL_SUCCESS
    })
}
