//! In-memory test doubles
//!
//! `MemorySourceHost` keeps a single-branch repository in memory with real
//! compare-and-swap semantics on writes; `ScriptedProvider` answers
//! inference calls deterministically and fails on request. Together they run
//! the whole pipeline without network access.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::ai::provider::{
    CompletionRequest, LlmProvider, LlmResponse, ResponseMetadata, ResponseTiming, TokenUsage,
};
use crate::source::SourceHost;
use crate::types::{
    CommitReceipt, Credential, ErrorCategory, FileContent, LlmError, PutFileRequest,
    RemoteFileState, RepodocError, RepositoryRef, RepositoryTree, Result, TreeEntry,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Revision marker of a file body
pub fn revision_of(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

// =============================================================================
// Memory Source Host
// =============================================================================

#[derive(Debug)]
struct MemoryRepo {
    commit_seq: u64,
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryRepo {
    fn commit_id(&self) -> String {
        format!("commit-{}", self.commit_seq)
    }
}

/// Single-branch repository held in memory
#[derive(Debug)]
pub struct MemorySourceHost {
    owner: String,
    name: String,
    branch: String,
    token: String,
    repo: Mutex<MemoryRepo>,
    failing_paths: Mutex<HashSet<String>>,
    tree_failures: AtomicUsize,
    concurrent_edits: Mutex<VecDeque<String>>,
    max_put_bytes: Mutex<Option<usize>>,
    content_delay: Mutex<Option<Duration>>,
    path_delays: Mutex<HashMap<String, Duration>>,
    put_delay: Mutex<Option<Duration>>,
    completed_reads: Mutex<Vec<String>>,
    tree_calls: AtomicUsize,
    content_calls: AtomicUsize,
    state_reads: AtomicUsize,
    put_calls: AtomicUsize,
}

impl MemorySourceHost {
    /// Empty repository `owner/name` with one branch, accepting `token`
    pub fn new(owner: &str, name: &str, branch: &str, token: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            branch: branch.to_string(),
            token: token.to_string(),
            repo: Mutex::new(MemoryRepo {
                commit_seq: 1,
                files: BTreeMap::new(),
            }),
            failing_paths: Mutex::new(HashSet::new()),
            tree_failures: AtomicUsize::new(0),
            concurrent_edits: Mutex::new(VecDeque::new()),
            max_put_bytes: Mutex::new(None),
            content_delay: Mutex::new(None),
            path_delays: Mutex::new(HashMap::new()),
            put_delay: Mutex::new(None),
            completed_reads: Mutex::new(Vec::new()),
            tree_calls: AtomicUsize::new(0),
            content_calls: AtomicUsize::new(0),
            state_reads: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_file(self, path: &str, content: impl AsRef<[u8]>) -> Self {
        lock(&self.repo)
            .files
            .insert(path.to_string(), content.as_ref().to_vec());
        self
    }

    /// Content reads of `path` fail with `UpstreamUnavailable`
    pub fn fail_path(&self, path: &str) {
        lock(&self.failing_paths).insert(path.to_string());
    }

    /// The next `count` tree listings fail transiently
    pub fn fail_tree_times(&self, count: usize) {
        self.tree_failures.store(count, Ordering::SeqCst);
    }

    /// Queue an edit by another writer. Each queued edit lands on the write
    /// target right before one `put_file` checks its revision marker.
    pub fn queue_concurrent_edit(&self, content: &str) {
        lock(&self.concurrent_edits).push_back(content.to_string());
    }

    pub fn set_max_put_bytes(&self, max: usize) {
        *lock(&self.max_put_bytes) = Some(max);
    }

    pub fn set_content_delay(&self, delay: Duration) {
        *lock(&self.content_delay) = Some(delay);
    }

    /// Content reads of `path` take `delay`, overriding the host-wide delay
    pub fn set_path_delay(&self, path: &str, delay: Duration) {
        lock(&self.path_delays).insert(path.to_string(), delay);
    }

    pub fn set_put_delay(&self, delay: Duration) {
        *lock(&self.put_delay) = Some(delay);
    }

    pub fn repository(&self) -> RepositoryRef {
        RepositoryRef::new(&self.owner, &self.name, &self.branch)
    }

    pub fn file_text(&self, path: &str) -> Option<String> {
        lock(&self.repo)
            .files
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn revision(&self, path: &str) -> Option<String> {
        lock(&self.repo).files.get(path).map(|b| revision_of(b))
    }

    pub fn tree_calls(&self) -> usize {
        self.tree_calls.load(Ordering::SeqCst)
    }

    /// Paths of successful content reads, in completion order
    pub fn completed_reads(&self) -> Vec<String> {
        lock(&self.completed_reads).clone()
    }

    pub fn content_calls(&self) -> usize {
        self.content_calls.load(Ordering::SeqCst)
    }

    pub fn state_reads(&self) -> usize {
        self.state_reads.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    fn authorize(&self, repository: &RepositoryRef, credential: &Credential) -> Result<()> {
        if credential.expose() != self.token {
            return Err(RepodocError::AccessDenied(
                "Bad credentials".to_string(),
            ));
        }
        if repository.owner != self.owner || repository.name != self.name {
            return Err(RepodocError::RefNotFound {
                repository: repository.full_name(),
                reference: repository.reference.clone(),
            });
        }
        Ok(())
    }

    fn check_ref(&self, repository: &RepositoryRef, reference: &str) -> Result<()> {
        let repo = lock(&self.repo);
        if reference == self.branch || reference == repo.commit_id() {
            Ok(())
        } else {
            Err(RepodocError::RefNotFound {
                repository: repository.full_name(),
                reference: reference.to_string(),
            })
        }
    }
}

#[async_trait]
impl SourceHost for MemorySourceHost {
    async fn resolve_ref(
        &self,
        repository: &RepositoryRef,
        credential: &Credential,
    ) -> Result<String> {
        self.authorize(repository, credential)?;
        self.check_ref(repository, &repository.reference)?;
        Ok(lock(&self.repo).commit_id())
    }

    async fn list_tree(
        &self,
        repository: &RepositoryRef,
        commit_id: &str,
        credential: &Credential,
    ) -> Result<RepositoryTree> {
        self.tree_calls.fetch_add(1, Ordering::SeqCst);
        self.authorize(repository, credential)?;

        let remaining = self.tree_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.tree_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RepodocError::UpstreamUnavailable(
                "503 Service Unavailable".to_string(),
            ));
        }

        self.check_ref(repository, commit_id)?;
        let repo = lock(&self.repo);

        let mut directories = BTreeSet::new();
        let mut entries = Vec::new();
        for (path, bytes) in &repo.files {
            let mut prefix = String::new();
            let components: Vec<&str> = path.split('/').collect();
            for component in &components[..components.len() - 1] {
                if !prefix.is_empty() {
                    prefix.push('/');
                }
                prefix.push_str(component);
                directories.insert(prefix.clone());
            }
            entries.push(TreeEntry::file(
                path.as_str(),
                revision_of(bytes),
                bytes.len() as u64,
            ));
        }
        entries.extend(
            directories
                .into_iter()
                .map(|dir| TreeEntry::directory(dir.clone(), format!("tree-{}", dir))),
        );

        Ok(RepositoryTree {
            commit_id: repo.commit_id(),
            entries,
            truncated: false,
        })
    }

    async fn get_file_content(
        &self,
        repository: &RepositoryRef,
        path: &str,
        reference: &str,
        _content_id: &str,
        credential: &Credential,
    ) -> Result<FileContent> {
        self.content_calls.fetch_add(1, Ordering::SeqCst);
        self.authorize(repository, credential)?;

        let delay = lock(&self.path_delays)
            .get(path)
            .copied()
            .or(*lock(&self.content_delay));
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if lock(&self.failing_paths).contains(path) {
            return Err(RepodocError::UpstreamUnavailable(format!(
                "502 Bad Gateway reading {}",
                path
            )));
        }

        self.check_ref(repository, reference)?;
        let repo = lock(&self.repo);
        let bytes = repo.files.get(path).cloned().ok_or_else(|| {
            RepodocError::RefNotFound {
                repository: repository.full_name(),
                reference: format!("{}:{}", reference, path),
            }
        })?;
        let revision_marker = revision_of(&bytes);
        lock(&self.completed_reads).push(path.to_string());
        Ok(FileContent {
            bytes,
            revision_marker,
        })
    }

    async fn get_file_state(
        &self,
        repository: &RepositoryRef,
        path: &str,
        branch: &str,
        credential: &Credential,
    ) -> Result<RemoteFileState> {
        self.state_reads.fetch_add(1, Ordering::SeqCst);
        self.authorize(repository, credential)?;
        self.check_ref(repository, branch)?;

        Ok(match lock(&self.repo).files.get(path) {
            Some(bytes) => RemoteFileState::existing(path, revision_of(bytes)),
            None => RemoteFileState::missing(path),
        })
    }

    async fn put_file(
        &self,
        repository: &RepositoryRef,
        request: PutFileRequest<'_>,
        credential: &Credential,
    ) -> Result<CommitReceipt> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.authorize(repository, credential)?;
        self.check_ref(repository, request.branch)?;

        let delay = *lock(&self.put_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let max_bytes = *lock(&self.max_put_bytes);
        if let Some(max) = max_bytes
            && request.content.len() > max
        {
            return Err(RepodocError::PayloadTooLarge(format!(
                "{} bytes exceeds {}",
                request.content.len(),
                max
            )));
        }

        let mut repo = lock(&self.repo);

        if let Some(edit) = lock(&self.concurrent_edits).pop_front() {
            repo.files
                .insert(request.path.to_string(), edit.into_bytes());
            repo.commit_seq += 1;
        }

        let current = repo.files.get(request.path).map(|b| revision_of(b));
        let accepted = match (current.as_deref(), request.expected_revision) {
            (None, None) => true,
            (Some(actual), Some(expected)) => actual == expected,
            _ => false,
        };
        if !accepted {
            return Err(RepodocError::RevisionConflict {
                path: request.path.to_string(),
            });
        }

        let bytes = request.content.as_bytes().to_vec();
        let revision_marker = revision_of(&bytes);
        repo.files.insert(request.path.to_string(), bytes);
        repo.commit_seq += 1;

        Ok(CommitReceipt {
            revision_marker,
            locator: Some(format!(
                "memory://{}/{}/blob/{}/{}",
                self.owner, self.name, request.branch, request.path
            )),
            commit_locator: Some(format!(
                "memory://{}/{}/commit/{}",
                self.owner,
                self.name,
                repo.commit_id()
            )),
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// =============================================================================
// Scripted Provider
// =============================================================================

/// How a scripted call misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// Return an inference error of this category
    Error(ErrorCategory),
    /// Never answer (until the caller's timeout fires)
    Hang,
}

/// Deterministic inference provider.
///
/// Extract calls answer `notes for <path> chunk <i of n>`; the assembly call
/// answers with the configured document. Any call whose prompt contains a
/// registered trigger fails as scripted.
#[derive(Debug)]
pub struct ScriptedProvider {
    assembly_response: String,
    fail_assembly: Option<ScriptedFailure>,
    triggers: Vec<(String, ScriptedFailure)>,
    delays: Vec<(String, Duration)>,
    extract_calls: AtomicUsize,
    assembly_calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            assembly_response: "# Generated Manual\n\n## Overview\n\nBuilt from extracts.\n"
                .to_string(),
            fail_assembly: None,
            triggers: Vec::new(),
            delays: Vec::new(),
            extract_calls: AtomicUsize::new(0),
            assembly_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_assembly_response(mut self, response: &str) -> Self {
        self.assembly_response = response.to_string();
        self
    }

    pub fn fail_assembly(mut self, failure: ScriptedFailure) -> Self {
        self.fail_assembly = Some(failure);
        self
    }

    /// Fail every extract call whose prompt contains `trigger`
    pub fn fail_when(mut self, trigger: &str, failure: ScriptedFailure) -> Self {
        self.triggers.push((trigger.to_string(), failure));
        self
    }

    /// Delay every extract call whose prompt contains `trigger`
    pub fn delay_when(mut self, trigger: &str, delay: Duration) -> Self {
        self.delays.push((trigger.to_string(), delay));
        self
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    pub fn assembly_calls(&self) -> usize {
        self.assembly_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.extract_calls() + self.assembly_calls()
    }

    /// Every request received, in arrival order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    /// User content of the assembly call, if one was made
    pub fn assembly_input(&self) -> Option<String> {
        lock(&self.requests)
            .iter()
            .find(|r| is_assembly(r))
            .map(|r| r.user.clone())
    }

    async fn misbehave(failure: ScriptedFailure) -> Result<LlmResponse> {
        match failure {
            ScriptedFailure::Error(category) => Err(LlmError::with_provider(
                category,
                format!("scripted {} failure", category),
                "scripted",
            )
            .into()),
            ScriptedFailure::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(LlmError::with_provider(ErrorCategory::Network, "hung", "scripted").into())
            }
        }
    }

    fn respond(content: String) -> LlmResponse {
        LlmResponse::with_metrics(
            content,
            TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
            ResponseTiming::default(),
            ResponseMetadata {
                model: "scripted".to_string(),
                provider: "scripted".to_string(),
            },
        )
    }
}

fn is_assembly(request: &CompletionRequest) -> bool {
    request.user.contains("# Extracted Information")
}

fn context_value<'a>(prompt: &'a str, key: &str) -> &'a str {
    let marker = format!("**{}**: ", key);
    prompt
        .lines()
        .find_map(|line| line.strip_prefix(marker.as_str()))
        .unwrap_or("?")
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<LlmResponse> {
        lock(&self.requests).push(request.clone());

        if is_assembly(request) {
            self.assembly_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(failure) = self.fail_assembly {
                return Self::misbehave(failure).await;
            }
            return Ok(Self::respond(self.assembly_response.clone()));
        }

        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        let mentions = |trigger: &str| request.system.contains(trigger) || request.user.contains(trigger);
        let delay = self
            .delays
            .iter()
            .find(|(trigger, _)| mentions(trigger))
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self
            .triggers
            .iter()
            .find(|(trigger, _)| mentions(trigger))
            .map(|(_, failure)| *failure);
        if let Some(failure) = failure {
            return Self::misbehave(failure).await;
        }

        Ok(Self::respond(format!(
            "notes for {} chunk {}",
            context_value(&request.system, "File"),
            context_value(&request.system, "Chunk")
        )))
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> MemorySourceHost {
        MemorySourceHost::new("octo", "widgets", "main", "tok")
            .with_file("README.md", "# Widgets")
            .with_file("src/lib.rs", "pub fn a() {}")
    }

    #[tokio::test]
    async fn test_memory_host_tree_includes_directories() {
        let host = host();
        let repo = host.repository();
        let cred = Credential::new("tok");
        let commit = host.resolve_ref(&repo, &cred).await.unwrap();
        let tree = host.list_tree(&repo, &commit, &cred).await.unwrap();

        assert_eq!(tree.entries.len(), 3);
        assert!(tree.entries.iter().any(|e| e.path == "src" && !e.is_file()));
    }

    #[tokio::test]
    async fn test_memory_host_rejects_bad_token() {
        let host = host();
        let err = host
            .resolve_ref(&host.repository(), &Credential::new("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepodocError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn test_memory_host_compare_and_swap() {
        let host = host();
        let repo = host.repository();
        let cred = Credential::new("tok");
        let stale = host.revision("README.md").unwrap();

        let receipt = host
            .put_file(
                &repo,
                PutFileRequest {
                    path: "README.md",
                    content: "# New",
                    message: "m",
                    branch: "main",
                    expected_revision: Some(&stale),
                },
                &cred,
            )
            .await
            .unwrap();
        assert_eq!(Some(receipt.revision_marker), host.revision("README.md"));

        let again = host
            .put_file(
                &repo,
                PutFileRequest {
                    path: "README.md",
                    content: "# Newer",
                    message: "m",
                    branch: "main",
                    expected_revision: Some(&stale),
                },
                &cred,
            )
            .await;
        assert!(matches!(again, Err(RepodocError::RevisionConflict { .. })));
        assert_eq!(host.file_text("README.md").unwrap(), "# New");
    }

    #[tokio::test]
    async fn test_scripted_provider_echoes_context() {
        let provider = ScriptedProvider::new().fail_when("src/bad.rs", ScriptedFailure::Error(ErrorCategory::Auth));
        let ok = CompletionRequest::new("**File**: a.rs\n**Chunk**: 1 of 2", "x", 10, 0.0);
        assert_eq!(
            provider.complete(&ok).await.unwrap().content,
            "notes for a.rs chunk 1 of 2"
        );

        let bad = CompletionRequest::new("**File**: src/bad.rs", "x", 10, 0.0);
        assert!(provider.complete(&bad).await.is_err());
        assert_eq!(provider.extract_calls(), 2);
        assert_eq!(provider.assembly_calls(), 0);
    }
}
