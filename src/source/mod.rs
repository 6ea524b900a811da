//! Source-Hosting Abstraction
//!
//! Defines the `SourceHost` trait the pipeline reads trees and files
//! through and publishes documents with. The credential is passed into
//! every call: it is scoped to one invocation and never stored on the host.
//!
//! ## Modules
//!
//! - `github`: GitHub REST API (trees, contents, blobs, contents PUT)

mod github;

pub use github::GitHubHost;

use async_trait::async_trait;
use std::sync::Arc;

use crate::types::{
    CommitReceipt, Credential, FileContent, PutFileRequest, RemoteFileState, RepositoryRef,
    RepositoryTree, Result,
};

/// Operations the pipeline needs from a source host
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Resolve a branch, tag or commit id to a commit id.
    /// Fails with `RefNotFound`, `AccessDenied` or `UpstreamUnavailable`.
    async fn resolve_ref(&self, repository: &RepositoryRef, credential: &Credential)
    -> Result<String>;

    /// Full recursive listing of a commit's tree
    async fn list_tree(
        &self,
        repository: &RepositoryRef,
        commit_id: &str,
        credential: &Credential,
    ) -> Result<RepositoryTree>;

    /// Raw bytes of one file at `reference`. `content_id` addresses the
    /// blob directly when the host does not inline large files.
    async fn get_file_content(
        &self,
        repository: &RepositoryRef,
        path: &str,
        reference: &str,
        content_id: &str,
        credential: &Credential,
    ) -> Result<FileContent>;

    /// Current revision marker of `path` on `branch`; a missing file is not an error
    async fn get_file_state(
        &self,
        repository: &RepositoryRef,
        path: &str,
        branch: &str,
        credential: &Credential,
    ) -> Result<RemoteFileState>;

    /// Compare-and-swap write. Must fail with `RevisionConflict` when
    /// `expected_revision` does not match the remote file (including
    /// "expected absent but exists" and the reverse).
    async fn put_file(
        &self,
        repository: &RepositoryRef,
        request: PutFileRequest<'_>,
        credential: &Credential,
    ) -> Result<CommitReceipt>;

    /// Host name for logging
    fn name(&self) -> &str;
}

/// Shared source host for concurrent access across pipeline stages
pub type SharedSourceHost = Arc<dyn SourceHost>;
