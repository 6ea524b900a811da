//! Optimistic-concurrency publish
//!
//! ```text
//! ReadCurrent ──▶ Attempting ──▶ Committed
//!      ▲              │
//!      │              ├──▶ Conflicted ──(attempts < max)──▶ ReadCurrent
//!      │              │         └──(attempts == max)──▶ Failed(PublishConflict)
//!      │              └──▶ Failed(any other error)
//! ```
//!
//! Every write carries the revision marker read immediately before it, or
//! none when the target does not exist yet. Only a rejected marker is
//! retried; every other error ends the publish.

use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::ai::timeout::{RunGuard, with_timeout};
use crate::source::SharedSourceHost;
use crate::types::{
    CommitReceipt, Credential, PublishResult, PutFileRequest, RemoteFileState, RepodocError,
    RepositoryRef,
};

/// What to write and where
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    pub path: &'a str,
    pub content: &'a str,
    pub message: &'a str,
}

#[derive(Debug)]
enum PublishState {
    ReadCurrent,
    Attempting(RemoteFileState),
    Conflicted,
    Committed(CommitReceipt),
    Failed(RepodocError),
}

pub struct OptimisticPublisher {
    host: SharedSourceHost,
    request_timeout: Duration,
    max_attempts: u32,
}

impl OptimisticPublisher {
    pub fn new(host: SharedSourceHost, request_timeout: Duration, max_attempts: u32) -> Self {
        Self {
            host,
            request_timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Write `request.content` to `request.path` on the repository's branch.
    /// A guard expiry mid-publish ends it as `Failed` with the attempts made so far.
    #[instrument(skip_all, fields(repository = %repository, path = %request.path))]
    pub async fn publish(
        &self,
        repository: &RepositoryRef,
        credential: &Credential,
        request: PublishRequest<'_>,
        guard: &RunGuard,
    ) -> PublishResult {
        let branch = repository.reference.as_str();
        let mut attempts: u32 = 0;
        let mut state = PublishState::ReadCurrent;

        loop {
            state = match state {
                PublishState::ReadCurrent => {
                    let read = with_timeout(
                        self.request_timeout,
                        self.host
                            .get_file_state(repository, request.path, branch, credential),
                        "read publish target",
                    );
                    match guard.run(read, "read publish target").await {
                        Ok(remote) => PublishState::Attempting(remote),
                        Err(err) => PublishState::Failed(err),
                    }
                }

                PublishState::Attempting(remote) => {
                    attempts += 1;
                    debug!(
                        attempt = attempts,
                        exists = remote.exists,
                        "Writing with believed revision"
                    );
                    let put = PutFileRequest {
                        path: request.path,
                        content: request.content,
                        message: request.message,
                        branch,
                        expected_revision: remote.revision_marker.as_deref(),
                    };
                    let write = with_timeout(
                        self.request_timeout,
                        self.host.put_file(repository, put, credential),
                        "write publish target",
                    );
                    match guard.run(write, "write publish target").await {
                        Ok(receipt) => PublishState::Committed(receipt),
                        Err(RepodocError::RevisionConflict { .. }) => PublishState::Conflicted,
                        Err(err) => PublishState::Failed(err),
                    }
                }

                PublishState::Conflicted => {
                    if attempts >= self.max_attempts {
                        PublishState::Failed(RepodocError::PublishConflict {
                            path: request.path.to_string(),
                            attempts,
                        })
                    } else {
                        warn!(
                            attempt = attempts,
                            max = self.max_attempts,
                            "Remote file changed since it was read, refreshing revision"
                        );
                        PublishState::ReadCurrent
                    }
                }

                PublishState::Committed(receipt) => {
                    info!(
                        attempts,
                        revision = %receipt.revision_marker,
                        "Published document"
                    );
                    return PublishResult::committed(
                        receipt.revision_marker,
                        receipt.locator,
                        receipt.commit_locator,
                        attempts,
                    );
                }

                PublishState::Failed(err) => {
                    warn!(attempts, kind = %err.kind(), error = %err, "Publish failed");
                    return PublishResult::failed(&err, attempts);
                }
            };
        }
    }
}
