//! Repository tree discovery
//!
//! Resolves the ref to a commit, then lists that commit's full tree. All
//! later content reads are pinned to the same commit id. A transient
//! listing failure is re-requested exactly once.

use backon::{ConstantBuilder, Retryable};
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::ai::timeout::with_timeout;
use crate::constants::network;
use crate::source::SharedSourceHost;
use crate::types::{Credential, RepodocError, RepositoryRef, RepositoryTree, Result};

const RETRY_DELAY: Duration = Duration::from_millis(200);

pub struct TreeFetcher {
    host: SharedSourceHost,
    request_timeout: Duration,
    retries: usize,
}

impl TreeFetcher {
    pub fn new(host: SharedSourceHost, request_timeout: Duration) -> Self {
        Self {
            host,
            request_timeout,
            retries: network::TREE_RETRIES,
        }
    }

    #[instrument(skip(self, credential), fields(repository = %repository))]
    pub async fn fetch(
        &self,
        repository: &RepositoryRef,
        credential: &Credential,
    ) -> Result<RepositoryTree> {
        let commit_id = self
            .idempotent("resolve ref", || self.host.resolve_ref(repository, credential))
            .await?;

        let tree = self
            .idempotent("list tree", || {
                self.host.list_tree(repository, &commit_id, credential)
            })
            .await?;

        if tree.truncated {
            warn!(
                entries = tree.entries.len(),
                "Upstream truncated the tree listing; selection sees a partial tree"
            );
        }
        info!(commit = %tree.commit_id, entries = tree.entries.len(), "Fetched repository tree");
        Ok(tree)
    }

    /// Run a read with a per-request timeout, re-issuing it once on a transient failure
    async fn idempotent<T, F, Fut>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let attempt = || with_timeout(self.request_timeout, call(), operation);

        attempt
            .retry(
                ConstantBuilder::default()
                    .with_delay(RETRY_DELAY)
                    .with_max_times(self.retries),
            )
            .when(RepodocError::is_transient)
            .notify(|err: &RepodocError, _| {
                warn!(operation, error = %err, "Transient failure, re-requesting once");
            })
            .await
    }
}
