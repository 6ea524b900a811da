//! GitHub REST API Source Host
//!
//! - Ref resolution: `GET /repos/{owner}/{repo}/commits/{ref}` (sha media type)
//! - Tree: `GET /repos/{owner}/{repo}/git/trees/{sha}?recursive=1`
//! - Content: `GET /repos/{owner}/{repo}/contents/{path}?ref=`, falling back to
//!   `GET /repos/{owner}/{repo}/git/blobs/{sha}` when content is not inlined
//! - Publish: `PUT /repos/{owner}/{repo}/contents/{path}` with the blob sha
//!   as the compare-and-swap revision marker

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::SourceHost;
use crate::config::SourceConfig;
use crate::types::{
    CommitReceipt, Credential, EntryKind, FileContent, PutFileRequest, RemoteFileState,
    RepodocError, RepositoryRef, RepositoryTree, Result, TreeEntry,
};

const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_SHA: &str = "application/vnd.github.sha";
const API_VERSION: &str = "2022-11-28";

/// GitHub source host
#[derive(Debug, Clone)]
pub struct GitHubHost {
    api_base: Url,
    client: reqwest::Client,
}

impl GitHubHost {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let api_base = Url::parse(&config.api_base).map_err(|e| {
            RepodocError::Config(format!("Invalid source API base '{}': {}", config.api_base, e))
        })?;

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()
            .map_err(|e| RepodocError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { api_base, client })
    }

    /// `{base}/repos/{owner}/{repo}/{segments...}` with each segment percent-encoded
    fn endpoint<'a>(
        &self,
        repository: &RepositoryRef,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| RepodocError::Config("Source API base cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(["repos", repository.owner.as_str(), repository.name.as_str()])
            .extend(segments);
        Ok(url)
    }

    fn contents_url(&self, repository: &RepositoryRef, path: &str) -> Result<Url> {
        self.endpoint(
            repository,
            std::iter::once("contents").chain(path.split('/').filter(|s| !s.is_empty())),
        )
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: Url,
        credential: &Credential,
    ) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(credential.expose())
            .header(reqwest::header::ACCEPT, ACCEPT_JSON)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        repository: &RepositoryRef,
        reference: &str,
    ) -> Result<reqwest::Response> {
        let response = builder.send().await.map_err(|e| {
            RepodocError::UpstreamUnavailable(format!("GitHub request failed: {}", e))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, &body, repository, reference))
    }

    async fn decode_blob(
        &self,
        repository: &RepositoryRef,
        content_id: &str,
        credential: &Credential,
    ) -> Result<Vec<u8>> {
        let url = self.endpoint(repository, ["git", "blobs", content_id])?;
        let response = self
            .send(
                self.request(reqwest::Method::GET, url, credential),
                repository,
                &repository.reference,
            )
            .await?;
        let blob: BlobResponse = response.json().await.map_err(parse_error)?;
        decode_content(&blob.content, &blob.encoding)
    }
}

#[async_trait]
impl SourceHost for GitHubHost {
    async fn resolve_ref(
        &self,
        repository: &RepositoryRef,
        credential: &Credential,
    ) -> Result<String> {
        let url = self.endpoint(
            repository,
            std::iter::once("commits").chain(repository.reference.split('/')),
        )?;
        let response = self
            .send(
                self.request(reqwest::Method::GET, url, credential)
                    .header(reqwest::header::ACCEPT, ACCEPT_SHA),
                repository,
                &repository.reference,
            )
            .await?;

        let sha = response.text().await.map_err(parse_error)?.trim().to_string();
        if sha.is_empty() {
            return Err(RepodocError::RefNotFound {
                repository: repository.full_name(),
                reference: repository.reference.clone(),
            });
        }
        debug!(reference = %repository.reference, commit = %sha, "Resolved ref");
        Ok(sha)
    }

    async fn list_tree(
        &self,
        repository: &RepositoryRef,
        commit_id: &str,
        credential: &Credential,
    ) -> Result<RepositoryTree> {
        let mut url = self.endpoint(repository, ["git", "trees", commit_id])?;
        url.query_pairs_mut().append_pair("recursive", "1");

        let response = self
            .send(
                self.request(reqwest::Method::GET, url, credential),
                repository,
                &repository.reference,
            )
            .await?;
        let tree: TreeResponse = response.json().await.map_err(parse_error)?;
        Ok(tree.into_repository_tree(commit_id))
    }

    async fn get_file_content(
        &self,
        repository: &RepositoryRef,
        path: &str,
        reference: &str,
        content_id: &str,
        credential: &Credential,
    ) -> Result<FileContent> {
        let mut url = self.contents_url(repository, path)?;
        url.query_pairs_mut().append_pair("ref", reference);

        let response = self
            .send(
                self.request(reqwest::Method::GET, url, credential),
                repository,
                reference,
            )
            .await?;
        let contents: ContentsResponse = response.json().await.map_err(parse_error)?;

        let bytes = match (contents.content.as_deref(), contents.encoding.as_deref()) {
            (Some(content), Some("base64")) => decode_content(content, "base64")?,
            _ => {
                // Files above the inline limit come back with encoding "none"
                debug!(path, "Content not inlined, reading blob");
                self.decode_blob(repository, content_id, credential).await?
            }
        };

        Ok(FileContent {
            bytes,
            revision_marker: contents.sha,
        })
    }

    async fn get_file_state(
        &self,
        repository: &RepositoryRef,
        path: &str,
        branch: &str,
        credential: &Credential,
    ) -> Result<RemoteFileState> {
        let mut url = self.contents_url(repository, path)?;
        url.query_pairs_mut().append_pair("ref", branch);

        let response = self
            .request(reqwest::Method::GET, url, credential)
            .send()
            .await
            .map_err(|e| {
                RepodocError::UpstreamUnavailable(format!("GitHub request failed: {}", e))
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(RemoteFileState::missing(path));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body, repository, branch));
        }

        let contents: ContentsResponse = response.json().await.map_err(parse_error)?;
        Ok(RemoteFileState::existing(path, contents.sha))
    }

    async fn put_file(
        &self,
        repository: &RepositoryRef,
        request: PutFileRequest<'_>,
        credential: &Credential,
    ) -> Result<CommitReceipt> {
        let url = self.contents_url(repository, request.path)?;
        let body = PutContentsBody {
            message: request.message,
            content: STANDARD.encode(request.content.as_bytes()),
            branch: request.branch,
            sha: request.expected_revision,
        };

        let response = self
            .request(reqwest::Method::PUT, url, credential)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                RepodocError::UpstreamUnavailable(format!("GitHub request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if is_revision_conflict(status, &text) {
                warn!(path = request.path, %status, "Write rejected: stale revision marker");
                return Err(RepodocError::RevisionConflict {
                    path: request.path.to_string(),
                });
            }
            return Err(map_status(status, &text, repository, request.branch));
        }

        let put: PutContentsResponse = response.json().await.map_err(parse_error)?;
        Ok(CommitReceipt {
            revision_marker: put.content.sha,
            locator: put.content.html_url,
            commit_locator: put.commit.html_url,
        })
    }

    fn name(&self) -> &str {
        "github"
    }
}

// =============================================================================
// Status and Content Mapping
// =============================================================================

/// Map a non-success status to the error taxonomy
fn map_status(
    status: StatusCode,
    body: &str,
    repository: &RepositoryRef,
    reference: &str,
) -> RepodocError {
    let message = api_message(body).unwrap_or_else(|| body.chars().take(200).collect());
    match status {
        StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY
            if status == StatusCode::NOT_FOUND || message.to_lowercase().contains("no commit") =>
        {
            RepodocError::RefNotFound {
                repository: repository.full_name(),
                reference: reference.to_string(),
            }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RepodocError::AccessDenied(format!("GitHub returned {}: {}", status, message))
        }
        StatusCode::PAYLOAD_TOO_LARGE => {
            RepodocError::PayloadTooLarge(format!("GitHub returned {}: {}", status, message))
        }
        _ => RepodocError::UpstreamUnavailable(format!("GitHub returned {}: {}", status, message)),
    }
}

/// 409, or 422 complaining about the sha (a concurrent create or stale marker)
fn is_revision_conflict(status: StatusCode, body: &str) -> bool {
    match status {
        StatusCode::CONFLICT => true,
        StatusCode::UNPROCESSABLE_ENTITY => api_message(body)
            .unwrap_or_else(|| body.to_string())
            .to_lowercase()
            .contains("sha"),
        _ => false,
    }
}

fn api_message(body: &str) -> Option<String> {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .map(|err| err.message)
}

/// Decode a GitHub content payload; base64 arrives wrapped at 60 columns
fn decode_content(content: &str, encoding: &str) -> Result<Vec<u8>> {
    match encoding {
        "base64" => {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            STANDARD.decode(compact).map_err(|e| {
                RepodocError::UpstreamUnavailable(format!("Invalid base64 content: {}", e))
            })
        }
        "utf-8" | "utf8" => Ok(content.as_bytes().to_vec()),
        other => Err(RepodocError::UpstreamUnavailable(format!(
            "Unsupported content encoding: {}",
            other
        ))),
    }
}

fn parse_error(err: reqwest::Error) -> RepodocError {
    RepodocError::UpstreamUnavailable(format!("Malformed GitHub response: {}", err))
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    item_type: String,
    sha: String,
    size: Option<u64>,
}

impl TreeResponse {
    fn into_repository_tree(self, commit_id: &str) -> RepositoryTree {
        let entries = self
            .tree
            .into_iter()
            .filter_map(|item| {
                let kind = match item.item_type.as_str() {
                    "blob" => EntryKind::File,
                    "tree" => EntryKind::Directory,
                    // Submodule commits have no content in this repository
                    _ => return None,
                };
                Some(TreeEntry {
                    path: item.path,
                    kind,
                    content_id: item.sha,
                    size: item.size,
                })
            })
            .collect();

        RepositoryTree {
            commit_id: commit_id.to_string(),
            entries,
            truncated: self.truncated,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    content: Option<String>,
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    content: String,
    encoding: String,
}

#[derive(Debug, Serialize)]
struct PutContentsBody<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: PutContentInfo,
    commit: PutCommitInfo,
}

#[derive(Debug, Deserialize)]
struct PutContentInfo {
    sha: String,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PutCommitInfo {
    html_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> GitHubHost {
        GitHubHost::new(&SourceConfig::default()).unwrap()
    }

    fn repo() -> RepositoryRef {
        RepositoryRef::new("octo", "widgets", "main")
    }

    #[test]
    fn test_contents_url_encodes_segments() {
        let url = host().contents_url(&repo(), "docs/user guide.md").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/octo/widgets/contents/docs/user%20guide.md"
        );
    }

    #[test]
    fn test_endpoint_respects_base_path() {
        let config = SourceConfig {
            api_base: "https://ghe.example.com/api/v3/".to_string(),
            ..Default::default()
        };
        let host = GitHubHost::new(&config).unwrap();
        let url = host.endpoint(&repo(), ["git", "trees", "abc"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/repos/octo/widgets/git/trees/abc"
        );
    }

    #[test]
    fn test_decode_wrapped_base64() {
        let bytes = decode_content("aGVsbG8g\nd29ybGQ=\n", "base64").unwrap();
        assert_eq!(bytes, b"hello world");
        assert!(decode_content("!!!", "base64").is_err());
        assert!(decode_content("x", "none").is_err());
    }

    #[test]
    fn test_status_mapping() {
        let repo = repo();
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, "", &repo, "dev"),
            RepodocError::RefNotFound { ref reference, .. } if reference == "dev"
        ));
        assert!(matches!(
            map_status(
                StatusCode::UNPROCESSABLE_ENTITY,
                r#"{"message":"No commit found for SHA: dev"}"#,
                &repo,
                "dev"
            ),
            RepodocError::RefNotFound { .. }
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, "{}", &repo, "main"),
            RepodocError::AccessDenied(_)
        ));
        assert!(matches!(
            map_status(StatusCode::PAYLOAD_TOO_LARGE, "", &repo, "main"),
            RepodocError::PayloadTooLarge(_)
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY, "", &repo, "main"),
            RepodocError::UpstreamUnavailable(_)
        ));
    }

    #[test]
    fn test_revision_conflict_detection() {
        assert!(is_revision_conflict(StatusCode::CONFLICT, ""));
        assert!(is_revision_conflict(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"Invalid request.\n\n\"sha\" wasn't supplied."}"#
        ));
        assert!(!is_revision_conflict(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"Validation Failed"}"#
        ));
        assert!(!is_revision_conflict(StatusCode::FORBIDDEN, ""));
    }

    #[test]
    fn test_tree_response_conversion() {
        let raw = r#"{
            "sha": "abc",
            "truncated": true,
            "tree": [
                {"path": "src", "type": "tree", "sha": "t1"},
                {"path": "src/lib.rs", "type": "blob", "sha": "b1", "size": 120},
                {"path": "vendor/dep", "type": "commit", "sha": "c1"}
            ]
        }"#;
        let tree: TreeResponse = serde_json::from_str(raw).unwrap();
        let tree = tree.into_repository_tree("abc");

        assert!(tree.truncated);
        assert_eq!(tree.entries.len(), 2);
        assert_eq!(tree.entries[1], TreeEntry::file("src/lib.rs", "b1", 120));
        assert!(!tree.entries[0].is_file());
    }

    #[test]
    fn test_put_body_omits_sha_on_create() {
        let body = PutContentsBody {
            message: "docs",
            content: STANDARD.encode("# Title"),
            branch: "main",
            sha: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("sha").is_none());
        assert_eq!(json["content"], "IyBUaXRsZQ==");
    }
}
