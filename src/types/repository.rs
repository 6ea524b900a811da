//! Repository-side data model: refs, tree entries, fetched files and
//! remote file state.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::error::{RepodocError, Result};

/// Identifies the target repository and ref. Immutable input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
    /// Branch name, tag, or commit id
    pub reference: String,
}

impl RepositoryRef {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            reference: reference.into(),
        }
    }

    /// Parse `owner/name` plus a separate ref
    pub fn parse(full_name: &str, reference: impl Into<String>) -> Result<Self> {
        let (owner, name) = full_name
            .trim()
            .trim_end_matches(".git")
            .split_once('/')
            .filter(|(o, n)| !o.is_empty() && !n.is_empty() && !n.contains('/'))
            .ok_or_else(|| {
                RepodocError::Config(format!(
                    "Invalid repository '{}': expected owner/name",
                    full_name
                ))
            })?;

        let reference = reference.into();
        if reference.trim().is_empty() {
            return Err(RepodocError::Config("Ref must not be empty".to_string()));
        }

        Ok(Self::new(owner, name, reference))
    }

    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.name, self.reference)
    }
}

/// Source-host access credential, scoped to a single invocation.
///
/// Never logged: `Debug` is redacted and the secret is only exposed when a
/// request header is built.
#[derive(Clone)]
pub struct Credential(SecretString);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    pub fn is_blank(&self) -> bool {
        self.0.expose_secret().trim().is_empty()
    }

    pub(crate) fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One node of the recursive tree listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub kind: EntryKind,
    /// Opaque content-addressed handle (blob id)
    pub content_id: String,
    /// Size in bytes; directories and some hosts report none
    pub size: Option<u64>,
}

impl TreeEntry {
    pub fn file(path: impl Into<String>, content_id: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            content_id: content_id.into(),
            size: Some(size),
        }
    }

    pub fn directory(path: impl Into<String>, content_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            content_id: content_id.into(),
            size: None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Final path component
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Full recursive listing of a resolved ref
#[derive(Debug, Clone)]
pub struct RepositoryTree {
    /// Commit the ref resolved to; content reads are pinned to it
    pub commit_id: String,
    pub entries: Vec<TreeEntry>,
    /// Host stopped listing early
    pub truncated: bool,
}

/// Raw file bytes plus the revision they were read at
#[derive(Debug, Clone)]
pub struct FileContent {
    pub bytes: Vec<u8>,
    pub revision_marker: String,
}

/// A fetched file. `raw_text` is the empty string when the fetch failed; the
/// failure is signalled by `error`, never by content shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub path: String,
    pub size: u64,
    pub raw_text: String,
    pub content_id: String,
    pub error: Option<String>,
}

impl FileCandidate {
    pub fn loaded(entry: &TreeEntry, raw_text: String) -> Self {
        Self {
            path: entry.path.clone(),
            size: entry.size.unwrap_or(raw_text.len() as u64),
            raw_text,
            content_id: entry.content_id.clone(),
            error: None,
        }
    }

    pub fn failed(entry: &TreeEntry, error: impl Into<String>) -> Self {
        Self {
            path: entry.path.clone(),
            size: entry.size.unwrap_or(0),
            raw_text: String::new(),
            content_id: entry.content_id.clone(),
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Believed current state of the publish target, read right before a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileState {
    pub path: String,
    /// Present iff the file exists
    pub revision_marker: Option<String>,
    pub exists: bool,
}

impl RemoteFileState {
    pub fn missing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            revision_marker: None,
            exists: false,
        }
    }

    pub fn existing(path: impl Into<String>, revision_marker: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            revision_marker: Some(revision_marker.into()),
            exists: true,
        }
    }
}

/// Compare-and-swap write request
#[derive(Debug, Clone)]
pub struct PutFileRequest<'a> {
    pub path: &'a str,
    pub content: &'a str,
    pub message: &'a str,
    pub branch: &'a str,
    /// Omitted when creating a file
    pub expected_revision: Option<&'a str>,
}

/// Accepted write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub revision_marker: String,
    /// Where the published file can be read
    pub locator: Option<String>,
    pub commit_locator: Option<String>,
}
