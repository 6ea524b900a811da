//! Document-side data model: kinds, chunks, summaries, the synthesized
//! document and publish results.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{ErrorKind, RepodocError};
use super::repository::RepositoryRef;

/// Which files the selector keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Every textual file that survives the denylist and size bound
    Full,
    /// Only allowlisted extensions and high-signal filenames
    #[default]
    Curated,
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionMode::Full => write!(f, "full"),
            SelectionMode::Curated => write!(f, "curated"),
        }
    }
}

impl std::str::FromStr for SelectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(SelectionMode::Full),
            "curated" => Ok(SelectionMode::Curated),
            _ => Err(format!(
                "Unknown selection mode: {}. Valid values: full, curated",
                s
            )),
        }
    }
}

/// Kind of document the pipeline produces. One pipeline serves every kind;
/// the kind only parameterizes prompts, target path and selection defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    #[default]
    UserManual,
    ContributingGuide,
    ProjectStructure,
    ApiReference,
    Overview,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 5] = [
        DocumentKind::UserManual,
        DocumentKind::ContributingGuide,
        DocumentKind::ProjectStructure,
        DocumentKind::ApiReference,
        DocumentKind::Overview,
    ];

    /// Human-readable label used in titles and commit messages
    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::UserManual => "User Manual",
            DocumentKind::ContributingGuide => "Contributing Guide",
            DocumentKind::ProjectStructure => "Project Structure",
            DocumentKind::ApiReference => "API Reference",
            DocumentKind::Overview => "Project Overview",
        }
    }

    /// Stable identifier used as the storage key
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::UserManual => "user-manual",
            DocumentKind::ContributingGuide => "contributing-guide",
            DocumentKind::ProjectStructure => "project-structure",
            DocumentKind::ApiReference => "api-reference",
            DocumentKind::Overview => "overview",
        }
    }

    pub fn default_target_path(&self) -> &'static str {
        match self {
            DocumentKind::UserManual => "USER_MANUAL.md",
            DocumentKind::ContributingGuide => "CONTRIBUTING.md",
            DocumentKind::ProjectStructure => "PROJECT_STRUCTURE.md",
            DocumentKind::ApiReference => "API_REFERENCE.md",
            DocumentKind::Overview => "OVERVIEW.md",
        }
    }

    pub fn default_selection_mode(&self) -> SelectionMode {
        match self {
            DocumentKind::Overview => SelectionMode::Full,
            _ => SelectionMode::Curated,
        }
    }

    pub fn default_commit_message(&self, repository: &RepositoryRef) -> String {
        format!(
            "docs: generate {} for {}",
            self.label().to_lowercase(),
            repository.full_name()
        )
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace('_', "-");
        DocumentKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "Unknown document kind: {}. Valid values: {}",
                    s,
                    DocumentKind::ALL.map(|k| k.as_str()).join(", ")
                )
            })
    }
}

/// Token-bounded slice of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenChunk {
    pub path: String,
    /// Zero-based
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// Concatenation of the slice's tokens
    pub text: String,
    pub token_count: usize,
}

/// Per-chunk extract. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSummary {
    pub path: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// Extract text, or a human-readable failure note when `is_error`
    pub text: String,
    pub is_error: bool,
}

impl ChunkSummary {
    pub fn success(chunk: &TokenChunk, text: impl Into<String>) -> Self {
        Self {
            path: chunk.path.clone(),
            chunk_index: chunk.chunk_index,
            total_chunks: chunk.total_chunks,
            text: text.into(),
            is_error: false,
        }
    }

    pub fn failure(chunk: &TokenChunk, error: &RepodocError) -> Self {
        Self {
            path: chunk.path.clone(),
            chunk_index: chunk.chunk_index,
            total_chunks: chunk.total_chunks,
            text: format!(
                "Error summarizing chunk {}/{} of {}: {}",
                chunk.chunk_index + 1,
                chunk.total_chunks,
                chunk.path,
                error
            ),
            is_error: true,
        }
    }

    /// Ordering key used to restore deterministic order before assembly
    pub fn order_key(&self) -> (&str, usize) {
        (&self.path, self.chunk_index)
    }
}

/// The reduce output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizedDocument {
    pub title: String,
    /// Markdown body
    pub body: String,
    pub source: RepositoryRef,
    pub kind: DocumentKind,
    /// Stand-in produced without a successful assembly call
    pub placeholder: bool,
}

impl SynthesizedDocument {
    /// Placeholder used when there is nothing to assemble from
    pub fn placeholder(source: &RepositoryRef, kind: DocumentKind, reason: &str) -> Self {
        let title = format!("{} for {}", kind.label(), source.full_name());
        let body = format!(
            "# {}\n\n{}\n\nThe repository may need more readable, documentation-friendly \
             content (a README, source files, or usage guides) before this document can be \
             generated.\n",
            title, reason
        );
        Self {
            title,
            body,
            source: source.clone(),
            kind,
            placeholder: true,
        }
    }
}

/// Why publishing stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&RepodocError> for PublishFailure {
    fn from(err: &RepodocError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for PublishFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Terminal result of the publisher; never mutated after return
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub success: bool,
    pub new_revision_marker: Option<String>,
    pub remote_locator: Option<String>,
    pub commit_locator: Option<String>,
    pub attempts: u32,
    pub error: Option<PublishFailure>,
}

impl PublishResult {
    pub fn committed(
        revision_marker: String,
        remote_locator: Option<String>,
        commit_locator: Option<String>,
        attempts: u32,
    ) -> Self {
        Self {
            success: true,
            new_revision_marker: Some(revision_marker),
            remote_locator,
            commit_locator,
            attempts,
            error: None,
        }
    }

    pub fn failed(error: &RepodocError, attempts: u32) -> Self {
        Self {
            success: false,
            new_revision_marker: None,
            remote_locator: None,
            commit_locator: None,
            attempts,
            error: Some(PublishFailure::from(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_kind_roundtrip_str() {
        for kind in DocumentKind::ALL {
            assert_eq!(kind.as_str().parse::<DocumentKind>().unwrap(), kind);
        }
        assert_eq!(
            "USER_MANUAL".parse::<DocumentKind>().unwrap(),
            DocumentKind::UserManual
        );
        assert!("novel".parse::<DocumentKind>().is_err());
    }

    #[test]
    fn test_kind_defaults() {
        assert_eq!(
            DocumentKind::ContributingGuide.default_target_path(),
            "CONTRIBUTING.md"
        );
        assert_eq!(
            DocumentKind::Overview.default_selection_mode(),
            SelectionMode::Full
        );
        assert_eq!(
            DocumentKind::UserManual.default_selection_mode(),
            SelectionMode::Curated
        );
    }

    #[test]
    fn test_placeholder_document() {
        let repo = RepositoryRef::new("octo", "widgets", "main");
        let doc = SynthesizedDocument::placeholder(&repo, DocumentKind::UserManual, "Nothing found.");
        assert!(doc.placeholder);
        assert_eq!(doc.title, "User Manual for octo/widgets");
        assert!(doc.body.starts_with("# User Manual for octo/widgets"));
        assert!(doc.body.contains("Nothing found."));
    }

    #[test]
    fn test_failure_summary_note() {
        let chunk = TokenChunk {
            path: "src/a.rs".to_string(),
            chunk_index: 1,
            total_chunks: 3,
            text: "fn a() {}".to_string(),
            token_count: 6,
        };
        let err = RepodocError::timeout("summarize", std::time::Duration::from_secs(5));
        let summary = ChunkSummary::failure(&chunk, &err);
        assert!(summary.is_error);
        assert!(summary.text.contains("chunk 2/3 of src/a.rs"));
        assert_eq!(summary.order_key(), ("src/a.rs", 1));
    }
}
