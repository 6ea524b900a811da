//! Unified Error Type System
//!
//! Centralized error types for the entire crate.
//!
//! ## Error Kinds
//!
//! Every `RepodocError` maps onto a small `ErrorKind` taxonomy that callers
//! match on instead of inspecting messages:
//!
//! - **Fatal to a run**: `SelectionEmpty`, `AssemblyFailed`, `Timeout`,
//!   `Cancelled`, `MissingCredential`, and tree-level read failures
//! - **Absorbed per item**: per-file read failures, `ChunkSummaryError`
//! - **Fatal to publishing only**: `PublishConflict`, `PayloadTooLarge`
//!
//! Inference failures additionally carry an `ErrorCategory` which drives the
//! capped HTTP-level retry policy.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories (inference)
// =============================================================================

/// Inference error categories for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited - wait then retry
    RateLimit,
    /// Context/token limit exceeded - retrying the same request cannot help
    TokenLimit,
    /// Authentication failed - fail fast
    Auth,
    /// Network/connectivity issues - retry with backoff
    Network,
    /// Invalid request - don't retry, fix request
    BadRequest,
    /// Response could not be parsed
    ParseError,
    /// Temporary server issues - retry
    Transient,
    /// Unknown error - not retried
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::TokenLimit => write!(f, "TOKEN_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::Network => write!(f, "NETWORK"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::ParseError => write!(f, "PARSE_ERROR"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Check if this category is worth another attempt at the HTTP layer
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Network | Self::Transient)
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// Inference error with category and provider context
#[derive(Debug, Clone)]
pub struct LlmError {
    /// Error category for routing decisions
    pub category: ErrorCategory,
    /// Detailed error message
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
    /// Suggested wait time before retry (if applicable)
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            provider: None,
            retry_after: None,
        }
    }

    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            provider: Some(provider.into()),
            retry_after: None,
        }
    }

    /// Add suggested retry delay
    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Classifies inference failures into categories
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an error message (used for transport errors without a status)
    pub fn classify(message: &str, provider: &str) -> LlmError {
        let lower = message.to_lowercase();

        if lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("quota exceeded")
        {
            return LlmError::with_provider(ErrorCategory::RateLimit, message, provider)
                .retry_after(Duration::from_secs(30));
        }

        if lower.contains("token")
            && (lower.contains("limit") || lower.contains("exceed") || lower.contains("maximum"))
            || lower.contains("context length")
        {
            return LlmError::with_provider(ErrorCategory::TokenLimit, message, provider);
        }

        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
            || lower.contains("unauthorized")
        {
            return LlmError::with_provider(ErrorCategory::Auth, message, provider);
        }

        if lower.contains("network")
            || lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("timed out")
            || lower.contains("timeout")
        {
            return LlmError::with_provider(ErrorCategory::Network, message, provider)
                .retry_after(Duration::from_secs(5));
        }

        if lower.contains("502")
            || lower.contains("503")
            || lower.contains("overloaded")
            || lower.contains("temporar")
        {
            return LlmError::with_provider(ErrorCategory::Transient, message, provider)
                .retry_after(Duration::from_secs(2));
        }

        if lower.contains("parse") || lower.contains("json") || lower.contains("decode") {
            return LlmError::with_provider(ErrorCategory::ParseError, message, provider);
        }

        LlmError::with_provider(ErrorCategory::Unknown, message, provider)
    }

    /// Classify HTTP status code directly (more accurate than string matching)
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> LlmError {
        match status {
            429 => LlmError::with_provider(ErrorCategory::RateLimit, message, provider)
                .retry_after(Duration::from_secs(30)),
            401 | 403 => LlmError::with_provider(ErrorCategory::Auth, message, provider),
            400 | 404 | 422 => {
                // Context overflows come back as 400 with a descriptive body
                let classified = Self::classify(message, provider);
                if classified.category == ErrorCategory::TokenLimit {
                    classified
                } else {
                    LlmError::with_provider(ErrorCategory::BadRequest, message, provider)
                }
            }
            500 | 502 | 503 | 504 => {
                LlmError::with_provider(ErrorCategory::Transient, message, provider)
                    .retry_after(Duration::from_secs(5))
            }
            _ => LlmError::with_provider(ErrorCategory::Unknown, message, provider),
        }
    }
}

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification of every crate error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RefNotFound,
    AccessDenied,
    UpstreamUnavailable,
    SelectionEmpty,
    ChunkSummaryError,
    AssemblyFailed,
    PublishConflict,
    RevisionConflict,
    PayloadTooLarge,
    Timeout,
    Cancelled,
    MissingCredential,
    Inference,
    Config,
    Storage,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::RefNotFound => "REF_NOT_FOUND",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            Self::SelectionEmpty => "SELECTION_EMPTY",
            Self::ChunkSummaryError => "CHUNK_SUMMARY_ERROR",
            Self::AssemblyFailed => "ASSEMBLY_FAILED",
            Self::PublishConflict => "PUBLISH_CONFLICT",
            Self::RevisionConflict => "REVISION_CONFLICT",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::MissingCredential => "MISSING_CREDENTIAL",
            Self::Inference => "INFERENCE",
            Self::Config => "CONFIG",
            Self::Storage => "STORAGE",
            Self::Internal => "INTERNAL",
        };
        f.write_str(label)
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum RepodocError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Source Host Errors
    // -------------------------------------------------------------------------
    #[error("Ref '{reference}' not found in {repository}")]
    RefNotFound {
        repository: String,
        reference: String,
    },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A single compare-and-swap write was rejected because the supplied
    /// revision marker no longer matches the remote file
    #[error("Revision conflict writing {path}")]
    RevisionConflict { path: String },

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    // -------------------------------------------------------------------------
    // Pipeline Errors
    // -------------------------------------------------------------------------
    #[error("No eligible files remained after selection ({considered} tree entries considered)")]
    SelectionEmpty { considered: usize },

    #[error("Summarizing chunk {chunk}/{total} of {path} failed: {message}")]
    ChunkSummary {
        path: String,
        chunk: usize,
        total: usize,
        message: String,
    },

    #[error("Document assembly failed: {0}")]
    AssemblyFailed(String),

    #[error("Publishing {path} conflicted on all {attempts} attempts")]
    PublishConflict { path: String, attempts: u32 },

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    // -------------------------------------------------------------------------
    // Inference Errors
    // -------------------------------------------------------------------------
    #[error("LLM error: {0}")]
    Llm(LlmError),

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<LlmError> for RepodocError {
    fn from(err: LlmError) -> Self {
        RepodocError::Llm(err)
    }
}

pub type Result<T> = std::result::Result<T, RepodocError>;

impl RepodocError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Taxonomy entry for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RefNotFound { .. } => ErrorKind::RefNotFound,
            Self::AccessDenied(_) => ErrorKind::AccessDenied,
            Self::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            Self::RevisionConflict { .. } => ErrorKind::RevisionConflict,
            Self::PayloadTooLarge(_) => ErrorKind::PayloadTooLarge,
            Self::SelectionEmpty { .. } => ErrorKind::SelectionEmpty,
            Self::ChunkSummary { .. } => ErrorKind::ChunkSummaryError,
            Self::AssemblyFailed(_) => ErrorKind::AssemblyFailed,
            Self::PublishConflict { .. } => ErrorKind::PublishConflict,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::MissingCredential(_) => ErrorKind::MissingCredential,
            Self::Llm(_) => ErrorKind::Inference,
            Self::Config(_) => ErrorKind::Config,
            Self::Storage(_) | Self::Database(_) => ErrorKind::Storage,
            Self::Io(_) | Self::Json(_) => ErrorKind::Internal,
        }
    }

    /// Whether an idempotent read may be re-issued once
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_) | Self::Timeout { .. })
    }

    /// Whether an inference call may be retried at the HTTP layer
    pub fn is_retryable_inference(&self) -> bool {
        match self {
            Self::Llm(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Context extension trait for adding context to storage-level errors
pub trait ResultExt<T> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| RepodocError::Storage(format!("{}: {}", context.into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::RateLimit.is_retryable());
        assert!(ErrorCategory::Network.is_retryable());
        assert!(ErrorCategory::Transient.is_retryable());
        assert!(!ErrorCategory::Auth.is_retryable());
        assert!(!ErrorCategory::BadRequest.is_retryable());
        assert!(!ErrorCategory::TokenLimit.is_retryable());
    }

    #[test]
    fn test_classify_rate_limit() {
        let err = ErrorClassifier::classify("Rate limit exceeded, please retry", "openai");
        assert_eq!(err.category, ErrorCategory::RateLimit);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_network() {
        let err = ErrorClassifier::classify("Connection timed out after 30s", "openai");
        assert_eq!(err.category, ErrorCategory::Network);
    }

    #[test]
    fn test_classify_http_status() {
        let rate_limit = ErrorClassifier::classify_http_status(429, "Rate limited", "test");
        assert_eq!(rate_limit.category, ErrorCategory::RateLimit);

        let auth = ErrorClassifier::classify_http_status(401, "Unauthorized", "test");
        assert_eq!(auth.category, ErrorCategory::Auth);

        let server = ErrorClassifier::classify_http_status(503, "unavailable", "test");
        assert_eq!(server.category, ErrorCategory::Transient);

        let overflow = ErrorClassifier::classify_http_status(
            400,
            "This model's maximum context length is 128000 tokens",
            "test",
        );
        assert_eq!(overflow.category, ErrorCategory::TokenLimit);
    }

    #[test]
    fn test_error_kind_mapping() {
        let err = RepodocError::SelectionEmpty { considered: 3 };
        assert_eq!(err.kind(), ErrorKind::SelectionEmpty);

        let err = RepodocError::timeout("tree", Duration::from_secs(1));
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.is_transient());

        let err = RepodocError::AccessDenied("no scope".to_string());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::with_provider(ErrorCategory::RateLimit, "Too many requests", "openai");
        assert_eq!(err.to_string(), "[openai:RATE_LIMIT] Too many requests");
        assert!(RepodocError::from(err).is_retryable_inference());
    }
}
