//! Global Constants
//!
//! Centralized defaults for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Pipeline defaults
pub mod pipeline {
    /// Maximum tokens per summarized chunk
    pub const MAX_TOKENS_PER_CHUNK: usize = 3000;

    /// Files larger than this are skipped, not truncated (bytes)
    pub const MAX_FILE_SIZE_BYTES: u64 = 120_000;

    /// Compare-and-swap publish attempts before giving up
    pub const MAX_PUBLISH_RETRIES: u32 = 3;

    /// Wall-clock budget for a whole run (seconds)
    pub const OVERALL_TIMEOUT_SECS: u64 = 900;

    /// Concurrent content fetches
    pub const FETCH_CONCURRENCY: usize = 8;

    /// Concurrent chunk summarization calls
    pub const SUMMARIZE_CONCURRENCY: usize = 4;

    /// Token budget for the extracts fed into the single assembly call
    pub const ASSEMBLY_INPUT_TOKENS: usize = 60_000;
}

/// Binary-content heuristic
pub mod binary {
    /// Density of suspicious characters above which a file is binary
    pub const SUSPICIOUS_RATIO: f64 = 0.01;

    /// Files with at most this many suspicious characters are always text
    pub const MIN_SUSPICIOUS_CHARS: usize = 10;
}

/// Inference call budgets
pub mod inference {
    pub const SUMMARY_MAX_OUTPUT_TOKENS: u32 = 400;
    pub const SUMMARY_TEMPERATURE: f32 = 0.1;
    pub const ASSEMBLY_MAX_OUTPUT_TOKENS: u32 = 3800;
    pub const ASSEMBLY_TEMPERATURE: f32 = 0.3;

    /// Retries at the HTTP layer for retryable inference failures
    pub const MAX_HTTP_RETRIES: usize = 2;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 500;

    /// Maximum delay between retries (seconds)
    pub const MAX_DELAY_SECS: u64 = 30;
}

/// HTTP/Network constants
pub mod network {
    /// Inference request timeout (seconds)
    pub const LLM_TIMEOUT_SECS: u64 = 120;

    /// Source-host request timeout (seconds)
    pub const SOURCE_TIMEOUT_SECS: u64 = 30;

    /// Re-requests of an idempotent tree listing on transient failure
    pub const TREE_RETRIES: usize = 1;

    pub const GITHUB_API_BASE: &str = "https://api.github.com";

    pub const USER_AGENT: &str = concat!("repodoc/", env!("CARGO_PKG_VERSION"));
}
