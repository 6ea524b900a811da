//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (platform config dir) and project (.repodoc/) level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{binary, inference, network, pipeline};
use crate::types::{DocumentKind, RepodocError, Result, SelectionMode};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Source-hosting API settings
    pub source: SourceConfig,

    /// Inference provider settings
    pub llm: LlmConfig,

    /// Pipeline defaults and tuning
    pub pipeline: PipelineConfig,

    /// File selection policy
    pub selection: SelectionConfig,

    /// Local document record store
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            source: SourceConfig::default(),
            llm: LlmConfig::default(),
            pipeline: PipelineConfig::default(),
            selection: SelectionConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `RepodocError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        for (name, temperature) in [
            ("summary_temperature", self.llm.summary_temperature),
            ("assembly_temperature", self.llm.assembly_temperature),
        ] {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(RepodocError::Config(format!(
                    "LLM {} must be between 0.0 and 2.0, got {}",
                    name, temperature
                )));
            }
        }

        let non_zero = [
            ("llm.timeout_secs", self.llm.timeout_secs as usize),
            ("llm.summary_max_tokens", self.llm.summary_max_tokens as usize),
            ("llm.assembly_max_tokens", self.llm.assembly_max_tokens as usize),
            ("source.timeout_secs", self.source.timeout_secs as usize),
            ("pipeline.max_tokens_per_chunk", self.pipeline.max_tokens_per_chunk),
            ("pipeline.max_file_size_bytes", self.pipeline.max_file_size_bytes as usize),
            ("pipeline.max_publish_retries", self.pipeline.max_publish_retries as usize),
            ("pipeline.overall_timeout_secs", self.pipeline.overall_timeout_secs as usize),
            ("pipeline.fetch_concurrency", self.pipeline.fetch_concurrency),
            ("pipeline.summarize_concurrency", self.pipeline.summarize_concurrency),
            ("pipeline.assembly_input_tokens", self.pipeline.assembly_input_tokens),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(RepodocError::Config(format!(
                "{} must be greater than 0",
                name
            )));
        }

        if !(self.pipeline.binary_threshold > 0.0 && self.pipeline.binary_threshold < 1.0) {
            return Err(RepodocError::Config(format!(
                "pipeline.binary_threshold must be between 0 and 1 (exclusive), got {}",
                self.pipeline.binary_threshold
            )));
        }

        for pattern in &self.selection.deny_patterns {
            glob::Pattern::new(pattern).map_err(|e| {
                RepodocError::Config(format!("Invalid deny pattern '{}': {}", pattern, e))
            })?;
        }

        url::Url::parse(&self.source.api_base).map_err(|e| {
            RepodocError::Config(format!(
                "Invalid source.api_base '{}': {}",
                self.source.api_base, e
            ))
        })?;

        Ok(())
    }
}

// =============================================================================
// Source Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// REST API base URL of the source host
    pub api_base: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_base: network::GITHUB_API_BASE.to_string(),
            timeout_secs: network::SOURCE_TIMEOUT_SECS,
            user_agent: network::USER_AGENT.to_string(),
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name
    pub provider: String,

    /// Model name
    pub model: String,

    /// API key; usually supplied through the environment.
    /// Never serialized to output.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Custom endpoint for OpenAI-compatible APIs
    pub api_base: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Retries for retryable inference failures (rate limit, network, 5xx)
    pub max_retries: usize,

    /// Output budget of a per-chunk extract call
    pub summary_max_tokens: u32,

    /// Low temperature keeps extracts factual
    pub summary_temperature: f32,

    /// Output budget of the single assembly call
    pub assembly_max_tokens: u32,

    pub assembly_temperature: f32,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("summary_max_tokens", &self.summary_max_tokens)
            .field("summary_temperature", &self.summary_temperature)
            .field("assembly_max_tokens", &self.assembly_max_tokens)
            .field("assembly_temperature", &self.assembly_temperature)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            api_base: None,
            timeout_secs: network::LLM_TIMEOUT_SECS,
            max_retries: inference::MAX_HTTP_RETRIES,
            summary_max_tokens: inference::SUMMARY_MAX_OUTPUT_TOKENS,
            summary_temperature: inference::SUMMARY_TEMPERATURE,
            assembly_max_tokens: inference::ASSEMBLY_MAX_OUTPUT_TOKENS,
            assembly_temperature: inference::ASSEMBLY_TEMPERATURE,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_tokens_per_chunk: usize,

    /// Larger files are skipped, not truncated
    pub max_file_size_bytes: u64,

    /// Overrides the document kind's default selection mode when set
    pub selection_mode: Option<SelectionMode>,

    /// Compare-and-swap publish attempts
    pub max_publish_retries: u32,

    /// Wall-clock budget for one run
    pub overall_timeout_secs: u64,

    /// Concurrent content fetches
    pub fetch_concurrency: usize,

    /// Concurrent extract calls
    pub summarize_concurrency: usize,

    /// Suspicious-character density above which a file is binary
    pub binary_threshold: f64,

    /// Token budget of extracts fed into the assembly call
    pub assembly_input_tokens: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_chunk: pipeline::MAX_TOKENS_PER_CHUNK,
            max_file_size_bytes: pipeline::MAX_FILE_SIZE_BYTES,
            selection_mode: None,
            max_publish_retries: pipeline::MAX_PUBLISH_RETRIES,
            overall_timeout_secs: pipeline::OVERALL_TIMEOUT_SECS,
            fetch_concurrency: pipeline::FETCH_CONCURRENCY,
            summarize_concurrency: pipeline::SUMMARIZE_CONCURRENCY,
            binary_threshold: binary::SUSPICIOUS_RATIO,
            assembly_input_tokens: pipeline::ASSEMBLY_INPUT_TOKENS,
        }
    }
}

// =============================================================================
// Selection Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Glob patterns of build output, VCS metadata, dependencies, lockfiles, secrets
    pub deny_patterns: Vec<String>,

    /// Extensions of binary media, archives and objects (no leading dot)
    pub deny_extensions: Vec<String>,

    /// Extensions kept in curated mode
    pub allow_extensions: Vec<String>,

    /// Lowercased file stems kept in curated mode regardless of extension
    pub high_signal_names: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            deny_patterns: strings(&[
                "**/.git/**",
                "**/node_modules/**",
                "**/dist/**",
                "**/build/**",
                "**/coverage/**",
                "**/vendor/**",
                "**/target/**",
                "**/__pycache__/**",
                "**/.venv/**",
                "**/.idea/**",
                "**/.vscode/**",
                "**/*.lock",
                "**/package-lock.json",
                "**/pnpm-lock.yaml",
                "**/go.sum",
                "**/*.min.js",
                "**/*.min.css",
                "**/.env",
                "**/.env.*",
                "**/.DS_Store",
            ]),
            deny_extensions: strings(&[
                "lock", "log", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "bmp", "mp3",
                "mp4", "avi", "mov", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "zip",
                "tar", "gz", "rar", "7z", "eot", "ttf", "woff", "woff2", "exe", "dll", "so",
                "dylib", "class", "jar", "pyc", "o", "obj", "a", "bin", "dat", "bak", "tmp",
                "swp", "wasm",
            ]),
            allow_extensions: strings(&[
                "md", "markdown", "txt", "html", "rst", "adoc", "asciidoc", "tex", "rtf", "ini",
                "toml", "yaml", "yml", "conf", "cfg", "sh", "ps1", "js", "mjs", "ts", "jsx",
                "tsx", "py", "java", "cs", "go", "rb", "php", "swift", "kt", "rs", "c", "cpp",
                "h", "hpp", "xml", "json", "sql", "graphql", "proto", "feature", "css", "scss",
                "less", "sass", "vue", "svelte", "astro", "config",
            ]),
            high_signal_names: strings(&[
                "readme",
                "license",
                "licence",
                "contributing",
                "changelog",
                "code_of_conduct",
                "security",
                "authors",
                "makefile",
                "dockerfile",
            ]),
        }
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path; defaults to the platform data directory
    pub database_path: Option<PathBuf>,
}

// =============================================================================
// Synthesis Options
// =============================================================================

/// Per-invocation options of `synthesize`
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub kind: DocumentKind,
    pub max_tokens_per_chunk: usize,
    pub max_file_size_bytes: u64,
    pub selection_mode: SelectionMode,
    pub max_publish_retries: u32,
    pub overall_timeout: Duration,
    pub fetch_concurrency: usize,
    pub summarize_concurrency: usize,
    pub binary_threshold: f64,
    pub assembly_input_tokens: usize,
    /// Commit message; defaults per document kind
    pub commit_message: Option<String>,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default(), DocumentKind::default())
    }
}

impl SynthesisOptions {
    /// Build options from configured pipeline defaults for a document kind
    pub fn from_config(config: &PipelineConfig, kind: DocumentKind) -> Self {
        Self {
            kind,
            max_tokens_per_chunk: config.max_tokens_per_chunk,
            max_file_size_bytes: config.max_file_size_bytes,
            selection_mode: config
                .selection_mode
                .unwrap_or_else(|| kind.default_selection_mode()),
            max_publish_retries: config.max_publish_retries,
            overall_timeout: Duration::from_secs(config.overall_timeout_secs),
            fetch_concurrency: config.fetch_concurrency,
            summarize_concurrency: config.summarize_concurrency,
            binary_threshold: config.binary_threshold,
            assembly_input_tokens: config.assembly_input_tokens,
            commit_message: None,
        }
    }

    pub fn with_max_tokens_per_chunk(mut self, max_tokens: usize) -> Self {
        self.max_tokens_per_chunk = max_tokens;
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size_bytes = bytes;
        self
    }

    pub fn with_selection_mode(mut self, mode: SelectionMode) -> Self {
        self.selection_mode = mode;
        self
    }

    pub fn with_max_publish_retries(mut self, retries: u32) -> Self {
        self.max_publish_retries = retries;
        self
    }

    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }

    pub fn with_commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = Some(message.into());
        self
    }

    /// Reject option values that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens_per_chunk == 0 {
            return Err(RepodocError::Config(
                "max_tokens_per_chunk must be greater than 0".to_string(),
            ));
        }
        if self.max_publish_retries == 0 {
            return Err(RepodocError::Config(
                "max_publish_retries must be greater than 0".to_string(),
            ));
        }
        if self.overall_timeout.is_zero() {
            return Err(RepodocError::Config(
                "overall timeout must be greater than 0".to_string(),
            ));
        }
        if self.fetch_concurrency == 0 || self.summarize_concurrency == 0 {
            return Err(RepodocError::Config(
                "concurrency limits must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.pipeline.max_tokens_per_chunk, 3000);
        assert_eq!(config.pipeline.max_publish_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.llm.summary_temperature = 3.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.fetch_concurrency = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pipeline.fetch_concurrency"));

        let mut config = Config::default();
        config.pipeline.binary_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.selection.deny_patterns.push("[unclosed".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_llm_config_debug_redacts_key() {
        let config = LlmConfig {
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_options_follow_kind_defaults() {
        let config = PipelineConfig::default();
        let manual = SynthesisOptions::from_config(&config, DocumentKind::UserManual);
        assert_eq!(manual.selection_mode, SelectionMode::Curated);

        let overview = SynthesisOptions::from_config(&config, DocumentKind::Overview);
        assert_eq!(overview.selection_mode, SelectionMode::Full);

        let forced = PipelineConfig {
            selection_mode: Some(SelectionMode::Full),
            ..Default::default()
        };
        let options = SynthesisOptions::from_config(&forced, DocumentKind::UserManual);
        assert_eq!(options.selection_mode, SelectionMode::Full);
    }

    #[test]
    fn test_options_validate() {
        assert!(SynthesisOptions::default().validate().is_ok());
        assert!(
            SynthesisOptions::default()
                .with_max_tokens_per_chunk(0)
                .validate()
                .is_err()
        );
        assert!(
            SynthesisOptions::default()
                .with_overall_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
