//! LLM Provider Abstraction
//!
//! Defines the `LlmProvider` trait: one chat-style completion
//! `(system instruction, user content, max output tokens, temperature) -> text`.
//! The chunk summarizer and the document assembler share it with different
//! prompts and budgets. All providers return `LlmResponse` with token usage.
//!
//! ## Modules
//!
//! - `openai`: OpenAI Chat Completions (and compatible endpoints)
//! - `retry`: capped exponential retry for retryable error categories

mod openai;
mod retry;

pub use openai::OpenAiProvider;
pub use retry::{RetryPolicy, RetryingProvider};

// Re-export error types from centralized location
pub use crate::types::{ErrorCategory, ErrorClassifier, LlmError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::types::{RepodocError, Result};

// =============================================================================
// Completion Request
// =============================================================================

/// A single chat-style completion
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(
        system: impl Into<String>,
        user: impl Into<String>,
        max_output_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_output_tokens,
            temperature,
        }
    }
}

// =============================================================================
// LLM Response with Usage Metrics
// =============================================================================

/// Complete LLM response including content and usage metrics
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Generated text
    pub content: String,
    /// Token usage metrics
    pub usage: TokenUsage,
    /// Response timing
    pub timing: ResponseTiming,
    /// Provider and model info
    pub metadata: ResponseMetadata,
}

impl LlmResponse {
    /// Create response with content only (usage unknown)
    pub fn content_only(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: TokenUsage::default(),
            timing: ResponseTiming::default(),
            metadata: ResponseMetadata::default(),
        }
    }

    pub fn with_metrics(
        content: String,
        usage: TokenUsage,
        timing: ResponseTiming,
        metadata: ResponseMetadata,
    ) -> Self {
        Self {
            content,
            usage,
            timing,
            metadata,
        }
    }
}

/// Token usage metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens (prompt)
    pub input_tokens: u32,
    /// Output tokens (response)
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Create from OpenAI-style usage response
    pub fn from_openai(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            input_tokens: prompt_tokens,
            output_tokens: completion_tokens,
        }
    }
}

/// Wall-clock latency of one call
#[derive(Debug, Clone, Default)]
pub struct ResponseTiming {
    pub total_ms: u64,
}

impl ResponseTiming {
    pub fn from_duration(duration: std::time::Duration) -> Self {
        Self {
            total_ms: duration.as_millis() as u64,
        }
    }
}

/// Response metadata
#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    /// Model used
    pub model: String,
    /// Provider name
    pub provider: String,
}

/// Shared LLM provider type for concurrent access across pipeline stages.
pub type SharedProvider = Arc<dyn LlmProvider + Send + Sync>;

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for LLM providers
///
/// Note: API keys are never serialized to output and are redacted in debug
/// output. Each provider converts the key to SecretString internally.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type: "openai"
    pub provider: String,
    /// Model name (provider-specific)
    pub model: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// API key; never serialized to output
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub api_base: Option<String>,
    /// Retries for retryable failures
    #[serde(default)]
    pub max_retries: usize,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::from_llm_config(&LlmConfig::default())
    }
}

impl ProviderConfig {
    pub fn from_llm_config(config: &LlmConfig) -> Self {
        Self {
            provider: config.provider.clone(),
            model: Some(config.model.clone()),
            timeout_secs: config.timeout_secs,
            api_key: config.api_key.clone(),
            api_base: config.api_base.clone(),
            max_retries: config.max_retries,
        }
    }
}

// =============================================================================
// LLM Provider Trait
// =============================================================================

/// LLM Provider trait for chat-style completion with usage metrics
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one completion. Failures carry an `ErrorCategory` via
    /// `RepodocError::Llm` so callers can decide on retries.
    async fn complete(&self, request: &CompletionRequest) -> Result<LlmResponse>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model name currently in use
    fn model(&self) -> &str;
}

/// Create a shared provider from configuration, wrapped in the capped retry policy
pub fn create_provider(config: &ProviderConfig) -> Result<SharedProvider> {
    let inner: SharedProvider = match config.provider.as_str() {
        "openai" => Arc::new(OpenAiProvider::new(config.clone())?),
        _ => {
            return Err(RepodocError::Config(format!(
                "Unknown provider: {}. Supported: openai",
                config.provider
            )));
        }
    };

    Ok(Arc::new(RetryingProvider::new(
        inner,
        RetryPolicy::with_max_retries(config.max_retries),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_config_debug_redacts_key() {
        let config = ProviderConfig {
            api_key: Some("sk-live".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-live"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = ProviderConfig {
            provider: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown provider"));
    }

    #[test]
    fn test_token_usage_from_openai() {
        let usage = TokenUsage::from_openai(100, 50);
        assert_eq!((usage.input_tokens, usage.output_tokens), (100, 50));
    }
}
