//! AI Integration Layer
//!
//! Inference provider, prompts, tokenization, timeouts and usage metrics
//! shared by the summarizer and the assembler.

pub mod metrics;
pub mod prompt;
pub mod provider;
pub mod timeout;
pub mod tokenizer;

pub use metrics::{
    InferenceStage, MetricsCollector, MetricsSummary, SharedMetrics, create_shared_metrics,
};
pub use prompt::{PromptBuilder, PromptSection, PromptTemplates};
pub use provider::{
    CompletionRequest, ErrorCategory, ErrorClassifier, LlmError, LlmProvider, LlmResponse,
    OpenAiProvider, ProviderConfig, ResponseMetadata, ResponseTiming, RetryPolicy,
    RetryingProvider, SharedProvider, TokenUsage, create_provider,
};
pub use timeout::{RunGuard, TimeoutConfig, with_timeout};
pub use tokenizer::Tokenizer;
