//! Reduce phase: one assembly call over all extracts
//!
//! Successful extracts are fed in `(path, chunk_index)` order until the
//! assembly input budget is spent. Error extracts and extracts that did not
//! fit are named in an omitted list, never passed as text. With no
//! successful extract at all the provider is not called.

use regex::Regex;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::ai::Tokenizer;
use crate::ai::metrics::{InferenceStage, SharedMetrics};
use crate::ai::prompt::PromptTemplates;
use crate::ai::provider::{CompletionRequest, SharedProvider};
use crate::ai::timeout::with_timeout;
use crate::config::LlmConfig;
use crate::constants::pipeline;
use crate::types::{
    ChunkSummary, DocumentKind, RepodocError, RepositoryRef, Result, SynthesizedDocument,
};

/// Budgets for the assembly call
#[derive(Debug, Clone, Copy)]
pub struct AssemblyBudget {
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// Tokens of extract text allowed into the prompt
    pub input_tokens: usize,
}

impl Default for AssemblyBudget {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default(), pipeline::ASSEMBLY_INPUT_TOKENS)
    }
}

impl AssemblyBudget {
    pub fn from_config(config: &LlmConfig, input_tokens: usize) -> Self {
        Self {
            max_output_tokens: config.assembly_max_tokens,
            temperature: config.assembly_temperature,
            input_tokens,
        }
    }
}

/// Which extracts go into the prompt
#[derive(Debug, Default)]
pub struct AssemblyPlan<'a> {
    pub included: Vec<&'a ChunkSummary>,
    pub omitted: Vec<&'a ChunkSummary>,
    pub input_tokens: usize,
}

impl AssemblyPlan<'_> {
    pub fn has_material(&self) -> bool {
        !self.included.is_empty()
    }
}

pub struct DocumentAssembler {
    provider: SharedProvider,
    metrics: SharedMetrics,
    budget: AssemblyBudget,
    request_timeout: Duration,
    tokenizer: Tokenizer,
    title_pattern: Regex,
}

impl DocumentAssembler {
    pub fn new(
        provider: SharedProvider,
        metrics: SharedMetrics,
        budget: AssemblyBudget,
        request_timeout: Duration,
    ) -> Result<Self> {
        let title_pattern = Regex::new(r"(?m)^#[ \t]+(.+?)[ \t#]*$")
            .map_err(|e| RepodocError::Config(format!("Invalid title pattern: {}", e)))?;
        Ok(Self {
            provider,
            metrics,
            budget,
            request_timeout,
            tokenizer: Tokenizer::new(),
            title_pattern,
        })
    }

    /// Split `summaries` (already in key order) into prompt material and
    /// omitted entries. The first successful extract is always included.
    pub fn plan<'a>(&self, summaries: &'a [ChunkSummary]) -> AssemblyPlan<'a> {
        let mut plan = AssemblyPlan::default();
        let mut budget_spent = false;

        for summary in summaries {
            if summary.is_error || budget_spent {
                plan.omitted.push(summary);
                continue;
            }
            let tokens = self.tokenizer.count(&summary.text);
            if plan.has_material() && plan.input_tokens + tokens > self.budget.input_tokens {
                budget_spent = true;
                plan.omitted.push(summary);
                continue;
            }
            plan.input_tokens += tokens;
            plan.included.push(summary);
        }
        plan
    }

    #[instrument(skip_all, fields(repository = %repository, kind = %kind, extracts = summaries.len()))]
    pub async fn assemble(
        &self,
        repository: &RepositoryRef,
        kind: DocumentKind,
        summaries: &[ChunkSummary],
    ) -> Result<SynthesizedDocument> {
        let plan = self.plan(summaries);
        if !plan.has_material() {
            return Err(RepodocError::AssemblyFailed(format!(
                "none of the {} chunk extracts succeeded",
                summaries.len()
            )));
        }
        if !plan.omitted.is_empty() {
            warn!(
                included = plan.included.len(),
                omitted = plan.omitted.len(),
                "Some extracts are left out of the assembly prompt"
            );
        }

        let extracts: Vec<(&str, usize, usize, &str)> = plan
            .included
            .iter()
            .map(|s| (s.path.as_str(), s.chunk_index, s.total_chunks, s.text.as_str()))
            .collect();
        let omitted: Vec<(String, usize, usize)> = plan
            .omitted
            .iter()
            .map(|s| (s.path.clone(), s.chunk_index, s.total_chunks))
            .collect();

        let request = CompletionRequest::new(
            PromptTemplates::assemble_system(kind, repository),
            PromptTemplates::assemble_user(repository, &extracts, &omitted),
            self.budget.max_output_tokens,
            self.budget.temperature,
        );

        let response = match with_timeout(
            self.request_timeout,
            self.provider.complete(&request),
            "assemble document",
        )
        .await
        {
            Ok(response) => response,
            Err(err) => {
                self.metrics.record_failure(InferenceStage::Assembly);
                return Err(RepodocError::AssemblyFailed(err.to_string()));
            }
        };
        self.metrics.record_response(InferenceStage::Assembly, &response);

        let body = response.content.trim();
        if body.is_empty() {
            return Err(RepodocError::AssemblyFailed(
                "model returned an empty document".to_string(),
            ));
        }

        let title = self
            .extract_title(body)
            .unwrap_or_else(|| format!("{} for {}", kind.label(), repository.full_name()));

        info!(
            title = %title,
            input_tokens = plan.input_tokens,
            body_bytes = body.len(),
            "Document assembled"
        );

        Ok(SynthesizedDocument {
            title,
            body: format!("{}\n", body),
            source: repository.clone(),
            kind,
            placeholder: false,
        })
    }

    /// First level-one markdown heading
    pub fn extract_title(&self, body: &str) -> Option<String> {
        self.title_pattern
            .captures(body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|t| !t.is_empty())
    }
}
