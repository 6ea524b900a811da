//! Prompt Builder System
//!
//! Standardized prompt construction for the two inference calls of a run:
//! the per-chunk extract (map) and the single document assembly (reduce).
//! One template per call, parameterized by `DocumentKind`.
//!
//! ## Design Principles
//!
//! 1. **Role Definition**: Clear AI role for each task
//! 2. **Structured Objectives**: Numbered goals
//! 3. **Context Sections**: Ordered key-value input data
//! 4. **Focus Enforcement**: Prevent topic drift and invented facts

use crate::types::{DocumentKind, RepositoryRef};

/// Prompt section types
#[derive(Debug, Clone)]
pub enum PromptSection {
    /// Role definition with expertise area
    Role { expertise: String, task: String },
    /// Numbered objectives
    Objectives(Vec<String>),
    /// Context with ordered key-value pairs
    Context(Vec<(String, String)>),
    /// Raw text section with optional header
    Text {
        header: Option<String>,
        content: String,
    },
    /// Fenced block with optional language
    Code { language: String, content: String },
    /// Focus enforcement with restrictions
    Focus {
        target: String,
        restrictions: Vec<String>,
    },
    /// Custom section
    Custom(String),
}

/// Prompt builder for consistent prompt construction
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<PromptSection>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a role definition section
    pub fn role(mut self, expertise: &str, task: &str) -> Self {
        self.sections.push(PromptSection::Role {
            expertise: expertise.to_string(),
            task: task.to_string(),
        });
        self
    }

    /// Add objectives section
    pub fn objectives<I, S>(mut self, objectives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sections.push(PromptSection::Objectives(
            objectives.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Add a context item, appending to the first context section
    pub fn context_item(mut self, key: &str, value: &str) -> Self {
        let existing = self.sections.iter_mut().find_map(|section| match section {
            PromptSection::Context(items) => Some(items),
            _ => None,
        });
        match existing {
            Some(items) => items.push((key.to_string(), value.to_string())),
            None => self.sections.push(PromptSection::Context(vec![(
                key.to_string(),
                value.to_string(),
            )])),
        }
        self
    }

    /// Add text section
    pub fn text(mut self, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: None,
            content: content.to_string(),
        });
        self
    }

    /// Add text section with header
    pub fn section(mut self, header: &str, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: Some(header.to_string()),
            content: content.to_string(),
        });
        self
    }

    /// Add fenced block
    pub fn code(mut self, language: &str, content: &str) -> Self {
        self.sections.push(PromptSection::Code {
            language: language.to_string(),
            content: content.to_string(),
        });
        self
    }

    /// Add focus enforcement section
    pub fn focus<I, S>(mut self, target: &str, restrictions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sections.push(PromptSection::Focus {
            target: target.to_string(),
            restrictions: restrictions.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Add custom section
    pub fn custom(mut self, content: &str) -> Self {
        self.sections
            .push(PromptSection::Custom(content.to_string()));
        self
    }

    /// Build the final prompt string
    pub fn build(self) -> String {
        let mut prompt = String::new();

        for section in self.sections {
            match section {
                PromptSection::Role { expertise, task } => {
                    prompt.push_str("<ROLE>\n");
                    prompt.push_str(&format!(
                        "You are an expert {} specializing in {}.\n",
                        expertise, task
                    ));
                    prompt.push_str("</ROLE>\n\n");
                }
                PromptSection::Objectives(objectives) => {
                    prompt.push_str("<OBJECTIVES>\n");
                    for (i, obj) in objectives.iter().enumerate() {
                        prompt.push_str(&format!("{}. {}\n", i + 1, obj));
                    }
                    prompt.push_str("</OBJECTIVES>\n\n");
                }
                PromptSection::Context(items) => {
                    prompt.push_str("# Context\n\n");
                    for (key, value) in items {
                        prompt.push_str(&format!("**{}**: {}\n", key, value));
                    }
                    prompt.push('\n');
                }
                PromptSection::Text { header, content } => {
                    if let Some(h) = header {
                        prompt.push_str(&format!("# {}\n\n", h));
                    }
                    prompt.push_str(&content);
                    prompt.push_str("\n\n");
                }
                PromptSection::Code { language, content } => {
                    prompt.push_str(&format!("```{}\n", language));
                    prompt.push_str(&content);
                    prompt.push_str("\n```\n\n");
                }
                PromptSection::Focus {
                    target,
                    restrictions,
                } => {
                    prompt.push_str("<FOCUS>\n");
                    prompt.push_str(&format!("IMPORTANT: Focus EXCLUSIVELY on: {}\n", target));
                    for restriction in restrictions {
                        prompt.push_str(&format!("- {}\n", restriction));
                    }
                    prompt.push_str("</FOCUS>\n\n");
                }
                PromptSection::Custom(content) => {
                    prompt.push_str(&content);
                    prompt.push_str("\n\n");
                }
            }
        }

        prompt.trim_end().to_string()
    }
}

// =============================================================================
// Kind-specific wording
// =============================================================================

/// Reader the document is written for
fn audience(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::UserManual => "an end-user of the software",
        DocumentKind::ContributingGuide => "a new contributor to the project",
        DocumentKind::ProjectStructure => "an engineer onboarding onto the codebase",
        DocumentKind::ApiReference => "a developer integrating with the project's interfaces",
        DocumentKind::Overview => "someone evaluating the project for the first time",
    }
}

/// What a per-chunk extract should capture
fn extract_focus(kind: DocumentKind) -> &'static [&'static str] {
    match kind {
        DocumentKind::UserManual => &[
            "Functionality this file provides TO THE USER",
            "How a user INTERACTS with this part of the software",
            "User-facing FEATURES described or implemented",
            "User-relevant CONFIGURATION options or settings",
            "INSTRUCTIONS or GUIDANCE for users (README, tutorials, examples)",
        ],
        DocumentKind::ContributingGuide => &[
            "Project setup: dependencies, toolchains, environment variables",
            "Commands to build, run and test the project",
            "Linters, formatters and code style rules",
            "Branching, commit and pull request conventions",
            "How bugs and feature requests are reported",
        ],
        DocumentKind::ProjectStructure => &[
            "The PURPOSE of this file and the directory it lives in",
            "Key modules, types or components it defines",
            "Entry points and how control reaches this file",
            "Relationships to other files (imports, calls, configuration)",
        ],
        DocumentKind::ApiReference => &[
            "Public functions, classes, endpoints or commands",
            "Parameters, return values and data shapes",
            "Errors and status codes that callers must handle",
            "Authentication or usage constraints",
        ],
        DocumentKind::Overview => &[
            "What problem the project solves",
            "Main features and capabilities",
            "Technologies, frameworks and external services used",
            "How the major parts fit together",
        ],
    }
}

/// Section outline the assembled document should follow
fn outline(kind: DocumentKind) -> &'static [&'static str] {
    match kind {
        DocumentKind::UserManual => &[
            "Title",
            "Table of Contents",
            "Introduction / Overview",
            "Getting Started / Installation",
            "Key Features",
            "How to Use",
            "Configuration",
            "Troubleshooting / FAQs",
            "Conclusion",
        ],
        DocumentKind::ContributingGuide => &[
            "Title (\"Contributing to <repository>\")",
            "Project Setup",
            "Running Tests",
            "Code Style / Linting",
            "Submitting Changes",
            "Reporting Bugs and Requesting Features",
            "Code of Conduct",
        ],
        DocumentKind::ProjectStructure => &[
            "Title",
            "Overview",
            "Directory Layout",
            "Key Components",
            "Entry Points",
            "Build and Configuration Files",
        ],
        DocumentKind::ApiReference => &[
            "Title",
            "Overview",
            "Authentication",
            "Interfaces (one subsection per endpoint, command or public type)",
            "Errors",
            "Examples",
        ],
        DocumentKind::Overview => &[
            "Title",
            "Summary",
            "Features",
            "Technology Stack",
            "Architecture",
            "Getting Started",
        ],
    }
}

/// Preset prompt templates for the map and reduce calls
pub struct PromptTemplates;

impl PromptTemplates {
    /// System instruction for one chunk's extract.
    /// `chunk_index` is zero-based; the prompt shows it one-based.
    pub fn extract_system(
        kind: DocumentKind,
        path: &str,
        chunk_index: usize,
        total_chunks: usize,
    ) -> String {
        PromptBuilder::new()
            .role(
                "technical documentation assistant",
                &format!("extracting material for a {}", kind.label()),
            )
            .context_item("File", path)
            .context_item(
                "Chunk",
                &format!("{} of {}", chunk_index + 1, total_chunks),
            )
            .context_item("Audience", audience(kind))
            .objectives(extract_focus(kind).iter().copied())
            .focus(
                "facts observable in the provided content",
                [
                    "Be concise: bullet points or short descriptions",
                    "Do NOT speculate about code or files you cannot see",
                    "If the content is irrelevant for the audience or appears corrupted, say so in one line",
                ],
            )
            .build()
    }

    /// User content for one chunk's extract
    pub fn extract_user(chunk_text: &str) -> String {
        PromptBuilder::new()
            .section("File Content", "")
            .code("", chunk_text)
            .build()
    }

    /// System instruction for the single assembly call
    pub fn assemble_system(kind: DocumentKind, repository: &RepositoryRef) -> String {
        PromptBuilder::new()
            .role(
                "technical writer",
                &format!(
                    "writing a {} for the repository '{}' on ref '{}'",
                    kind.label(),
                    repository.full_name(),
                    repository.reference
                ),
            )
            .context_item("Audience", audience(kind))
            .objectives(outline(kind).iter().copied())
            .focus(
                "the supplied extracts",
                [
                    "Build the document STRICTLY from the extracts below",
                    "Do NOT invent features, commands, options or facts the extracts do not support",
                    "If information for a section is missing, say so briefly instead of guessing",
                    "Format in clean Markdown and start with a single `# ` title line",
                ],
            )
            .build()
    }

    /// User content for the assembly call. `extracts` are already ordered
    /// (path, chunk); `omitted` lists `(path, chunk_index)` whose text is not included.
    pub fn assemble_user(
        repository: &RepositoryRef,
        extracts: &[(&str, usize, usize, &str)],
        omitted: &[(String, usize, usize)],
    ) -> String {
        let mut body = String::new();
        for (path, chunk_index, total_chunks, text) in extracts {
            body.push_str(&format!(
                "---\n## {} (chunk {}/{})\n{}\n",
                path,
                chunk_index + 1,
                total_chunks,
                text.trim()
            ));
        }
        body.push_str("---");

        let mut builder = PromptBuilder::new()
            .context_item("Repository", &repository.full_name())
            .context_item("Ref", &repository.reference)
            .section("Extracted Information", &body);

        if !omitted.is_empty() {
            let list = omitted
                .iter()
                .map(|(path, idx, total)| format!("- {} (chunk {}/{})", path, idx + 1, total))
                .collect::<Vec<_>>()
                .join("\n");
            builder = builder.section(
                "Omitted Material",
                &format!(
                    "The following chunks could not be summarized or did not fit; \
                     do not describe their contents:\n{}",
                    list
                ),
            );
        }

        builder.build()
    }
}
