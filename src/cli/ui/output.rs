use console::style;

use crate::pipeline::{PipelineOutcome, RunReport};
use crate::storage::{DocumentRecord, PublishStatus};

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    pub fn field(&self, label: &str, value: impl std::fmt::Display) {
        println!("  {:<18} {}", style(label).dim(), value);
    }

    /// Headline plus run statistics for a finished run
    pub fn outcome(&self, outcome: &PipelineOutcome, target_path: &str) {
        match outcome {
            PipelineOutcome::FullSuccess {
                document, publish, ..
            } => {
                self.success(&format!("Published \"{}\" to {}", document.title, target_path));
                if let Some(locator) = &publish.remote_locator {
                    self.field("File", locator);
                }
                if let Some(locator) = &publish.commit_locator {
                    self.field("Commit", locator);
                }
            }
            PipelineOutcome::PartialSuccess {
                document, publish, ..
            } => {
                self.warning(&format!(
                    "Generated \"{}\" but could not publish it to {}",
                    document.title, target_path
                ));
                if let Some(failure) = &publish.error {
                    self.field("Reason", failure);
                }
            }
            PipelineOutcome::Failure {
                error, placeholder, ..
            } => {
                self.error(&format!("Synthesis failed: {}", error));
                if placeholder.is_some() {
                    self.field("Placeholder", "stored locally, not published");
                }
            }
        }
        self.report(outcome.report());
    }

    pub fn report(&self, report: &RunReport) {
        self.section("Run");
        self.field("Run id", &report.run_id);
        if let Some(commit) = &report.commit_id {
            self.field("Commit", commit);
        }
        let truncated = if report.tree_truncated { " (truncated)" } else { "" };
        self.field("Tree entries", format!("{}{}", report.tree_entries, truncated));
        self.field(
            "Files",
            format!(
                "{} selected, {} loaded, {} failed, {} binary",
                report.selected_files,
                report.loaded_files,
                report.failed_files,
                report.binary_rejected
            ),
        );
        self.field(
            "Chunks",
            format!("{} ({} failed)", report.chunks, report.chunk_errors),
        );
        self.field(
            "Inference",
            format!(
                "{} extract + {} assembly calls ({} failed), {} tokens",
                report.inference.extract_calls,
                report.inference.assembly_calls,
                report.inference.failed_calls,
                report.inference.total_tokens
            ),
        );
        self.field("Publish attempts", report.publish_attempts);
        self.field("Elapsed", format!("{:.1}s", report.elapsed.as_secs_f64()));
    }

    pub fn record(&self, record: &DocumentRecord) {
        let status = match record.status {
            PublishStatus::Published => style(record.status.as_str()).green(),
            PublishStatus::Unpublished => style(record.status.as_str()).yellow(),
            PublishStatus::Failed => style(record.status.as_str()).red(),
        };
        println!(
            "{} {}@{} [{}] {}",
            status,
            style(&record.repository).bold(),
            record.branch,
            record.kind,
            record.title
        );
        self.field("Path", &record.target_path);
        self.field("User", &record.owner_user);
        self.field("Updated", record.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
        if let Some(locator) = &record.file_locator {
            self.field("File", locator);
        }
        if let Some(error) = &record.last_error {
            self.field("Last error", error);
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
