//! Bounded-parallel content loading
//!
//! Fetches selected files through the source host with a fixed concurrency
//! limit. A failed read becomes a `FileCandidate` with empty text and an
//! error note; it never aborts the batch. Decoded text that looks binary is
//! rejected after the fetch.

use futures::stream::{self, StreamExt};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::ai::timeout::with_timeout;
use crate::constants::binary;
use crate::source::SharedSourceHost;
use crate::types::{Credential, FileCandidate, RepositoryRef, TreeEntry};

/// Result of loading a selection
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Successfully decoded text files, in selection order
    pub loaded: Vec<FileCandidate>,
    /// Reads that failed; `raw_text` is empty and `error` is set
    pub failed: Vec<FileCandidate>,
    /// Paths rejected by the binary heuristic
    pub binary_rejected: Vec<String>,
}

pub struct FileContentLoader {
    host: SharedSourceHost,
    request_timeout: Duration,
    concurrency: usize,
    binary_threshold: f64,
}

impl FileContentLoader {
    pub fn new(
        host: SharedSourceHost,
        request_timeout: Duration,
        concurrency: usize,
        binary_threshold: f64,
    ) -> Self {
        Self {
            host,
            request_timeout,
            concurrency: concurrency.max(1),
            binary_threshold,
        }
    }

    /// Load every entry at `commit_id`
    #[instrument(skip_all, fields(repository = %repository, files = entries.len()))]
    pub async fn load(
        &self,
        repository: &RepositoryRef,
        credential: &Credential,
        commit_id: &str,
        entries: &[TreeEntry],
    ) -> LoadReport {
        let mut results: Vec<(usize, FileCandidate)> = stream::iter(entries.iter().enumerate())
            .map(|(idx, entry)| async move {
                (idx, self.load_one(repository, credential, commit_id, entry).await)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        // Completion order is arbitrary; restore selection order
        results.sort_by_key(|(idx, _)| *idx);

        let mut report = LoadReport::default();
        for (_, candidate) in results {
            if candidate.is_failed() {
                report.failed.push(candidate);
            } else if is_probably_binary(&candidate.raw_text, self.binary_threshold) {
                debug!(path = %candidate.path, "Rejected as binary content");
                report.binary_rejected.push(candidate.path);
            } else {
                report.loaded.push(candidate);
            }
        }

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            binary = report.binary_rejected.len(),
            "Loaded file contents"
        );
        report
    }

    async fn load_one(
        &self,
        repository: &RepositoryRef,
        credential: &Credential,
        commit_id: &str,
        entry: &TreeEntry,
    ) -> FileCandidate {
        let fetched = with_timeout(
            self.request_timeout,
            self.host.get_file_content(
                repository,
                &entry.path,
                commit_id,
                &entry.content_id,
                credential,
            ),
            "read file content",
        )
        .await;

        match fetched {
            Ok(content) => FileCandidate::loaded(entry, decode_text(&content.bytes)),
            Err(err) => {
                warn!(path = %entry.path, error = %err, "Failed to read file, skipping");
                FileCandidate::failed(entry, err.to_string())
            }
        }
    }
}

/// UTF-8 decode; invalid sequences become U+FFFD and count against the binary heuristic
pub fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn is_suspicious(ch: char) -> bool {
    match ch {
        '\t' | '\n' | '\r' => false,
        '\u{FFFD}' => true,
        c => c.is_control(),
    }
}

/// True when the text has more than a handful of control or replacement
/// characters and their density exceeds `threshold`
pub fn is_probably_binary(text: &str, threshold: f64) -> bool {
    let mut total = 0usize;
    let mut suspicious = 0usize;
    for ch in text.chars() {
        total += 1;
        if is_suspicious(ch) {
            suspicious += 1;
        }
    }
    if suspicious <= binary::MIN_SUSPICIOUS_CHARS || total == 0 {
        return false;
    }
    suspicious as f64 / total as f64 > threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySourceHost;
    use std::sync::Arc;

    #[test]
    fn test_binary_heuristic() {
        assert!(!is_probably_binary("plain text\nwith lines\t\r\n", 0.01));
        assert!(!is_probably_binary("", 0.01));

        let noisy: String = std::iter::repeat_n('\u{0}', 20).collect();
        assert!(is_probably_binary(&noisy, 0.01));

        // 11 control chars hidden in a large text stay under 1%
        let mut mostly_text = "a".repeat(5_000);
        mostly_text.push_str(&"\u{1}".repeat(11));
        assert!(!is_probably_binary(&mostly_text, 0.01));

        // At most ten suspicious chars never trips the heuristic
        assert!(!is_probably_binary(&"\u{7}".repeat(10), 0.01));
    }

    #[test]
    fn test_del_and_c1_controls_count_as_binary() {
        assert!(is_probably_binary(&"\u{7F}".repeat(20), 0.01));
        assert!(is_probably_binary(&"\u{85}\u{9F}".repeat(10), 0.01));
        // Printable non-ASCII text is fine
        assert!(!is_probably_binary(&"héllo 日本語 ".repeat(20), 0.01));
    }

    #[test]
    fn test_decode_replaces_invalid_utf8() {
        let text = decode_text(&[0x68, 0x69, 0xFF, 0xFE]);
        assert!(text.starts_with("hi"));
        assert!(text.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn test_load_absorbs_failures_and_binary() {
        let mut png = vec![0x89, b'P', b'N', b'G'];
        png.extend(std::iter::repeat_n(0u8, 64));
        let host = Arc::new(
            MemorySourceHost::new("octo", "widgets", "main", "tok")
                .with_file("README.md", "# Widgets")
                .with_file("src/lib.rs", "pub fn a() {}")
                .with_file("broken.md", "never read")
                .with_file("image.dat", png),
        );
        host.fail_path("broken.md");

        let entries = vec![
            TreeEntry::file("README.md", "a", 9),
            TreeEntry::file("broken.md", "b", 10),
            TreeEntry::file("image.dat", "c", 68),
            TreeEntry::file("src/lib.rs", "d", 13),
        ];
        let loader = FileContentLoader::new(host.clone(), Duration::from_secs(5), 2, 0.01);
        let report = loader
            .load(&host.repository(), &Credential::new("tok"), "commit-1", &entries)
            .await;

        let loaded: Vec<_> = report.loaded.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(loaded, vec!["README.md", "src/lib.rs"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].raw_text, "");
        assert!(report.failed[0].error.is_some());
        assert_eq!(report.binary_rejected, vec!["image.dat".to_string()]);
        assert_eq!(host.content_calls(), 4);
    }

    #[tokio::test]
    async fn test_slow_first_file_keeps_selection_order() {
        let host = Arc::new(
            MemorySourceHost::new("octo", "widgets", "main", "tok")
                .with_file("a.md", "alpha")
                .with_file("b.md", "bravo")
                .with_file("c.md", "charlie"),
        );
        host.set_path_delay("a.md", Duration::from_millis(120));
        host.set_path_delay("b.md", Duration::from_millis(60));

        let entries = vec![
            TreeEntry::file("a.md", "a", 5),
            TreeEntry::file("b.md", "b", 5),
            TreeEntry::file("c.md", "c", 7),
        ];
        let loader = FileContentLoader::new(host.clone(), Duration::from_secs(5), 3, 0.01);
        let report = loader
            .load(&host.repository(), &Credential::new("tok"), "commit-1", &entries)
            .await;

        assert_eq!(host.completed_reads(), vec!["c.md", "b.md", "a.md"]);
        let loaded: Vec<_> = report.loaded.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(loaded, vec!["a.md", "b.md", "c.md"]);
    }

    #[tokio::test]
    async fn test_per_file_timeout_is_absorbed() {
        let host = Arc::new(
            MemorySourceHost::new("octo", "widgets", "main", "tok")
                .with_file("slow.md", "eventually"),
        );
        host.set_content_delay(Duration::from_secs(5));

        let loader = FileContentLoader::new(host.clone(), Duration::from_millis(20), 4, 0.01);
        let report = loader
            .load(
                &host.repository(),
                &Credential::new("tok"),
                "commit-1",
                &[TreeEntry::file("slow.md", "a", 10)],
            )
            .await;

        assert!(report.loaded.is_empty());
        assert!(report.failed[0].error.as_deref().unwrap().contains("Timeout"));
    }
}
