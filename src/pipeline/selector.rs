//! File selection policy
//!
//! Pure filter over tree entries, applied in order:
//! 1. drop directories
//! 2. drop denylisted paths (glob patterns) and denied extensions
//! 3. drop empty files and files above the size bound
//! 4. in curated mode, keep only allowlisted extensions and high-signal names
//!
//! Content is never inspected here; size comes from tree metadata.

use glob::{MatchOptions, Pattern};
use std::collections::HashSet;
use tracing::debug;

use crate::config::SelectionConfig;
use crate::types::{RepodocError, Result, SelectionMode, TreeEntry};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compiled selection policy
#[derive(Debug, Clone)]
pub struct FileSelector {
    deny_patterns: Vec<Pattern>,
    deny_extensions: HashSet<String>,
    allow_extensions: HashSet<String>,
    high_signal_names: HashSet<String>,
    max_file_size: u64,
    mode: SelectionMode,
}

fn lowercase_set(items: &[String]) -> HashSet<String> {
    items
        .iter()
        .map(|s| s.trim_start_matches('.').to_lowercase())
        .collect()
}

impl FileSelector {
    pub fn new(config: &SelectionConfig, max_file_size: u64, mode: SelectionMode) -> Result<Self> {
        let deny_patterns = config
            .deny_patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    RepodocError::Config(format!("Invalid deny pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            deny_patterns,
            deny_extensions: lowercase_set(&config.deny_extensions),
            allow_extensions: lowercase_set(&config.allow_extensions),
            high_signal_names: lowercase_set(&config.high_signal_names),
            max_file_size,
            mode,
        })
    }

    pub fn select(&self, entries: &[TreeEntry]) -> Vec<TreeEntry> {
        let chosen: Vec<TreeEntry> = entries
            .iter()
            .filter(|entry| self.accepts(entry))
            .cloned()
            .collect();
        debug!(
            considered = entries.len(),
            chosen = chosen.len(),
            mode = %self.mode,
            "Selected files"
        );
        chosen
    }

    pub fn accepts(&self, entry: &TreeEntry) -> bool {
        if !entry.is_file() {
            return false;
        }
        if self.is_denied(&entry.path) {
            return false;
        }
        match entry.size {
            Some(0) => return false,
            Some(size) if size > self.max_file_size => return false,
            _ => {}
        }
        match self.mode {
            SelectionMode::Full => true,
            SelectionMode::Curated => self.is_of_interest(entry),
        }
    }

    fn is_denied(&self, path: &str) -> bool {
        if let Some(ext) = extension(path)
            && self.deny_extensions.contains(&ext)
        {
            return true;
        }
        self.deny_patterns
            .iter()
            .any(|pattern| pattern.matches_with(path, MATCH_OPTIONS))
    }

    fn is_of_interest(&self, entry: &TreeEntry) -> bool {
        if let Some(ext) = extension(&entry.path)
            && self.allow_extensions.contains(&ext)
        {
            return true;
        }
        let name = entry.file_name().to_lowercase();
        let stem = name.split('.').next().unwrap_or(&name);
        self.high_signal_names.contains(stem)
    }
}

/// Lowercased extension of the final path component; dotfiles have none
fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn selector(mode: SelectionMode) -> FileSelector {
        FileSelector::new(&SelectionConfig::default(), 1_000, mode).unwrap()
    }

    fn paths(entries: &[TreeEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn test_drops_directories_and_denylisted() {
        let entries = vec![
            TreeEntry::directory("src", "t"),
            TreeEntry::file("src/main.rs", "a", 10),
            TreeEntry::file("node_modules/left-pad/index.js", "b", 10),
            TreeEntry::file("web/node_modules/x.js", "c", 10),
            TreeEntry::file("Cargo.lock", "d", 10),
            TreeEntry::file("assets/logo.PNG", "e", 10),
            TreeEntry::file(".env", "f", 10),
            TreeEntry::file("config/.env.production", "g", 10),
            TreeEntry::file(".git/config", "h", 10),
        ];
        let chosen = selector(SelectionMode::Full).select(&entries);
        assert_eq!(paths(&chosen), vec!["src/main.rs"]);
    }

    #[test]
    fn test_size_bound_and_empty_files() {
        let entries = vec![
            TreeEntry::file("small.md", "a", 999),
            TreeEntry::file("edge.md", "b", 1_000),
            TreeEntry::file("huge.md", "c", 1_001),
            TreeEntry::file("empty.md", "d", 0),
            TreeEntry {
                size: None,
                ..TreeEntry::file("unknown.md", "e", 0)
            },
        ];
        let chosen = selector(SelectionMode::Full).select(&entries);
        assert_eq!(paths(&chosen), vec!["small.md", "edge.md", "unknown.md"]);
    }

    #[test]
    fn test_curated_keeps_high_signal_names() {
        let entries = vec![
            TreeEntry::file("README", "a", 10),
            TreeEntry::file("LICENSE.txt", "b", 10),
            TreeEntry::file("docs/CONTRIBUTING.rst", "c", 10),
            TreeEntry::file("Makefile", "d", 10),
            TreeEntry::file("src/app.py", "e", 10),
            TreeEntry::file("data/blob.xyz", "f", 10),
            TreeEntry::file("scripts/run", "g", 10),
        ];
        let curated = selector(SelectionMode::Curated).select(&entries);
        assert_eq!(
            paths(&curated),
            vec![
                "README",
                "LICENSE.txt",
                "docs/CONTRIBUTING.rst",
                "Makefile",
                "src/app.py"
            ]
        );

        let full = selector(SelectionMode::Full).select(&entries);
        assert_eq!(full.len(), entries.len());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let config = SelectionConfig {
            deny_patterns: vec!["[".to_string()],
            ..Default::default()
        };
        assert!(FileSelector::new(&config, 10, SelectionMode::Full).is_err());
    }

    #[test]
    fn test_extension_parsing() {
        assert_eq!(extension("a/b/c.TAR.GZ"), Some("gz".to_string()));
        assert_eq!(extension(".gitignore"), None);
        assert_eq!(extension("Makefile"), None);
    }

    fn arb_entry() -> impl Strategy<Value = TreeEntry> {
        let path = prop::collection::vec(
            prop::sample::select(vec![
                "src", "docs", "node_modules", "build", "README.md", "main.rs", "logo.png",
                "Cargo.lock", "LICENSE", ".env", "notes.txt", "lib",
            ]),
            1..4,
        )
        .prop_map(|parts| parts.join("/"));
        (path, 0u64..2_000, any::<bool>()).prop_map(|(path, size, is_dir)| {
            if is_dir {
                TreeEntry::directory(path, "t")
            } else {
                TreeEntry::file(path, "b", size)
            }
        })
    }

    proptest! {
        #[test]
        fn prop_select_is_idempotent(
            entries in prop::collection::vec(arb_entry(), 0..40),
            curated in any::<bool>(),
        ) {
            let mode = if curated { SelectionMode::Curated } else { SelectionMode::Full };
            let selector = selector(mode);
            let once = selector.select(&entries);
            let twice = selector.select(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_curated_is_subset_of_full(entries in prop::collection::vec(arb_entry(), 0..40)) {
            let full = selector(SelectionMode::Full).select(&entries);
            let curated = selector(SelectionMode::Curated).select(&entries);
            prop_assert!(curated.iter().all(|e| full.contains(e)));
        }
    }
}
