//! Token chunking
//!
//! Splits a file's text into consecutive slices of at most `max_tokens`
//! BPE tokens. Slices are cut on token ends that fall on character
//! boundaries, so concatenating the chunks of a file reproduces its text
//! exactly.

use crate::ai::Tokenizer;
use crate::types::TokenChunk;

#[derive(Debug, Clone)]
pub struct TokenChunker {
    tokenizer: Tokenizer,
    max_tokens: usize,
}

impl TokenChunker {
    /// `max_tokens` must be positive; options validation enforces it
    pub fn new(max_tokens: usize) -> Self {
        Self {
            tokenizer: Tokenizer::new(),
            max_tokens: max_tokens.max(1),
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Chunk one file. Empty text yields no chunks. Only the last chunk
    /// may be short, except where a multi-byte character spans a budget
    /// edge and the cut moves back to the character's start.
    pub fn chunk(&self, path: &str, text: &str) -> Vec<TokenChunk> {
        let spans = self.tokenizer.split(text, self.max_tokens);
        let total_chunks = spans.len();
        spans
            .into_iter()
            .enumerate()
            .map(|(chunk_index, span)| TokenChunk {
                path: path.to_string(),
                chunk_index,
                total_chunks,
                text: text[span.start..span.end].to_string(),
                token_count: span.tokens,
            })
            .collect()
    }

    /// Chunk several files, preserving their order
    pub fn chunk_all<'a, I>(&self, files: I) -> Vec<TokenChunk>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        files
            .into_iter()
            .flat_map(|(path, text)| self.chunk(path, text))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_file_has_no_chunks() {
        assert!(TokenChunker::new(10).chunk("empty.md", "").is_empty());
    }

    #[test]
    fn test_small_file_is_single_chunk() {
        let chunks = TokenChunker::new(100).chunk("README.md", "# Title\n\nHello.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].total_chunks, 1);
        assert_eq!(chunks[0].text, "# Title\n\nHello.");
    }

    #[test]
    fn test_exact_multiple_of_budget() {
        // "a b c" is three tokens: "a", " b", " c"
        let chunks = TokenChunker::new(3).chunk("x", "a b c a b c");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "a b c");
        assert_eq!(chunks[1].text, " a b c");
        assert!(chunks.iter().all(|c| c.token_count == 3 && c.total_chunks == 2));
    }

    #[test]
    fn test_whitespace_padding_is_bounded() {
        let padding = " ".repeat(2_000);
        let chunks = TokenChunker::new(1).chunk("pad.txt", &padding);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.token_count == 1));
        assert!(chunks.iter().all(|c| c.text.len() < padding.len()));
    }

    #[test]
    fn test_cjk_and_emoji_stay_whole() {
        let text = "日本語テキスト 🦀🦀🦀🦀";
        let chunks = TokenChunker::new(1).chunk("i18n.md", text);
        assert!(chunks.len() > 2);
        let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_chunk_all_keeps_file_order() {
        let chunker = TokenChunker::new(1);
        let chunks = chunker.chunk_all([("b.md", "x y"), ("a.md", "z")]);
        let keys: Vec<_> = chunks
            .iter()
            .map(|c| (c.path.as_str(), c.chunk_index))
            .collect();
        assert_eq!(keys, vec![("b.md", 0), ("b.md", 1), ("a.md", 0)]);
    }

    proptest! {
        #[test]
        fn prop_chunks_reassemble_to_input(text in "\\PC{0,400}", max in 1usize..64) {
            let chunker = TokenChunker::new(max);
            let chunks = chunker.chunk("f", &text);
            let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
            prop_assert_eq!(rebuilt, text.clone());

            let tokens = Tokenizer::new().count(&text);
            prop_assert_eq!(chunks.iter().map(|c| c.token_count).sum::<usize>(), tokens);
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.chunk_index, i);
                prop_assert_eq!(chunk.total_chunks, chunks.len());
                prop_assert!(chunk.token_count > 0);
                prop_assert!(chunk.token_count <= max || !chunk.text.is_ascii());
            }
        }

        #[test]
        fn prop_ascii_chunks_fill_the_budget(text in "[ -~\\n\\t]{0,400}", max in 1usize..64) {
            let chunks = TokenChunker::new(max).chunk("f", &text);
            let tokens = Tokenizer::new().count(&text);
            prop_assert_eq!(chunks.len(), tokens.div_ceil(max));
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert!(chunk.token_count <= max);
                if i + 1 < chunks.len() {
                    prop_assert_eq!(chunk.token_count, max);
                }
            }
        }
    }
}
