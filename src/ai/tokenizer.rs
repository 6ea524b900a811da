//! Token Counting and Lossless Slicing
//!
//! Counts and slices text with the `cl100k_base` BPE encoding, the one the
//! chat models behind the default provider use, so a chunk budget bounds
//! what actually reaches the model's context.
//!
//! ## Slicing
//! - Text is encoded once; each token's byte length comes from its decoded
//!   bytes, so token ends map back to byte offsets in the input
//! - A token can end inside a multi-byte character (CJK, emoji). Cuts are
//!   only made at token ends that are also `char` boundaries, which keeps
//!   every slice valid UTF-8 and the concatenation equal to the input

use std::fmt;

use tiktoken_rs::{CoreBPE, cl100k_base_singleton};
use tracing::trace;

/// Byte range of the input covering `tokens` consecutive tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSpan {
    pub start: usize,
    pub end: usize,
    pub tokens: usize,
}

/// BPE tokenizer for chunking and budgeting
#[derive(Clone, Copy)]
pub struct Tokenizer {
    bpe: &'static CoreBPE,
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer")
            .field("encoding", &"cl100k_base")
            .finish()
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            bpe: cl100k_base_singleton(),
        }
    }

    /// Token count of `text`
    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Byte offset just past each token, in order. The last entry is `text.len()`.
    pub fn token_ends(&self, text: &str) -> Vec<usize> {
        let tokens = self.bpe.encode_ordinary(text);
        let mut ends = Vec::with_capacity(tokens.len());
        let mut offset = 0usize;
        for bytes in self.bpe._decode_native_and_split(tokens) {
            offset += bytes.len();
            ends.push(offset);
        }
        trace!(bytes = text.len(), tokens = ends.len(), "Tokenized text");
        ends
    }

    /// Cut `text` into consecutive spans of at most `max_tokens` tokens.
    ///
    /// A span exceeds `max_tokens` only when no token end inside the budget
    /// is a character boundary; it then runs to the next one.
    pub fn split(&self, text: &str, max_tokens: usize) -> Vec<TokenSpan> {
        let max_tokens = max_tokens.max(1);
        let ends = self.token_ends(text);
        let on_boundary = |token: usize| text.is_char_boundary(ends[token - 1]);

        let mut spans = Vec::new();
        let mut first = 0usize;
        let mut start = 0usize;
        while first < ends.len() {
            let limit = (first + max_tokens).min(ends.len());
            let cut = (first + 1..=limit)
                .rev()
                .find(|&t| on_boundary(t))
                .or_else(|| (limit + 1..=ends.len()).find(|&t| on_boundary(t)))
                .unwrap_or(ends.len());

            let end = ends[cut - 1];
            spans.push(TokenSpan {
                start,
                end,
                tokens: cut - first,
            });
            first = cut;
            start = end;
        }
        spans
    }
}
