//! Token counting.
//!
//! Wraps the `o200k_base` encoding from `tiktoken-rs`. Building the
//! encoder loads the embedded rank tables, so it is constructed once and
//! shared. When construction fails the counter degrades to the
//! chars-per-token approximation (`len / 4`) instead of erroring — token
//! counts gate heuristics, they are never billed.

use std::sync::Arc;

use tiktoken_rs::CoreBPE;

const CHARS_PER_TOKEN: usize = 4;

/// A shared token counter. Cheap to clone.
#[derive(Clone)]
pub struct TokenCounter {
    bpe: Option<Arc<CoreBPE>>,
}

impl TokenCounter {
    /// Build an `o200k_base` counter, degrading to the approximation when
    /// the encoder cannot be constructed.
    pub fn new() -> Self {
        match tiktoken_rs::o200k_base() {
            Ok(bpe) => Self {
                bpe: Some(Arc::new(bpe)),
            },
            Err(e) => {
                tracing::warn!(error = %e, "o200k_base unavailable, using chars/4 approximation");
                Self { bpe: None }
            }
        }
    }

    /// A counter that always uses the `len / 4` approximation.
    /// Deterministic and fast; used throughout the test suites.
    pub fn approximate() -> Self {
        Self { bpe: None }
    }

    /// Count tokens in `text`.
    pub fn count(&self, text: &str) -> usize {
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => text.len() / CHARS_PER_TOKEN,
        }
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approximate_counts_quarter_of_chars() {
        let counter = TokenCounter::approximate();
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("abcd"), 1);
        assert_eq!(counter.count(&"x".repeat(40_000)), 10_000);
    }

    #[test]
    fn real_encoder_counts_words() {
        let counter = TokenCounter::new();
        let n = counter.count("the quick brown fox jumps over the lazy dog");
        // Exact count depends on the encoding; it must be word-scale.
        assert!(n >= 5 && n <= 15, "unexpected token count {n}");
    }
}
