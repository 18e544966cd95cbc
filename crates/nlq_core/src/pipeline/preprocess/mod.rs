//! Text preprocessing: language detection, normalization, tokenization.

pub mod language;
pub mod normalizer;
pub mod tokenizer;

pub use language::LanguageDetector;
pub use normalizer::{NormalizedText, TextNormalizer};
pub use tokenizer::{tokenizer_for, CjkTokenizer, Tokenizer, WhitespaceTokenizer};

use crate::models::{Language, PreprocessedText};

/// Runs detector, normalizer, and tokenizer in order.
///
/// Pure: the same input always yields the same tokens and spans.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextPreprocessor {
    detector: LanguageDetector,
    normalizer: TextNormalizer,
}

impl TextPreprocessor {
    /// Create a preprocessor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preprocess `text`, detecting its language.
    ///
    /// Blank input yields a result with no tokens instead of an error.
    pub fn preprocess(&self, text: &str) -> PreprocessedText {
        if text.trim().is_empty() {
            return PreprocessedText::empty(text);
        }
        let language = self.detector.detect(text);
        self.preprocess_with_language(text, language)
    }

    /// Preprocess `text` with a known language.
    pub fn preprocess_with_language(&self, text: &str, language: Language) -> PreprocessedText {
        if text.trim().is_empty() {
            return PreprocessedText::empty(text);
        }

        let normalized = self.normalizer.normalize(text);
        let tokenizer = tokenizer_for(language);
        let tokens = tokenizer.tokenize(&normalized.text, normalized.leading_offset);

        tracing::debug!(
            language = language.as_str(),
            tokenizer = tokenizer.name(),
            token_count = tokens.len(),
            "Text preprocessed"
        );

        PreprocessedText::new(
            text,
            normalized.text,
            language,
            tokens,
            normalized.corrections,
            normalized.leading_offset,
        )
    }
}
