//! Preprocessed text models.

use serde::{Deserialize, Serialize};

/// Detected language of the input text.
///
/// The language decides which tokenizer runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Chinese (Han script)
    Zh,
    /// Japanese (Kana present)
    Ja,
    /// Korean (Hangul)
    Ko,
    /// Russian and other Cyrillic
    Ru,
    /// Arabic script
    Ar,
    /// Latin script, the fallback
    #[default]
    En,
}

impl Language {
    /// Language tag (e.g., "zh", "en").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zh => "zh",
            Self::Ja => "ja",
            Self::Ko => "ko",
            Self::Ru => "ru",
            Self::Ar => "ar",
            Self::En => "en",
        }
    }

    /// Whether the script writes words without delimiters.
    pub fn is_unsegmented(&self) -> bool {
        matches!(self, Self::Zh | Self::Ja)
    }
}

/// Lexical class of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenFeature {
    /// Alphabetic word (any space-delimited script)
    Word,
    /// Integer or decimal number
    Number,
    /// Single CJK/Kana character
    Ideograph,
    /// Comparison symbol such as `>=`
    Symbol,
    /// Quoted literal, quotes included
    Quoted,
}

/// A token with its character span in the original text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Token text (normalized)
    pub text: String,
    /// Char offset of the first character in the original text
    pub start: usize,
    /// Char offset one past the last character
    pub end: usize,
    /// Lexical class
    pub feature: TokenFeature,
}

impl Token {
    /// Create a token.
    pub fn new(text: impl Into<String>, start: usize, end: usize, feature: TokenFeature) -> Self {
        Self { text: text.into(), start, end, feature }
    }
}

/// Output of the text preprocessor. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessedText {
    /// Text exactly as received
    pub original_text: String,
    /// Case-folded, trimmed, width-normalized text
    pub normalized_text: String,
    /// Detected language
    pub language: Language,
    /// Ordered tokens
    pub tokens: Vec<String>,
    /// Per-token spans and features, parallel to `tokens`
    pub token_details: Vec<Token>,
    /// Notes about normalizations applied
    pub corrections: Vec<String>,
    /// Chars trimmed from the front of the original text
    pub leading_offset: usize,
}

impl PreprocessedText {
    /// Build from token details; `tokens` is derived from them.
    pub fn new(
        original_text: impl Into<String>,
        normalized_text: impl Into<String>,
        language: Language,
        token_details: Vec<Token>,
        corrections: Vec<String>,
        leading_offset: usize,
    ) -> Self {
        let tokens = token_details.iter().map(|t| t.text.clone()).collect();
        Self {
            original_text: original_text.into(),
            normalized_text: normalized_text.into(),
            language,
            tokens,
            token_details,
            corrections,
            leading_offset,
        }
    }

    /// An empty result for blank input.
    pub fn empty(original_text: impl Into<String>) -> Self {
        Self::new(original_text, String::new(), Language::En, Vec::new(), Vec::new(), 0)
    }

    /// Whether no tokens were produced.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Get the number of tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Text of the original input between two char offsets.
    pub fn original_slice(&self, start: usize, end: usize) -> String {
        self.original_text.chars().skip(start).take(end.saturating_sub(start)).collect()
    }
}
