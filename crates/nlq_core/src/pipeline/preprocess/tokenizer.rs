//! Tokenizers for delimited and undelimited scripts.

use super::language::is_ideograph;
use crate::models::{Language, Token, TokenFeature};

/// Splits normalized text into tokens.
///
/// `base_offset` is added to every span so spans index the original text.
pub trait Tokenizer: Send + Sync {
    /// Tokenize `text`.
    fn tokenize(&self, text: &str, base_offset: usize) -> Vec<Token>;

    /// Tokenizer name for logging.
    fn name(&self) -> &'static str;
}

/// Whitespace-delimited words, numbers, symbols, and quoted literals.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

/// Like [`WhitespaceTokenizer`], but every CJK/Kana character is its own token.
#[derive(Debug, Clone, Copy, Default)]
pub struct CjkTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str, base_offset: usize) -> Vec<Token> {
        scan(text, base_offset, false)
    }

    fn name(&self) -> &'static str {
        "whitespace"
    }
}

impl Tokenizer for CjkTokenizer {
    fn tokenize(&self, text: &str, base_offset: usize) -> Vec<Token> {
        scan(text, base_offset, true)
    }

    fn name(&self) -> &'static str {
        "cjk"
    }
}

static WHITESPACE: WhitespaceTokenizer = WhitespaceTokenizer;
static CJK: CjkTokenizer = CjkTokenizer;

/// Pick the tokenizer for a language.
pub fn tokenizer_for(language: Language) -> &'static dyn Tokenizer {
    if language.is_unsegmented() {
        &CJK
    } else {
        &WHITESPACE
    }
}

fn closing_quote(open: char) -> Option<char> {
    match open {
        '\'' => Some('\''),
        '"' => Some('"'),
        '\u{201C}' => Some('\u{201D}'),
        '\u{2018}' => Some('\u{2019}'),
        '「' => Some('」'),
        '『' => Some('』'),
        _ => None,
    }
}

fn is_word_char(c: char, split_ideographs: bool) -> bool {
    (c.is_alphanumeric() || c == '_') && !(split_ideographs && is_ideograph(c))
}

fn scan(text: &str, base: usize, split_ideographs: bool) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let slice = |from: usize, to: usize| chars[from..to].iter().collect::<String>();

    while i < chars.len() {
        let c = chars[i];

        // quoted literal; an apostrophe inside a word is not an opener
        if let Some(close) = closing_quote(c) {
            let prev_is_word = i > 0 && chars[i - 1].is_alphanumeric();
            if !(c == '\'' && prev_is_word) {
                if let Some(rel) = chars[i + 1..].iter().position(|&x| x == close) {
                    let end = i + 1 + rel + 1;
                    tokens.push(Token::new(slice(i, end), base + i, base + end, TokenFeature::Quoted));
                    i = end;
                    continue;
                }
            }
            i += 1;
            continue;
        }

        if matches!(c, '<' | '>' | '=' | '!') {
            let pair = chars.get(i + 1).map(|n| format!("{c}{n}"));
            match pair.as_deref() {
                Some(">=" | "<=" | "!=" | "<>" | "==") => {
                    tokens.push(Token::new(slice(i, i + 2), base + i, base + i + 2, TokenFeature::Symbol));
                    i += 2;
                }
                _ if c != '!' => {
                    tokens.push(Token::new(c.to_string(), base + i, base + i + 1, TokenFeature::Symbol));
                    i += 1;
                }
                _ => i += 1,
            }
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() {
                let ch = chars[i];
                let joins_digits = matches!(ch, '.' | '-' | '/' | ':')
                    && i > start
                    && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
                if ch.is_ascii_digit() || joins_digits {
                    i += 1;
                } else {
                    break;
                }
            }
            tokens.push(Token::new(slice(start, i), base + start, base + i, TokenFeature::Number));
            continue;
        }

        if split_ideographs && is_ideograph(c) {
            tokens.push(Token::new(c.to_string(), base + i, base + i + 1, TokenFeature::Ideograph));
            i += 1;
            continue;
        }

        if is_word_char(c, split_ideographs) {
            let start = i;
            while i < chars.len() && is_word_char(chars[i], split_ideographs) {
                i += 1;
            }
            tokens.push(Token::new(slice(start, i), base + start, base + i, TokenFeature::Word));
            continue;
        }

        // whitespace and punctuation separate tokens
        i += 1;
    }

    tokens
}
