//! Script-count language detection.

use crate::models::Language;

/// Writing system of a single character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Han,
    Kana,
    Hangul,
    Cyrillic,
    Arabic,
    Latin,
    Other,
}

/// Classify a character by script.
pub fn script_of(c: char) -> Script {
    match c as u32 {
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF => Script::Han,
        0x3040..=0x30FF => Script::Kana,
        0xAC00..=0xD7AF | 0x1100..=0x11FF | 0x3130..=0x318F => Script::Hangul,
        0x0400..=0x04FF => Script::Cyrillic,
        0x0600..=0x06FF => Script::Arabic,
        0x00C0..=0x024F => Script::Latin,
        _ if c.is_ascii_alphabetic() => Script::Latin,
        _ => Script::Other,
    }
}

/// Whether a character is written without word delimiters.
pub fn is_ideograph(c: char) -> bool {
    matches!(script_of(c), Script::Han | Script::Kana)
}

/// Picks the dominant script of a text.
///
/// Non-Latin scripts are counted per character, Latin per word, so a Chinese
/// question mentioning `users` still tokenizes as Chinese. When nothing beats
/// the Latin word count the text is treated as English.
#[derive(Debug, Clone, Copy, Default)]
pub struct LanguageDetector;

impl LanguageDetector {
    /// Detect the language of `text`.
    pub fn detect(&self, text: &str) -> Language {
        let (mut han, mut kana, mut hangul, mut cyrillic, mut arabic) = (0usize, 0, 0, 0, 0);
        let mut latin_words = 0usize;
        let mut in_latin = false;

        for c in text.chars() {
            let script = script_of(c);
            if script == Script::Latin {
                if !in_latin {
                    latin_words += 1;
                }
                in_latin = true;
                continue;
            }
            in_latin = false;
            match script {
                Script::Han => han += 1,
                Script::Kana => kana += 1,
                Script::Hangul => hangul += 1,
                Script::Cyrillic => cyrillic += 1,
                Script::Arabic => arabic += 1,
                Script::Latin | Script::Other => {}
            }
        }

        let cjk = if kana > 0 { Language::Ja } else { Language::Zh };
        let candidates = [
            (han + kana, cjk),
            (hangul, Language::Ko),
            (cyrillic, Language::Ru),
            (arabic, Language::Ar),
        ];

        // first candidate wins ties
        let mut best = (0usize, Language::En);
        for (count, language) in candidates {
            if count > best.0 {
                best = (count, language);
            }
        }

        if best.0 == 0 || best.0 < latin_words {
            Language::En
        } else {
            best.1
        }
    }
}
