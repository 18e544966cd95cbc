//! Text canonicalization.
//!
//! Normalization is char-for-char after trimming, so a char offset into the
//! normalized text plus the trimmed prefix length is an offset into the
//! original text.

/// Normalized text and what was done to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    /// Canonical text
    pub text: String,
    /// Chars trimmed from the front of the input
    pub leading_offset: usize,
    /// Human-readable notes about applied corrections
    pub corrections: Vec<String>,
}

/// Case-folds, trims, and converts full-width forms to half-width.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextNormalizer;

impl TextNormalizer {
    /// Normalize `text`.
    pub fn normalize(&self, text: &str) -> NormalizedText {
        let leading_offset = text.chars().take_while(|c| c.is_whitespace()).count();
        let trimmed = text.trim();

        let mut corrections = Vec::new();
        if trimmed.len() != text.len() {
            corrections.push("trimmed surrounding whitespace".to_string());
        }

        let mut widened = false;
        let mut folded = false;
        let normalized: String = trimmed
            .chars()
            .map(|c| {
                let half = to_half_width(c);
                if half != c {
                    widened = true;
                }
                let lower = fold_case(half);
                if lower != half {
                    folded = true;
                }
                lower
            })
            .collect();

        if widened {
            corrections.push("converted full-width characters to half-width".to_string());
        }
        if folded {
            corrections.push("folded letters to lower case".to_string());
        }

        NormalizedText { text: normalized, leading_offset, corrections }
    }
}

/// Map full-width ASCII variants and the ideographic space to ASCII.
fn to_half_width(c: char) -> char {
    match c as u32 {
        0x3000 => ' ',
        code @ 0xFF01..=0xFF5E => char::from_u32(code - 0xFEE0).unwrap_or(c),
        _ => c,
    }
}

/// Lower-case a char only when that yields exactly one char.
fn fold_case(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}
