//! Pluggable string similarity for fuzzy schema matching.

use crate::config::SimilarityKind;
use crate::pipeline::preprocess::language::is_ideograph;

use std::collections::HashSet;
use std::sync::Arc;

/// Scores how alike two strings are, in [0, 1].
pub trait Similarity: Send + Sync {
    /// Similarity of `a` and `b`; 1.0 means identical.
    fn score(&self, a: &str, b: &str) -> f64;

    /// Name for logging.
    fn name(&self) -> &'static str;
}

/// Edit distance normalized by the longer string's length.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedLevenshtein;

impl Similarity for NormalizedLevenshtein {
    fn score(&self, a: &str, b: &str) -> f64 {
        strsim::normalized_levenshtein(a, b)
    }

    fn name(&self) -> &'static str {
        "normalized_levenshtein"
    }
}

/// Jaro-Winkler; rewards common prefixes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinkler;

impl Similarity for JaroWinkler {
    fn score(&self, a: &str, b: &str) -> f64 {
        strsim::jaro_winkler(a, b)
    }

    fn name(&self) -> &'static str {
        "jaro_winkler"
    }
}

/// Jaccard overlap of word sets.
///
/// Words split on whitespace and underscores; ideographs count as one word each.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSetSimilarity;

impl TokenSetSimilarity {
    fn units(s: &str) -> HashSet<String> {
        let mut units = HashSet::new();
        for word in s.split(|c: char| c.is_whitespace() || c == '_').filter(|w| !w.is_empty()) {
            if word.chars().any(is_ideograph) {
                units.extend(word.chars().map(String::from));
            } else {
                units.insert(word.to_string());
            }
        }
        units
    }
}

impl Similarity for TokenSetSimilarity {
    fn score(&self, a: &str, b: &str) -> f64 {
        let (a, b) = (Self::units(a), Self::units(b));
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        let shared = a.intersection(&b).count();
        let total = a.union(&b).count();
        shared as f64 / total as f64
    }

    fn name(&self) -> &'static str {
        "token_set"
    }
}

/// Build the configured similarity function.
pub fn similarity_for(kind: SimilarityKind) -> Arc<dyn Similarity> {
    match kind {
        SimilarityKind::NormalizedLevenshtein => Arc::new(NormalizedLevenshtein),
        SimilarityKind::JaroWinkler => Arc::new(JaroWinkler),
        SimilarityKind::TokenSet => Arc::new(TokenSetSimilarity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_scores() {
        let sim = NormalizedLevenshtein;
        assert_eq!(sim.score("users", "users"), 1.0);
        assert!((sim.score("user", "users") - 0.8).abs() < 1e-9);
        assert!(sim.score("用户", "订单") < 0.5);
    }

    #[test]
    fn test_token_set_handles_snake_case_and_cjk() {
        let sim = TokenSetSimilarity;
        assert!((sim.score("order date", "order_date") - 1.0).abs() < 1e-9);
        assert!((sim.score("用户名", "用户") - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_factory_matches_kind() {
        assert_eq!(similarity_for(SimilarityKind::JaroWinkler).name(), "jaro_winkler");
        assert_eq!(similarity_for(SimilarityKind::TokenSet).name(), "token_set");
    }
}
