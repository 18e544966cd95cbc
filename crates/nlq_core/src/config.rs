//! Runtime configuration for the translation pipeline and executor.
//!
//! Every section has defaults, so an empty JSON object is a valid config file.

use crate::error::{NlqError, NlqResult};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "NLQ_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NlqConfig {
    /// Entity extraction settings
    pub extraction: ExtractionConfig,
    /// Intent recognition settings
    pub intent: IntentConfig,
    /// SQL generation settings
    pub generation: GenerationConfig,
    /// Query executor settings
    pub executor: ExecutorConfig,
    /// Optional tracing filter directive
    pub log_filter: Option<String>,
}

/// Similarity function used for fuzzy schema matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityKind {
    /// 1 - (edit distance / longer length)
    #[default]
    NormalizedLevenshtein,
    /// Jaro-Winkler, favours shared prefixes
    JaroWinkler,
    /// Jaccard overlap of word (or character) sets
    TokenSet,
}

/// Entity extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractionConfig {
    /// Match tokens against schema names and comments
    pub use_metadata: bool,
    /// Score tokens against schema keys with the similarity function
    pub fuzzy_enabled: bool,
    /// Minimum similarity for a fuzzy match to be emitted
    pub fuzzy_min_confidence: f64,
    /// Entities below this confidence are dropped by validation
    pub confidence_floor: f64,
    /// Longest token window considered for schema matches
    pub max_ngram: usize,
    /// Similarity function for fuzzy matching
    pub similarity: SimilarityKind,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            use_metadata: true,
            fuzzy_enabled: true,
            fuzzy_min_confidence: 0.8,
            confidence_floor: 0.5,
            max_ngram: 6,
            similarity: SimilarityKind::default(),
        }
    }
}

/// Intent recognition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IntentConfig {
    /// Page size used when a page number is given without one
    pub default_page_size: u32,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self { default_page_size: 10 }
    }
}

/// SQL generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Candidate tables within this distance of the best one count as ambiguous
    pub ambiguity_margin: f64,
    /// Column names that mark a column as the time axis
    pub time_column_hints: Vec<String>,
    /// Maximum number of alternative SQL statements
    pub max_alternatives: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            ambiguity_margin: 0.05,
            time_column_hints: [
                "created_at",
                "create_time",
                "created_time",
                "updated_at",
                "update_time",
                "order_date",
                "date",
                "time",
                "timestamp",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            max_alternatives: 3,
        }
    }
}

/// Query executor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutorConfig {
    /// How many finished query statuses stay visible to `status()`
    pub max_retained_statuses: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_retained_statuses: 1024 }
    }
}

impl NlqConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> NlqResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            NlqError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load from the file named by `NLQ_CONFIG`, or use defaults.
    pub fn from_env() -> NlqResult<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Reject out-of-range settings.
    pub fn validate(&self) -> NlqResult<()> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(NlqError::config(format!("{name} must be within [0, 1], got {v}")))
            }
        };
        unit("extraction.fuzzyMinConfidence", self.extraction.fuzzy_min_confidence)?;
        unit("extraction.confidenceFloor", self.extraction.confidence_floor)?;
        unit("generation.ambiguityMargin", self.generation.ambiguity_margin)?;

        if self.extraction.max_ngram == 0 {
            return Err(NlqError::config("extraction.maxNgram must be at least 1"));
        }
        if self.intent.default_page_size == 0 {
            return Err(NlqError::config("intent.defaultPageSize must be at least 1"));
        }
        Ok(())
    }
}
