//! Entity extraction.
//!
//! Extractors tag spans of preprocessed text as tables, columns, literals,
//! operators, and query keywords. Every extractor shares the same
//! post-processing: [`validate_entities`] drops low-confidence tags and
//! [`merge_entities`] keeps one tag per `(kind, value)`. The generator reads
//! [`Extraction::occurrences`] instead, where a repeated word such as the
//! second 大于 in `金额大于100并且价格大于5` keeps its own position.

pub mod composite;
pub mod metadata;
pub mod rules;
pub mod similarity;

pub use composite::CompositeExtractor;
pub use metadata::MetadataEntityExtractor;
pub use rules::RuleEntityExtractor;
pub use similarity::{similarity_for, JaroWinkler, NormalizedLevenshtein, Similarity, TokenSetSimilarity};

use crate::config::ExtractionConfig;
use crate::models::{EntityKind, EntityTag, PreprocessedText, SchemaInfo};

use chrono::NaiveDate;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-request extraction settings.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    /// Match against schema metadata
    pub use_metadata: bool,
    /// Enable similarity-scored schema matches
    pub fuzzy_enabled: bool,
    /// Minimum similarity for fuzzy matches
    pub fuzzy_min_confidence: f64,
    /// Validation floor
    pub confidence_floor: f64,
    /// Longest token window for schema matches
    pub max_ngram: usize,
    /// Resolved schema, if available
    pub schema: Option<Arc<SchemaInfo>>,
    /// Date that relative day words resolve against
    pub reference_date: NaiveDate,
}

impl ExtractionContext {
    /// Build from configuration.
    pub fn from_config(config: &ExtractionConfig, reference_date: NaiveDate) -> Self {
        Self {
            use_metadata: config.use_metadata,
            fuzzy_enabled: config.fuzzy_enabled,
            fuzzy_min_confidence: config.fuzzy_min_confidence,
            confidence_floor: config.confidence_floor,
            max_ngram: config.max_ngram.max(1),
            schema: None,
            reference_date,
        }
    }

    /// Attach a schema.
    pub fn with_schema(mut self, schema: Arc<SchemaInfo>) -> Self {
        self.schema = Some(schema);
        self
    }
}

impl Default for ExtractionContext {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default(), chrono::Local::now().date_naive())
    }
}

/// Entities found in one question.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Validated and merged: one entity per `(kind, value)`
    pub entities: Vec<EntityTag>,
    /// Validated, one entity per `(kind, value, span)`
    pub occurrences: Vec<EntityTag>,
}

/// Tags entities in preprocessed text.
pub trait EntityExtractor: Send + Sync {
    /// Raw extraction. Never fails; an extractor that lacks what it needs
    /// returns an empty list.
    fn extract(&self, text: &PreprocessedText, context: &ExtractionContext) -> Vec<EntityTag>;

    /// Drop entities below the context's confidence floor.
    fn validate(&self, entities: Vec<EntityTag>, context: &ExtractionContext) -> Vec<EntityTag> {
        validate_entities(entities, context.confidence_floor)
    }

    /// Keep one entity per `(kind, value)`.
    fn merge(&self, entities: Vec<EntityTag>) -> Vec<EntityTag> {
        merge_entities(entities)
    }

    /// Extract, validate, and merge.
    fn extract_all(&self, text: &PreprocessedText, context: &ExtractionContext) -> Vec<EntityTag> {
        self.extract_occurrences(text, context).entities
    }

    /// Extract and validate once, keeping both the merged entities and
    /// every distinct occurrence.
    fn extract_occurrences(&self, text: &PreprocessedText, context: &ExtractionContext) -> Extraction {
        let raw = self.extract(text, context);
        let raw_count = raw.len();
        let occurrences = dedup_occurrences(self.validate(raw, context));
        let entities = self.merge(occurrences.clone());
        tracing::debug!(
            extractor = self.name(),
            raw_count,
            occurrence_count = occurrences.len(),
            entity_count = entities.len(),
            "Entities extracted"
        );
        Extraction { entities, occurrences }
    }

    /// Extractor name for logging.
    fn name(&self) -> &'static str;
}

/// Keep entities at or above `floor` with a non-empty value.
pub fn validate_entities(entities: Vec<EntityTag>, floor: f64) -> Vec<EntityTag> {
    entities
        .into_iter()
        .filter(|e| e.confidence >= floor && (0.0..=1.0).contains(&e.confidence))
        .filter(|e| !e.value.trim().is_empty())
        .collect()
}

/// Keep the highest-confidence entity for each `(kind, value)`.
///
/// Ties keep the earlier entity. The result is ordered by start offset.
pub fn merge_entities(entities: Vec<EntityTag>) -> Vec<EntityTag> {
    let mut kept: Vec<EntityTag> = Vec::with_capacity(entities.len());
    let mut slots: HashMap<(EntityKind, String), usize> = HashMap::new();

    for entity in entities {
        match slots.entry((entity.kind, entity.value.clone())) {
            Entry::Occupied(slot) => {
                let current = &mut kept[*slot.get()];
                if entity.confidence > current.confidence {
                    *current = entity;
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(kept.len());
                kept.push(entity);
            }
        }
    }

    kept.sort_by_key(|e| (e.start_offset, e.end_offset));
    kept
}

/// Keep the most confident entity for each `(kind, value, span)`, in
/// extraction order.
pub fn dedup_occurrences(entities: Vec<EntityTag>) -> Vec<EntityTag> {
    let mut kept: Vec<EntityTag> = Vec::with_capacity(entities.len());
    let mut slots: HashMap<(EntityKind, String, usize, usize), usize> = HashMap::new();

    for entity in entities {
        let key = (entity.kind, entity.value.clone(), entity.start_offset, entity.end_offset);
        match slots.entry(key) {
            Entry::Occupied(slot) => {
                let current = &mut kept[*slot.get()];
                if entity.confidence > current.confidence {
                    *current = entity;
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(kept.len());
                kept.push(entity);
            }
        }
    }
    kept
}

/// Convert a byte offset in `text` to a char offset.
pub(crate) fn char_offset(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntitySource;

    fn tag(kind: EntityKind, value: &str, confidence: f64, start: usize) -> EntityTag {
        EntityTag::new(kind, value, confidence, start, start + 1, EntitySource::Rule)
    }

    #[test]
    fn test_merge_keeps_highest_confidence() {
        let merged = merge_entities(vec![
            tag(EntityKind::Table, "orders", 0.6, 0),
            tag(EntityKind::Table, "orders", 0.9, 5),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].confidence, 0.9);
        assert_eq!(merged[0].start_offset, 5);
    }

    #[test]
    fn test_merge_distinguishes_kind() {
        let merged = merge_entities(vec![
            tag(EntityKind::Table, "orders", 0.6, 0),
            tag(EntityKind::Column, "orders", 0.7, 1),
            tag(EntityKind::Table, "orders", 0.6, 2),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].kind, EntityKind::Table);
        assert_eq!(merged[0].start_offset, 0);
    }

    #[test]
    fn test_merge_never_keeps_duplicates() {
        let values = ["a", "b", "a", "c", "b", "a"];
        let entities: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, v)| tag(EntityKind::Value, v, 0.1 * (i as f64 + 1.0), i))
            .collect();
        let merged = merge_entities(entities.clone());

        for (i, a) in merged.iter().enumerate() {
            for b in &merged[i + 1..] {
                assert!(!(a.kind == b.kind && a.value == b.value));
            }
            let best = entities
                .iter()
                .filter(|e| e.value == a.value)
                .map(|e| e.confidence)
                .fold(0.0, f64::max);
            assert_eq!(a.confidence, best);
        }
    }

    #[test]
    fn test_occurrences_keep_repeated_words_apart() {
        let deduped = dedup_occurrences(vec![
            tag(EntityKind::Operator, ">", 0.9, 2),
            tag(EntityKind::Operator, ">", 1.0, 2),
            tag(EntityKind::Operator, ">", 0.9, 8),
        ]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].confidence, 1.0);
        assert_eq!(deduped[1].start_offset, 8);
        assert_eq!(merge_entities(deduped).len(), 1);
    }

    #[test]
    fn test_validate_applies_floor() {
        let kept = validate_entities(
            vec![
                tag(EntityKind::Value, "x", 0.49, 0),
                tag(EntityKind::Value, "y", 0.5, 1),
                tag(EntityKind::Value, " ", 0.9, 2),
            ],
            0.5,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].value, "y");
    }
}
