//! Schema-driven entity extraction.

use super::similarity::{NormalizedLevenshtein, Similarity};
use super::{EntityExtractor, ExtractionContext};
use crate::models::{
    EntityKind, EntitySource, EntityTag, PreprocessedText, SchemaInfo, TokenFeature,
};

use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// What a lookup key points at.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Table { table: String },
    Column { table: String, column: String },
}

/// Case-insensitive map from schema names and comments to schema objects.
#[derive(Debug, Default)]
struct SchemaIndex {
    keys: HashMap<String, Vec<Target>>,
}

impl SchemaIndex {
    fn build(schema: &SchemaInfo) -> Self {
        let mut index = Self::default();
        for table in &schema.tables {
            let target = Target::Table { table: table.name.clone() };
            for key in key_variants(&table.name, table.comment.as_deref(), true) {
                index.insert(key, target.clone());
            }
            for column in &table.columns {
                let target = Target::Column { table: table.name.clone(), column: column.name.clone() };
                for key in key_variants(&column.name, column.comment.as_deref(), false) {
                    index.insert(key, target.clone());
                }
            }
        }
        index
    }

    fn insert(&mut self, key: String, target: Target) {
        let targets = self.keys.entry(key).or_default();
        if !targets.contains(&target) {
            targets.push(target);
        }
    }
}

/// Lookup keys for a name and its comment.
fn key_variants(name: &str, comment: Option<&str>, is_table: bool) -> Vec<String> {
    let mut keys = Vec::new();
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return keys;
    }
    keys.push(name.clone());
    if name.contains('_') {
        keys.push(name.replace('_', " "));
    }
    if is_table && name.len() > 3 && name.ends_with('s') && !name.ends_with("ss") {
        keys.push(name[..name.len() - 1].to_string());
    }

    if let Some(comment) = comment.map(|c| c.trim().to_lowercase()).filter(|c| !c.is_empty()) {
        keys.push(comment.clone());
        let stripped = ["信息表", "表", " table"]
            .iter()
            .find_map(|suffix| comment.strip_suffix(suffix))
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(stripped) = stripped {
            keys.push(stripped.to_string());
        }
    }
    keys
}

/// Matches token windows against schema names and comments.
///
/// Exact hits score 1.0. With fuzzy matching enabled every window of two or
/// more characters is also scored against every key, and scores at or above
/// the context minimum become additional entities.
pub struct MetadataEntityExtractor {
    similarity: Arc<dyn Similarity>,
}

impl Default for MetadataEntityExtractor {
    fn default() -> Self {
        Self::new(Arc::new(NormalizedLevenshtein))
    }
}

impl MetadataEntityExtractor {
    /// Create an extractor with a similarity function.
    pub fn new(similarity: Arc<dyn Similarity>) -> Self {
        Self { similarity }
    }

    fn emit(
        &self,
        out: &mut Vec<EntityTag>,
        targets: &[Target],
        confidence: f64,
        span: (usize, usize),
        origin: &str,
        source: EntitySource,
    ) {
        for target in targets {
            let tag = match target {
                Target::Table { table } => {
                    EntityTag::new(EntityKind::Table, table, confidence, span.0, span.1, source)
                }
                Target::Column { table, column } => {
                    EntityTag::new(EntityKind::Column, column, confidence, span.0, span.1, source)
                        .with_normalized(format!("{table}.{column}"))
                        .with_table(table)
                }
            };
            out.push(tag.with_origin(origin));
        }
    }
}

/// Join a token window, inserting spaces only between delimited tokens.
fn join_window(text: &PreprocessedText, from: usize, to: usize) -> String {
    let mut phrase = String::new();
    for i in from..to {
        let token = &text.token_details[i];
        if i > from {
            let prev = &text.token_details[i - 1];
            let glued = prev.feature == TokenFeature::Ideograph
                || token.feature == TokenFeature::Ideograph;
            if !glued {
                phrase.push(' ');
            }
        }
        phrase.push_str(&token.text);
    }
    phrase
}

impl EntityExtractor for MetadataEntityExtractor {
    fn extract(&self, text: &PreprocessedText, context: &ExtractionContext) -> Vec<EntityTag> {
        if !context.use_metadata {
            return Vec::new();
        }
        let Some(schema) = context.schema.as_ref() else {
            tracing::debug!("No schema available, skipping metadata extraction");
            return Vec::new();
        };

        let index = SchemaIndex::build(schema);
        let tokens = &text.token_details;
        let mut out = Vec::new();

        for start in 0..tokens.len() {
            for len in 1..=context.max_ngram {
                let end = start + len;
                if end > tokens.len() {
                    break;
                }
                let window = &tokens[start..end];
                if window
                    .iter()
                    .any(|t| matches!(t.feature, TokenFeature::Symbol | TokenFeature::Quoted))
                {
                    break;
                }
                if window.iter().all(|t| t.feature == TokenFeature::Number) {
                    continue;
                }

                let phrase = join_window(text, start, end);
                let span = (window[0].start, window[len - 1].end);
                let origin = text.original_slice(span.0, span.1);

                if let Some(targets) = index.keys.get(&phrase) {
                    self.emit(&mut out, targets, 1.0, span, &origin, EntitySource::Metadata);
                    continue;
                }

                if !context.fuzzy_enabled || phrase.chars().count() < 2 {
                    continue;
                }
                for (key, targets) in &index.keys {
                    let score = self.similarity.score(&phrase, key);
                    if score >= context.fuzzy_min_confidence {
                        self.emit(&mut out, targets, score, span, &origin, EntitySource::Fuzzy);
                    }
                }
            }
        }

        link_columns_to_tables(out)
    }

    fn name(&self) -> &'static str {
        "metadata"
    }
}

/// Point columns at their table's entity and drop column candidates whose
/// table was not mentioned when a sibling candidate's table was.
fn link_columns_to_tables(entities: Vec<EntityTag>) -> Vec<EntityTag> {
    let mut best_tables: HashMap<String, (Uuid, f64)> = HashMap::new();
    for entity in entities.iter().filter(|e| e.kind == EntityKind::Table) {
        let slot = best_tables.entry(entity.value.clone()).or_insert((entity.id, entity.confidence));
        if entity.confidence > slot.1 {
            *slot = (entity.id, entity.confidence);
        }
    }
    let table_ids: HashMap<String, Uuid> =
        best_tables.into_iter().map(|(name, (id, _))| (name, id)).collect();

    let linked: Vec<EntityTag> = entities
        .into_iter()
        .map(|e| match (e.kind, e.attributes.table.clone()) {
            (EntityKind::Column, Some(table)) => match table_ids.get(&table) {
                Some(id) => e.with_parent(*id),
                None => e,
            },
            _ => e,
        })
        .collect();

    let anchored: Vec<(String, usize, usize)> = linked
        .iter()
        .filter(|e| e.kind == EntityKind::Column && e.attributes.parent_id.is_some())
        .map(|e| (e.value.clone(), e.start_offset, e.end_offset))
        .collect();

    linked
        .into_iter()
        .filter(|e| {
            e.kind != EntityKind::Column
                || e.attributes.parent_id.is_some()
                || !anchored
                    .iter()
                    .any(|(v, s, end)| *v == e.value && *s == e.start_offset && *end == e.end_offset)
        })
        .collect()
}
