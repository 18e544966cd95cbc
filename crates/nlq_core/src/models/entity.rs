//! Entity tag models produced by the extractors.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification of a tagged span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Table,
    Column,
    Value,
    Condition,
    Operator,
    Number,
    String,
    DateTime,
    Boolean,
    Function,
    Order,
    Limit,
    Group,
}

impl EntityKind {
    /// Whether the entity is a literal usable as a predicate value.
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Self::Value | Self::Number | Self::String | Self::DateTime | Self::Boolean
        )
    }
}

/// Which extractor produced an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntitySource {
    /// Exact schema name or comment match
    Metadata,
    /// Similarity-scored schema match
    Fuzzy,
    /// Lexical rule
    Rule,
}

/// Optional extra data attached to an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityAttributes {
    /// The span of original text that produced the entity
    pub origin_text: Option<String>,
    /// Id of a related entity (a column's table). Lookup only.
    pub parent_id: Option<Uuid>,
    /// Owning table for column entities
    pub table: Option<String>,
}

/// A tagged span of the input.
///
/// Entities are never mutated after creation; merging replaces them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTag {
    /// Unique id for back-references
    pub id: Uuid,
    /// Entity class
    pub kind: EntityKind,
    /// Canonical value (schema names keep their original case)
    pub value: String,
    /// Normalized form, e.g. an ISO date or a SQL operator
    pub normalized_value: Option<String>,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Char offset into the original text
    pub start_offset: usize,
    /// Char offset one past the end
    pub end_offset: usize,
    /// Extra data
    pub attributes: EntityAttributes,
    /// Producing extractor
    pub source: EntitySource,
}

impl EntityTag {
    /// Create a new entity. Confidence is clamped to [0, 1].
    pub fn new(
        kind: EntityKind,
        value: impl Into<String>,
        confidence: f64,
        start_offset: usize,
        end_offset: usize,
        source: EntitySource,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            value: value.into(),
            normalized_value: None,
            confidence: clamp_confidence(confidence),
            start_offset,
            end_offset,
            attributes: EntityAttributes::default(),
            source,
        }
    }

    /// Set the normalized value.
    pub fn with_normalized(mut self, normalized: impl Into<String>) -> Self {
        self.normalized_value = Some(normalized.into());
        self
    }

    /// Set the origin text.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.attributes.origin_text = Some(origin.into());
        self
    }

    /// Set the owning table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.attributes.table = Some(table.into());
        self
    }

    /// Set the parent entity id.
    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.attributes.parent_id = Some(parent_id);
        self
    }

    /// The normalized value if present, else the value.
    pub fn effective_value(&self) -> &str {
        self.normalized_value.as_deref().unwrap_or(&self.value)
    }

    /// The text this entity was produced from, if recorded.
    pub fn origin_text(&self) -> Option<&str> {
        self.attributes.origin_text.as_deref()
    }
}

/// Clamp a score into [0, 1]; NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
