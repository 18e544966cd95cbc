//! Conversion result models.

use crate::models::entity::EntityTag;
use crate::models::intent::QueryIntent;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A typed value bound to a SQL placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    /// Parse a number literal, preferring integers.
    pub fn number(literal: &str) -> Option<Self> {
        if let Ok(i) = literal.parse::<i64>() {
            return Some(Self::Int(i));
        }
        literal.parse::<f64>().ok().filter(|f| f.is_finite()).map(Self::Float)
    }

    /// Convert to a JSON value for display.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Date(d) => serde_json::Value::String(d.to_string()),
            Self::Timestamp(t) => serde_json::Value::String(t.to_string()),
        }
    }

    /// Build from a caller-supplied JSON value.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            serde_json::Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

/// A named placeholder and its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundParameter {
    /// Placeholder as it appears in the SQL (e.g., "$1")
    pub name: String,
    /// Bound value
    pub value: SqlValue,
}

/// Output of the SQL generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedSql {
    /// SQL text; empty when no table could be resolved
    pub sql: String,
    /// Bound parameters in placeholder order
    pub parameters: Vec<BoundParameter>,
    /// Translation quality in [0, 1]
    pub confidence: f64,
    /// Audit trail of mapping decisions
    pub explanations: Vec<String>,
    /// Other plausible translations
    pub alternative_sqls: Vec<String>,
}

/// Result of converting one question. Produced once per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub sql: String,
    pub parameters: Vec<BoundParameter>,
    pub confidence: f64,
    pub explanations: Vec<String>,
    pub alternative_sqls: Vec<String>,
    pub extracted_entities: Vec<EntityTag>,
    pub query_intent: Option<QueryIntent>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl ConversionResult {
    /// Assemble a result from the pipeline outputs.
    ///
    /// Succeeds only when the generator produced SQL with non-zero confidence.
    pub fn from_generated(
        generated: GeneratedSql,
        entities: Vec<EntityTag>,
        intent: QueryIntent,
    ) -> Self {
        let success = !generated.sql.is_empty() && generated.confidence > 0.0;
        let error_message = if success {
            None
        } else {
            Some(
                generated
                    .explanations
                    .last()
                    .cloned()
                    .unwrap_or_else(|| "Unable to translate the question".to_string()),
            )
        };
        Self {
            sql: generated.sql,
            parameters: generated.parameters,
            confidence: generated.confidence,
            explanations: generated.explanations,
            alternative_sqls: generated.alternative_sqls,
            extracted_entities: entities,
            query_intent: Some(intent),
            success,
            error_message,
        }
    }

    /// A failed result carrying the failure reason.
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            sql: String::new(),
            parameters: Vec::new(),
            confidence: 0.0,
            explanations: vec![message.clone()],
            alternative_sqls: Vec::new(),
            extracted_entities: Vec::new(),
            query_intent: None,
            success: false,
            error_message: Some(message),
        }
    }

    /// Look up a bound parameter by placeholder name.
    pub fn parameter(&self, name: &str) -> Option<&SqlValue> {
        self.parameters.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    /// Parameter values in placeholder order.
    pub fn parameter_values(&self) -> Vec<SqlValue> {
        self.parameters.iter().map(|p| p.value.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_has_reason_and_zero_confidence() {
        let result = ConversionResult::failure("Data source not found: ds-9");
        assert!(!result.success);
        assert_eq!(result.confidence, 0.0);
        assert!(result.sql.is_empty());
        assert_eq!(result.explanations, vec!["Data source not found: ds-9".to_string()]);
        assert_eq!(result.error_message.as_deref(), Some("Data source not found: ds-9"));
    }

    #[test]
    fn test_zero_confidence_generation_is_not_success() {
        let generated = GeneratedSql {
            sql: String::new(),
            confidence: 0.0,
            explanations: vec!["No table could be resolved".to_string()],
            ..Default::default()
        };
        let result = ConversionResult::from_generated(generated, Vec::new(), QueryIntent::default());
        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("No table could be resolved"));
    }

    #[test]
    fn test_sql_value_number_prefers_int() {
        assert_eq!(SqlValue::number("42"), Some(SqlValue::Int(42)));
        assert_eq!(SqlValue::number("4.5"), Some(SqlValue::Float(4.5)));
        assert_eq!(SqlValue::number("abc"), None);
        assert_eq!(SqlValue::from_json(&serde_json::json!(7)), SqlValue::Int(7));
    }
}
