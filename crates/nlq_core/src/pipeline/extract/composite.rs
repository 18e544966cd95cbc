//! Delegating extractor.

use super::metadata::MetadataEntityExtractor;
use super::rules::RuleEntityExtractor;
use super::similarity::Similarity;
use super::{EntityExtractor, ExtractionContext};
use crate::models::{EntityTag, PreprocessedText};

use std::sync::Arc;

/// Runs several extractors and pools their raw output.
///
/// Validation and merging happen once over the pooled entities, so the
/// dedup invariant holds across strategies.
#[derive(Clone)]
pub struct CompositeExtractor {
    extractors: Vec<Arc<dyn EntityExtractor>>,
}

impl CompositeExtractor {
    /// Compose the given extractors, run in order.
    pub fn new(extractors: Vec<Arc<dyn EntityExtractor>>) -> Self {
        Self { extractors }
    }

    /// Metadata matching followed by lexical rules.
    pub fn standard(similarity: Arc<dyn Similarity>) -> Self {
        Self::new(vec![
            Arc::new(MetadataEntityExtractor::new(similarity)),
            Arc::new(RuleEntityExtractor::new()),
        ])
    }

    /// Names of the composed extractors.
    pub fn names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }
}

impl EntityExtractor for CompositeExtractor {
    fn extract(&self, text: &PreprocessedText, context: &ExtractionContext) -> Vec<EntityTag> {
        self.extractors
            .iter()
            .flat_map(|extractor| extractor.extract(text, context))
            .collect()
    }

    fn name(&self) -> &'static str {
        "composite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnInfo, EntityKind, SchemaInfo, TableInfo};
    use crate::pipeline::extract::NormalizedLevenshtein;
    use crate::pipeline::preprocess::TextPreprocessor;

    #[test]
    fn test_standard_combines_schema_and_rules() {
        let schema = SchemaInfo::new(
            "shop",
            vec![TableInfo::new("orders")
                .with_comment("订单")
                .with_column(ColumnInfo::new("amount", "numeric").with_comment("金额"))],
        );
        let context = ExtractionContext::default().with_schema(Arc::new(schema));
        let text = TextPreprocessor::new().preprocess("订单金额大于100");

        let extractor = CompositeExtractor::standard(Arc::new(NormalizedLevenshtein));
        assert_eq!(extractor.names(), vec!["metadata", "rules"]);

        let kinds: Vec<EntityKind> = extractor.extract_all(&text, &context).iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EntityKind::Table, EntityKind::Column, EntityKind::Operator, EntityKind::Number]
        );
    }

    #[test]
    fn test_empty_composite_extracts_nothing() {
        let text = TextPreprocessor::new().preprocess("anything");
        let out = CompositeExtractor::new(Vec::new()).extract_all(&text, &ExtractionContext::default());
        assert!(out.is_empty());
    }
}
