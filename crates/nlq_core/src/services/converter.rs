//! Question-to-SQL orchestration.
//!
//! [`Converter::convert`] resolves the schema, preprocesses the question,
//! runs extraction and intent recognition side by side on the blocking pool,
//! and hands both to the generator, also on the blocking pool. It never
//! returns an error or panics: every failure becomes a `ConversionResult`
//! with `success = false`.

use crate::config::NlqConfig;
use crate::error::{NlqError, NlqResult};
use crate::models::{ConversionResult, SchemaInfo};
use crate::pipeline::extract::similarity_for;
use crate::pipeline::{
    CompositeExtractor, EntityExtractor, ExtractionContext, GenerationContext, IntentContext,
    IntentRecognizer, RuleIntentRecognizer, SqlGenerator, TextPreprocessor,
};
use crate::services::schema::SchemaProvider;

use chrono::NaiveDateTime;
use std::sync::Arc;

/// Translates natural-language questions to SQL.
pub struct Converter {
    schemas: Arc<dyn SchemaProvider>,
    preprocessor: TextPreprocessor,
    extractor: Arc<dyn EntityExtractor>,
    recognizer: Arc<dyn IntentRecognizer>,
    generator: SqlGenerator,
    config: NlqConfig,
    /// Fixed "now"; the local clock when unset
    reference_time: Option<NaiveDateTime>,
}

impl Converter {
    /// Create a converter with the standard strategies for `config`.
    pub fn new(schemas: Arc<dyn SchemaProvider>, config: NlqConfig) -> Self {
        let extractor = CompositeExtractor::standard(similarity_for(config.extraction.similarity));
        Self {
            schemas,
            preprocessor: TextPreprocessor::new(),
            extractor: Arc::new(extractor),
            recognizer: Arc::new(RuleIntentRecognizer::new()),
            generator: SqlGenerator::new(),
            config,
            reference_time: None,
        }
    }

    /// Replace the entity extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replace the intent recognizer.
    pub fn with_recognizer(mut self, recognizer: Arc<dyn IntentRecognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    /// Resolve relative dates against a fixed time instead of the clock.
    pub fn with_reference_time(mut self, now: NaiveDateTime) -> Self {
        self.reference_time = Some(now);
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &NlqConfig {
        &self.config
    }

    /// Translate `query` against the schema of `data_source_id`.
    pub async fn convert(&self, query: &str, data_source_id: &str) -> ConversionResult {
        self.convert_with_metadata(query, data_source_id).await.0
    }

    /// Like [`Converter::convert`], also returning the schema that was used.
    #[tracing::instrument(level = "debug", skip_all, name = "convert", fields(data_source_id = %data_source_id))]
    pub async fn convert_with_metadata(
        &self,
        query: &str,
        data_source_id: &str,
    ) -> (ConversionResult, Option<Arc<SchemaInfo>>) {
        if query.trim().is_empty() {
            let err = NlqError::input("Query must not be empty");
            tracing::warn!(error = %err, "Rejected question");
            return (ConversionResult::failure(err.to_string()), None);
        }

        let schema = match self.schemas.get_schema(data_source_id).await {
            Ok(schema) => Arc::new(schema),
            Err(err) => {
                tracing::warn!(error = %err, category = err.category(), "Schema lookup failed");
                return (ConversionResult::failure(err.to_string()), None);
            }
        };

        match self.translate(query, Arc::clone(&schema)).await {
            Ok(result) => {
                tracing::debug!(
                    success = result.success,
                    confidence = result.confidence,
                    entity_count = result.extracted_entities.len(),
                    param_count = result.parameters.len(),
                    "Question converted"
                );
                (result, Some(schema))
            }
            Err(err) => {
                tracing::error!(error = %err, "Conversion failed");
                (ConversionResult::failure(err.to_string()), Some(schema))
            }
        }
    }

    async fn translate(&self, query: &str, schema: Arc<SchemaInfo>) -> NlqResult<ConversionResult> {
        let now = self
            .reference_time
            .unwrap_or_else(|| chrono::Local::now().naive_local());
        let text = Arc::new(self.preprocessor.preprocess(query));
        tracing::trace!(
            language = text.language.as_str(),
            token_count = text.tokens.len(),
            "Question preprocessed"
        );

        let extraction = ExtractionContext::from_config(&self.config.extraction, now.date())
            .with_schema(Arc::clone(&schema));
        let recognition = IntentContext::from_config(&self.config.intent, now.date());

        let extract = {
            let extractor = Arc::clone(&self.extractor);
            let text = Arc::clone(&text);
            tokio::task::spawn_blocking(move || extractor.extract_occurrences(&text, &extraction))
        };
        let recognize = {
            let recognizer = Arc::clone(&self.recognizer);
            let text = Arc::clone(&text);
            tokio::task::spawn_blocking(move || recognizer.recognize(&text, &recognition))
        };
        let (extraction, intent) = tokio::try_join!(extract, recognize)
            .map_err(|e| NlqError::internal_with_source("Pipeline stage failed", e))?;

        let context = GenerationContext::new(now, self.config.generation.clone());
        let generator = self.generator;
        let occurrences = extraction.occurrences;
        let (generated, intent) = tokio::task::spawn_blocking(move || {
            let generated = generator.generate(&occurrences, &intent, Some(&*schema), &context);
            (generated, intent)
        })
        .await
        .map_err(|e| NlqError::internal_with_source("Pipeline stage failed", e))?;
        Ok(ConversionResult::from_generated(generated, extraction.entities, intent))
    }
}
