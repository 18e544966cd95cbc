//! The translation pipeline.
//!
//! - `preprocess` - language detection, normalization, tokenization
//! - `extract` - entity extraction strategies and post-processing
//! - `intent` - query intent recognition
//! - `generate` - SQL generation
//!
//! Every stage is a pure function of its inputs and safe to call from any
//! number of tasks at once.

pub mod extract;
pub mod generate;
pub mod intent;
pub mod lexicon;
pub mod numerals;
pub mod preprocess;

pub use extract::{
    dedup_occurrences, merge_entities, validate_entities, CompositeExtractor, EntityExtractor,
    Extraction, ExtractionContext, MetadataEntityExtractor, RuleEntityExtractor,
};
pub use generate::{quote_ident, GenerationContext, SqlGenerator};
pub use intent::{IntentContext, IntentRecognizer, RuleIntentRecognizer};
pub use preprocess::TextPreprocessor;
