//! Data models for the nlq core.
//!
//! This module contains all value types passed between pipeline stages:
//! - `text` - PreprocessedText, Language, Token
//! - `entity` - EntityTag, EntityKind
//! - `intent` - QueryIntent and its parts
//! - `schema` - SchemaInfo, TableInfo, ColumnInfo
//! - `conversion` - ConversionResult, GeneratedSql, SqlValue
//! - `query` - QueryExecutionResult, QueryStatus, QueryHandle
//! - `data_source` - DataSource, ConnectionOptions

pub mod conversion;
pub mod data_source;
pub mod entity;
pub mod intent;
pub mod query;
pub mod schema;
pub mod text;

pub use conversion::{BoundParameter, ConversionResult, GeneratedSql, SqlValue};
pub use data_source::{ConnectionOptions, DataSource, DataSourceKind};
pub use entity::{EntityAttributes, EntityKind, EntitySource, EntityTag};
pub use intent::{
    AggregateFunction, LimitRequirement, QueryIntent, QueryPurpose, QueryType, SortDirection,
    SortRequirement, TimeRange, TimeUnit,
};
pub use query::{
    QueryExecutionResult, QueryHandle, QueryStatus, ResultColumn, Row, StatementKind,
    StatementOutcome,
};
pub use schema::{ColumnInfo, SchemaInfo, TableInfo};
pub use text::{Language, PreprocessedText, Token, TokenFeature};
