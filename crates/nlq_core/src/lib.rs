//! Core of nlq, a natural-language-to-SQL translator.
//!
//! This crate turns a question such as "查询最近30天订单金额大于100的记录"
//! into parameterized SQL and can run it:
//!
//! - **pipeline**: preprocessing, entity extraction, intent recognition, SQL generation
//! - **services**: schema providers, the converter, the query executor, PostgreSQL
//! - **state**: the `NlqService` facade answering requests end to end
//! - **models**: values passed between stages and returned to callers
//! - **config**, **error**, **logging**: runtime configuration, errors, tracing setup

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod state;


pub use config::NlqConfig;
pub use error::{NlqError, NlqResult};
pub use models::{
    BoundParameter, ColumnInfo, ConversionResult, DataSource, EntityKind, EntityTag,
    QueryExecutionResult, QueryIntent, QueryStatus, SchemaInfo, SqlValue, TableInfo,
};
pub use services::{
    Converter, ExecutionAdapter, ExecutionRequest, PostgresAdapter, QueryExecutor,
    SchemaProvider, StatementHandle, StaticSchemaProvider,
};
pub use state::{NlQueryRequest, NlQueryResponse, NlqService};
