//! Service layer around the pipeline.
//!
//! - `schema` - schema provider contract and an in-memory provider
//! - `converter` - question-to-SQL orchestration
//! - `executor` - query execution with status tracking and cancellation
//! - `postgres` - PostgreSQL schema provider and execution adapter

pub mod converter;
pub mod executor;
pub mod postgres;
pub mod schema;

#[cfg(test)]
pub(crate) mod testing;

pub use converter::Converter;
pub use executor::{ExecutionAdapter, ExecutionRequest, QueryExecutor, StatementHandle};
pub use postgres::PostgresAdapter;
pub use schema::{SchemaProvider, StaticSchemaProvider};
