//! Schema metadata lookup.
//!
//! The pipeline asks a [`SchemaProvider`] for the tables of a data source
//! before extraction. [`StaticSchemaProvider`] serves schemas held in memory;
//! [`crate::services::PostgresAdapter`] reads them from the system catalogs.

use crate::error::{NlqError, NlqResult};
use crate::models::SchemaInfo;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;

/// Resolves a data source id to its schema metadata.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Load the schema for `data_source_id`.
    async fn get_schema(&self, data_source_id: &str) -> NlqResult<SchemaInfo>;
}

/// Schema provider backed by an in-memory map.
#[derive(Debug, Default)]
pub struct StaticSchemaProvider {
    schemas: RwLock<HashMap<String, SchemaInfo>>,
}

impl StaticSchemaProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema under its `data_source_id`.
    pub fn with_schema(self, schema: SchemaInfo) -> Self {
        self.insert(schema);
        self
    }

    /// Register or replace a schema.
    pub fn insert(&self, schema: SchemaInfo) {
        tracing::debug!(
            data_source_id = %schema.data_source_id,
            table_count = schema.tables.len(),
            "Schema registered"
        );
        self.schemas.write().insert(schema.data_source_id.clone(), schema);
    }

    /// Remove a schema.
    pub fn remove(&self, data_source_id: &str) -> Option<SchemaInfo> {
        self.schemas.write().remove(data_source_id)
    }

    /// Read a schema description from a JSON file without registering it.
    pub fn read_file(path: impl AsRef<Path>) -> NlqResult<SchemaInfo> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            NlqError::schema_unavailable_with_source(
                format!("Failed to read {}", path.display()),
                e,
            )
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            NlqError::schema_unavailable_with_source(
                format!("Invalid schema file {}", path.display()),
                e,
            )
        })
    }

    /// Ids with a registered schema.
    pub fn data_source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.schemas.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl SchemaProvider for StaticSchemaProvider {
    async fn get_schema(&self, data_source_id: &str) -> NlqResult<SchemaInfo> {
        self.schemas
            .read()
            .get(data_source_id)
            .cloned()
            .ok_or_else(|| NlqError::data_source_not_found(data_source_id))
    }
}
