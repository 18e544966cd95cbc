//! Schema metadata models.
//!
//! Read-only descriptions of the tables a data source exposes. The pipeline
//! only looks names up here; it never changes them.

use serde::{Deserialize, Serialize};

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Data type (e.g., "integer", "timestamp without time zone").
    pub data_type: String,
    /// Column comment, if any.
    #[serde(default)]
    pub comment: Option<String>,
}

impl ColumnInfo {
    /// Create a column without a comment.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self { name: name.into(), data_type: data_type.into(), comment: None }
    }

    /// Set the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Whether the type stores dates or timestamps.
    pub fn is_temporal(&self) -> bool {
        let ty = self.data_type.to_lowercase();
        ty.contains("date") || ty.contains("time")
    }

    /// Whether the type is numeric.
    pub fn is_numeric(&self) -> bool {
        let ty = self.data_type.to_lowercase();
        ["int", "numeric", "decimal", "real", "double", "float", "money", "serial"]
            .iter()
            .any(|t| ty.contains(t))
    }
}

/// A table and its ordered columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Table comment, if any.
    #[serde(default)]
    pub comment: Option<String>,
    /// Columns in ordinal order.
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    /// Create a table with no columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), comment: None, columns: Vec::new() }
    }

    /// Set the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Append a column.
    pub fn with_column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    /// Find a column by name, ignoring case.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Everything known about a data source's tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInfo {
    /// Data source this schema belongs to.
    #[serde(default)]
    pub data_source_id: String,
    /// Tables in the data source.
    pub tables: Vec<TableInfo>,
}

impl SchemaInfo {
    /// Create a schema for a data source.
    pub fn new(data_source_id: impl Into<String>, tables: Vec<TableInfo>) -> Self {
        Self { data_source_id: data_source_id.into(), tables }
    }

    /// Find a table by name, ignoring case.
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Tables that have a column with this name.
    pub fn tables_with_column<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a TableInfo> {
        self.tables.iter().filter(move |t| t.column(column).is_some())
    }

    /// Whether there are no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
