//! Query execution models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One result row keyed by column label.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Kind of SQL statement, decided from its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatementKind {
    /// SELECT or WITH, returns rows
    Select,
    /// INSERT operation
    Insert,
    /// UPDATE operation
    Update,
    /// DELETE operation
    Delete,
    /// DDL, COPY, or other operations
    Other,
}

impl StatementKind {
    /// Detect the kind of a SQL statement.
    pub fn detect(sql: &str) -> Self {
        let trimmed = sql.trim_start().to_uppercase();

        if trimmed.starts_with("SELECT")
            || trimmed.starts_with("WITH")
            || trimmed.starts_with("SHOW")
            || trimmed.starts_with("VALUES")
        {
            Self::Select
        } else if trimmed.starts_with("INSERT") {
            Self::Insert
        } else if trimmed.starts_with("UPDATE") {
            Self::Update
        } else if trimmed.starts_with("DELETE") {
            Self::Delete
        } else {
            Self::Other
        }
    }

    /// Whether the statement produces a result set.
    pub fn returns_rows(&self) -> bool {
        matches!(self, Self::Select)
    }
}

/// Lifecycle of an executed query.
///
/// `Pending -> Running -> {Completed | Failed | Cancelled}`. `Unknown` is only
/// ever returned for ids that are not tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl QueryStatus {
    /// Whether no further transition can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: QueryStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }
}

/// Column metadata reported by an execution adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultColumn {
    /// Column label
    pub name: String,
    /// Database type name; empty when the adapter cannot tell
    pub type_name: String,
}

impl ResultColumn {
    /// Create column metadata.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self { name: name.into(), type_name: type_name.into() }
    }
}

/// Raw outcome of running one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    /// Result-producing statement; each row is parallel to `columns`
    Rows { columns: Vec<ResultColumn>, rows: Vec<Vec<serde_json::Value>> },
    /// Statement that only changes data
    Affected(u64),
}

/// Handle for tracking and cancelling a running query.
pub struct QueryHandle {
    /// Unique query identifier
    id: Uuid,
    /// Data source the query runs against
    data_source_id: String,
    /// The SQL being executed
    sql: String,
    /// Cancellation token for interrupting the query
    cancel_token: CancellationToken,
    /// Execution start time
    started_at: DateTime<Utc>,
}

impl QueryHandle {
    /// Create a new query handle.
    pub fn new(id: Uuid, data_source_id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            id,
            data_source_id: data_source_id.into(),
            sql: sql.into(),
            cancel_token: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }

    /// Get the unique query identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the data source id.
    pub fn data_source_id(&self) -> &str {
        &self.data_source_id
    }

    /// Get the SQL being executed.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Get when execution started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Get elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }

    /// Request cancellation of the query.
    pub fn cancel(&self) {
        tracing::debug!(query_id = %self.id, "Cancellation requested");
        self.cancel_token.cancel();
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Wait for cancellation.
    pub async fn cancelled(&self) {
        self.cancel_token.cancelled().await
    }
}

impl std::fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHandle")
            .field("id", &self.id)
            .field("data_source_id", &self.data_source_id)
            .field("sql", &self.sql)
            .field("started_at", &self.started_at)
            .field("is_cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Result of executing a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryExecutionResult {
    /// The tracked query id
    pub query_id: Uuid,
    /// Column labels in result order
    pub column_labels: Vec<String>,
    /// Column type names, parallel to `column_labels`
    pub column_types: Vec<String>,
    /// Result rows
    pub rows: Vec<Row>,
    /// Rows returned, or rows affected for non-result statements
    pub row_count: u64,
    /// Wall time in milliseconds
    pub duration_ms: u64,
    /// Whether the statement ran to completion
    pub success: bool,
    /// Failure message
    pub error_message: Option<String>,
    /// Kind of statement that ran
    pub statement_kind: Option<StatementKind>,
}

impl QueryExecutionResult {
    /// A failed result.
    pub fn failure(query_id: Uuid, message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            query_id,
            column_labels: Vec::new(),
            column_types: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            duration_ms,
            success: false,
            error_message: Some(message.into()),
            statement_kind: None,
        }
    }

    /// Check if the result has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
