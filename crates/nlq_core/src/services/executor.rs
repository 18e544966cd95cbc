//! Query execution with status tracking and cancellation.
//!
//! Every execution gets a [`QueryHandle`] keyed by its query id. The handle
//! lives in the tracking map from registration until the query reaches a
//! terminal status; the status itself is kept afterwards (bounded by
//! `max_retained_statuses`) so late `status()` calls still see the outcome.
//!
//! Cancellation and completion both settle the status under the same write
//! lock, and whichever gets there first wins. The loser observes a terminal
//! status and leaves it alone.

use crate::config::ExecutorConfig;
use crate::error::{NlqError, NlqResult};
use crate::models::{
    DataSource, QueryExecutionResult, QueryHandle, QueryStatus, Row, SchemaInfo, SqlValue,
    StatementKind, StatementOutcome,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::select;
use uuid::Uuid;

/// Opens statement handles against a data source.
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    /// Acquire a connection able to run one statement.
    async fn open(&self, source: &DataSource) -> NlqResult<Box<dyn StatementHandle>>;
}

/// One open connection, ready to run a statement.
#[async_trait]
pub trait StatementHandle: Send + Sync {
    /// Run `sql` with positional parameters.
    async fn run(&self, sql: &str, params: &[SqlValue]) -> NlqResult<StatementOutcome>;

    /// Interrupt the statement currently running on this connection.
    async fn cancel(&self) -> NlqResult<()>;
}

/// A statement to execute.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Id the query is tracked under; generated up front so callers can
    /// cancel before `execute` returns.
    pub query_id: Uuid,
    /// SQL text
    pub sql: String,
    /// Positional parameter values
    pub parameters: Vec<SqlValue>,
    /// Where to run it
    pub data_source: DataSource,
    /// Schema used to fill in column types the adapter does not report
    pub schema: Option<Arc<SchemaInfo>>,
}

impl ExecutionRequest {
    /// Create a request with a fresh query id.
    pub fn new(sql: impl Into<String>, data_source: DataSource) -> Self {
        Self {
            query_id: Uuid::new_v4(),
            sql: sql.into(),
            parameters: Vec::new(),
            data_source,
            schema: None,
        }
    }

    /// Set the parameter values.
    pub fn with_params(mut self, parameters: Vec<SqlValue>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Use a caller-chosen query id.
    pub fn with_id(mut self, query_id: Uuid) -> Self {
        self.query_id = query_id;
        self
    }

    /// Attach schema metadata.
    pub fn with_schema(mut self, schema: Arc<SchemaInfo>) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Tracking entry for one query id.
#[derive(Debug)]
struct TrackedQuery {
    status: QueryStatus,
    handle: Option<Arc<QueryHandle>>,
}

#[derive(Debug, Default)]
struct Tracker {
    queries: HashMap<Uuid, TrackedQuery>,
    /// Terminal ids, oldest first
    finished: VecDeque<Uuid>,
}

impl Tracker {
    /// Record that `id` reached a terminal status and evict the oldest
    /// terminal entries beyond `limit`.
    fn retire(&mut self, id: Uuid, limit: usize) {
        self.finished.push_back(id);
        while self.finished.len() > limit {
            let Some(oldest) = self.finished.pop_front() else { break };
            if self.queries.get(&oldest).is_some_and(|q| q.status.is_terminal()) {
                self.queries.remove(&oldest);
            }
        }
    }
}

/// Runs SQL through an [`ExecutionAdapter`] and tracks each query's status.
pub struct QueryExecutor {
    adapter: Arc<dyn ExecutionAdapter>,
    tracker: RwLock<Tracker>,
    config: ExecutorConfig,
}

impl QueryExecutor {
    /// Create an executor with default settings.
    pub fn new(adapter: Arc<dyn ExecutionAdapter>) -> Self {
        Self::with_config(adapter, ExecutorConfig::default())
    }

    /// Create an executor with explicit settings.
    pub fn with_config(adapter: Arc<dyn ExecutionAdapter>, config: ExecutorConfig) -> Self {
        Self { adapter, tracker: RwLock::new(Tracker::default()), config }
    }

    /// Execute a statement and wait for its result.
    ///
    /// Never fails: blank SQL, connection faults, statement faults, and
    /// cancellation all come back as a result with `success = false`.
    pub async fn execute(&self, request: ExecutionRequest) -> QueryExecutionResult {
        match self.register(&request) {
            Ok(handle) => self.run_registered(request, handle).await,
            Err(result) => result,
        }
    }

    /// Register the query, then run it on the tokio runtime.
    ///
    /// The query is tracked as `Pending` before this returns, so it can be
    /// cancelled immediately.
    pub fn spawn(
        self: &Arc<Self>,
        request: ExecutionRequest,
    ) -> tokio::task::JoinHandle<QueryExecutionResult> {
        let registered = self.register(&request);
        let executor = Arc::clone(self);
        tokio::spawn(async move {
            match registered {
                Ok(handle) => executor.run_registered(request, handle).await,
                Err(result) => result,
            }
        })
    }

    /// Request cancellation of a tracked query.
    ///
    /// Returns false when the id is unknown or the query already finished.
    pub fn cancel(&self, query_id: Uuid) -> bool {
        let handle = {
            let mut tracker = self.tracker.write();
            let Some(entry) = tracker.queries.get_mut(&query_id) else {
                tracing::debug!(query_id = %query_id, "Cancel requested for unknown query");
                return false;
            };
            if !entry.status.can_transition_to(QueryStatus::Cancelled) {
                return false;
            }
            let Some(handle) = entry.handle.take() else {
                return false;
            };
            entry.status = QueryStatus::Cancelled;
            tracker.retire(query_id, self.config.max_retained_statuses);
            handle
        };

        handle.cancel();
        tracing::info!(
            query_id = %query_id,
            data_source_id = %handle.data_source_id(),
            elapsed_ms = handle.elapsed_ms(),
            "Query cancelled"
        );
        true
    }

    /// Current status; `Unknown` for ids that are not tracked.
    pub fn status(&self, query_id: Uuid) -> QueryStatus {
        self.tracker
            .read()
            .queries
            .get(&query_id)
            .map(|q| q.status)
            .unwrap_or(QueryStatus::Unknown)
    }

    /// Whether a live statement handle is tracked for this id.
    pub fn is_in_flight(&self, query_id: Uuid) -> bool {
        self.tracker
            .read()
            .queries
            .get(&query_id)
            .is_some_and(|q| q.handle.is_some())
    }

    /// Ids of queries that have not finished.
    pub fn active_query_ids(&self) -> Vec<Uuid> {
        self.tracker
            .read()
            .queries
            .iter()
            .filter(|(_, q)| q.handle.is_some())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Number of tracked ids, finished ones included.
    pub fn tracked_count(&self) -> usize {
        self.tracker.read().queries.len()
    }

    fn register(&self, request: &ExecutionRequest) -> Result<Arc<QueryHandle>, QueryExecutionResult> {
        let query_id = request.query_id;
        if request.sql.trim().is_empty() {
            let err = NlqError::input("SQL must not be empty");
            tracing::warn!(query_id = %query_id, error = %err, "Rejected query");
            return Err(QueryExecutionResult::failure(query_id, err.to_string(), 0));
        }

        let mut tracker = self.tracker.write();
        if tracker.queries.get(&query_id).is_some_and(|q| !q.status.is_terminal()) {
            let err = NlqError::input(format!("Query id {query_id} is already running"));
            tracing::warn!(query_id = %query_id, error = %err, "Rejected query");
            return Err(QueryExecutionResult::failure(query_id, err.to_string(), 0));
        }

        let handle = Arc::new(QueryHandle::new(
            query_id,
            request.data_source.id.clone(),
            request.sql.clone(),
        ));
        tracker.finished.retain(|id| *id != query_id);
        tracker.queries.insert(
            query_id,
            TrackedQuery { status: QueryStatus::Pending, handle: Some(Arc::clone(&handle)) },
        );
        tracing::trace!(query_id = %query_id, "Query registered");
        Ok(handle)
    }

    async fn run_registered(
        &self,
        request: ExecutionRequest,
        handle: Arc<QueryHandle>,
    ) -> QueryExecutionResult {
        let start = Instant::now();
        let query_id = request.query_id;
        let kind = StatementKind::detect(&request.sql);

        tracing::debug!(
            query_id = %query_id,
            data_source_id = %request.data_source.id,
            statement_kind = ?kind,
            param_count = request.parameters.len(),
            "Executing query"
        );

        let outcome = self.run_statement(&request, &handle).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let final_status = match &outcome {
            Ok(_) => QueryStatus::Completed,
            Err(e) if e.is_cancelled() => QueryStatus::Cancelled,
            Err(_) => QueryStatus::Failed,
        };
        let settled = self.settle(query_id, final_status);

        match outcome {
            Ok(statement) if settled => {
                let result = build_result(query_id, kind, statement, request.schema.as_deref(), elapsed_ms);
                tracing::debug!(
                    query_id = %query_id,
                    execution_time_ms = elapsed_ms,
                    row_count = result.row_count,
                    "Query completed"
                );
                result
            }
            Err(err) if settled && !err.is_cancelled() => {
                tracing::warn!(
                    query_id = %query_id,
                    error = %err,
                    category = err.category(),
                    sql_state = err.sql_state(),
                    "Query failed"
                );
                QueryExecutionResult::failure(query_id, err.to_string(), elapsed_ms)
            }
            _ => {
                tracing::debug!(query_id = %query_id, "Query finished after cancellation");
                QueryExecutionResult::failure(
                    query_id,
                    NlqError::query_cancelled(query_id).to_string(),
                    elapsed_ms,
                )
            }
        }
    }

    async fn run_statement(
        &self,
        request: &ExecutionRequest,
        handle: &QueryHandle,
    ) -> NlqResult<StatementOutcome> {
        let query_id = request.query_id;
        if handle.is_cancelled() {
            return Err(NlqError::query_cancelled(query_id));
        }

        let statement = select! {
            opened = self.adapter.open(&request.data_source) => opened?,
            _ = handle.cancelled() => return Err(NlqError::query_cancelled(query_id)),
        };

        if !self.transition(query_id, QueryStatus::Running) {
            return Err(NlqError::query_cancelled(query_id));
        }

        select! {
            result = statement.run(&request.sql, &request.parameters) => result,
            _ = handle.cancelled() => {
                if let Err(e) = statement.cancel().await {
                    tracing::warn!(query_id = %query_id, error = %e, "Failed to interrupt statement");
                }
                Err(NlqError::query_cancelled(query_id))
            }
        }
    }

    /// Apply a non-terminal transition; false if the query moved on already.
    fn transition(&self, query_id: Uuid, next: QueryStatus) -> bool {
        let mut tracker = self.tracker.write();
        match tracker.queries.get_mut(&query_id) {
            Some(entry) if entry.status.can_transition_to(next) => {
                entry.status = next;
                true
            }
            _ => false,
        }
    }

    /// Move to a terminal status and drop the handle.
    ///
    /// Returns false when another path (a cancel) settled the query first.
    fn settle(&self, query_id: Uuid, status: QueryStatus) -> bool {
        let mut tracker = self.tracker.write();
        let Some(entry) = tracker.queries.get_mut(&query_id) else {
            return false;
        };
        if !entry.status.can_transition_to(status) {
            return false;
        }
        entry.status = status;
        entry.handle = None;
        tracker.retire(query_id, self.config.max_retained_statuses);
        true
    }
}

/// Turn a raw outcome into a result, filling unknown column types from the
/// schema.
fn build_result(
    query_id: Uuid,
    kind: StatementKind,
    outcome: StatementOutcome,
    schema: Option<&SchemaInfo>,
    duration_ms: u64,
) -> QueryExecutionResult {
    let (column_labels, column_types, rows, row_count) = match outcome {
        StatementOutcome::Rows { columns, rows } => {
            let labels: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
            let types = columns
                .iter()
                .map(|c| {
                    if c.type_name.is_empty() {
                        schema_type(schema, &c.name).unwrap_or_default()
                    } else {
                        c.type_name.clone()
                    }
                })
                .collect();
            let rows: Vec<Row> = rows
                .into_iter()
                .map(|values| labels.iter().cloned().zip(values).collect())
                .collect();
            let count = rows.len() as u64;
            (labels, types, rows, count)
        }
        StatementOutcome::Affected(n) => (Vec::new(), Vec::new(), Vec::new(), n),
    };

    QueryExecutionResult {
        query_id,
        column_labels,
        column_types,
        rows,
        row_count,
        duration_ms,
        success: true,
        error_message: None,
        statement_kind: Some(kind),
    }
}

fn schema_type(schema: Option<&SchemaInfo>, column: &str) -> Option<String> {
    schema?
        .tables
        .iter()
        .find_map(|t| t.column(column))
        .map(|c| c.data_type.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnInfo, ResultColumn, TableInfo};
    use crate::services::testing::{Script, ScriptedAdapter};
    use serde_json::json;
    use std::time::Duration;

    fn source() -> DataSource {
        DataSource::custom("mem", "scripted")
    }

    fn executor(script: Script) -> (Arc<QueryExecutor>, Arc<ScriptedAdapter>) {
        let adapter = Arc::new(ScriptedAdapter::new(script));
        (Arc::new(QueryExecutor::new(adapter.clone())), adapter)
    }

    async fn wait_for_status(executor: &QueryExecutor, id: Uuid, status: QueryStatus) {
        for _ in 0..200 {
            if executor.status(id) == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("query {id} never reached {status:?}, got {:?}", executor.status(id));
    }

    #[tokio::test]
    async fn test_blank_sql_is_rejected_without_tracking() {
        let (executor, adapter) = executor(Script::Affected(1));
        let request = ExecutionRequest::new("   ", source());
        let id = request.query_id;

        let result = executor.execute(request).await;
        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("SQL must not be empty"));
        assert_eq!(executor.status(id), QueryStatus::Unknown);
        assert_eq!(executor.tracked_count(), 0);
        assert_eq!(adapter.open_count(), 0);
    }

    #[tokio::test]
    async fn test_rows_are_keyed_by_label() {
        let (executor, _) = executor(Script::Rows {
            columns: vec![ResultColumn::new("id", "int8"), ResultColumn::new("name", "")],
            rows: vec![vec![json!(1), json!("Ann")], vec![json!(2), json!("Bo")]],
        });
        let schema = SchemaInfo::new(
            "mem",
            vec![TableInfo::new("users").with_column(ColumnInfo::new("name", "text"))],
        );
        let request = ExecutionRequest::new("SELECT id, name FROM users", source())
            .with_schema(Arc::new(schema));
        let id = request.query_id;

        let result = executor.execute(request).await;
        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(result.column_labels, vec!["id", "name"]);
        assert_eq!(result.column_types, vec!["int8", "text"]);
        assert_eq!(result.row_count, 2);
        assert_eq!(result.rows[1]["name"], json!("Bo"));
        assert_eq!(result.statement_kind, Some(StatementKind::Select));
        assert_eq!(executor.status(id), QueryStatus::Completed);
        assert!(!executor.is_in_flight(id));
    }

    #[tokio::test]
    async fn test_affected_rows_and_params_reach_the_adapter() {
        let (executor, adapter) = executor(Script::Affected(3));
        let request = ExecutionRequest::new("UPDATE t SET a = $1", source())
            .with_params(vec![SqlValue::Int(7)]);

        let result = executor.execute(request).await;
        assert!(result.success);
        assert_eq!(result.row_count, 3);
        assert!(result.rows.is_empty());
        assert_eq!(result.statement_kind, Some(StatementKind::Update));
        assert_eq!(
            adapter.last_run(),
            Some(("UPDATE t SET a = $1".to_string(), vec![SqlValue::Int(7)]))
        );
    }

    #[tokio::test]
    async fn test_statement_fault_marks_failed() {
        let (executor, _) = executor(Script::Fail("relation \"userz\" does not exist".into()));
        let request = ExecutionRequest::new("SELECT * FROM userz", source());
        let id = request.query_id;

        let result = executor.execute(request).await;
        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("relation \"userz\" does not exist"));
        assert_eq!(executor.status(id), QueryStatus::Failed);
        assert!(!executor.cancel(id));
    }

    #[tokio::test]
    async fn test_connection_fault_marks_failed() {
        let (executor, _) = executor(Script::FailOpen("server closed the connection".into()));
        let request = ExecutionRequest::new("SELECT 1", source());
        let id = request.query_id;

        let result = executor.execute(request).await;
        assert!(!result.success);
        assert_eq!(
            result.error_message.as_deref(),
            Some("Connection error: server closed the connection")
        );
        assert_eq!(executor.status(id), QueryStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancel_running_query_interrupts_statement() {
        let (executor, adapter) = executor(Script::Hang);
        let request = ExecutionRequest::new("SELECT pg_sleep(60)", source());
        let id = request.query_id;

        let task = executor.spawn(request);
        wait_for_status(&executor, id, QueryStatus::Running).await;
        assert!(executor.is_in_flight(id));
        assert_eq!(executor.active_query_ids(), vec![id]);

        assert!(executor.cancel(id));
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("cancelled query should finish promptly")
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("Query cancelled"));
        assert_eq!(executor.status(id), QueryStatus::Cancelled);
        assert!(!executor.is_in_flight(id));
        assert_eq!(adapter.cancel_count(), 1);
        assert!(!executor.cancel(id), "second cancel finds no handle");
    }

    #[tokio::test]
    async fn test_cancel_before_start_never_opens_connection() {
        let (executor, adapter) = executor(Script::Hang);
        let request = ExecutionRequest::new("SELECT pg_sleep(60)", source());
        let id = request.query_id;

        let task = executor.spawn(request);
        assert_eq!(executor.status(id), QueryStatus::Pending);
        assert!(executor.cancel(id));

        let result = task.await.unwrap();
        assert!(!result.success);
        assert_eq!(executor.status(id), QueryStatus::Cancelled);
        assert_eq!(adapter.open_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_after_completion_keeps_completed() {
        let (executor, _) = executor(Script::Affected(0));
        let request = ExecutionRequest::new("DELETE FROM t", source());
        let id = request.query_id;

        assert!(executor.execute(request).await.success);
        assert!(!executor.cancel(id));
        assert_eq!(executor.status(id), QueryStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_id_cannot_be_cancelled() {
        let (executor, _) = executor(Script::Affected(0));
        assert!(!executor.cancel(Uuid::new_v4()));
        assert_eq!(executor.status(Uuid::new_v4()), QueryStatus::Unknown);
    }

    #[tokio::test]
    async fn test_finished_statuses_are_bounded() {
        let adapter = Arc::new(ScriptedAdapter::new(Script::Affected(1)));
        let executor =
            QueryExecutor::with_config(adapter, ExecutorConfig { max_retained_statuses: 2 });

        let mut ids = Vec::new();
        for _ in 0..3 {
            let request = ExecutionRequest::new("DELETE FROM t", source());
            ids.push(request.query_id);
            executor.execute(request).await;
        }

        assert_eq!(executor.tracked_count(), 2);
        assert_eq!(executor.status(ids[0]), QueryStatus::Unknown);
        assert_eq!(executor.status(ids[2]), QueryStatus::Completed);
    }

    #[tokio::test]
    async fn test_duplicate_running_id_is_rejected() {
        let (executor, _) = executor(Script::Hang);
        let id = Uuid::new_v4();

        let first = executor.spawn(ExecutionRequest::new("SELECT 1", source()).with_id(id));
        let second = executor
            .execute(ExecutionRequest::new("SELECT 2", source()).with_id(id))
            .await;
        assert!(!second.success);
        assert!(second.error_message.unwrap().contains("already running"));

        assert!(executor.cancel(id));
        first.await.unwrap();
    }
}
