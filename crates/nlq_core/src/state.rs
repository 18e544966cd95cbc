//! Caller-facing service state.
//!
//! [`NlqService`] owns the data source registry, the converter, and the query
//! executor, and answers [`NlQueryRequest`]s end to end. Thread-safe via
//! `parking_lot::RwLock`; share it behind an `Arc`.

use crate::config::NlqConfig;
use crate::error::{NlqError, NlqResult};
use crate::models::{
    BoundParameter, ConversionResult, DataSource, QueryExecutionResult, QueryStatus, SqlValue,
};
use crate::services::{
    Converter, ExecutionAdapter, ExecutionRequest, QueryExecutor, SchemaProvider,
};

use chrono::NaiveDateTime;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A question to answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NlQueryRequest {
    /// Data source to query
    pub data_source_id: String,
    /// The question
    pub query: String,
    /// Values overriding generated parameters, keyed by placeholder (`$1` or `1`)
    #[serde(default)]
    pub parameters: Option<HashMap<String, serde_json::Value>>,
    /// Run the generated SQL
    #[serde(default)]
    pub execute: bool,
    /// Id to track the execution under, so it can be cancelled or polled
    /// while `ask` is still running; generated when absent
    #[serde(default)]
    pub query_id: Option<Uuid>,
}

impl NlQueryRequest {
    /// A conversion-only request.
    pub fn new(data_source_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            data_source_id: data_source_id.into(),
            query: query.into(),
            parameters: None,
            execute: false,
            query_id: None,
        }
    }

    /// Track the execution under `query_id`.
    pub fn with_query_id(mut self, query_id: Uuid) -> Self {
        self.query_id = Some(query_id);
        self
    }

    /// Also execute the generated SQL.
    pub fn executing(mut self) -> Self {
        self.execute = true;
        self
    }

    /// Override a generated parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.get_or_insert_with(HashMap::new).insert(name.into(), value);
        self
    }
}

/// The answer to an [`NlQueryRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NlQueryResponse {
    pub conversion: ConversionResult,
    /// Present when execution was requested and the conversion succeeded
    pub execution: Option<QueryExecutionResult>,
}

/// Central service state.
pub struct NlqService {
    /// Registered data sources
    data_sources: RwLock<HashMap<String, DataSource>>,
    converter: Converter,
    executor: Arc<QueryExecutor>,
    config: NlqConfig,
}

impl NlqService {
    /// Create a service over the given collaborators.
    pub fn new(
        schemas: Arc<dyn SchemaProvider>,
        adapter: Arc<dyn ExecutionAdapter>,
        config: NlqConfig,
    ) -> Self {
        let converter = Converter::new(schemas, config.clone());
        let executor = Arc::new(QueryExecutor::with_config(adapter, config.executor.clone()));
        tracing::info!("NlqService initialized");
        Self { data_sources: RwLock::new(HashMap::new()), converter, executor, config }
    }

    /// Resolve relative dates against a fixed time.
    pub fn with_reference_time(mut self, now: NaiveDateTime) -> Self {
        self.converter = self.converter.with_reference_time(now);
        self
    }

    // ========== Data Sources ==========

    /// Register or replace a data source.
    pub fn register_data_source(&self, source: DataSource) -> NlqResult<()> {
        source.validate().map_err(NlqError::config)?;
        tracing::debug!(data_source_id = %source.id, "Adding data source");
        self.data_sources.write().insert(source.id.clone(), source);
        Ok(())
    }

    /// Remove a data source.
    pub fn remove_data_source(&self, id: &str) -> Option<DataSource> {
        let removed = self.data_sources.write().remove(id);
        if removed.is_some() {
            tracing::debug!(data_source_id = %id, "Removed data source");
        }
        removed
    }

    /// Get a data source by id.
    pub fn data_source(&self, id: &str) -> Option<DataSource> {
        self.data_sources.read().get(id).cloned()
    }

    /// All registered ids, sorted.
    pub fn data_source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.data_sources.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    // ========== Questions ==========

    /// Translate a question without running it.
    pub async fn convert(&self, query: &str, data_source_id: &str) -> ConversionResult {
        self.converter.convert(query, data_source_id).await
    }

    /// Translate a question and, when asked to, run the result.
    ///
    /// The execution is tracked under `request.query_id` when one is given,
    /// so [`NlqService::cancel`] and [`NlqService::status`] work before this
    /// returns.
    pub async fn ask(&self, request: NlQueryRequest) -> NlQueryResponse {
        let query_id = request.query_id.unwrap_or_else(Uuid::new_v4);
        let (conversion, schema) = self
            .converter
            .convert_with_metadata(&request.query, &request.data_source_id)
            .await;

        if !request.execute {
            return NlQueryResponse { conversion, execution: None };
        }
        if !conversion.success {
            tracing::debug!(
                data_source_id = %request.data_source_id,
                "Skipping execution of failed conversion"
            );
            return NlQueryResponse { conversion, execution: None };
        }

        let Some(source) = self.data_source(&request.data_source_id) else {
            let err = NlqError::data_source_not_found(&request.data_source_id);
            tracing::warn!(error = %err, "Cannot execute");
            let execution = QueryExecutionResult::failure(query_id, err.to_string(), 0);
            return NlQueryResponse { conversion, execution: Some(execution) };
        };

        let params = merge_parameters(&conversion.parameters, request.parameters.as_ref());
        let mut execution_request = ExecutionRequest::new(conversion.sql.clone(), source)
            .with_id(query_id)
            .with_params(params);
        if let Some(schema) = schema {
            execution_request = execution_request.with_schema(schema);
        }

        let execution = self.executor.execute(execution_request).await;
        NlQueryResponse { conversion, execution: Some(execution) }
    }

    // ========== Query Tracking ==========

    /// Cancel a running query.
    pub fn cancel(&self, query_id: Uuid) -> bool {
        self.executor.cancel(query_id)
    }

    /// Status of a query.
    pub fn status(&self, query_id: Uuid) -> QueryStatus {
        self.executor.status(query_id)
    }

    /// The query executor, for running SQL directly.
    pub fn executor(&self) -> &Arc<QueryExecutor> {
        &self.executor
    }

    /// The active configuration.
    pub fn config(&self) -> &NlqConfig {
        &self.config
    }
}

/// Generated parameter values with caller overrides applied by name.
fn merge_parameters(
    generated: &[BoundParameter],
    overrides: Option<&HashMap<String, serde_json::Value>>,
) -> Vec<SqlValue> {
    let Some(overrides) = overrides else {
        return generated.iter().map(|p| p.value.clone()).collect();
    };

    for name in overrides.keys() {
        let known = generated
            .iter()
            .any(|p| p.name == *name || p.name.trim_start_matches('$') == name.as_str());
        if !known {
            tracing::warn!(parameter = %name, "Ignoring override for unknown parameter");
        }
    }

    generated
        .iter()
        .map(|p| {
            overrides
                .get(&p.name)
                .or_else(|| overrides.get(p.name.trim_start_matches('$')))
                .map(SqlValue::from_json)
                .unwrap_or_else(|| p.value.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnInfo, ResultColumn, SchemaInfo, TableInfo};
    use crate::services::testing::{Script, ScriptedAdapter};
    use crate::services::StaticSchemaProvider;
    use serde_json::json;
    use std::time::Duration;

    fn service(adapter: Arc<ScriptedAdapter>) -> NlqService {
        let schemas = StaticSchemaProvider::new().with_schema(SchemaInfo::new(
            "shop",
            vec![TableInfo::new("orders")
                .with_comment("订单")
                .with_column(ColumnInfo::new("id", "bigint"))
                .with_column(ColumnInfo::new("amount", "numeric").with_comment("金额"))],
        ));
        let service = NlqService::new(Arc::new(schemas), adapter, NlqConfig::default());
        service.register_data_source(DataSource::custom("shop", "scripted")).unwrap();
        service
    }

    fn bound(name: &str, value: SqlValue) -> BoundParameter {
        BoundParameter { name: name.to_string(), value }
    }

    #[test]
    fn test_merge_parameters_overrides_by_name() {
        let generated = vec![bound("$1", SqlValue::Int(100)), bound("$2", SqlValue::Text("a".into()))];
        let overrides = HashMap::from([
            ("$2".to_string(), json!("paid")),
            ("1".to_string(), json!(250)),
            ("$9".to_string(), json!(true)),
        ]);
        assert_eq!(
            merge_parameters(&generated, Some(&overrides)),
            vec![SqlValue::Int(250), SqlValue::Text("paid".into())]
        );
        assert_eq!(
            merge_parameters(&generated, None),
            vec![SqlValue::Int(100), SqlValue::Text("a".into())]
        );
    }

    #[test]
    fn test_register_rejects_invalid_source() {
        let service = service(Arc::new(ScriptedAdapter::new(Script::Affected(0))));
        let err = service
            .register_data_source(DataSource::postgres("pg", "", "db", "user"))
            .unwrap_err();
        assert_eq!(err.category(), "Config");
        assert_eq!(service.data_source_ids(), vec!["shop".to_string()]);
        assert!(service.remove_data_source("shop").is_some());
        assert!(service.data_source("shop").is_none());
    }

    #[tokio::test]
    async fn test_ask_without_execute_only_converts() {
        let adapter = Arc::new(ScriptedAdapter::new(Script::Affected(0)));
        let response = service(adapter.clone()).ask(NlQueryRequest::new("shop", "查询订单表")).await;
        assert!(response.conversion.success);
        assert!(response.execution.is_none());
        assert_eq!(adapter.open_count(), 0);
    }

    #[tokio::test]
    async fn test_ask_executes_with_overridden_parameter() {
        let adapter = Arc::new(ScriptedAdapter::new(Script::Rows {
            columns: vec![ResultColumn::new("amount", "")],
            rows: vec![vec![json!(300)]],
        }));
        let request = NlQueryRequest::new("shop", "查询订单表中金额大于100的记录")
            .executing()
            .with_parameter("$1", json!(250));

        let response = service(adapter.clone()).ask(request).await;
        assert!(response.conversion.success, "{:?}", response.conversion.explanations);
        let execution = response.execution.unwrap();
        assert!(execution.success);
        assert_eq!(execution.column_types, vec!["numeric"]);

        let (sql, params) = adapter.last_run().unwrap();
        assert_eq!(sql, response.conversion.sql);
        assert_eq!(params[0], SqlValue::Int(250));
    }

    #[tokio::test]
    async fn test_cancel_question_while_executing() {
        let adapter = Arc::new(ScriptedAdapter::new(Script::Hang));
        let service = Arc::new(service(adapter.clone()));
        let query_id = Uuid::new_v4();
        let request = NlQueryRequest::new("shop", "查询订单表").executing().with_query_id(query_id);

        let task = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.ask(request).await })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while service.status(query_id) == QueryStatus::Unknown {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("execution should start");
        assert!(service.cancel(query_id));

        let response = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("cancelled question should finish")
            .unwrap();
        let execution = response.execution.unwrap();
        assert_eq!(execution.query_id, query_id);
        assert!(!execution.success);
        assert_eq!(execution.error_message.as_deref(), Some("Query cancelled"));
        assert_eq!(service.status(query_id), QueryStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_failed_conversion_is_not_executed() {
        let adapter = Arc::new(ScriptedAdapter::new(Script::Affected(0)));
        let response = service(adapter.clone())
            .ask(NlQueryRequest::new("shop", "你好").executing())
            .await;
        assert!(!response.conversion.success);
        assert!(response.execution.is_none());
        assert_eq!(adapter.open_count(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_source_fails_execution() {
        let adapter = Arc::new(ScriptedAdapter::new(Script::Affected(0)));
        let service = service(adapter);
        service.remove_data_source("shop");

        let response = service.ask(NlQueryRequest::new("shop", "查询订单表").executing()).await;
        assert!(response.conversion.success);
        let execution = response.execution.unwrap();
        assert!(!execution.success);
        assert_eq!(execution.error_message.as_deref(), Some("Data source not found: shop"));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: NlQueryRequest =
            serde_json::from_str(r#"{"dataSourceId": "shop", "query": "订单数量"}"#).unwrap();
        assert!(!request.execute);
        assert!(request.parameters.is_none());
        assert!(request.query_id.is_none());
    }
}
