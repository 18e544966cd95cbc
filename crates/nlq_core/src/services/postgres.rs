//! PostgreSQL collaborator backed by deadpool-postgres.
//!
//! [`PostgresAdapter`] keeps one pool per registered data source. It reads
//! schema metadata (including table and column comments) from the system
//! catalogs and runs generated statements with server-side cancellation.

use crate::error::{NlqError, NlqResult};
use crate::models::{
    ColumnInfo, DataSource, DataSourceKind, ResultColumn, SchemaInfo, SqlValue, StatementKind,
    StatementOutcome, TableInfo,
};
use crate::services::executor::{ExecutionAdapter, StatementHandle};
use crate::services::schema::SchemaProvider;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::time::Duration;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::{CancelToken, NoTls};
use uuid::Uuid;

/// A parameter value ready to bind.
type BoxedParam = Box<dyn ToSql + Sync + Send>;

const SCHEMA_QUERY: &str = r#"
    SELECT
        c.relname AS table_name,
        obj_description(c.oid, 'pg_class') AS table_comment,
        a.attname AS column_name,
        format_type(a.atttypid, a.atttypmod) AS data_type,
        col_description(c.oid, a.attnum) AS column_comment
    FROM pg_catalog.pg_class c
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    JOIN pg_catalog.pg_attribute a ON a.attrelid = c.oid
    WHERE c.relkind IN ('r', 'p', 'v', 'm')
      AND a.attnum > 0
      AND NOT a.attisdropped
      AND n.nspname = ANY (current_schemas(false))
    ORDER BY c.relname, a.attnum
"#;

/// PostgreSQL schema provider and execution adapter.
#[derive(Default)]
pub struct PostgresAdapter {
    sources: RwLock<HashMap<String, DataSource>>,
    pools: RwLock<HashMap<String, Pool>>,
}

impl PostgresAdapter {
    /// Create an adapter with no data sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a data source. Connections are opened lazily.
    pub fn register(&self, source: DataSource) -> NlqResult<()> {
        source.validate().map_err(NlqError::config)?;
        if source.kind != DataSourceKind::Postgres {
            return Err(NlqError::config(format!(
                "Data source {} is not a PostgreSQL data source",
                source.id
            )));
        }
        tracing::info!(
            data_source_id = %source.id,
            url = %source.display_url(),
            "PostgreSQL data source registered"
        );
        if let Some(old) = self.pools.write().remove(&source.id) {
            old.close();
        }
        self.sources.write().insert(source.id.clone(), source);
        Ok(())
    }

    /// Close the pool of a data source and forget it.
    pub fn unregister(&self, data_source_id: &str) -> bool {
        if let Some(pool) = self.pools.write().remove(data_source_id) {
            pool.close();
        }
        self.sources.write().remove(data_source_id).is_some()
    }

    fn pool_for(&self, source: &DataSource) -> NlqResult<Pool> {
        if let Some(pool) = self.pools.read().get(&source.id) {
            return Ok(pool.clone());
        }

        let mut pools = self.pools.write();
        if let Some(pool) = pools.get(&source.id) {
            return Ok(pool.clone());
        }
        let pool = build_pool(source)?;
        pools.insert(source.id.clone(), pool.clone());
        Ok(pool)
    }

    async fn client_for(&self, source: &DataSource) -> NlqResult<deadpool_postgres::Object> {
        let pool = self.pool_for(source)?;
        let client = pool.get().await?;
        client.batch_execute(&session_settings(source)).await?;
        Ok(client)
    }
}

fn build_pool(source: &DataSource) -> NlqResult<Pool> {
    let connect_timeout = Duration::from_secs(u64::from(source.options.connect_timeout_secs));

    let mut pg_config = tokio_postgres::Config::new();
    pg_config.host(&source.host);
    pg_config.port(source.port);
    pg_config.dbname(&source.database);
    pg_config.user(&source.username);
    if let Some(password) = &source.password {
        pg_config.password(password);
    }
    pg_config.application_name(&source.options.application_name);
    pg_config.connect_timeout(connect_timeout);
    pg_config.keepalives(true);

    let manager = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig { recycling_method: RecyclingMethod::Fast },
    );

    Pool::builder(manager)
        .max_size(source.options.max_connections.max(1))
        .wait_timeout(Some(connect_timeout))
        .create_timeout(Some(connect_timeout))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| NlqError::connection(format!("Failed to create pool: {e}")))
}

/// Session settings applied each time a pooled connection is handed out.
fn session_settings(source: &DataSource) -> String {
    let timeout_ms = source
        .options
        .statement_timeout_secs
        .map(|secs| u64::from(secs) * 1000)
        .unwrap_or(0);
    let read_only = if source.options.read_only { "on" } else { "off" };
    format!(
        "SET statement_timeout = {timeout_ms}; SET default_transaction_read_only = {read_only};"
    )
}

/// One catalog row: table, table comment, column, type, column comment.
type CatalogRow = (String, Option<String>, String, String, Option<String>);

/// Fold catalog rows (ordered by table, then column position) into tables.
fn group_columns(rows: impl IntoIterator<Item = CatalogRow>) -> Vec<TableInfo> {
    let mut tables: Vec<TableInfo> = Vec::new();
    for (table, table_comment, column, data_type, column_comment) in rows {
        if tables.last().map_or(true, |t| t.name != table) {
            tables.push(TableInfo { name: table, comment: table_comment, columns: Vec::new() });
        }
        if let Some(current) = tables.last_mut() {
            current.columns.push(ColumnInfo { name: column, data_type, comment: column_comment });
        }
    }
    tables
}

#[async_trait]
impl SchemaProvider for PostgresAdapter {
    async fn get_schema(&self, data_source_id: &str) -> NlqResult<SchemaInfo> {
        let source = self
            .sources
            .read()
            .get(data_source_id)
            .cloned()
            .ok_or_else(|| NlqError::data_source_not_found(data_source_id))?;

        let client = self.client_for(&source).await.map_err(|e| {
            NlqError::schema_unavailable_with_source(
                format!("Cannot connect to {}", source.display_url()),
                e,
            )
        })?;
        let rows = client.query(SCHEMA_QUERY, &[]).await.map_err(|e| {
            NlqError::schema_unavailable_with_source("Catalog query failed", e)
        })?;

        let tables = group_columns(rows.iter().map(|row| {
            (
                row.get("table_name"),
                row.get("table_comment"),
                row.get("column_name"),
                row.get("data_type"),
                row.get("column_comment"),
            )
        }));

        tracing::debug!(
            data_source_id = %data_source_id,
            table_count = tables.len(),
            "Schema loaded from catalog"
        );
        Ok(SchemaInfo::new(data_source_id, tables))
    }
}

#[async_trait]
impl ExecutionAdapter for PostgresAdapter {
    async fn open(&self, source: &DataSource) -> NlqResult<Box<dyn StatementHandle>> {
        if !self.sources.read().contains_key(&source.id) {
            self.register(source.clone())?;
        }
        let client = self.client_for(source).await?;
        let cancel_token = client.cancel_token();
        Ok(Box::new(PgStatement { client, cancel_token }))
    }
}

/// A pooled connection running one statement.
struct PgStatement {
    client: deadpool_postgres::Object,
    cancel_token: CancelToken,
}

#[async_trait]
impl StatementHandle for PgStatement {
    async fn run(&self, sql: &str, params: &[SqlValue]) -> NlqResult<StatementOutcome> {
        let statement = self.client.prepare(sql).await?;
        let (statement, bound) = match bind_params(params, statement.params()) {
            Ok(bound) => (statement, bound),
            Err(reason) => {
                // Inferred types we cannot bind to (numeric, arrays): let the
                // server coerce from the values' own types instead.
                tracing::debug!(reason = %reason, "Re-preparing statement with value types");
                let types: Vec<Type> = params.iter().map(natural_type).collect();
                let typed = self.client.prepare_typed(sql, &types).await?;
                let bound = bind_params(params, typed.params()).map_err(NlqError::query)?;
                (typed, bound)
            }
        };
        let refs: Vec<&(dyn ToSql + Sync)> =
            bound.iter().map(|p| &**p as &(dyn ToSql + Sync)).collect();

        if !StatementKind::detect(sql).returns_rows() {
            let affected = self.client.execute(&statement, &refs).await?;
            return Ok(StatementOutcome::Affected(affected));
        }

        let rows = self.client.query(&statement, &refs).await?;
        let columns = statement
            .columns()
            .iter()
            .map(|c| ResultColumn::new(c.name(), c.type_().name()))
            .collect();
        let rows = rows
            .iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(i, col)| cell_to_json(row, i, col.type_()))
                    .collect()
            })
            .collect();
        Ok(StatementOutcome::Rows { columns, rows })
    }

    async fn cancel(&self) -> NlqResult<()> {
        self.cancel_token.cancel_query(NoTls).await?;
        Ok(())
    }
}

/// The type a value binds as when the server gives no better guess.
fn natural_type(value: &SqlValue) -> Type {
    match value {
        SqlValue::Null | SqlValue::Text(_) => Type::TEXT,
        SqlValue::Bool(_) => Type::BOOL,
        SqlValue::Int(_) => Type::INT8,
        SqlValue::Float(_) => Type::FLOAT8,
        SqlValue::Date(_) => Type::DATE,
        SqlValue::Timestamp(_) => Type::TIMESTAMP,
    }
}

fn bind_params(values: &[SqlValue], types: &[Type]) -> Result<Vec<BoxedParam>, String> {
    if values.len() != types.len() {
        return Err(format!(
            "statement expects {} parameters, got {}",
            types.len(),
            values.len()
        ));
    }
    values
        .iter()
        .zip(types)
        .enumerate()
        .map(|(i, (value, ty))| {
            convert_param(value, ty).ok_or_else(|| {
                format!("cannot bind {value:?} to parameter ${} of type {}", i + 1, ty.name())
            })
        })
        .collect()
}

/// Convert a value to the parameter type the server inferred.
fn convert_param(value: &SqlValue, ty: &Type) -> Option<BoxedParam> {
    let text = match value {
        SqlValue::Text(s) => Some(s.trim()),
        _ => None,
    };
    let int = || match value {
        SqlValue::Int(i) => Some(*i),
        SqlValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
        _ => text.and_then(|s| s.parse().ok()),
    };
    let float = || match value {
        SqlValue::Int(i) => Some(*i as f64),
        SqlValue::Float(f) => Some(*f),
        _ => text.and_then(|s| s.parse().ok()),
    };
    let timestamp = || match value {
        SqlValue::Timestamp(t) => Some(*t),
        SqlValue::Date(d) => d.and_hms_opt(0, 0, 0),
        _ => text.and_then(|s| s.parse().ok()),
    };
    let is_null = matches!(value, SqlValue::Null);

    let boxed: BoxedParam = match *ty {
        Type::INT2 if is_null => Box::new(None::<i16>),
        Type::INT2 => Box::new(i16::try_from(int()?).ok()?),
        Type::INT4 if is_null => Box::new(None::<i32>),
        Type::INT4 => Box::new(i32::try_from(int()?).ok()?),
        Type::INT8 if is_null => Box::new(None::<i64>),
        Type::INT8 => Box::new(int()?),
        Type::FLOAT4 if is_null => Box::new(None::<f32>),
        Type::FLOAT4 => Box::new(float()? as f32),
        Type::FLOAT8 if is_null => Box::new(None::<f64>),
        Type::FLOAT8 => Box::new(float()?),
        Type::BOOL => match value {
            SqlValue::Null => Box::new(None::<bool>),
            SqlValue::Bool(b) => Box::new(*b),
            _ => Box::new(text?.parse::<bool>().ok()?),
        },
        Type::DATE => match value {
            SqlValue::Null => Box::new(None::<NaiveDate>),
            SqlValue::Date(d) => Box::new(*d),
            SqlValue::Timestamp(t) => Box::new(t.date()),
            _ => Box::new(text?.parse::<NaiveDate>().ok()?),
        },
        Type::TIMESTAMP if is_null => Box::new(None::<NaiveDateTime>),
        Type::TIMESTAMP => Box::new(timestamp()?),
        Type::TIMESTAMPTZ if is_null => Box::new(None::<DateTime<Utc>>),
        Type::TIMESTAMPTZ => Box::new(timestamp()?.and_utc()),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => match value {
            SqlValue::Null => Box::new(None::<String>),
            SqlValue::Text(s) => Box::new(s.clone()),
            other => Box::new(other.to_json().to_string().trim_matches('"').to_string()),
        },
        _ => return None,
    };
    Some(boxed)
}

fn get<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, i: usize) -> Option<T> {
    row.try_get::<_, Option<T>>(i).ok().flatten()
}

/// Convert one cell to JSON by its column type.
fn cell_to_json(row: &tokio_postgres::Row, i: usize, ty: &Type) -> JsonValue {
    let string = |s: Option<String>| s.map(JsonValue::String);
    let value = match *ty {
        Type::BOOL => get::<bool>(row, i).map(JsonValue::Bool),
        Type::INT2 => get::<i16>(row, i).map(JsonValue::from),
        Type::INT4 => get::<i32>(row, i).map(JsonValue::from),
        Type::INT8 => get::<i64>(row, i).map(JsonValue::from),
        Type::FLOAT4 => get::<f32>(row, i)
            .and_then(|v| serde_json::Number::from_f64(f64::from(v)))
            .map(JsonValue::Number),
        Type::FLOAT8 => get::<f64>(row, i)
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number),
        Type::UUID => string(get::<Uuid>(row, i).map(|v| v.to_string())),
        Type::JSON | Type::JSONB => get::<JsonValue>(row, i),
        Type::TIMESTAMPTZ => string(get::<DateTime<Utc>>(row, i).map(|v| v.to_rfc3339())),
        Type::TIMESTAMP => string(get::<NaiveDateTime>(row, i).map(|v| v.to_string())),
        Type::DATE => string(get::<NaiveDate>(row, i).map(|v| v.to_string())),
        Type::TIME => string(get::<NaiveTime>(row, i).map(|v| v.to_string())),
        Type::INT4_ARRAY => get::<Vec<i32>>(row, i)
            .map(|v| JsonValue::Array(v.into_iter().map(JsonValue::from).collect())),
        Type::TEXT_ARRAY => get::<Vec<String>>(row, i)
            .map(|v| JsonValue::Array(v.into_iter().map(JsonValue::String).collect())),
        _ => string(get::<String>(row, i)),
    };
    value.unwrap_or(JsonValue::Null)
}
