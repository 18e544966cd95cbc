//! Scripted execution adapter for tests.

use crate::error::{NlqError, NlqResult};
use crate::models::{DataSource, ResultColumn, SqlValue, StatementOutcome};
use crate::services::executor::{ExecutionAdapter, StatementHandle};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What every statement run through a [`ScriptedAdapter`] does.
#[derive(Debug, Clone)]
pub enum Script {
    Rows { columns: Vec<ResultColumn>, rows: Vec<Vec<serde_json::Value>> },
    Affected(u64),
    Fail(String),
    FailOpen(String),
    /// Never finishes until cancelled
    Hang,
}

#[derive(Debug, Default)]
struct Calls {
    opened: AtomicUsize,
    cancelled: AtomicUsize,
    runs: Mutex<Vec<(String, Vec<SqlValue>)>>,
}

pub struct ScriptedAdapter {
    script: Script,
    calls: Arc<Calls>,
}

impl ScriptedAdapter {
    pub fn new(script: Script) -> Self {
        Self { script, calls: Arc::new(Calls::default()) }
    }

    pub fn open_count(&self) -> usize {
        self.calls.opened.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.calls.cancelled.load(Ordering::SeqCst)
    }

    pub fn last_run(&self) -> Option<(String, Vec<SqlValue>)> {
        self.calls.runs.lock().last().cloned()
    }
}

#[async_trait]
impl ExecutionAdapter for ScriptedAdapter {
    async fn open(&self, _source: &DataSource) -> NlqResult<Box<dyn StatementHandle>> {
        if let Script::FailOpen(message) = &self.script {
            return Err(NlqError::connection(message.clone()));
        }
        self.calls.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedStatement { script: self.script.clone(), calls: self.calls.clone() }))
    }
}

struct ScriptedStatement {
    script: Script,
    calls: Arc<Calls>,
}

#[async_trait]
impl StatementHandle for ScriptedStatement {
    async fn run(&self, sql: &str, params: &[SqlValue]) -> NlqResult<StatementOutcome> {
        self.calls.runs.lock().push((sql.to_string(), params.to_vec()));
        match &self.script {
            Script::Rows { columns, rows } => {
                Ok(StatementOutcome::Rows { columns: columns.clone(), rows: rows.clone() })
            }
            Script::Affected(n) => Ok(StatementOutcome::Affected(*n)),
            Script::Fail(message) => Err(NlqError::query(message.clone())),
            Script::FailOpen(message) => Err(NlqError::connection(message.clone())),
            Script::Hang => std::future::pending().await,
        }
    }

    async fn cancel(&self) -> NlqResult<()> {
        self.calls.cancelled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
