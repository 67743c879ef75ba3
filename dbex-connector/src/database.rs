//! The `Database` capability: the opaque boundary between this crate
//! family and a concrete engine's wire protocol. DbEx's core never talks to
//! SQL Server/MySQL/PostgreSQL directly; everything goes through this
//! trait.
//!
//! Dialect-translation and driver wiring are explicitly out of scope;
//! production embedders provide their own implementation (e.g. backed by
//! `quaint`, `tokio-postgres`, `mysql_async`, `tiberius`).

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::DbExResult;
use crate::model::DataValue;

/// A single returned row, column-name indexed, using the same coerced value
/// representation as [`DataValue`] so introspection and data-emission share
/// one vocabulary.
#[derive(Debug, Clone, Default)]
pub struct DbRow {
    pub columns: HashMap<String, DataValue>,
}

impl DbRow {
    pub fn get(&self, name: &str) -> Option<&DataValue> {
        self.columns.get(name)
    }
}

/// Parameters bound to a parameterized statement (used only by the journal
/// audit call — `@scriptName`, `@applied`).
#[derive(Debug, Clone)]
pub struct BoundParam {
    pub name: String,
    pub value: DataValue,
}

/// The capability a driver must expose for DbEx's core to drive a database
/// session. Every method is a suspension point.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute a batch of SQL with no parameters and discard any result set.
    async fn execute_batch(&self, sql: &str) -> DbExResult<()>;

    /// Execute SQL and return a single scalar value (first column of the
    /// first row), or `DataValue::Null` if there were no rows.
    async fn execute_scalar(&self, sql: &str) -> DbExResult<DataValue>;

    /// Execute SQL and return all rows, for introspection queries and
    /// `journal.get_executed_scripts`.
    async fn execute_query(&self, sql: &str) -> DbExResult<Vec<DbRow>>;

    /// Execute a parameterized statement, used by the journal's audit call.
    async fn execute_parameterized(&self, sql: &str, params: &[BoundParam]) -> DbExResult<()>;

    /// Best-effort cooperative cancellation of whatever statement is
    /// in-flight. Implementations without native cancel support may no-op.
    async fn cancel(&self) {}
}

/// A deterministic in-memory `Database` double, used by this workspace's own
/// tests in place of a real engine connection. Records every statement it
/// was asked to run and lets tests stage canned query results.
pub struct FakeDatabase {
    pub executed: std::sync::Mutex<Vec<String>>,
    pub query_results: std::sync::Mutex<HashMap<String, Vec<DbRow>>>,
    pub scalar_results: std::sync::Mutex<HashMap<String, DataValue>>,
    pub fail_on: std::sync::Mutex<Option<String>>,
}

impl Default for FakeDatabase {
    fn default() -> Self {
        Self {
            executed: std::sync::Mutex::new(Vec::new()),
            query_results: std::sync::Mutex::new(HashMap::new()),
            scalar_results: std::sync::Mutex::new(HashMap::new()),
            fail_on: std::sync::Mutex::new(None),
        }
    }
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_query(&self, sql: &str, rows: Vec<DbRow>) {
        self.query_results.lock().unwrap().insert(sql.to_string(), rows);
    }

    pub fn stage_scalar(&self, sql: &str, value: DataValue) {
        self.scalar_results.lock().unwrap().insert(sql.to_string(), value);
    }

    pub fn fail_containing(&self, needle: &str) {
        *self.fail_on.lock().unwrap() = Some(needle.to_string());
    }

    pub fn history(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn check_failure(&self, sql: &str) -> DbExResult<()> {
        if let Some(needle) = self.fail_on.lock().unwrap().as_ref() {
            if sql.contains(needle.as_str()) {
                return Err(crate::error::DbExError::ConnectionFailure(anyhow::anyhow!(
                    "fake failure triggered by statement containing `{needle}`"
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Database for FakeDatabase {
    async fn execute_batch(&self, sql: &str) -> DbExResult<()> {
        self.check_failure(sql)?;
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(())
    }

    async fn execute_scalar(&self, sql: &str) -> DbExResult<DataValue> {
        self.check_failure(sql)?;
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(self
            .scalar_results
            .lock()
            .unwrap()
            .get(sql)
            .cloned()
            .unwrap_or(DataValue::Null))
    }

    async fn execute_query(&self, sql: &str) -> DbExResult<Vec<DbRow>> {
        self.check_failure(sql)?;
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(self.query_results.lock().unwrap().get(sql).cloned().unwrap_or_default())
    }

    async fn execute_parameterized(&self, sql: &str, params: &[BoundParam]) -> DbExResult<()> {
        self.check_failure(sql)?;
        let rendered = format!("{sql} -- params: {}", params.len());
        self.executed.lock().unwrap().push(rendered);
        Ok(())
    }
}
