//! Backend capability contract.
//!
//! The materializer, schema inspector and tool handlers depend only on this trait,
//! never on a concrete driver. [`DbPool`](crate::db::DbPool) implements it over sqlx
//! pools and [`MockBackend`](crate::db::MockBackend) implements it in memory.

use crate::error::DbResult;
use crate::models::{DatabaseType, QueryOptions, QueryParam, Value};
use async_trait::async_trait;

/// Raw statement output: column names in backend order plus decoded cells per row.
///
/// Zero columns means the statement produced no result set at all (DDL, DML).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// True when the statement returned no columns, as opposed to zero rows.
    pub fn is_columnless(&self) -> bool {
        self.columns.is_empty()
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> DatabaseType;

    /// Run a statement and return its columns and every row.
    async fn fetch(
        &self,
        sql: &str,
        params: &[QueryParam],
        opts: &QueryOptions,
    ) -> DbResult<ResultTable>;

    /// Run a statement for its effect and return the affected-row count.
    async fn execute(&self, sql: &str, params: &[QueryParam], opts: &QueryOptions)
    -> DbResult<u64>;

    /// Number of open connections.
    fn pool_size(&self) -> u32;

    async fn close(&self);
}
