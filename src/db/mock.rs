//! In-memory backend for tests.
//!
//! `MockBackend` answers statements from canned [`ResultTable`]s keyed by SQL text.
//! Statements with no canned result behave like DDL and return zero columns.
//! Every call honors the caller's timeout and cancellation token, so a configured
//! delay can drive timeout and shutdown scenarios.

use crate::db::backend::{Backend, ResultTable};
use crate::db::executor::bounded;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryOptions, QueryParam};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type RecordedParams = Arc<Mutex<Vec<Vec<QueryParam>>>>;

#[derive(Debug)]
pub struct MockBackend {
    kind: DatabaseType,
    results: HashMap<String, ResultTable>,
    rows_affected: u64,
    failure: Option<DbError>,
    delay: Option<Duration>,
    pool_size: u32,
    recorded: RecordedParams,
    closed: AtomicBool,
}

impl MockBackend {
    pub fn new(kind: DatabaseType) -> Self {
        Self {
            kind,
            results: HashMap::new(),
            rows_affected: 0,
            failure: None,
            delay: None,
            pool_size: 1,
            recorded: Arc::default(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn sqlite() -> Self {
        Self::new(DatabaseType::SQLite)
    }

    pub fn postgres() -> Self {
        Self::new(DatabaseType::PostgreSQL)
    }

    /// Answer `sql` (compared after trimming) with `table`.
    pub fn with_result(mut self, sql: &str, table: ResultTable) -> Self {
        self.results.insert(sql.trim().to_string(), table);
        self
    }

    pub fn with_rows_affected(mut self, count: u64) -> Self {
        self.rows_affected = count;
        self
    }

    /// Fail every fetch and execute with `err`.
    pub fn with_failure(mut self, err: DbError) -> Self {
        self.failure = Some(err);
        self
    }

    /// Sleep before answering, subject to the call's timeout and cancellation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Handle to the parameter lists of every call, in call order.
    pub fn recorded_params(&self) -> RecordedParams {
        Arc::clone(&self.recorded)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn answer<T>(
        &self,
        operation: &str,
        params: &[QueryParam],
        opts: &QueryOptions,
        reply: impl FnOnce() -> T,
    ) -> DbResult<T> {
        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.push(params.to_vec());
        }
        if self.is_closed() {
            return Err(DbError::connection(
                "Connection pool is closed",
                "Restart the server",
            ));
        }

        bounded(operation, opts, async {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.failure {
                Some(err) => Err(err.clone()),
                None => Ok(reply()),
            }
        })
        .await
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn kind(&self) -> DatabaseType {
        self.kind
    }

    async fn fetch(
        &self,
        sql: &str,
        params: &[QueryParam],
        opts: &QueryOptions,
    ) -> DbResult<ResultTable> {
        let table = self.results.get(sql.trim()).cloned().unwrap_or_default();
        self.answer("query execution", params, opts, move || table)
            .await
    }

    async fn execute(
        &self,
        _sql: &str,
        params: &[QueryParam],
        opts: &QueryOptions,
    ) -> DbResult<u64> {
        let count = self.rows_affected;
        self.answer("statement execution", params, opts, move || count)
            .await
    }

    fn pool_size(&self) -> u32 {
        self.pool_size
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
