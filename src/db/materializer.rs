//! Row materialization.
//!
//! Turns raw backend output of unknown shape into a [`RowSet`]: one [`Record`] per
//! row keyed by column name, or the single success record when the statement
//! produced no columns at all.

use crate::db::backend::{Backend, ResultTable};
use crate::db::params::order_named_params;
use crate::error::DbResult;
use crate::models::{QueryOptions, QueryParam, Record, RowSet};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Executes statements against a [`Backend`] and assembles generic records.
///
/// Holds no per-call state, so one instance serves concurrent calls.
#[derive(Clone)]
pub struct RowMaterializer {
    backend: Arc<dyn Backend>,
}

impl RowMaterializer {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Run a statement with positional parameters and materialize every row.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[QueryParam],
        opts: &QueryOptions,
    ) -> DbResult<RowSet> {
        let table = self.backend.fetch(sql, params, opts).await?;
        let rows = into_row_set(table);
        debug!(records = rows.len(), "Materialized rows");
        Ok(rows)
    }

    /// Run a statement whose parameters arrive as a name to value mapping.
    ///
    /// Names are ordered into positions before binding; see [`order_named_params`].
    pub async fn execute_named(
        &self,
        sql: &str,
        params: &BTreeMap<String, JsonValue>,
        opts: &QueryOptions,
    ) -> DbResult<RowSet> {
        let positional = order_named_params(params)?;
        self.execute(sql, &positional, opts).await
    }

    /// Run a statement for its effect. Always yields exactly one record.
    pub async fn execute_prepared(
        &self,
        sql: &str,
        params: &[QueryParam],
        opts: &QueryOptions,
    ) -> DbResult<RowSet> {
        let affected = self.backend.execute(sql, params, opts).await?;
        debug!(rows_affected = affected, "Prepared statement executed");
        Ok(RowSet::from(vec![Record::rows_affected(affected)]))
    }
}

/// Key each row's cells by column name. A repeated column name keeps the last cell.
fn into_row_set(table: ResultTable) -> RowSet {
    if table.is_columnless() {
        return RowSet::from(vec![Record::success()]);
    }

    let ResultTable { columns, rows } = table;
    rows.into_iter()
        .map(|cells| columns.iter().cloned().zip(cells).collect::<Record>())
        .collect()
}
