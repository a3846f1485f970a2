//! Statement execution engine.
//!
//! This module runs statements against a pool with support for:
//! - Parameterized statements
//! - Per-call timeouts and cancellation
//! - Column discovery even when a statement returns no rows
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `postgres`: PostgreSQL-specific fetch and execute operations
//! - `sqlite`: SQLite-specific fetch and execute operations
//!
//! Each submodule provides identical functionality adapted to the database's type system.
//!
//! Failures are classified by stage. Preparing the statement fails as
//! [`DbError::Statement`]. Binding, running, or any failure before the first row
//! arrives is [`DbError::Execution`]. A failure after rows have been read is
//! [`DbError::Cursor`], and a cell that cannot be decoded is [`DbError::Scan`].

use crate::db::backend::ResultTable;
use crate::db::types::RowToValues;
use crate::error::{DbError, DbResult};
use crate::models::{QueryOptions, QueryParam};
use futures_util::TryStreamExt;
use sqlx::{Column, Executor, Statement};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// Run `fut` bounded by the call's timeout and cancellation token.
///
/// Dropping the future on either signal releases the in-flight statement and its
/// connection.
pub(crate) async fn bounded<T>(
    operation: &str,
    opts: &QueryOptions,
    fut: impl Future<Output = DbResult<T>>,
) -> DbResult<T> {
    tokio::select! {
        biased;
        _ = opts.cancel.cancelled() => Err(DbError::cancelled(operation)),
        result = timeout(opts.timeout, fut) => match result {
            Ok(inner) => inner,
            Err(_) => Err(timeout_error(operation, opts.timeout)),
        },
    }
}

fn timeout_error(operation: &str, timeout: Duration) -> DbError {
    DbError::timeout(operation, timeout.as_secs() as u32)
}

fn statement_error(err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::Database(db_err) => {
            DbError::statement(db_err.message(), db_err.code().map(|c| c.to_string()))
        }
        other => DbError::from(other),
    }
}

fn cursor_error(err: sqlx::Error) -> DbError {
    match err {
        err @ (sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_)) => DbError::from(err),
        sqlx::Error::Database(db_err) => DbError::cursor(db_err.message()),
        other => DbError::cursor(other.to_string()),
    }
}

fn column_names<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

/// Drain a row stream into `table`, classifying errors by whether rows were already read.
async fn collect_rows<S, R>(mut rows: S, table: &mut ResultTable) -> DbResult<()>
where
    S: futures_util::Stream<Item = Result<R, sqlx::Error>> + Unpin,
    R: RowToValues,
{
    loop {
        match rows.try_next().await {
            Ok(Some(row)) => table.rows.push(row.to_values()?),
            Ok(None) => return Ok(()),
            Err(e) if table.rows.is_empty() => return Err(DbError::from(e)),
            Err(e) => return Err(cursor_error(e)),
        }
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// The code structure is intentionally parallel to make differences obvious.

pub(crate) mod postgres {
    use super::*;
    use crate::db::params::{bind_postgres_param, postgres_param_type};
    use sqlx::PgPool;
    use sqlx::postgres::PgTypeInfo;

    pub async fn fetch_table(
        pool: &PgPool,
        sql: &str,
        params: &[QueryParam],
        opts: &QueryOptions,
    ) -> DbResult<ResultTable> {
        let start = Instant::now();
        let table = bounded("query execution", opts, async {
            let mut conn = pool.acquire().await?;

            // Parameter types follow the bound values so binary encoding matches
            let types: Vec<PgTypeInfo> = params.iter().map(postgres_param_type).collect();
            let statement = (&mut *conn)
                .prepare_with(sql, &types)
                .await
                .map_err(statement_error)?;
            let mut table = ResultTable::new(column_names(statement.columns()));

            let mut query = statement.query();
            for param in params {
                query = bind_postgres_param(query, param);
            }

            if table.is_columnless() {
                query.execute(&mut *conn).await?;
            } else {
                collect_rows(query.fetch(&mut *conn), &mut table).await?;
            }
            Ok::<_, DbError>(table)
        })
        .await?;

        debug!(
            columns = table.columns.len(),
            rows = table.rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "PostgreSQL fetch complete"
        );
        Ok(table)
    }

    pub async fn execute(
        pool: &PgPool,
        sql: &str,
        params: &[QueryParam],
        opts: &QueryOptions,
    ) -> DbResult<u64> {
        bounded("statement execution", opts, async {
            // When params is empty, run raw SQL to allow statements that can't be prepared
            let result = if params.is_empty() {
                pool.execute(sql).await?
            } else {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_postgres_param(query, param);
                }
                query.execute(pool).await?
            };
            Ok::<_, DbError>(result.rows_affected())
        })
        .await
    }
}

pub(crate) mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_param;
    use sqlx::SqlitePool;

    pub async fn fetch_table(
        pool: &SqlitePool,
        sql: &str,
        params: &[QueryParam],
        opts: &QueryOptions,
    ) -> DbResult<ResultTable> {
        let start = Instant::now();
        let table = bounded("query execution", opts, async {
            let mut conn = pool.acquire().await?;

            let statement = (&mut *conn)
                .prepare_with(sql, &[])
                .await
                .map_err(statement_error)?;
            let mut table = ResultTable::new(column_names(statement.columns()));

            let mut query = statement.query();
            for param in params {
                query = bind_sqlite_param(query, param);
            }

            if table.is_columnless() {
                query.execute(&mut *conn).await?;
            } else {
                collect_rows(query.fetch(&mut *conn), &mut table).await?;
            }
            Ok::<_, DbError>(table)
        })
        .await?;

        debug!(
            columns = table.columns.len(),
            rows = table.rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "SQLite fetch complete"
        );
        Ok(table)
    }

    pub async fn execute(
        pool: &SqlitePool,
        sql: &str,
        params: &[QueryParam],
        opts: &QueryOptions,
    ) -> DbResult<u64> {
        bounded("statement execution", opts, async {
            let result = if params.is_empty() {
                pool.execute(sql).await?
            } else {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_sqlite_param(query, param);
                }
                query.execute(pool).await?
            };
            Ok::<_, DbError>(result.rows_affected())
        })
        .await
    }
}
