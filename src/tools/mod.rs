//! MCP tool implementations.
//!
//! This module contains all database tool handlers:
//! - `query`: `execute_query` and `execute_prepared`
//! - `schema`: `get_schema`
//! - `status`: `get_connection_status`
//! - `format`: JSON, CSV and HTML-table rendering
//! - `sql_validator`: the leading-`SELECT` guard for `execute_query`

pub mod format;
pub mod query;
pub mod schema;
pub mod sql_validator;
pub mod status;

pub use format::{FormattedOutput, OutputFormat, format_rows};
pub use query::{PreparedInput, QueryInput, QueryToolHandler};
pub use schema::{SchemaInput, SchemaToolHandler};
pub use status::{StatusInput, StatusOutput, StatusToolHandler};

use crate::db::{Backend, RowMaterializer, SchemaInspector};
use crate::error::{DbError, DbResult};
use crate::models::QueryOptions;
use schemars::JsonSchema;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

/// State shared by every tool handler: the backend, the configured database name,
/// the default statement timeout and the server's shutdown signal.
pub struct ToolContext {
    materializer: RowMaterializer,
    inspector: SchemaInspector,
    database: Option<String>,
    default_timeout: Duration,
    shutdown: CancellationToken,
}

impl ToolContext {
    pub fn new(
        backend: Arc<dyn Backend>,
        database: Option<String>,
        default_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        let materializer = RowMaterializer::new(backend);
        Self {
            inspector: SchemaInspector::new(materializer.clone()),
            materializer,
            database,
            default_timeout,
            shutdown,
        }
    }

    pub fn materializer(&self) -> &RowMaterializer {
        &self.materializer
    }

    pub fn inspector(&self) -> &SchemaInspector {
        &self.inspector
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        self.materializer.backend()
    }

    /// Token cancelled when the server shuts down.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// The configured database name, if the connection URL named one.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Check a request's optional `database` field against the configured database.
    ///
    /// Returns the effective database name.
    pub fn resolve_database(&self, requested: Option<&str>) -> DbResult<Option<String>> {
        match requested.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(self.database.clone()),
            Some(name) if self.database.as_deref() == Some(name) => Ok(Some(name.to_string())),
            Some(name) => Err(DbError::invalid_input(format!(
                "Unknown database '{}'. This server is connected to {}",
                name,
                self.database
                    .as_deref()
                    .map(|d| format!("'{d}'"))
                    .unwrap_or_else(|| "no named database".to_string())
            ))),
        }
    }

    /// Per-call options: the request timeout (or the default) and a child of the
    /// shutdown token, so server shutdown aborts the call.
    pub fn options(&self, timeout_secs: Option<u32>) -> QueryOptions {
        QueryOptions::new(QueryOptions::resolve_timeout(timeout_secs, self.default_timeout))
            .with_cancel(self.shutdown.child_token())
    }
}

/// Response envelope shared by `execute_query`, `execute_prepared` and `get_schema`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct QueryEnvelope {
    /// The statement text that was run (or `get_schema`)
    pub query: String,
    /// Rendered result in `format`
    pub response: String,
    /// Canonical lowercase format name
    pub format: String,
}

impl QueryEnvelope {
    pub fn new(query: impl Into<String>, output: FormattedOutput) -> Self {
        Self {
            query: query.into(),
            response: output.text,
            format: output.format.as_str().to_string(),
        }
    }
}

/// Log a failed tool call and wrap the cause with the tool name.
pub(crate) fn operation_failed(operation: &str, request_id: &Uuid, err: DbError) -> DbError {
    warn!(
        request_id = %request_id,
        tool = operation,
        stage = err.stage(),
        error = %err,
        "Tool call failed"
    );
    DbError::operation_failed(operation, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockBackend;

    fn context(database: Option<&str>) -> ToolContext {
        ToolContext::new(
            Arc::new(MockBackend::sqlite()),
            database.map(String::from),
            Duration::from_secs(30),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_resolve_database() {
        let ctx = context(Some("shop"));
        assert_eq!(ctx.resolve_database(None).unwrap().as_deref(), Some("shop"));
        assert_eq!(
            ctx.resolve_database(Some(" shop ")).unwrap().as_deref(),
            Some("shop")
        );
        assert_eq!(ctx.resolve_database(Some("")).unwrap().as_deref(), Some("shop"));

        let err = ctx.resolve_database(Some("other")).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
        assert!(err.to_string().contains("'shop'"));
    }

    #[test]
    fn test_resolve_database_without_configured_name() {
        let ctx = context(None);
        assert_eq!(ctx.resolve_database(None).unwrap(), None);
        assert!(ctx.resolve_database(Some("shop")).is_err());
    }

    #[test]
    fn test_options_follow_shutdown() {
        let shutdown = CancellationToken::new();
        let ctx = ToolContext::new(
            Arc::new(MockBackend::sqlite()),
            None,
            Duration::from_secs(30),
            shutdown.clone(),
        );
        let opts = ctx.options(Some(5));
        assert_eq!(opts.timeout, Duration::from_secs(5));
        assert!(!opts.cancel.is_cancelled());
        shutdown.cancel();
        assert!(opts.cancel.is_cancelled());
    }
}
