//! Query execution tools.
//!
//! `execute_query` runs a single `SELECT` with named parameters and renders the rows.
//! `execute_prepared` runs any statement for its effect and reports the affected row
//! count. Both validate the output format before touching the database.

use crate::error::DbResult;
use crate::models::{QueryParam, resolve_row_limit};
use crate::tools::{OutputFormat, QueryEnvelope, ToolContext, format_rows, operation_failed};
use crate::tools::sql_validator;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Input for the execute_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryInput {
    /// Database name. Must match the configured database when given.
    #[serde(default)]
    pub database: Option<String>,
    /// SQL SELECT statement to execute. Use $1, $2... (PostgreSQL) or ?1, ?2... (SQLite) placeholders.
    pub query: String,
    /// Named parameters. Keys "1", "2"... (or "$1", "$2"...) bind by position; other keys bind in sorted order.
    #[serde(default)]
    pub parameters: Option<BTreeMap<String, JsonValue>>,
    /// Output format: "json" (default), "csv" or "table" (HTML)
    #[serde(default)]
    pub format: Option<String>,
    /// Row limit hint. Default: 10, max: 10000. Put a LIMIT clause in the SQL to bound results.
    #[serde(default)]
    pub limit: Option<i64>,
    /// Query timeout in seconds. Default: 30, max: 300
    #[serde(default)]
    pub timeout: Option<u32>,
}

/// Input for the execute_prepared tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PreparedInput {
    /// Database name. Must match the configured database when given.
    #[serde(default)]
    pub database: Option<String>,
    /// SQL statement to execute (INSERT, UPDATE, DELETE, DDL...)
    pub statement: String,
    /// Positional parameters, bound in order
    #[serde(default)]
    pub parameters: Vec<JsonValue>,
    /// Output format: "json" (default), "csv" or "table" (HTML)
    #[serde(default)]
    pub format: Option<String>,
    /// Statement timeout in seconds. Default: 30, max: 300
    #[serde(default)]
    pub timeout: Option<u32>,
}

/// Handler for query execution.
pub struct QueryToolHandler {
    ctx: Arc<ToolContext>,
}

impl QueryToolHandler {
    pub const EXECUTE_QUERY: &'static str = "execute_query";
    pub const EXECUTE_PREPARED: &'static str = "execute_prepared";

    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }

    /// Handle the execute_query tool call.
    ///
    /// Rejects anything whose first word is not `SELECT`. The row limit is advisory
    /// and never truncates the result.
    pub async fn execute_query(&self, input: QueryInput) -> DbResult<QueryEnvelope> {
        let request_id = Uuid::new_v4();
        info!(
            request_id = %request_id,
            tool = Self::EXECUTE_QUERY,
            sql = %input.query,
            "Tool call"
        );
        self.run_query(&request_id, input)
            .await
            .map_err(|e| operation_failed(Self::EXECUTE_QUERY, &request_id, e))
    }

    async fn run_query(&self, request_id: &Uuid, input: QueryInput) -> DbResult<QueryEnvelope> {
        self.ctx.resolve_database(input.database.as_deref())?;
        let format = OutputFormat::from_request(input.format.as_deref())?;
        sql_validator::validate_select(&input.query)?;

        let limit = resolve_row_limit(input.limit);
        let params = input.parameters.unwrap_or_default();
        debug!(
            request_id = %request_id,
            limit,
            params = params.len(),
            "Effective row limit"
        );

        let start = Instant::now();
        let opts = self.ctx.options(input.timeout);
        let rows = self
            .ctx
            .materializer()
            .execute_named(&input.query, &params, &opts)
            .await?;
        let output = format_rows(&rows, format)?;

        info!(
            request_id = %request_id,
            rows = rows.len(),
            format = %format,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query executed"
        );
        Ok(QueryEnvelope::new(input.query, output))
    }

    /// Handle the execute_prepared tool call.
    ///
    /// The response is a single record: `message: "success"` plus `rowsAffected`.
    pub async fn execute_prepared(&self, input: PreparedInput) -> DbResult<QueryEnvelope> {
        let request_id = Uuid::new_v4();
        info!(
            request_id = %request_id,
            tool = Self::EXECUTE_PREPARED,
            sql = %input.statement,
            "Tool call"
        );
        self.run_prepared(&request_id, input)
            .await
            .map_err(|e| operation_failed(Self::EXECUTE_PREPARED, &request_id, e))
    }

    async fn run_prepared(
        &self,
        request_id: &Uuid,
        input: PreparedInput,
    ) -> DbResult<QueryEnvelope> {
        self.ctx.resolve_database(input.database.as_deref())?;
        let format = OutputFormat::from_request(input.format.as_deref())?;

        let params: Vec<QueryParam> = input.parameters.into_iter().map(Into::into).collect();
        let start = Instant::now();
        let opts = self.ctx.options(input.timeout);
        let rows = self
            .ctx
            .materializer()
            .execute_prepared(&input.statement, &params, &opts)
            .await?;
        let output = format_rows(&rows, format)?;

        info!(
            request_id = %request_id,
            params = params.len(),
            format = %format,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Prepared statement executed"
        );
        Ok(QueryEnvelope::new(input.statement, output))
    }
}
