//! Schema introspection tool.
//!
//! This module implements the `get_schema` MCP tool. The column description is
//! always rendered as JSON.

use crate::error::DbResult;
use crate::tools::{OutputFormat, QueryEnvelope, ToolContext, format_rows, operation_failed};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Input for the get_schema tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SchemaInput {
    /// Database name. Must match the configured database when given.
    #[serde(default)]
    pub database: Option<String>,
    /// Tables to describe. Unknown tables contribute no columns.
    pub tables: Vec<String>,
}

/// Handler for schema introspection.
pub struct SchemaToolHandler {
    ctx: Arc<ToolContext>,
}

impl SchemaToolHandler {
    pub const GET_SCHEMA: &'static str = "get_schema";

    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }

    /// Handle the get_schema tool call.
    ///
    /// One record per column (`column_name`, `data_type`, `character_maximum_length`),
    /// in request order and catalog order within each table.
    pub async fn get_schema(&self, input: SchemaInput) -> DbResult<QueryEnvelope> {
        let request_id = Uuid::new_v4();
        info!(
            request_id = %request_id,
            tool = Self::GET_SCHEMA,
            tables = ?input.tables,
            "Tool call"
        );
        self.describe(&input)
            .await
            .map_err(|e| operation_failed(Self::GET_SCHEMA, &request_id, e))
    }

    async fn describe(&self, input: &SchemaInput) -> DbResult<QueryEnvelope> {
        self.ctx.resolve_database(input.database.as_deref())?;

        let opts = self.ctx.options(None);
        let columns = self.ctx.inspector().describe(&input.tables, &opts).await?;
        info!(tables = input.tables.len(), columns = columns.len(), "Schema described");

        let output = format_rows(&columns, OutputFormat::Json)?;
        Ok(QueryEnvelope::new(Self::GET_SCHEMA, output))
    }
}
