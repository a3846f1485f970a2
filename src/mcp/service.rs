//! MCP service implementation using rmcp.
//!
//! This module defines the DbService struct with the database tools
//! exposed via the MCP protocol using the rmcp framework's macros.

use crate::tools::ToolContext;
use crate::tools::query::{PreparedInput, QueryInput, QueryToolHandler};
use crate::tools::schema::{SchemaInput, SchemaToolHandler};
use crate::tools::status::{StatusInput, StatusOutput, StatusToolHandler};
use crate::tools::QueryEnvelope;
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct DbService {
    /// Backend, configured database and shutdown signal shared by every tool
    ctx: Arc<ToolContext>,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl DbService {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    pub fn context(&self) -> &Arc<ToolContext> {
        &self.ctx
    }
}

#[tool_router]
impl DbService {
    #[tool(
        description = "Execute a SELECT query and return the rows.\nParameters are a JSON object: keys \"1\", \"2\"... bind to $1, $2... (PostgreSQL) or ?1, ?2... (SQLite).\nOutput format: json (default), csv, or table (HTML).\nOnly statements starting with SELECT are accepted; use execute_prepared for anything else."
    )]
    async fn execute_query(
        &self,
        Parameters(input): Parameters<QueryInput>,
    ) -> Result<Json<QueryEnvelope>, McpError> {
        QueryToolHandler::new(self.ctx.clone())
            .execute_query(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Execute a statement for its effect (INSERT, UPDATE, DELETE, DDL) and return the number of affected rows.\nParameters are a JSON array bound in order.\nOutput format: json (default), csv, or table (HTML)."
    )]
    async fn execute_prepared(
        &self,
        Parameters(input): Parameters<PreparedInput>,
    ) -> Result<Json<QueryEnvelope>, McpError> {
        QueryToolHandler::new(self.ctx.clone())
            .execute_prepared(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Describe the columns of one or more tables: column_name, data_type and character_maximum_length.\nAlways returns JSON. Unknown tables contribute no columns."
    )]
    async fn get_schema(
        &self,
        Parameters(input): Parameters<SchemaInput>,
    ) -> Result<Json<QueryEnvelope>, McpError> {
        SchemaToolHandler::new(self.ctx.clone())
            .get_schema(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Check the database connection.\nReturns active backends (PostgreSQL) or open pool connections (SQLite) and the time of the last activity."
    )]
    async fn get_connection_status(
        &self,
        Parameters(input): Parameters<StatusInput>,
    ) -> Result<Json<StatusOutput>, McpError> {
        StatusToolHandler::new(self.ctx.clone())
            .get_connection_status(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for DbService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "db-query-server".to_owned(),
                title: Some("DB Query Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Database tools for querying a single SQL database (PostgreSQL or SQLite).\n\
                \n\
                ## Workflow\n\
                1. Call `get_schema` with the tables you need to see their columns\n\
                2. Read data with `execute_query` (SELECT only)\n\
                3. Change data with `execute_prepared`, which reports `rowsAffected`\n\
                \n\
                ## Parameters\n\
                - `execute_query`: a JSON object such as {\"1\": 42, \"2\": \"x\"}\n\
                - `execute_prepared`: a JSON array such as [42, \"x\"]\n\
                - Placeholders are $1, $2 on PostgreSQL and ?1, ?2 on SQLite\n\
                \n\
                ## Output\n\
                Every result is an envelope {query, response, format}. `response` is text\n\
                in the requested format: json (default), csv, or table (HTML).\n\
                csv and table fail on an empty result; json returns [].\n\
                \n\
                ## Limits\n\
                `limit` is advisory. Put a LIMIT clause in the SQL to bound the result.\n\
                `timeout` is in seconds (default 30, max 300)."
                    .to_string(),
            ),
        }
    }
}
