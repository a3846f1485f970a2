//! Connection status tool.
//!
//! Reports backend count and last activity for the configured database. PostgreSQL
//! reads both from its statistics views; SQLite answers with a ping.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, RowSet, Value, value::format_timestamp};
use crate::tools::{ToolContext, operation_failed};
use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

mod queries {
    pub const PG_BACKENDS: &str =
        "SELECT numbackends FROM pg_stat_database WHERE datname = $1";
    pub const PG_LAST_ACTIVITY: &str = "SELECT state_change FROM pg_stat_activity \
        WHERE datname = $1 ORDER BY state_change DESC NULLS LAST LIMIT 1";
    pub const PING: &str = "SELECT 1";
}

/// Input for the get_connection_status tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct StatusInput {
    /// Database name. Defaults to the configured database.
    #[serde(default)]
    pub database: Option<String>,
}

/// Output from the get_connection_status tool.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct StatusOutput {
    pub database: String,
    pub connected: bool,
    /// Active backends (PostgreSQL) or open pool connections (SQLite)
    pub pool_stats: i64,
    /// RFC 3339 time of the most recent activity
    pub last_ping: String,
}

/// Handler for connection status.
pub struct StatusToolHandler {
    ctx: Arc<ToolContext>,
}

impl StatusToolHandler {
    pub const GET_CONNECTION_STATUS: &'static str = "get_connection_status";

    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }

    /// Handle the get_connection_status tool call.
    pub async fn get_connection_status(&self, input: StatusInput) -> DbResult<StatusOutput> {
        let request_id = Uuid::new_v4();
        info!(
            request_id = %request_id,
            tool = Self::GET_CONNECTION_STATUS,
            "Tool call"
        );
        self.status(&input)
            .await
            .map_err(|e| operation_failed(Self::GET_CONNECTION_STATUS, &request_id, e))
    }

    async fn status(&self, input: &StatusInput) -> DbResult<StatusOutput> {
        let database = self
            .ctx
            .resolve_database(input.database.as_deref())?
            .unwrap_or_default();

        let output = match self.ctx.backend().kind() {
            DatabaseType::PostgreSQL => self.postgres_status(database).await?,
            DatabaseType::SQLite => self.sqlite_status(database).await?,
        };
        info!(
            database = %output.database,
            pool_stats = output.pool_stats,
            "Connection status"
        );
        Ok(output)
    }

    async fn postgres_status(&self, database: String) -> DbResult<StatusOutput> {
        let materializer = self.ctx.materializer();
        let params: BTreeMap<String, JsonValue> =
            BTreeMap::from([("1".to_string(), json!(database))]);

        let opts = self.ctx.options(None);
        let backends = materializer
            .execute_named(queries::PG_BACKENDS, &params, &opts)
            .await?;
        let pool_stats = match first_value(&backends, "numbackends") {
            Some(Value::Integer(n)) => *n,
            _ => return Err(status_unavailable("numbackends")),
        };

        let activity = materializer
            .execute_named(queries::PG_LAST_ACTIVITY, &params, &opts)
            .await?;
        let last_ping = match first_value(&activity, "state_change") {
            Some(Value::Timestamp(ts)) => format_timestamp(ts),
            _ => return Err(status_unavailable("state_change")),
        };

        Ok(StatusOutput {
            database,
            connected: true,
            pool_stats,
            last_ping,
        })
    }

    async fn sqlite_status(&self, database: String) -> DbResult<StatusOutput> {
        let opts = self.ctx.options(None);
        self.ctx
            .materializer()
            .execute(queries::PING, &[], &opts)
            .await?;

        Ok(StatusOutput {
            database,
            connected: true,
            pool_stats: i64::from(self.ctx.backend().pool_size()),
            last_ping: format_timestamp(&Utc::now()),
        })
    }
}

fn first_value<'a>(rows: &'a RowSet, column: &str) -> Option<&'a Value> {
    rows.records().first().and_then(|record| record.get(column))
}

fn status_unavailable(column: &str) -> DbError {
    DbError::internal(format!("Connection status unavailable: no {column} value"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MockBackend, ResultTable};
    use crate::models::QueryParam;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn handler(mock: MockBackend) -> StatusToolHandler {
        let ctx = ToolContext::new(
            Arc::new(mock),
            Some("shop".to_string()),
            Duration::from_secs(30),
            CancellationToken::new(),
        );
        StatusToolHandler::new(Arc::new(ctx))
    }

    fn single(column: &str, value: Value) -> ResultTable {
        ResultTable {
            columns: vec![column.to_string()],
            rows: vec![vec![value]],
        }
    }

    #[tokio::test]
    async fn test_postgres_status() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let mock = MockBackend::postgres()
            .with_result(queries::PG_BACKENDS, single("numbackends", Value::Integer(20)))
            .with_result(
                queries::PG_LAST_ACTIVITY,
                single("state_change", Value::Timestamp(ts)),
            );
        let recorded = mock.recorded_params();

        let out = handler(mock)
            .get_connection_status(StatusInput::default())
            .await
            .unwrap();
        assert_eq!(
            out,
            StatusOutput {
                database: "shop".to_string(),
                connected: true,
                pool_stats: 20,
                last_ping: "2024-05-01T08:30:00Z".to_string(),
            }
        );
        assert!(
            recorded
                .lock()
                .unwrap()
                .iter()
                .all(|p| p == &vec![QueryParam::String("shop".into())])
        );
    }

    #[tokio::test]
    async fn test_postgres_wrong_kind_is_unavailable() {
        let mock = MockBackend::postgres().with_result(
            queries::PG_BACKENDS,
            single("numbackends", Value::from("twenty")),
        );
        let err = handler(mock)
            .get_connection_status(StatusInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err.root_cause(), DbError::Internal { .. }));
        assert!(err.root_cause().to_string().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_postgres_missing_row_is_unavailable() {
        let mock = MockBackend::postgres()
            .with_result(queries::PG_BACKENDS, ResultTable::new(vec!["numbackends".into()]));
        let err = handler(mock)
            .get_connection_status(StatusInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err.root_cause(), DbError::Internal { .. }));
    }

    #[tokio::test]
    async fn test_sqlite_status_reports_pool_size() {
        let mock = MockBackend::sqlite()
            .with_pool_size(3)
            .with_result(queries::PING, single("1", Value::Integer(1)));
        let out = handler(mock)
            .get_connection_status(StatusInput {
                database: Some("shop".to_string()),
            })
            .await
            .unwrap();
        assert!(out.connected);
        assert_eq!(out.pool_stats, 3);
        assert!(out.last_ping.ends_with('Z'));
    }
}
