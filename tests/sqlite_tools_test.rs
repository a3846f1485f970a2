//! Integration tests for the query, schema and status tools against SQLite.
//!
//! Each test gets a fresh database file named `shop.db` in its own temp directory,
//! so the configured database name is `shop`.

use db_query_server::config::parse_database_url;
use db_query_server::db::{Backend, DbPool};
use db_query_server::error::DbError;
use db_query_server::models::{QueryOptions, Record, RowSet};
use db_query_server::tools::query::{PreparedInput, QueryInput, QueryToolHandler};
use db_query_server::tools::schema::{SchemaInput, SchemaToolHandler};
use db_query_server::tools::status::{StatusInput, StatusToolHandler};
use db_query_server::tools::ToolContext;
use pretty_assertions::assert_eq;
use serde_json::{Value as JsonValue, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct TestDb {
    // Dropping the directory deletes the database file
    _dir: TempDir,
    ctx: Arc<ToolContext>,
}

impl TestDb {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.db");
        let config = parse_database_url(&format!("sqlite:{}", path.display())).unwrap();
        assert_eq!(config.database.as_deref(), Some("shop"));

        let pool = DbPool::connect(&config).await.unwrap();
        let backend: Arc<dyn Backend> = Arc::new(pool);
        let ctx = ToolContext::new(
            backend,
            config.database.clone(),
            Duration::from_secs(30),
            CancellationToken::new(),
        );
        Self {
            _dir: dir,
            ctx: Arc::new(ctx),
        }
    }

    fn queries(&self) -> QueryToolHandler {
        QueryToolHandler::new(self.ctx.clone())
    }

    async fn exec(&self, statement: &str, parameters: Vec<JsonValue>) -> String {
        self.queries()
            .execute_prepared(PreparedInput {
                database: None,
                statement: statement.to_string(),
                parameters,
                format: None,
                timeout: None,
            })
            .await
            .unwrap()
            .response
    }

    async fn query(&self, sql: &str, format: Option<&str>) -> Result<String, DbError> {
        self.query_with(sql, BTreeMap::new(), format).await
    }

    async fn query_with(
        &self,
        sql: &str,
        parameters: BTreeMap<String, JsonValue>,
        format: Option<&str>,
    ) -> Result<String, DbError> {
        self.queries()
            .execute_query(QueryInput {
                database: None,
                query: sql.to_string(),
                parameters: Some(parameters),
                format: format.map(String::from),
                limit: None,
                timeout: None,
            })
            .await
            .map(|envelope| envelope.response)
    }

    async fn with_users(self) -> Self {
        self.exec(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name VARCHAR(200))",
            vec![],
        )
        .await;
        self.exec(
            "INSERT INTO users (id, name) VALUES (?1, ?2), (?3, ?4)",
            vec![json!(1), json!("Alice"), json!(2), json!("Bob")],
        )
        .await;
        self
    }
}

fn named(pairs: &[(&str, JsonValue)]) -> BTreeMap<String, JsonValue> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn test_csv_output() {
    let db = TestDb::new().await.with_users().await;
    let out = db
        .query("SELECT id, name FROM users ORDER BY id", Some("csv"))
        .await
        .unwrap();
    assert_eq!(out, "id,name\n1,Alice\n2,Bob\n");
}

#[tokio::test]
async fn test_table_output_uses_sorted_columns() {
    let db = TestDb::new().await;
    db.exec(
        "CREATE TABLE customers (CustomerName TEXT, Address TEXT, id TEXT)",
        vec![],
    )
    .await;
    db.exec(
        "INSERT INTO customers VALUES ('Bob', 'Some street', '1')",
        vec![],
    )
    .await;

    let out = db
        .query("SELECT * FROM customers", Some("table"))
        .await
        .unwrap();
    assert_eq!(
        out,
        "<table><thead><tr><th>Address</th><th>CustomerName</th><th>id</th></tr></thead>\
         <tbody><tr><td>Some street</td><td>Bob</td><td>1</td></tr></tbody></table>"
    );
}

#[tokio::test]
async fn test_mixed_types_in_json_and_csv() {
    let db = TestDb::new().await;
    db.exec(
        "CREATE TABLE contacts (id INTEGER, price REAL, ContactName BOOLEAN, Address TEXT, City TEXT)",
        vec![],
    )
    .await;
    db.exec(
        "INSERT INTO contacts VALUES (?1, ?2, ?3, ?4, ?5)",
        vec![json!(22), json!(123.78), json!(true), json!(null), json!("Dublin")],
    )
    .await;

    let sql = "SELECT * FROM contacts";
    assert_eq!(
        db.query(sql, Some("json")).await.unwrap(),
        r#"[{"Address":null,"City":"Dublin","ContactName":true,"id":22,"price":123.78}]"#
    );
    assert_eq!(
        db.query(sql, Some("csv")).await.unwrap(),
        "Address,City,ContactName,id,price\n,Dublin,true,22,123.78\n"
    );
}

#[tokio::test]
async fn test_datetime_text_becomes_timestamp() {
    let db = TestDb::new().await;
    db.exec("CREATE TABLE events (at DATETIME, note TEXT)", vec![])
        .await;
    db.exec(
        "INSERT INTO events VALUES ('2024-03-09 14:05:00', 'a'), ('not a date', 'b')",
        vec![],
    )
    .await;

    let out = db
        .query("SELECT at, note FROM events ORDER BY note", Some("csv"))
        .await
        .unwrap();
    assert_eq!(out, "at,note\n2024-03-09T14:05:00Z,a\nnot a date,b\n");
}

#[tokio::test]
async fn test_empty_result_per_format() {
    let db = TestDb::new().await.with_users().await;
    let sql = "SELECT id, name FROM users WHERE id > 100";

    assert_eq!(db.query(sql, None).await.unwrap(), "[]");

    for format in ["csv", "table"] {
        let err = db.query(sql, Some(format)).await.unwrap_err();
        assert!(err.is_format_error(), "{format} should fail on empty data");
        assert!(matches!(err.root_cause(), DbError::EmptyData { .. }));
    }
}

#[tokio::test]
async fn test_unsupported_format_rejected() {
    let db = TestDb::new().await.with_users().await;
    let err = db.query("SELECT * FROM users", Some("xml")).await.unwrap_err();
    assert!(matches!(err.root_cause(), DbError::UnsupportedFormat { .. }));
}

#[tokio::test]
async fn test_numeric_keys_bind_by_position() {
    let db = TestDb::new().await;
    let params = named(&[("2", json!("second")), ("1", json!("first"))]);
    let out = db
        .query_with("SELECT ?2 AS b, ?1 AS a", params, None)
        .await
        .unwrap();
    assert_eq!(out, r#"[{"a":"first","b":"second"}]"#);

    let params = named(&[("$1", json!(10)), ("$2", json!(20))]);
    let out = db
        .query_with("SELECT ?1 + ?2 AS total", params, None)
        .await
        .unwrap();
    assert_eq!(out, r#"[{"total":30}]"#);
}

#[tokio::test]
async fn test_other_keys_bind_in_sorted_order() {
    let db = TestDb::new().await;
    let params = named(&[("beta", json!(2)), ("alpha", json!(1))]);
    let out = db
        .query_with("SELECT ?1 AS first, ?2 AS second", params, None)
        .await
        .unwrap();
    assert_eq!(out, r#"[{"first":1,"second":2}]"#);
}

#[tokio::test]
async fn test_same_sql_with_different_param_types() {
    let db = TestDb::new().await;
    for (param, expected) in [
        (json!(5), r#"[{"v":5}]"#),
        (json!("abc"), r#"[{"v":"abc"}]"#),
        (json!(1.5), r#"[{"v":1.5}]"#),
    ] {
        let out = db
            .query_with("SELECT ?1 AS v", named(&[("1", param)]), None)
            .await
            .unwrap();
        assert_eq!(out, expected);
    }
}

#[tokio::test]
async fn test_numeric_key_gap_rejected() {
    let db = TestDb::new().await;
    let params = named(&[("1", json!(1)), ("3", json!(3))]);
    let err = db
        .query_with("SELECT ?1, ?3", params, None)
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), DbError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_select_guard_blocks_writes() {
    let db = TestDb::new().await.with_users().await;
    let err = db.query("DELETE FROM users", None).await.unwrap_err();
    assert!(
        matches!(err, DbError::OperationFailed { ref operation, .. } if operation == "execute_query")
    );

    let out = db
        .query("SELECT COUNT(*) AS n FROM users", None)
        .await
        .unwrap();
    assert_eq!(out, r#"[{"n":2}]"#);
}

#[tokio::test]
async fn test_malformed_sql_is_statement_error() {
    let db = TestDb::new().await;
    let err = db
        .query("SELECT * FROM missing_table", None)
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), DbError::Statement { .. }));
}

#[tokio::test]
async fn test_prepared_reports_rows_affected() {
    let db = TestDb::new().await.with_users().await;
    let out = db
        .exec("UPDATE users SET name = ?1 WHERE id >= ?2", vec![json!("X"), json!(1)])
        .await;
    assert_eq!(out, r#"[{"message":"success","rowsAffected":2}]"#);

    let out = db.exec("DELETE FROM users WHERE id = 99", vec![]).await;
    assert_eq!(out, r#"[{"message":"success","rowsAffected":0}]"#);
}

#[tokio::test]
async fn test_prepared_csv_output() {
    let db = TestDb::new().await.with_users().await;
    let out = db
        .queries()
        .execute_prepared(PreparedInput {
            database: Some("shop".to_string()),
            statement: "DELETE FROM users WHERE id = ?1".to_string(),
            parameters: vec![json!(1)],
            format: Some("csv".to_string()),
            timeout: None,
        })
        .await
        .unwrap();
    assert_eq!(out.query, "DELETE FROM users WHERE id = ?1");
    assert_eq!(out.format, "csv");
    assert_eq!(out.response, "message,rowsAffected\nsuccess,1\n");
}

#[tokio::test]
async fn test_columnless_statement_yields_success_record() {
    let db = TestDb::new().await;
    let rows = db
        .ctx
        .materializer()
        .execute("CREATE TABLE t (x INTEGER)", &[], &QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(rows, RowSet::from(vec![Record::success()]));
}

#[tokio::test]
async fn test_schema_of_existing_table() {
    let db = TestDb::new().await.with_users().await;
    let out = SchemaToolHandler::new(db.ctx.clone())
        .get_schema(SchemaInput {
            database: None,
            tables: vec!["users".to_string()],
        })
        .await
        .unwrap();

    assert_eq!(out.query, "get_schema");
    assert_eq!(out.format, "json");
    assert_eq!(
        out.response,
        r#"[{"character_maximum_length":null,"column_name":"id","data_type":"INTEGER"},{"character_maximum_length":200,"column_name":"name","data_type":"VARCHAR(200)"}]"#
    );
}

#[tokio::test]
async fn test_schema_of_missing_table_is_empty() {
    let db = TestDb::new().await;
    let out = SchemaToolHandler::new(db.ctx.clone())
        .get_schema(SchemaInput {
            database: None,
            tables: vec!["nope".to_string()],
        })
        .await
        .unwrap();
    assert_eq!(out.response, "[]");
}

#[tokio::test]
async fn test_connection_status() {
    let db = TestDb::new().await;
    let status = StatusToolHandler::new(db.ctx.clone())
        .get_connection_status(StatusInput::default())
        .await
        .unwrap();
    assert_eq!(status.database, "shop");
    assert!(status.connected);
    assert!(status.pool_stats >= 1);
    assert!(chrono::DateTime::parse_from_rfc3339(&status.last_ping).is_ok());
}

#[tokio::test]
async fn test_wrong_database_rejected() {
    let db = TestDb::new().await;
    let err = StatusToolHandler::new(db.ctx.clone())
        .get_connection_status(StatusInput {
            database: Some("elsewhere".to_string()),
        })
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), DbError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_shutdown_aborts_and_closes() {
    let db = TestDb::new().await;
    db.ctx.shutdown_token().cancel();
    let err = db.query("SELECT 1 AS one", None).await.unwrap_err();
    assert!(matches!(err.root_cause(), DbError::Cancelled { .. }));
}
