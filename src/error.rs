//! Error types for the DB Query Server.
//!
//! Every failure surfaced by a tool names the stage that failed: preparing the
//! statement, executing it, scanning a cell, finalizing the cursor, or rendering
//! the result. Formatting failures stay distinguishable from execution failures
//! even after being wrapped with operation context.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Statement preparation failed: {message}")]
    Statement {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Statement execution failed: {message}")]
    Execution {
        message: String,
        sql_state: Option<String>,
    },

    #[error("Failed to read column '{column}': {message}")]
    Scan { column: String, message: String },

    #[error("Failed to finalize result cursor: {message}")]
    Cursor { message: String },

    #[error("Format '{format}' is not supported. Use one of: json, csv, table")]
    UnsupportedFormat { format: String },

    #[error("No data to render as {format}")]
    EmptyData { format: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("{operation} failed: {source}")]
    OperationFailed {
        operation: String,
        #[source]
        source: Box<DbError>,
    },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a statement preparation error with optional SQL state.
    pub fn statement(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Statement {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a statement execution error with optional SQL state.
    pub fn execution(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Execution {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a scan error for a single column.
    pub fn scan(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Scan {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a cursor finalization error.
    pub fn cursor(message: impl Into<String>) -> Self {
        Self::Cursor {
            message: message.into(),
        }
    }

    /// Create an unsupported output format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Create an empty data error for a format that needs at least one record.
    pub fn empty_data(format: impl Into<String>) -> Self {
        Self::EmptyData {
            format: format.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Wrap an error with the operation it interrupted.
    pub fn operation_failed(operation: impl Into<String>, source: DbError) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through operation wrappers.
    pub fn root_cause(&self) -> &DbError {
        match self {
            Self::OperationFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Short name of the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self.root_cause() {
            Self::Connection { .. } => "connection",
            Self::Statement { .. } => "statement",
            Self::Execution { .. } => "execution",
            Self::Scan { .. } => "scan",
            Self::Cursor { .. } => "cursor",
            Self::UnsupportedFormat { .. } | Self::EmptyData { .. } => "format",
            Self::InvalidInput { .. } => "input",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::Internal { .. } | Self::OperationFailed { .. } => "internal",
        }
    }

    /// True when the statement ran (or was never needed) but the result could not be rendered.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::UnsupportedFormat { .. } | Self::EmptyData { .. }
        )
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self.root_cause() {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Statement { .. } => Some("Check the SQL syntax and referenced objects"),
            Self::Execution { .. } => {
                Some("Check the parameter count and types against the statement placeholders")
            }
            Self::UnsupportedFormat { .. } => Some("Use one of: json, csv, table"),
            Self::EmptyData { .. } => Some("Use format 'json' to receive an empty result"),
            Self::Timeout { .. } => {
                Some("Consider increasing the timeout or optimizing the statement")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::Connection { .. } | Self::Timeout { .. }
        )
    }

    fn sql_state(&self) -> Option<&str> {
        match self.root_cause() {
            Self::Statement { sql_state, .. } | Self::Execution { sql_state, .. } => {
                sql_state.as_deref()
            }
            _ => None,
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// This is the stage-agnostic mapping; the executor refines backend errors into
/// statement, execution, or cursor failures depending on where they occurred.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::execution(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DbError::execution("No rows returned", None),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Restart the server")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::scan(index, source.to_string())
            }
            sqlx::Error::Decode(source) => DbError::scan("<unknown>", source.to_string()),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Build error data as JSON value.
fn error_data(err: &DbError) -> Option<serde_json::Value> {
    let mut data = serde_json::Map::new();
    data.insert("stage".to_string(), err.stage().into());
    if let Some(suggestion) = err.suggestion() {
        data.insert("suggestion".to_string(), suggestion.into());
    }
    Some(serde_json::Value::Object(data))
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
///
/// Caller mistakes (bad SQL, bad parameters, bad format) map to `invalid_params`;
/// everything else maps to `internal_error`. The full wrapped message is kept.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = error_data(&err);
        let message = match err.sql_state() {
            Some(code) => format!("{} (SQLSTATE: {})", err, code),
            None => err.to_string(),
        };

        match err.root_cause() {
            DbError::InvalidInput { .. }
            | DbError::Statement { .. }
            | DbError::Execution { .. }
            | DbError::UnsupportedFormat { .. }
            | DbError::EmptyData { .. } => rmcp::ErrorData::invalid_params(message, data),

            DbError::Connection { .. }
            | DbError::Scan { .. }
            | DbError::Cursor { .. }
            | DbError::Timeout { .. }
            | DbError::Cancelled { .. }
            | DbError::Internal { .. }
            | DbError::OperationFailed { .. } => rmcp::ErrorData::internal_error(message, data),
        }
    }
}
