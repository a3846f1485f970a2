//! Data models for the DB Query Server.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod value;

// Re-export commonly used types
pub use connection::{ConnectionConfig, ConnectionConfigError, DatabaseType};
pub use query::{
    DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, MAX_QUERY_TIMEOUT_SECS, MAX_ROW_LIMIT,
    QueryOptions, QueryParam, resolve_row_limit,
};
pub use value::{Record, RowSet, Value};
