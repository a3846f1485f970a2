//! Query-related data models.
//!
//! This module defines bound parameter values and per-request execution options.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default row limit hint when a request omits one.
pub const DEFAULT_ROW_LIMIT: u32 = 10;

/// Maximum accepted row limit hint.
pub const MAX_ROW_LIMIT: u32 = 10000;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u32 = 30;

/// Maximum query timeout in seconds.
pub const MAX_QUERY_TIMEOUT_SECS: u32 = 300;

/// A parameter value for parameterized statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Structured value (arrays and objects)
    Json(JsonValue),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Json(_) => "json",
        }
    }
}

impl From<JsonValue> for QueryParam {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                // u64 beyond i64::MAX and fractional numbers
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Self::String(s),
            other @ (JsonValue::Array(_) | JsonValue::Object(_)) => Self::Json(other),
        }
    }
}

/// Per-call execution bounds: a timeout and an externally owned cancellation signal.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl QueryOptions {
    /// Options with the given timeout and a fresh, never-cancelled token.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a cancellation token owned by the caller.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolve a request's timeout in seconds against the server default.
    ///
    /// Zero or absent falls back to the default; anything above the maximum is clamped.
    pub fn resolve_timeout(requested_secs: Option<u32>, default: Duration) -> Duration {
        match requested_secs {
            Some(secs) if secs > 0 => {
                Duration::from_secs(secs.min(MAX_QUERY_TIMEOUT_SECS) as u64)
            }
            _ => default.min(Duration::from_secs(MAX_QUERY_TIMEOUT_SECS as u64)),
        }
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS as u64))
    }
}

/// Resolve a request's advisory row limit: absent or non-positive becomes the default.
pub fn resolve_row_limit(requested: Option<i64>) -> u32 {
    match requested {
        Some(limit) if limit > 0 => limit.min(MAX_ROW_LIMIT as i64) as u32,
        _ => DEFAULT_ROW_LIMIT,
    }
}
