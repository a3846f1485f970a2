//! Backend cell decoding into [`Value`].
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. Classify the cell: PostgreSQL by its column type name via [`categorize_type`],
//!    SQLite by the cell's storage class refined by the declared column type
//! 2. Database-specific decoders extract the value for that category
//!
//! Every cell maps to some [`Value`]. Types without a dedicated kind become
//! [`Value::Opaque`] carrying a best-effort string. Only a driver decode failure for
//! a recognised type is an error, reported as a scan failure naming the column.

use crate::error::{DbError, DbResult};
use crate::models::Value;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for PostgreSQL column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Boolean,
    Integer,
    Oid,
    Float4,
    Float8,
    Text,
    TimestampTz,
    Timestamp,
    Date,
    Time,
    TimeTz,
    Decimal,
    Json,
    Uuid,
    Binary,
    Interval,
    Array,
    Unknown,
}

/// Classify a PostgreSQL type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    match type_name.to_ascii_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => TypeCategory::Boolean,
        "INT2" | "INT4" | "INT8" | "SMALLINT" | "INTEGER" | "BIGINT" => TypeCategory::Integer,
        "OID" => TypeCategory::Oid,
        "FLOAT4" | "REAL" => TypeCategory::Float4,
        "FLOAT8" | "DOUBLE PRECISION" => TypeCategory::Float8,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" | "CITEXT" => TypeCategory::Text,
        "TIMESTAMPTZ" => TypeCategory::TimestampTz,
        "TIMESTAMP" => TypeCategory::Timestamp,
        "DATE" => TypeCategory::Date,
        "TIME" => TypeCategory::Time,
        "TIMETZ" => TypeCategory::TimeTz,
        "NUMERIC" | "DECIMAL" => TypeCategory::Decimal,
        "JSON" | "JSONB" => TypeCategory::Json,
        "UUID" => TypeCategory::Uuid,
        "BYTEA" => TypeCategory::Binary,
        "INTERVAL" => TypeCategory::Interval,
        name if name.ends_with("[]") || name.starts_with('_') => TypeCategory::Array,
        _ => TypeCategory::Unknown,
    }
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("NUMERIC")
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        matches!(categorize_type(ty.name()), TypeCategory::Decimal)
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => decode_numeric(value.as_bytes()?).map(RawDecimal),
        }
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Render PostgreSQL's binary NUMERIC (base-10000 digit groups) as decimal text.
fn decode_numeric(buf: &[u8]) -> Result<String, BoxDynError> {
    use std::fmt::Write as _;

    let read_i16 = |at: usize| -> Result<i16, BoxDynError> {
        buf.get(at..at + 2)
            .map(|b| i16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated NUMERIC value".into())
    };

    let ndigits = read_i16(0)?.max(0) as usize;
    let weight = read_i16(2)?;
    let sign = read_i16(4)? as u16;
    let dscale = read_i16(6)?.max(0) as usize;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| read_i16(8 + i * 2))
        .collect::<Result<Vec<i16>, _>>()?;
    let digit_at = |i: i32| -> i16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG && !digits.iter().all(|d| *d == 0) {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=i32::from(weight) {
            if i == 0 {
                write!(out, "{}", digit_at(i))?;
            } else {
                write!(out, "{:04}", digit_at(i))?;
            }
        }
    }

    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut i = i32::from(weight) + 1;
        while frac.len() < dscale {
            write!(frac, "{:04}", digit_at(i))?;
            i += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }

    Ok(out)
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Best-effort text for raw bytes: UTF-8 when valid, otherwise base64.
pub fn decode_binary_value(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => STANDARD.encode(bytes),
    }
}

/// Best-effort text for the wire bytes of a type without a dedicated decoder.
///
/// Cells arrive in binary format, so only printable UTF-8 passes through.
pub fn decode_raw_value(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if !s.chars().any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r')) => {
            s.to_string()
        }
        _ => STANDARD.encode(bytes),
    }
}

// =============================================================================
// PostgreSQL Text Forms
// =============================================================================

/// Render an interval the way PostgreSQL's default `IntervalStyle` does,
/// e.g. `1 year 2 mons -3 days +04:05:06.5`.
pub fn format_interval(months: i32, days: i32, microseconds: i64) -> String {
    let mut out = String::new();
    // A positive field after a negative one carries an explicit `+`
    let mut after_negative = false;

    let fields = [
        (i64::from(months / 12), "year"),
        (i64::from(months % 12), "mon"),
        (i64::from(days), "day"),
    ];
    for (value, unit) in fields {
        if value == 0 {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        let plus = if after_negative && value > 0 { "+" } else { "" };
        let plural = if value == 1 { "" } else { "s" };
        out.push_str(&format!("{plus}{value} {unit}{plural}"));
        after_negative = value < 0;
    }

    if out.is_empty() || microseconds != 0 {
        let sign = if microseconds < 0 {
            "-"
        } else if after_negative {
            "+"
        } else {
            ""
        };
        let total = microseconds.unsigned_abs();
        let secs = total / 1_000_000;
        let frac = total % 1_000_000;
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&format!(
            "{sign}{:02}:{:02}:{:02}",
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        ));
        if frac != 0 {
            out.push('.');
            out.push_str(format!("{frac:06}").trim_end_matches('0'));
        }
    }
    out
}

/// Quote an array element when PostgreSQL's array literal syntax requires it.
fn quote_array_element(text: &str) -> String {
    let needs_quotes = text.is_empty()
        || text.eq_ignore_ascii_case("NULL")
        || text
            .chars()
            .any(|c| matches!(c, '{' | '}' | ',' | '"' | '\\') || c.is_whitespace());
    if !needs_quotes {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Render a one-dimensional array as a PostgreSQL array literal, e.g. `{1,NULL,3}`.
fn format_array<T>(items: &[Option<T>], render: impl Fn(&T) -> String) -> String {
    let body: Vec<String> = items
        .iter()
        .map(|item| item.as_ref().map_or_else(|| "NULL".to_string(), &render))
        .collect();
    format!("{{{}}}", body.join(","))
}

/// Parse a SQLite date/time text cell.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` (with `T` or space), and bare dates.
/// Naive values are taken as UTC.
pub fn parse_datetime_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn scan_error(column: &str, err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::ColumnDecode { source, .. } => DbError::scan(column, source.to_string()),
        other => DbError::scan(column, other.to_string()),
    }
}

// =============================================================================
// Row Decoding Trait
// =============================================================================

/// Trait for decoding every cell of a database row into [`Value`]s, in column order.
pub trait RowToValues {
    fn to_values(&self) -> DbResult<Vec<Value>>;
}

impl RowToValues for PgRow {
    fn to_values(&self) -> DbResult<Vec<Value>> {
        self.columns()
            .iter()
            .map(|col| {
                let category = categorize_type(col.type_info().name());
                postgres::decode_column(self, col.ordinal(), col.name(), category)
            })
            .collect()
    }
}

impl RowToValues for SqliteRow {
    fn to_values(&self) -> DbResult<Vec<Value>> {
        self.columns()
            .iter()
            .map(|col| {
                sqlite::decode_column(self, col.ordinal(), col.name(), col.type_info().name())
            })
            .collect()
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod postgres {
    use super::*;
    use chrono::{FixedOffset, NaiveTime};
    use serde_json::Value as JsonValue;
    use sqlx::postgres::types::{Oid, PgInterval, PgTimeTz};

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        column: &str,
        category: TypeCategory,
    ) -> DbResult<Value> {
        let raw = row.try_get_raw(idx).map_err(|e| scan_error(column, e))?;
        if raw.is_null() {
            return Ok(Value::Null);
        }

        let value = match category {
            TypeCategory::Boolean => Value::Boolean(get(row, idx, column)?),
            TypeCategory::Integer => decode_integer(row, idx, column)?,
            TypeCategory::Oid => Value::Integer(get::<Oid>(row, idx, column)?.0.into()),
            TypeCategory::Float4 => {
                let v: f32 = get(row, idx, column)?;
                // Widen through the shortest decimal so 123.78f32 stays 123.78
                Value::Float(v.to_string().parse().unwrap_or(f64::from(v)))
            }
            TypeCategory::Float8 => Value::Float(get(row, idx, column)?),
            TypeCategory::Text => {
                let text = raw.as_str().map_err(|e| DbError::scan(column, e.to_string()))?;
                Value::Text(text.to_string())
            }
            TypeCategory::TimestampTz => Value::Timestamp(get(row, idx, column)?),
            TypeCategory::Timestamp => {
                Value::Timestamp(get::<NaiveDateTime>(row, idx, column)?.and_utc())
            }
            TypeCategory::Date => {
                let date: NaiveDate = get(row, idx, column)?;
                Value::Timestamp(date.and_time(NaiveTime::MIN).and_utc())
            }
            TypeCategory::Time => Value::Opaque(get::<NaiveTime>(row, idx, column)?.to_string()),
            TypeCategory::TimeTz => {
                let t: PgTimeTz<NaiveTime, FixedOffset> = get(row, idx, column)?;
                Value::Opaque(format!("{}{}", t.time, t.offset))
            }
            TypeCategory::Decimal => Value::Opaque(get::<RawDecimal>(row, idx, column)?.0),
            TypeCategory::Json => Value::Opaque(get::<JsonValue>(row, idx, column)?.to_string()),
            TypeCategory::Uuid => {
                Value::Opaque(get::<uuid::Uuid>(row, idx, column)?.hyphenated().to_string())
            }
            TypeCategory::Binary => {
                Value::Opaque(decode_binary_value(&get::<Vec<u8>>(row, idx, column)?))
            }
            TypeCategory::Interval => {
                let iv: PgInterval = get(row, idx, column)?;
                Value::Opaque(format_interval(iv.months, iv.days, iv.microseconds))
            }
            TypeCategory::Array => match decode_array(row, idx) {
                Some(text) => Value::Opaque(text),
                None => Value::Opaque(decode_raw_value(raw_bytes(&raw, column)?)),
            },
            TypeCategory::Unknown => Value::Opaque(decode_raw_value(raw_bytes(&raw, column)?)),
        };
        Ok(value)
    }

    fn raw_bytes<'r>(raw: &PgValueRef<'r>, column: &str) -> DbResult<&'r [u8]> {
        raw.as_bytes().map_err(|e| DbError::scan(column, e.to_string()))
    }

    /// Arrays of scalar element types; `None` for element types (or dimensions) without a decoder.
    fn decode_array(row: &PgRow, idx: usize) -> Option<String> {
        let name = row.column(idx).type_info().name().to_ascii_uppercase();
        let element = name
            .strip_suffix("[]")
            .or_else(|| name.strip_prefix('_'))?;

        match categorize_type(element) {
            TypeCategory::Boolean => {
                array::<bool>(row, idx, |v| (if *v { "t" } else { "f" }).to_string())
            }
            TypeCategory::Integer => match element {
                "INT2" | "SMALLINT" => array::<i16>(row, idx, |v| v.to_string()),
                "INT4" | "INTEGER" => array::<i32>(row, idx, |v| v.to_string()),
                _ => array::<i64>(row, idx, |v| v.to_string()),
            },
            TypeCategory::Float4 => array::<f32>(row, idx, |v| v.to_string()),
            TypeCategory::Float8 => array::<f64>(row, idx, |v| v.to_string()),
            TypeCategory::Text => array::<String>(row, idx, |v| quote_array_element(v)),
            TypeCategory::Uuid => {
                array::<uuid::Uuid>(row, idx, |v| v.hyphenated().to_string())
            }
            _ => None,
        }
    }

    fn array<'r, T>(row: &'r PgRow, idx: usize, render: impl Fn(&T) -> String) -> Option<String>
    where
        Vec<Option<T>>: Decode<'r, sqlx::Postgres> + Type<sqlx::Postgres>,
    {
        // Multi-dimensional arrays fail to decode and fall back to raw bytes
        let items: Vec<Option<T>> = row.try_get(idx).ok()?;
        Some(format_array(&items, render))
    }

    fn get<'r, T>(row: &'r PgRow, idx: usize, column: &str) -> DbResult<T>
    where
        T: Decode<'r, sqlx::Postgres> + Type<sqlx::Postgres>,
    {
        row.try_get::<T, _>(idx).map_err(|e| scan_error(column, e))
    }

    fn decode_integer(row: &PgRow, idx: usize, column: &str) -> DbResult<Value> {
        let value = match row.column(idx).type_info().name() {
            "INT2" => i64::from(get::<i16>(row, idx, column)?),
            "INT4" => i64::from(get::<i32>(row, idx, column)?),
            _ => get::<i64>(row, idx, column)?,
        };
        Ok(Value::Integer(value))
    }
}

mod sqlite {
    use super::*;

    /// Decode by storage class, refined by the declared column type.
    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        column: &str,
        declared: &str,
    ) -> DbResult<Value> {
        let raw = row.try_get_raw(idx).map_err(|e| scan_error(column, e))?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let storage = raw.type_info().name().to_string();
        let declared = declared.to_ascii_uppercase();

        let value = match storage.as_str() {
            "INTEGER" => {
                let v: i64 = get(row, idx, column)?;
                match declared.as_str() {
                    "BOOLEAN" | "BOOL" => Value::Boolean(v != 0),
                    "DATETIME" | "TIMESTAMP" => DateTime::from_timestamp(v, 0)
                        .map(Value::Timestamp)
                        .unwrap_or(Value::Integer(v)),
                    _ => Value::Integer(v),
                }
            }
            "REAL" => Value::Float(get(row, idx, column)?),
            "TEXT" => {
                let text: String = get(row, idx, column)?;
                match declared.as_str() {
                    "DATETIME" | "TIMESTAMP" | "DATE" => parse_datetime_text(&text)
                        .map(Value::Timestamp)
                        .unwrap_or(Value::Text(text)),
                    _ => Value::Text(text),
                }
            }
            _ => Value::Opaque(decode_binary_value(&get::<Vec<u8>>(row, idx, column)?)),
        };
        Ok(value)
    }

    fn get<'r, T>(row: &'r SqliteRow, idx: usize, column: &str) -> DbResult<T>
    where
        T: Decode<'r, sqlx::Sqlite> + Type<sqlx::Sqlite>,
    {
        // Declared affinity and storage class disagree freely in SQLite
        row.try_get_unchecked::<T, _>(idx)
            .map_err(|e| scan_error(column, e))
    }
}
