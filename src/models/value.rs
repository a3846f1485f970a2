//! Uniform in-memory representation of query results.
//!
//! A result set of unknown shape is materialized as a [`RowSet`] of [`Record`]s,
//! each mapping column names to a [`Value`]. Records keep their columns in
//! byte-wise key order so that serialized output never depends on the order the
//! backend happened to enumerate columns in.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

/// Key of the marker column in synthetic success records.
pub const MESSAGE_KEY: &str = "message";

/// Key of the affected-row count in prepared-statement records.
pub const ROWS_AFFECTED_KEY: &str = "rowsAffected";

/// Marker text for statements that completed without returning rows.
pub const SUCCESS_MESSAGE: &str = "success";

/// A single decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    /// Absolute point in time, rendered only when formatted.
    Timestamp(DateTime<Utc>),
    /// Driver-specific value without a dedicated kind, kept as a best-effort string.
    Opaque(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the kind name of this value for debugging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::Opaque(_) => "opaque",
        }
    }

    /// Render the value as plain text for csv cells and html table cells.
    ///
    /// Null renders as an empty string. Floats use the shortest decimal form that
    /// round-trips, without exponent notation.
    pub fn render_text(&self) -> Cow<'_, str> {
        match self {
            Self::Null => Cow::Borrowed(""),
            Self::Boolean(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Self::Integer(i) => Cow::Owned(i.to_string()),
            Self::Float(f) => Cow::Owned(f.to_string()),
            Self::Text(s) | Self::Opaque(s) => Cow::Borrowed(s),
            Self::Timestamp(ts) => Cow::Owned(format_timestamp(ts)),
        }
    }
}

/// RFC 3339 in UTC with a `Z` suffix and only as many fractional digits as needed.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Integer(i) => serializer.serialize_i64(*i),
            // JSON has no representation for NaN or infinities
            Self::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Self::Float(f) => serializer.serialize_str(&f.to_string()),
            Self::Text(s) | Self::Opaque(s) => serializer.serialize_str(s),
            Self::Timestamp(ts) => serializer.serialize_str(&format_timestamp(ts)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// One logical row: column name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// The record produced for a statement that returned no columns.
    pub fn success() -> Self {
        Self::from_iter([(MESSAGE_KEY, Value::from(SUCCESS_MESSAGE))])
    }

    /// The record produced by a prepared statement executed for its effect.
    pub fn rows_affected(count: u64) -> Self {
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        Self::from_iter([
            (MESSAGE_KEY, Value::from(SUCCESS_MESSAGE)),
            (ROWS_AFFECTED_KEY, Value::Integer(count)),
        ])
    }

    /// Insert a column; a repeated name replaces the earlier value.
    pub fn insert(&mut self, column: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(column.into(), value)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Ordered sequence of records produced by one operation.
///
/// Order is whatever the backend returned; nothing here sorts rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RowSet(Vec<Record>);

impl RowSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.0.push(record);
    }

    pub fn records(&self) -> &[Record] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sorted union of every column name appearing in any record.
    pub fn column_union(&self) -> Vec<&str> {
        self.0
            .iter()
            .flat_map(Record::columns)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl From<Vec<Record>> for RowSet {
    fn from(records: Vec<Record>) -> Self {
        Self(records)
    }
}

impl FromIterator<Record> for RowSet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Record> for RowSet {
    fn extend<I: IntoIterator<Item = Record>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for RowSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a RowSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_render_text_per_kind() {
        assert_eq!(Value::Null.render_text(), "");
        assert_eq!(Value::Boolean(true).render_text(), "true");
        assert_eq!(Value::Integer(-42).render_text(), "-42");
        assert_eq!(Value::Float(123.78).render_text(), "123.78");
        assert_eq!(Value::Float(2.0).render_text(), "2");
        assert_eq!(Value::Float(1e21).render_text(), "1000000000000000000000");
        assert_eq!(Value::Opaque("AQI=".into()).render_text(), "AQI=");
    }

    #[test]
    fn test_timestamp_rendering() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(Value::Timestamp(ts).render_text(), "2024-03-09T14:05:00Z");
        assert_eq!(
            serde_json::to_string(&Value::Timestamp(ts)).unwrap(),
            "\"2024-03-09T14:05:00Z\""
        );
    }

    #[test]
    fn test_value_json_kinds() {
        assert_eq!(serde_json::to_string(&Value::Null).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Value::Integer(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&Value::Float(0.5)).unwrap(), "0.5");
        assert_eq!(
            serde_json::to_string(&Value::Float(f64::NAN)).unwrap(),
            "\"NaN\""
        );
    }

    #[test]
    fn test_record_serializes_with_sorted_keys() {
        let record = Record::from_iter([
            ("name", Value::from("Alice")),
            ("id", Value::from(1)),
            ("Zed", Value::Null),
        ]);
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"Zed":null,"id":1,"name":"Alice"}"#
        );
    }

    #[test]
    fn test_success_records() {
        assert_eq!(
            serde_json::to_string(&Record::success()).unwrap(),
            r#"{"message":"success"}"#
        );
        assert_eq!(
            serde_json::to_string(&Record::rows_affected(3)).unwrap(),
            r#"{"message":"success","rowsAffected":3}"#
        );
    }

    #[test]
    fn test_column_union_is_sorted_and_deduplicated() {
        let rows = RowSet::from(vec![
            Record::from_iter([("b", Value::Null), ("a", Value::Null)]),
            Record::from_iter([("c", Value::Null), ("a", Value::Null)]),
        ]);
        assert_eq!(rows.column_union(), vec!["a", "b", "c"]);
    }
}
