//! Parameter ordering and binding utilities.
//!
//! Named parameters arrive as an unordered JSON object. They are turned into a
//! positional list here, before anything touches the backend, so that a value
//! always lands on the same placeholder regardless of map iteration order.

use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use serde_json::Value as JsonValue;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgTypeInfo};
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{Encode, Postgres, Sqlite, Type};
use std::collections::BTreeMap;

/// Order named parameters into a positional list.
///
/// Keys that are all positive integers (optionally written `$n`) bind in numeric
/// order and must cover exactly `1..=n`. Any other key set binds in byte-wise
/// lexical key order.
pub fn order_named_params(params: &BTreeMap<String, JsonValue>) -> DbResult<Vec<QueryParam>> {
    if params.is_empty() {
        return Ok(Vec::new());
    }

    let positions: Option<Vec<u64>> = params.keys().map(|k| positional_index(k)).collect();

    match positions {
        Some(indexes) => {
            let mut numbered: Vec<(u64, &JsonValue)> =
                indexes.into_iter().zip(params.values()).collect();
            numbered.sort_by_key(|(idx, _)| *idx);

            for (expected, (idx, _)) in (1u64..).zip(&numbered) {
                if *idx != expected {
                    return Err(DbError::invalid_input(format!(
                        "Positional parameters must be numbered 1..={} without gaps or duplicates (found {})",
                        numbered.len(),
                        describe_keys(params)
                    )));
                }
            }

            Ok(numbered
                .into_iter()
                .map(|(_, v)| QueryParam::from(v.clone()))
                .collect())
        }
        // BTreeMap iterates in byte-wise key order
        None => Ok(params.values().cloned().map(QueryParam::from).collect()),
    }
}

fn positional_index(key: &str) -> Option<u64> {
    let digits = key.strip_prefix('$').unwrap_or(key);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok().filter(|n| *n > 0)
}

fn describe_keys(params: &BTreeMap<String, JsonValue>) -> String {
    params.keys().cloned().collect::<Vec<_>>().join(", ")
}

/// A NULL bound with no declared type, so PostgreSQL infers it from context.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// PostgreSQL parameter type matching how [`bind_postgres_param`] encodes the value.
pub(crate) fn postgres_param_type(param: &QueryParam) -> PgTypeInfo {
    match param {
        QueryParam::Null => <UntypedNull as Type<Postgres>>::type_info(),
        QueryParam::Bool(_) => <bool as Type<Postgres>>::type_info(),
        QueryParam::Int(_) => <i64 as Type<Postgres>>::type_info(),
        QueryParam::Float(_) => <f64 as Type<Postgres>>::type_info(),
        QueryParam::String(_) => <String as Type<Postgres>>::type_info(),
        QueryParam::Json(_) => <Json<JsonValue> as Type<Postgres>>::type_info(),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(UntypedNull),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        // SQLite doesn't have native JSON type, store as string
        QueryParam::Json(v) => query.bind(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn map(pairs: &[(&str, JsonValue)]) -> BTreeMap<String, JsonValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_numeric_keys_bind_in_numeric_order() {
        // "10" sorts before "2" lexically
        let mut pairs: Vec<(String, JsonValue)> =
            (1..=10).map(|i| (i.to_string(), json!(i))).collect();
        pairs.shuffle(&mut rand::thread_rng());
        let params: BTreeMap<String, JsonValue> = pairs.into_iter().collect();

        let ordered = assert_ok!(order_named_params(&params));
        let expected: Vec<QueryParam> = (1..=10).map(QueryParam::Int).collect();
        assert_eq!(ordered, expected);
    }

    #[test]
    fn test_dollar_prefixed_keys() {
        let params = map(&[("$2", json!("b")), ("$1", json!("a"))]);
        let ordered = assert_ok!(order_named_params(&params));
        assert_eq!(
            ordered,
            vec![
                QueryParam::String("a".into()),
                QueryParam::String("b".into())
            ]
        );
    }

    #[test]
    fn test_gap_in_positions_is_rejected() {
        let params = map(&[("1", json!(1)), ("3", json!(3))]);
        let err = assert_err!(order_named_params(&params));
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[test]
    fn test_duplicate_positions_are_rejected() {
        let params = map(&[("1", json!(1)), ("$1", json!(2))]);
        assert_err!(order_named_params(&params));
    }

    #[test]
    fn test_zero_position_falls_back_to_lexical() {
        let params = map(&[("0", json!("zero")), ("1", json!("one"))]);
        let ordered = assert_ok!(order_named_params(&params));
        assert_eq!(
            ordered,
            vec![
                QueryParam::String("zero".into()),
                QueryParam::String("one".into())
            ]
        );
    }

    #[test]
    fn test_named_keys_bind_in_lexical_order() {
        let params = map(&[
            ("name", json!("Bob")),
            ("Country", json!("UK")),
            ("age", json!(30)),
        ]);
        let ordered = assert_ok!(order_named_params(&params));
        assert_eq!(
            ordered,
            vec![
                QueryParam::String("UK".into()),
                QueryParam::Int(30),
                QueryParam::String("Bob".into()),
            ]
        );
    }

    #[test]
    fn test_empty_map_binds_nothing() {
        let ordered = assert_ok!(order_named_params(&BTreeMap::new()));
        assert!(ordered.is_empty());
    }

    #[test]
    fn test_postgres_param_types() {
        use sqlx::TypeInfo;
        assert_eq!(postgres_param_type(&QueryParam::Int(1)).name(), "INT8");
        assert_eq!(
            postgres_param_type(&QueryParam::String("x".into())).name(),
            "TEXT"
        );
        assert_eq!(
            postgres_param_type(&QueryParam::Json(json!([1]))).name(),
            "JSONB"
        );
    }
}
