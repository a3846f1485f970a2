//! Leading-keyword guard for the `execute_query` tool.
//!
//! The guard inspects only the first whitespace-delimited word of the statement.
//! It is not a parser: anything after that word is passed to the backend as-is.

use crate::error::{DbError, DbResult};

const REQUIRED_KEYWORD: &str = "SELECT";

/// Error messages for each rejection.
mod error_messages {
    pub const EMPTY: &str = "Empty SQL statement";
    pub const NOT_SELECT: &str = "Only SELECT statements are allowed in execute_query. \
        Use execute_prepared for statements that modify data.";
}

/// Require the first word of `sql` to be `SELECT`.
///
/// The comparison ignores ASCII case and leading whitespace. A word that merely
/// starts with `SELECT` (such as `SELECTA`) does not pass.
///
/// # Examples
///
/// ```
/// use db_query_server::tools::sql_validator::validate_select;
///
/// assert!(validate_select("SELECT * FROM users").is_ok());
/// assert!(validate_select("  select 1").is_ok());
/// assert!(validate_select("DELETE FROM users").is_err());
/// ```
pub fn validate_select(sql: &str) -> DbResult<()> {
    let first_word = sql
        .split_whitespace()
        .next()
        .ok_or_else(|| DbError::invalid_input(error_messages::EMPTY))?;

    if first_word.eq_ignore_ascii_case(REQUIRED_KEYWORD) {
        Ok(())
    } else {
        Err(DbError::invalid_input(format!(
            "{} Found '{}'.",
            error_messages::NOT_SELECT,
            first_word
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_allowed() {
        assert!(validate_select("SELECT * FROM customers").is_ok());
        assert!(validate_select("select id from t").is_ok());
        assert!(validate_select("\n\t SELECT\n1").is_ok());
    }

    #[test]
    fn test_word_prefix_is_not_enough() {
        let err = validate_select("SELECTA SELECT * FROM customers").unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
        assert!(err.to_string().contains("SELECTA"));
    }

    #[test]
    fn test_other_statements_rejected() {
        for sql in [
            "INSERT INTO t VALUES (1)",
            "WITH x AS (SELECT 1) SELECT * FROM x",
            "(SELECT 1)",
            "DROP TABLE customers",
        ] {
            assert!(validate_select(sql).is_err(), "{sql} should be rejected");
        }
    }

    #[test]
    fn test_empty_rejected() {
        let err = validate_select("   ").unwrap_err();
        assert!(err.to_string().contains("Empty SQL statement"));
    }
}
