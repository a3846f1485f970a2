//! Schema introspection module.
//!
//! Describes the columns of a set of tables as generic records, one per column,
//! so the result flows through the same formatter as query output.
//!
//! # Architecture
//!
//! SQL queries are organized in the `queries` submodule with constants for each
//! database type. Both run through the [`RowMaterializer`], so catalog lookups share
//! the error taxonomy, timeout and cancellation handling of ordinary queries.

use crate::db::materializer::RowMaterializer;
use crate::error::DbResult;
use crate::models::{DatabaseType, QueryOptions, QueryParam, Record, RowSet, Value};
use tracing::debug;

pub const COLUMN_NAME: &str = "column_name";
pub const DATA_TYPE: &str = "data_type";
pub const CHARACTER_MAXIMUM_LENGTH: &str = "character_maximum_length";

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod postgres {
        pub const DESCRIBE_COLUMNS: &str = "SELECT column_name::text AS column_name, \
            data_type::text AS data_type, \
            character_maximum_length::bigint AS character_maximum_length \
            FROM information_schema.columns \
            WHERE table_name = $1 \
            ORDER BY ordinal_position";
    }

    pub mod sqlite {
        pub const DESCRIBE_COLUMNS: &str = "SELECT name AS column_name, \
            type AS data_type, \
            NULL AS character_maximum_length \
            FROM pragma_table_info(?1) \
            ORDER BY cid";
    }
}

/// Schema inspector for database introspection.
#[derive(Clone)]
pub struct SchemaInspector {
    materializer: RowMaterializer,
}

impl SchemaInspector {
    pub fn new(materializer: RowMaterializer) -> Self {
        Self { materializer }
    }

    /// Describe the columns of `tables`.
    ///
    /// Records follow the order of `tables`, then catalog column order within each
    /// table. A table with no columns (or that does not exist) contributes nothing.
    pub async fn describe(&self, tables: &[String], opts: &QueryOptions) -> DbResult<RowSet> {
        let kind = self.materializer.backend().kind();
        let sql = match kind {
            DatabaseType::PostgreSQL => queries::postgres::DESCRIBE_COLUMNS,
            DatabaseType::SQLite => queries::sqlite::DESCRIBE_COLUMNS,
        };

        let mut columns = RowSet::new();
        for table in tables {
            let params = [QueryParam::String(table.clone())];
            let rows = self.materializer.execute(sql, &params, opts).await?;
            debug!(table = %table, columns = rows.len(), "Described table");

            match kind {
                DatabaseType::PostgreSQL => columns.extend(rows),
                DatabaseType::SQLite => columns.extend(rows.into_iter().map(with_declared_length)),
            }
        }
        Ok(columns)
    }
}

/// Fill `character_maximum_length` from a declared type such as `VARCHAR(200)`.
///
/// SQLite keeps the declared type verbatim and has no catalog column for the length.
fn with_declared_length(mut record: Record) -> Record {
    let length = match record.get(DATA_TYPE) {
        Some(Value::Text(declared)) => declared_char_length(declared),
        _ => None,
    };
    if let Some(length) = length {
        record.insert(CHARACTER_MAXIMUM_LENGTH, Value::Integer(length));
    }
    record
}

fn declared_char_length(declared: &str) -> Option<i64> {
    let upper = declared.to_ascii_uppercase();
    if !upper.contains("CHAR") {
        return None;
    }
    let open = upper.find('(')?;
    let close = upper[open..].find(')')? + open;
    upper[open + 1..close].trim().parse().ok()
}
