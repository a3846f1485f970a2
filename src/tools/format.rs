//! Result rendering.
//!
//! Renders a [`RowSet`] as JSON, CSV or an HTML table. Output is a pure function
//! of the records and the target format: CSV and table columns are always the
//! sorted union of keys across all records, never the order a backend happened to
//! report them in.

use crate::error::{DbError, DbResult};
use crate::models::RowSet;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::str::FromStr;

/// Output format for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON array of objects (default)
    #[default]
    Json,
    /// Comma-separated values with a header row
    Csv,
    /// HTML `<table>`
    Table,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Table => "table",
        }
    }

    /// Resolve an optional request field; absent or blank means JSON.
    pub fn from_request(requested: Option<&str>) -> DbResult<Self> {
        match requested.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => name.parse(),
            None => Ok(Self::default()),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "table" => Ok(Self::Table),
            _ => Err(DbError::unsupported_format(s.trim())),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendered text paired with the format that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedOutput {
    pub format: OutputFormat,
    pub text: String,
}

/// Render `rows` in `format`.
///
/// JSON accepts an empty row set and renders `[]`; CSV and table fail with
/// [`DbError::EmptyData`] because they have no columns to emit.
pub fn format_rows(rows: &RowSet, format: OutputFormat) -> DbResult<FormattedOutput> {
    let text = match format {
        OutputFormat::Json => format_as_json(rows)?,
        OutputFormat::Csv => format_as_csv(rows)?,
        OutputFormat::Table => format_as_table(rows)?,
    };
    Ok(FormattedOutput { format, text })
}

fn format_as_json(rows: &RowSet) -> DbResult<String> {
    serde_json::to_string(rows)
        .map_err(|e| DbError::internal(format!("Failed to serialize rows as JSON: {e}")))
}

fn format_as_csv(rows: &RowSet) -> DbResult<String> {
    if rows.is_empty() {
        return Err(DbError::empty_data(OutputFormat::Csv.as_str()));
    }

    let columns = rows.column_union();
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_error = |e: csv::Error| DbError::internal(format!("Failed to write CSV: {e}"));

    writer.write_record(&columns).map_err(csv_error)?;
    for record in rows {
        let cells = columns
            .iter()
            .map(|col| record.get(col).map(|v| v.render_text()).unwrap_or_default());
        writer.write_record(cells.map(|c| c.into_owned())).map_err(csv_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| DbError::internal(format!("Failed to flush CSV: {e}")))?;
    String::from_utf8(bytes).map_err(|e| DbError::internal(format!("CSV is not UTF-8: {e}")))
}

fn format_as_table(rows: &RowSet) -> DbResult<String> {
    if rows.is_empty() {
        return Err(DbError::empty_data(OutputFormat::Table.as_str()));
    }

    let columns = rows.column_union();
    let mut out = String::from("<table><thead><tr>");
    for col in &columns {
        out.push_str("<th>");
        out.push_str(&escape_html(col));
        out.push_str("</th>");
    }
    out.push_str("</tr></thead><tbody>");

    for record in rows {
        out.push_str("<tr>");
        for col in &columns {
            let cell = record.get(col).map(|v| v.render_text()).unwrap_or_default();
            // Writing to a String cannot fail
            let _ = write!(out, "<td>{}</td>", escape_html(&cell));
        }
        out.push_str("</tr>");
    }
    out.push_str("</tbody></table>");
    Ok(out)
}

/// Escape `& < > ' "` for HTML text and attribute content.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&#39;"),
            '"' => escaped.push_str("&#34;"),
            other => escaped.push(other),
        }
    }
    escaped
}
