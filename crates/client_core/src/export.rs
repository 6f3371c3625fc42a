use thiserror::Error;

use crate::record::{Column, FieldValue, Fields};

const DATE_FORMAT: &str = "%b %-d, %Y";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error("no columns selected")]
    NoColumns,
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
}

/// Resolves user-selected column keys, keeping their order.
pub fn select_columns<T: Fields>(keys: &[&str]) -> Result<Vec<Column>, ExportError> {
    if keys.is_empty() {
        return Err(ExportError::NoColumns);
    }
    keys.iter()
        .map(|key| T::column(key.trim()).ok_or_else(|| ExportError::UnknownColumn(key.to_string())))
        .collect()
}

/// Header of column labels, then one line per row. Every cell is quoted;
/// dates read `Jan 5, 2025`, booleans `Yes`/`No`, nulls are empty.
pub fn to_csv<T: Fields>(rows: &[T], columns: &[Column]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        columns
            .iter()
            .map(|column| quote(column.label))
            .collect::<Vec<_>>()
            .join(","),
    );
    for row in rows {
        lines.push(
            columns
                .iter()
                .map(|column| quote(&format_value(row.field(column.key).unwrap_or(FieldValue::Missing))))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    lines.join("\n")
}

/// Display form of one cell, shared by export and text views.
pub fn format_value(value: FieldValue<'_>) -> String {
    match value {
        FieldValue::Text(text) => text.to_string(),
        FieldValue::Integer(n) => n.to_string(),
        FieldValue::Bool(true) => "Yes".to_string(),
        FieldValue::Bool(false) => "No".to_string(),
        FieldValue::Date(date) => date.format(DATE_FORMAT).to_string(),
        FieldValue::Timestamp(at) => at.date_naive().format(DATE_FORMAT).to_string(),
        FieldValue::Missing => String::new(),
    }
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

#[cfg(test)]
#[path = "tests/export_tests.rs"]
mod tests;
