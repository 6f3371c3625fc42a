use chrono::NaiveDate;
use serde_json::Value;
use shared::{
    domain::{ProjectStatus, SpeakerStatus},
    protocol::{Patch, Table},
};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Bool,
    Date,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub writable: bool,
}

const fn col(name: &'static str, kind: ColumnKind, nullable: bool, writable: bool) -> ColumnSpec {
    ColumnSpec {
        name,
        kind,
        nullable,
        writable,
    }
}

use ColumnKind::{Bool, Date, Integer, Status, Text};

const SPEAKER_COLUMNS: &[ColumnSpec] = &[
    col("id", Integer, false, false),
    col("club_id", Integer, false, false),
    col("name", Text, false, true),
    col("email", Text, true, true),
    col("phone", Text, true, true),
    col("organization", Text, true, true),
    col("topic", Text, true, true),
    col("status", Status, false, true),
    col("position", Integer, false, true),
    col("scheduled_date", Date, true, true),
    col("is_rotarian", Bool, false, true),
    col("notes", Text, true, true),
    col("created_at", Text, false, false),
    col("updated_at", Text, false, false),
];

const MEMBER_COLUMNS: &[ColumnSpec] = &[
    col("id", Integer, false, false),
    col("club_id", Integer, false, false),
    col("name", Text, false, true),
    col("email", Text, true, true),
    col("phone", Text, true, true),
    col("classification", Text, true, true),
    col("role", Text, true, true),
    col("member_since", Date, true, true),
    col("active", Bool, false, true),
    col("created_at", Text, false, false),
    col("updated_at", Text, false, false),
];

const PROJECT_COLUMNS: &[ColumnSpec] = &[
    col("id", Integer, false, false),
    col("club_id", Integer, false, false),
    col("name", Text, false, true),
    col("area_of_focus", Text, true, true),
    col("status", Status, false, true),
    col("position", Integer, false, true),
    col("lead", Text, true, true),
    col("start_date", Date, true, true),
    col("budget_cents", Integer, true, true),
    col("notes", Text, true, true),
    col("created_at", Text, false, false),
    col("updated_at", Text, false, false),
];

pub fn columns(table: Table) -> &'static [ColumnSpec] {
    match table {
        Table::Speakers => SPEAKER_COLUMNS,
        Table::Members => MEMBER_COLUMNS,
        Table::Projects => PROJECT_COLUMNS,
    }
}

pub fn column(table: Table, name: &str) -> Option<&'static ColumnSpec> {
    columns(table).iter().find(|spec| spec.name == name)
}

pub fn sql_table(table: Table) -> &'static str {
    match table {
        Table::Speakers => "speakers",
        Table::Members => "members",
        Table::Projects => "service_projects",
    }
}

pub fn is_pipelined(table: Table) -> bool {
    column(table, "position").is_some()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("patch is empty")]
    Empty,
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("column '{0}' is read-only")]
    ReadOnly(String),
    #[error("invalid value for '{column}': {reason}")]
    InvalidValue { column: String, reason: String },
}

/// A patch value already checked against its column type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Text(Option<String>),
    Integer(Option<i64>),
    Bool(bool),
    Date(Option<NaiveDate>),
}

pub fn typed_patch(table: Table, patch: &Patch) -> Result<Vec<(&'static str, TypedValue)>, PatchError> {
    if patch.is_empty() {
        return Err(PatchError::Empty);
    }
    patch
        .iter()
        .map(|(name, value)| {
            let spec =
                column(table, name).ok_or_else(|| PatchError::UnknownColumn(name.clone()))?;
            if !spec.writable {
                return Err(PatchError::ReadOnly(name.clone()));
            }
            Ok((spec.name, typed_value(table, spec, value)?))
        })
        .collect()
}

fn typed_value(table: Table, spec: &ColumnSpec, value: &Value) -> Result<TypedValue, PatchError> {
    let invalid = |reason: &str| PatchError::InvalidValue {
        column: spec.name.to_string(),
        reason: reason.to_string(),
    };

    if value.is_null() {
        if !spec.nullable {
            return Err(invalid("must not be null"));
        }
        return Ok(match spec.kind {
            Text | Status => TypedValue::Text(None),
            Integer => TypedValue::Integer(None),
            Date => TypedValue::Date(None),
            Bool => return Err(invalid("must not be null")),
        });
    }

    match spec.kind {
        Text => {
            let text = value.as_str().ok_or_else(|| invalid("expected a string"))?;
            if !spec.nullable && text.trim().is_empty() {
                return Err(invalid("must not be blank"));
            }
            Ok(TypedValue::Text(Some(text.to_string())))
        }
        Status => {
            let text = value.as_str().ok_or_else(|| invalid("expected a status"))?;
            let known = match table {
                Table::Speakers => text.parse::<SpeakerStatus>().map(|s| s.as_str()),
                Table::Projects => text.parse::<ProjectStatus>().map(|s| s.as_str()),
                Table::Members => return Err(invalid("members have no status")),
            };
            let canonical = known.map_err(|e| invalid(&e.to_string()))?;
            Ok(TypedValue::Text(Some(canonical.to_string())))
        }
        Integer => {
            let n = value.as_i64().ok_or_else(|| invalid("expected an integer"))?;
            if spec.name == "position" && n < 0 {
                return Err(invalid("must be non-negative"));
            }
            Ok(TypedValue::Integer(Some(n)))
        }
        Bool => value
            .as_bool()
            .map(TypedValue::Bool)
            .ok_or_else(|| invalid("expected a boolean")),
        Date => {
            let text = value.as_str().ok_or_else(|| invalid("expected a date"))?;
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map(|d| TypedValue::Date(Some(d)))
                .map_err(|_| invalid("expected YYYY-MM-DD"))
        }
    }
}

/// Filter values arrive as strings from query parameters.
pub fn typed_filter(table: Table, name: &str, raw: &str) -> Result<(&'static str, TypedValue), PatchError> {
    let spec = column(table, name).ok_or_else(|| PatchError::UnknownColumn(name.to_string()))?;
    let value = match spec.kind {
        Text | Status | Date => Value::String(raw.to_string()),
        Integer => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| PatchError::InvalidValue {
                column: name.to_string(),
                reason: "expected an integer".to_string(),
            })?,
        Bool => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Value::Bool(true),
            "false" | "0" | "no" => Value::Bool(false),
            _ => {
                return Err(PatchError::InvalidValue {
                    column: name.to_string(),
                    reason: "expected a boolean".to_string(),
                })
            }
        },
    };
    Ok((spec.name, typed_value(table, spec, &value)?))
}
