use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    domain::{ClubId, ClubKind, UnknownVariant},
    error::ApiError,
};

/// Partial record: column name to new value.
pub type Patch = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Speakers,
    Members,
    Projects,
}

impl Table {
    pub const ALL: &'static [Table] = &[Table::Speakers, Table::Members, Table::Projects];

    pub fn as_str(self) -> &'static str {
        match self {
            Table::Speakers => "speakers",
            Table::Members => "members",
            Table::Projects => "projects",
        }
    }
}

impl FromStr for Table {
    type Err = UnknownVariant;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "speakers" => Ok(Table::Speakers),
            "members" => Ok(Table::Members),
            "projects" | "service_projects" => Ok(Table::Projects),
            _ => Err(UnknownVariant {
                kind: "table",
                value: raw.to_string(),
            }),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Which change kinds a realtime subscriber wants delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMask {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl ChangeMask {
    pub const ALL: ChangeMask = ChangeMask {
        insert: true,
        update: true,
        delete: true,
    };

    pub fn allows(&self, kind: ChangeKind) -> bool {
        match kind {
            ChangeKind::Insert => self.insert,
            ChangeKind::Update => self.update,
            ChangeKind::Delete => self.delete,
        }
    }

    /// Query-string form, e.g. `insert,update`.
    pub fn to_query(&self) -> String {
        let mut parts = Vec::new();
        if self.insert {
            parts.push("insert");
        }
        if self.update {
            parts.push("update");
        }
        if self.delete {
            parts.push("delete");
        }
        parts.join(",")
    }

    pub fn from_query(raw: &str) -> Self {
        let mut mask = ChangeMask {
            insert: false,
            update: false,
            delete: false,
        };
        for part in raw.split(',').map(str::trim) {
            match part.to_ascii_lowercase().as_str() {
                "insert" => mask.insert = true,
                "update" => mask.update = true,
                "delete" => mask.delete = true,
                "*" | "all" => mask = ChangeMask::ALL,
                _ => {}
            }
        }
        mask
    }
}

impl Default for ChangeMask {
    fn default() -> Self {
        ChangeMask::ALL
    }
}

/// A committed row change as it travels over the realtime feed. Rows stay
/// untyped here; subscribers decode them into their own record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEnvelope {
    pub club_id: ClubId,
    pub table: Table,
    #[serde(rename = "eventType")]
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    pub committed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    Subscribed { club_id: ClubId, table: Table },
    RowChanged(ChangeEnvelope),
    Error(ApiError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// Read request against one table of one club.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SelectQuery {
    /// Equality filters, ANDed.
    #[serde(default)]
    pub filters: Vec<(String, String)>,
    #[serde(default)]
    pub order: Vec<OrderBy>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    /// `position.asc,name.desc`
    pub fn order_param(&self) -> Option<String> {
        if self.order.is_empty() {
            return None;
        }
        Some(
            self.order
                .iter()
                .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    pub fn parse_order_param(raw: &str) -> Vec<OrderBy> {
        raw.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.rsplit_once('.') {
                Some((column, "desc")) => OrderBy::desc(column),
                Some((column, "asc")) => OrderBy::asc(column),
                _ => OrderBy::asc(part),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClubRequest {
    pub name: String,
    pub kind: ClubKind,
}
