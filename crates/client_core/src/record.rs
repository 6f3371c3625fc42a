use std::{
    fmt::{Debug, Display},
    hash::Hash,
};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{
        Member, MemberId, NewMember, NewServiceProject, NewSpeaker, ProjectId, ProjectStatus,
        ServiceProject, Speaker, SpeakerId, SpeakerStatus,
    },
    protocol::Table,
};

/// A row type mirrored from one store table.
pub trait Record: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    type Id: Copy + Eq + Hash + Debug + Display + From<i64> + Into<i64> + Send + Sync + 'static;
    /// Insert payload; the store assigns the id.
    type Draft: Serialize + Send + Sync + 'static;

    const TABLE: Table;

    fn id(&self) -> Self::Id;
}

/// Records that live on a kanban board: a closed status set plus a manual
/// `position` inside each status column.
pub trait Pipelined: Record {
    type Status: Copy + Eq + Hash + Debug + Display + Serialize + Send + Sync + 'static;

    fn status(&self) -> Self::Status;
    fn set_status(&mut self, status: Self::Status);
    fn position(&self) -> i64;
    fn set_position(&mut self, position: i64);

    /// Statuses hidden by the "active" filter.
    fn is_terminal(status: Self::Status) -> bool;

    /// Board priority bucket, lower sorts first.
    fn board_rank(status: Self::Status) -> u8;

    /// Secondary board key. Only one status uses it; everything else
    /// returns `None` and falls through to `position`.
    fn board_date(&self) -> Option<NaiveDate> {
        None
    }
}

/// Fixed text fields matched by the free-text search box.
pub trait Searchable {
    fn search_fields(&self) -> Vec<&str>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub key: &'static str,
    pub label: &'static str,
}

const fn column(key: &'static str, label: &'static str) -> Column {
    Column { key, label }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Integer(i64),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Missing,
}

impl FieldValue<'_> {
    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }
}

fn text(value: &Option<String>) -> FieldValue<'_> {
    value.as_deref().map_or(FieldValue::Missing, FieldValue::Text)
}

fn date(value: Option<NaiveDate>) -> FieldValue<'static> {
    value.map_or(FieldValue::Missing, FieldValue::Date)
}

/// Named, typed column access for table sorting and export.
pub trait Fields {
    const COLUMNS: &'static [Column];

    /// `None` for an unknown key; `Some(FieldValue::Missing)` for a null.
    fn field(&self, key: &str) -> Option<FieldValue<'_>>;

    fn column(key: &str) -> Option<Column> {
        Self::COLUMNS.iter().copied().find(|c| c.key == key)
    }
}

impl Record for Speaker {
    type Id = SpeakerId;
    type Draft = NewSpeaker;

    const TABLE: Table = Table::Speakers;

    fn id(&self) -> SpeakerId {
        self.id
    }
}

impl Pipelined for Speaker {
    type Status = SpeakerStatus;

    fn status(&self) -> SpeakerStatus {
        self.status
    }

    fn set_status(&mut self, status: SpeakerStatus) {
        self.status = status;
    }

    fn position(&self) -> i64 {
        self.position
    }

    fn set_position(&mut self, position: i64) {
        self.position = position;
    }

    fn is_terminal(status: SpeakerStatus) -> bool {
        matches!(status, SpeakerStatus::Dropped | SpeakerStatus::Spoken)
    }

    fn board_rank(status: SpeakerStatus) -> u8 {
        match status {
            SpeakerStatus::Scheduled => 1,
            SpeakerStatus::Agreed => 2,
            SpeakerStatus::Approached => 3,
            SpeakerStatus::Ideas => 4,
            SpeakerStatus::Spoken => 5,
            SpeakerStatus::Dropped => 6,
        }
    }

    fn board_date(&self) -> Option<NaiveDate> {
        match self.status {
            SpeakerStatus::Scheduled => self.scheduled_date,
            _ => None,
        }
    }
}

impl Searchable for Speaker {
    fn search_fields(&self) -> Vec<&str> {
        [
            Some(self.name.as_str()),
            self.email.as_deref(),
            self.organization.as_deref(),
            self.topic.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl Fields for Speaker {
    const COLUMNS: &'static [Column] = &[
        column("name", "Name"),
        column("email", "Email"),
        column("phone", "Phone"),
        column("organization", "Organization"),
        column("topic", "Topic"),
        column("status", "Status"),
        column("position", "Position"),
        column("scheduled_date", "Scheduled Date"),
        column("is_rotarian", "Rotarian"),
        column("notes", "Notes"),
        column("created_at", "Added"),
    ];

    fn field(&self, key: &str) -> Option<FieldValue<'_>> {
        Some(match key {
            "name" => FieldValue::Text(&self.name),
            "email" => text(&self.email),
            "phone" => text(&self.phone),
            "organization" => text(&self.organization),
            "topic" => text(&self.topic),
            "status" => FieldValue::Text(self.status.as_str()),
            "position" => FieldValue::Integer(self.position),
            "scheduled_date" => date(self.scheduled_date),
            "is_rotarian" => FieldValue::Bool(self.is_rotarian),
            "notes" => text(&self.notes),
            "created_at" => FieldValue::Timestamp(self.created_at),
            _ => return None,
        })
    }
}

impl Record for Member {
    type Id = MemberId;
    type Draft = NewMember;

    const TABLE: Table = Table::Members;

    fn id(&self) -> MemberId {
        self.id
    }
}

impl Searchable for Member {
    fn search_fields(&self) -> Vec<&str> {
        [
            Some(self.name.as_str()),
            self.email.as_deref(),
            self.classification.as_deref(),
            self.role.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl Fields for Member {
    const COLUMNS: &'static [Column] = &[
        column("name", "Name"),
        column("email", "Email"),
        column("phone", "Phone"),
        column("classification", "Classification"),
        column("role", "Role"),
        column("member_since", "Member Since"),
        column("active", "Active"),
    ];

    fn field(&self, key: &str) -> Option<FieldValue<'_>> {
        Some(match key {
            "name" => FieldValue::Text(&self.name),
            "email" => text(&self.email),
            "phone" => text(&self.phone),
            "classification" => text(&self.classification),
            "role" => text(&self.role),
            "member_since" => date(self.member_since),
            "active" => FieldValue::Bool(self.active),
            _ => return None,
        })
    }
}

impl Record for ServiceProject {
    type Id = ProjectId;
    type Draft = NewServiceProject;

    const TABLE: Table = Table::Projects;

    fn id(&self) -> ProjectId {
        self.id
    }
}

impl Pipelined for ServiceProject {
    type Status = ProjectStatus;

    fn status(&self) -> ProjectStatus {
        self.status
    }

    fn set_status(&mut self, status: ProjectStatus) {
        self.status = status;
    }

    fn position(&self) -> i64 {
        self.position
    }

    fn set_position(&mut self, position: i64) {
        self.position = position;
    }

    fn is_terminal(status: ProjectStatus) -> bool {
        matches!(status, ProjectStatus::Completed | ProjectStatus::Dropped)
    }

    fn board_rank(status: ProjectStatus) -> u8 {
        match status {
            ProjectStatus::Execution => 1,
            ProjectStatus::Planning => 2,
            ProjectStatus::Idea => 3,
            ProjectStatus::Completed => 4,
            ProjectStatus::Dropped => 5,
        }
    }

    fn board_date(&self) -> Option<NaiveDate> {
        match self.status {
            ProjectStatus::Execution => self.start_date,
            _ => None,
        }
    }
}

impl Searchable for ServiceProject {
    fn search_fields(&self) -> Vec<&str> {
        [
            Some(self.name.as_str()),
            self.area_of_focus.as_deref(),
            self.lead.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl Fields for ServiceProject {
    const COLUMNS: &'static [Column] = &[
        column("name", "Name"),
        column("area_of_focus", "Area of Focus"),
        column("status", "Status"),
        column("position", "Position"),
        column("lead", "Lead"),
        column("start_date", "Start Date"),
        column("budget_cents", "Budget (cents)"),
        column("notes", "Notes"),
    ];

    fn field(&self, key: &str) -> Option<FieldValue<'_>> {
        Some(match key {
            "name" => FieldValue::Text(&self.name),
            "area_of_focus" => text(&self.area_of_focus),
            "status" => FieldValue::Text(self.status.as_str()),
            "position" => FieldValue::Integer(self.position),
            "lead" => text(&self.lead),
            "start_date" => date(self.start_date),
            "budget_cents" => self
                .budget_cents
                .map_or(FieldValue::Missing, FieldValue::Integer),
            "notes" => text(&self.notes),
            _ => return None,
        })
    }
}
