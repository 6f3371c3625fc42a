use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};
use std::{fs, path::PathBuf, str::FromStr};
use tracing::info;

use shared::{
    domain::{
        Club, ClubId, ClubKind, Member, MemberId, NewMember, NewServiceProject, NewSpeaker,
        ProjectId, ProjectStatus, ServiceProject, Speaker, SpeakerId, SpeakerStatus,
    },
    protocol::{OrderBy, Patch, SelectQuery, Table},
};

pub mod columns;

pub use columns::PatchError;
use columns::{sql_table, typed_filter, typed_patch, TypedValue};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Outcome of a partial update: the row before and after.
#[derive(Debug, Clone)]
pub struct Updated<T> {
    pub old: T,
    pub new: T,
}

const SPEAKER_SELECT: &str = "SELECT id, club_id, name, email, phone, organization, topic, status, position, scheduled_date, is_rotarian, notes, created_at, updated_at FROM speakers";
const MEMBER_SELECT: &str = "SELECT id, club_id, name, email, phone, classification, role, member_since, active, created_at, updated_at FROM members";
const PROJECT_SELECT: &str = "SELECT id, club_id, name, area_of_focus, status, position, lead, start_date, budget_cents, notes, created_at, updated_at FROM service_projects";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// `(name, sql)` for every user table, as recorded by SQLite.
    pub async fn schema(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            "SELECT name, sql FROM sqlite_master
             WHERE type IN ('table', 'index') AND sql IS NOT NULL
               AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%'
             ORDER BY type DESC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>(0), r.get::<String, _>(1)))
            .collect())
    }

    pub async fn create_club(&self, name: &str, kind: ClubKind) -> Result<ClubId> {
        let rec = sqlx::query(
            "INSERT INTO clubs (name, kind) VALUES (?, ?)
             ON CONFLICT(name) DO UPDATE SET kind=excluded.kind
             RETURNING id",
        )
        .bind(name)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(ClubId(rec.get::<i64, _>(0)))
    }

    pub async fn list_clubs(&self) -> Result<Vec<Club>> {
        let rows = sqlx::query("SELECT id, name, kind FROM clubs ORDER BY lower(name) ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(club_from_row).collect()
    }

    pub async fn club(&self, club_id: ClubId) -> Result<Option<Club>> {
        let row = sqlx::query("SELECT id, name, kind FROM clubs WHERE id = ?")
            .bind(club_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(club_from_row).transpose()
    }

    /// Club that owns a row, used to scope change events.
    pub async fn club_for_row(&self, table: Table, id: i64) -> Result<Option<ClubId>> {
        let sql = format!("SELECT club_id FROM {} WHERE id = ?", sql_table(table));
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| ClubId(r.get::<i64, _>(0))))
    }

    /// Next free position at the end of a status column.
    pub async fn next_position(&self, table: Table, club_id: ClubId, status: &str) -> Result<i64> {
        let sql = format!(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM {} WHERE club_id = ? AND status = ?",
            sql_table(table)
        );
        let next: i64 = sqlx::query_scalar(&sql)
            .bind(club_id.0)
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(next)
    }

    /// Rewrites positions of one status column to `0..n`, keeping the current
    /// relative order. Returns how many rows changed.
    pub async fn renumber_positions(
        &self,
        table: Table,
        club_id: ClubId,
        status: &str,
    ) -> Result<u64> {
        if !columns::is_pipelined(table) {
            return Err(anyhow!("table {table} has no positions"));
        }
        let table_name = sql_table(table);
        let mut tx = self.pool.begin().await?;
        let ids: Vec<(i64, i64)> = sqlx::query_as(&format!(
            "SELECT id, position FROM {table_name}
             WHERE club_id = ? AND status = ?
             ORDER BY position ASC, id ASC"
        ))
        .bind(club_id.0)
        .bind(status)
        .fetch_all(&mut *tx)
        .await?;

        let mut changed = 0;
        for (index, (id, position)) in ids.into_iter().enumerate() {
            let index = i64::try_from(index).unwrap_or(i64::MAX);
            if index == position {
                continue;
            }
            sqlx::query(&format!(
                "UPDATE {table_name} SET position = ?, updated_at = ? WHERE id = ?"
            ))
            .bind(index)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;
            changed += 1;
        }
        tx.commit().await?;
        info!(%table, club_id = club_id.0, status, changed, "renumbered positions");
        Ok(changed)
    }

    pub async fn list_speakers(&self, club_id: ClubId, query: &SelectQuery) -> Result<Vec<Speaker>> {
        let rows = self
            .select_rows(Table::Speakers, SPEAKER_SELECT, club_id, query)
            .await?;
        rows.iter().map(speaker_from_row).collect()
    }

    pub async fn speaker(&self, id: SpeakerId) -> Result<Option<Speaker>> {
        let row = sqlx::query(&format!("{SPEAKER_SELECT} WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(speaker_from_row).transpose()
    }

    pub async fn insert_speaker(&self, club_id: ClubId, new: &NewSpeaker) -> Result<Speaker> {
        let position = match new.position {
            Some(position) => position,
            None => {
                self.next_position(Table::Speakers, club_id, new.status.as_str())
                    .await?
            }
        };
        let now = Utc::now();
        let rec = sqlx::query(
            "INSERT INTO speakers (club_id, name, email, phone, organization, topic, status, position, scheduled_date, is_rotarian, notes, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(club_id.0)
        .bind(new.name.trim())
        .bind(new.email.as_deref())
        .bind(new.phone.as_deref())
        .bind(new.organization.as_deref())
        .bind(new.topic.as_deref())
        .bind(new.status.as_str())
        .bind(position)
        .bind(new.scheduled_date)
        .bind(new.is_rotarian)
        .bind(new.notes.as_deref())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        let id = SpeakerId(rec.get::<i64, _>(0));
        self.speaker(id)
            .await?
            .ok_or_else(|| anyhow!("speaker {id} vanished after insert"))
    }

    pub async fn update_speaker(&self, id: SpeakerId, patch: &Patch) -> Result<Option<Updated<Speaker>>> {
        let Some(old) = self.speaker(id).await? else {
            return Ok(None);
        };
        self.apply_patch(Table::Speakers, id.0, patch).await?;
        let new = self
            .speaker(id)
            .await?
            .ok_or_else(|| anyhow!("speaker {id} vanished during update"))?;
        Ok(Some(Updated { old, new }))
    }

    pub async fn delete_speaker(&self, id: SpeakerId) -> Result<Option<Speaker>> {
        let Some(old) = self.speaker(id).await? else {
            return Ok(None);
        };
        sqlx::query("DELETE FROM speakers WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(Some(old))
    }

    pub async fn list_members(&self, club_id: ClubId, query: &SelectQuery) -> Result<Vec<Member>> {
        let rows = self
            .select_rows(Table::Members, MEMBER_SELECT, club_id, query)
            .await?;
        rows.iter().map(member_from_row).collect()
    }

    pub async fn member(&self, id: MemberId) -> Result<Option<Member>> {
        let row = sqlx::query(&format!("{MEMBER_SELECT} WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(member_from_row).transpose()
    }

    pub async fn insert_member(&self, club_id: ClubId, new: &NewMember) -> Result<Member> {
        let now = Utc::now();
        let rec = sqlx::query(
            "INSERT INTO members (club_id, name, email, phone, classification, role, member_since, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(club_id.0)
        .bind(new.name.trim())
        .bind(new.email.as_deref())
        .bind(new.phone.as_deref())
        .bind(new.classification.as_deref())
        .bind(new.role.as_deref())
        .bind(new.member_since)
        .bind(new.active)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        let id = MemberId(rec.get::<i64, _>(0));
        self.member(id)
            .await?
            .ok_or_else(|| anyhow!("member {id} vanished after insert"))
    }

    pub async fn update_member(&self, id: MemberId, patch: &Patch) -> Result<Option<Updated<Member>>> {
        let Some(old) = self.member(id).await? else {
            return Ok(None);
        };
        self.apply_patch(Table::Members, id.0, patch).await?;
        let new = self
            .member(id)
            .await?
            .ok_or_else(|| anyhow!("member {id} vanished during update"))?;
        Ok(Some(Updated { old, new }))
    }

    pub async fn delete_member(&self, id: MemberId) -> Result<Option<Member>> {
        let Some(old) = self.member(id).await? else {
            return Ok(None);
        };
        sqlx::query("DELETE FROM members WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(Some(old))
    }

    pub async fn list_projects(
        &self,
        club_id: ClubId,
        query: &SelectQuery,
    ) -> Result<Vec<ServiceProject>> {
        let rows = self
            .select_rows(Table::Projects, PROJECT_SELECT, club_id, query)
            .await?;
        rows.iter().map(project_from_row).collect()
    }

    pub async fn project(&self, id: ProjectId) -> Result<Option<ServiceProject>> {
        let row = sqlx::query(&format!("{PROJECT_SELECT} WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(project_from_row).transpose()
    }

    pub async fn insert_project(
        &self,
        club_id: ClubId,
        new: &NewServiceProject,
    ) -> Result<ServiceProject> {
        let position = match new.position {
            Some(position) => position,
            None => {
                self.next_position(Table::Projects, club_id, new.status.as_str())
                    .await?
            }
        };
        let now = Utc::now();
        let rec = sqlx::query(
            "INSERT INTO service_projects (club_id, name, area_of_focus, status, position, lead, start_date, budget_cents, notes, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(club_id.0)
        .bind(new.name.trim())
        .bind(new.area_of_focus.as_deref())
        .bind(new.status.as_str())
        .bind(position)
        .bind(new.lead.as_deref())
        .bind(new.start_date)
        .bind(new.budget_cents)
        .bind(new.notes.as_deref())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        let id = ProjectId(rec.get::<i64, _>(0));
        self.project(id)
            .await?
            .ok_or_else(|| anyhow!("project {id} vanished after insert"))
    }

    pub async fn update_project(
        &self,
        id: ProjectId,
        patch: &Patch,
    ) -> Result<Option<Updated<ServiceProject>>> {
        let Some(old) = self.project(id).await? else {
            return Ok(None);
        };
        self.apply_patch(Table::Projects, id.0, patch).await?;
        let new = self
            .project(id)
            .await?
            .ok_or_else(|| anyhow!("project {id} vanished during update"))?;
        Ok(Some(Updated { old, new }))
    }

    pub async fn delete_project(&self, id: ProjectId) -> Result<Option<ServiceProject>> {
        let Some(old) = self.project(id).await? else {
            return Ok(None);
        };
        sqlx::query("DELETE FROM service_projects WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(Some(old))
    }

    async fn select_rows(
        &self,
        table: Table,
        select: &str,
        club_id: ClubId,
        query: &SelectQuery,
    ) -> Result<Vec<SqliteRow>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(select);
        qb.push(" WHERE club_id = ");
        qb.push_bind(club_id.0);

        for (name, raw) in &query.filters {
            let (column, value) = typed_filter(table, name, raw)?;
            qb.push(format!(" AND {column} "));
            match value {
                TypedValue::Text(None) | TypedValue::Integer(None) | TypedValue::Date(None) => {
                    qb.push("IS NULL");
                }
                value => {
                    qb.push("= ");
                    push_typed(&mut qb, value);
                }
            }
        }

        let order = if query.order.is_empty() {
            default_order(table)
        } else {
            query.order.clone()
        };
        qb.push(" ORDER BY ");
        for order_by in &order {
            let spec = columns::column(table, &order_by.column)
                .ok_or_else(|| PatchError::UnknownColumn(order_by.column.clone()))?;
            qb.push(format!(
                "{} {}, ",
                spec.name,
                if order_by.ascending { "ASC" } else { "DESC" }
            ));
        }
        qb.push("id ASC");

        Ok(qb.build().fetch_all(&self.pool).await?)
    }

    async fn apply_patch(&self, table: Table, id: i64, patch: &Patch) -> Result<()> {
        let assignments = typed_patch(table, patch)?;
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("UPDATE {} SET ", sql_table(table)));
        for (column, value) in assignments {
            qb.push(format!("{column} = "));
            push_typed(&mut qb, value);
            qb.push(", ");
        }
        qb.push("updated_at = ");
        qb.push_bind(Utc::now());
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.build().execute(&self.pool).await?;
        Ok(())
    }
}

fn push_typed(qb: &mut QueryBuilder<'_, Sqlite>, value: TypedValue) {
    match value {
        TypedValue::Text(v) => {
            qb.push_bind(v);
        }
        TypedValue::Integer(v) => {
            qb.push_bind(v);
        }
        TypedValue::Bool(v) => {
            qb.push_bind(v);
        }
        TypedValue::Date(v) => {
            qb.push_bind(v);
        }
    }
}

fn default_order(table: Table) -> Vec<OrderBy> {
    if columns::is_pipelined(table) {
        vec![OrderBy::asc("status"), OrderBy::asc("position")]
    } else {
        vec![OrderBy::asc("name")]
    }
}

fn club_from_row(r: &SqliteRow) -> Result<Club> {
    let kind: String = r.try_get("kind")?;
    Ok(Club {
        id: ClubId(r.try_get("id")?),
        name: r.try_get("name")?,
        kind: kind.parse()?,
    })
}

fn speaker_from_row(r: &SqliteRow) -> Result<Speaker> {
    let status: String = r.try_get("status")?;
    Ok(Speaker {
        id: SpeakerId(r.try_get("id")?),
        club_id: ClubId(r.try_get("club_id")?),
        name: r.try_get("name")?,
        email: r.try_get("email")?,
        phone: r.try_get("phone")?,
        organization: r.try_get("organization")?,
        topic: r.try_get("topic")?,
        status: status.parse::<SpeakerStatus>()?,
        position: r.try_get("position")?,
        scheduled_date: r.try_get::<Option<NaiveDate>, _>("scheduled_date")?,
        is_rotarian: r.try_get("is_rotarian")?,
        notes: r.try_get("notes")?,
        created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: r.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn member_from_row(r: &SqliteRow) -> Result<Member> {
    Ok(Member {
        id: MemberId(r.try_get("id")?),
        club_id: ClubId(r.try_get("club_id")?),
        name: r.try_get("name")?,
        email: r.try_get("email")?,
        phone: r.try_get("phone")?,
        classification: r.try_get("classification")?,
        role: r.try_get("role")?,
        member_since: r.try_get::<Option<NaiveDate>, _>("member_since")?,
        active: r.try_get("active")?,
        created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: r.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn project_from_row(r: &SqliteRow) -> Result<ServiceProject> {
    let status: String = r.try_get("status")?;
    Ok(ServiceProject {
        id: ProjectId(r.try_get("id")?),
        club_id: ClubId(r.try_get("club_id")?),
        name: r.try_get("name")?,
        area_of_focus: r.try_get("area_of_focus")?,
        status: status.parse::<ProjectStatus>()?,
        position: r.try_get("position")?,
        lead: r.try_get("lead")?,
        start_date: r.try_get::<Option<NaiveDate>, _>("start_date")?,
        budget_cents: r.try_get("budget_cents")?,
        notes: r.try_get("notes")?,
        created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: r.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_file_path(database_url) else {
        return Ok(());
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create parent directory '{}' for database url '{database_url}'",
                parent.display()
            )
        })?;
    }
    Ok(())
}

fn sqlite_file_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if path.is_empty() {
        return None;
    }
    Some(PathBuf::from(path))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
