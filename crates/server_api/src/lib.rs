use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use shared::{
    domain::{
        Club, ClubId, MemberId, NewMember, NewServiceProject, NewSpeaker, ProjectId, SpeakerId,
    },
    error::{ApiError, ErrorCode},
    protocol::{ChangeEnvelope, ChangeKind, CreateClubRequest, Patch, SelectQuery, Table},
};
use storage::{PatchError, Storage, Updated};
use tracing::debug;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub fn club_rows_route() -> &'static str {
    "/clubs/:club_id/:table"
}

pub fn row_route() -> &'static str {
    "/clubs/:club_id/:table/:id"
}

pub fn realtime_route() -> &'static str {
    "/realtime"
}

pub async fn list_clubs(ctx: &ApiContext) -> Result<Vec<Club>, ApiError> {
    ctx.storage.list_clubs().await.map_err(internal)
}

pub async fn create_club(ctx: &ApiContext, req: &CreateClubRequest) -> Result<Club, ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("club name must not be empty"));
    }
    let id = ctx
        .storage
        .create_club(name, req.kind)
        .await
        .map_err(internal)?;
    Ok(Club {
        id,
        name: name.to_string(),
        kind: req.kind,
    })
}

pub async fn list_rows(
    ctx: &ApiContext,
    club_id: ClubId,
    table: Table,
    query: &SelectQuery,
) -> Result<Vec<Value>, ApiError> {
    ensure_club(ctx, club_id).await?;
    match table {
        Table::Speakers => to_values(ctx.storage.list_speakers(club_id, query).await),
        Table::Members => to_values(ctx.storage.list_members(club_id, query).await),
        Table::Projects => to_values(ctx.storage.list_projects(club_id, query).await),
    }
}

/// Inserts a row and returns it along with the change to broadcast.
pub async fn insert_row(
    ctx: &ApiContext,
    club_id: ClubId,
    table: Table,
    body: Value,
) -> Result<(Value, ChangeEnvelope), ApiError> {
    ensure_club(ctx, club_id).await?;
    let row = match table {
        Table::Speakers => {
            let new: NewSpeaker = decode_body(body)?;
            ensure_name(&new.name)?;
            ensure_position(new.position)?;
            to_value(ctx.storage.insert_speaker(club_id, &new).await)?
        }
        Table::Members => {
            let new: NewMember = decode_body(body)?;
            ensure_name(&new.name)?;
            to_value(ctx.storage.insert_member(club_id, &new).await)?
        }
        Table::Projects => {
            let new: NewServiceProject = decode_body(body)?;
            ensure_name(&new.name)?;
            ensure_position(new.position)?;
            to_value(ctx.storage.insert_project(club_id, &new).await)?
        }
    };
    debug!(%table, club_id = club_id.0, "row inserted");
    let change = envelope(club_id, table, ChangeKind::Insert, Some(row.clone()), None);
    Ok((row, change))
}

pub async fn update_row(
    ctx: &ApiContext,
    club_id: ClubId,
    table: Table,
    id: i64,
    patch: &Patch,
) -> Result<ChangeEnvelope, ApiError> {
    ensure_row_in_club(ctx, club_id, table, id).await?;
    let (old, new) = match table {
        Table::Speakers => {
            let updated = ctx
                .storage
                .update_speaker(SpeakerId(id), patch)
                .await
                .map_err(storage_error)?;
            split_update(table, id, updated)?
        }
        Table::Members => {
            let updated = ctx
                .storage
                .update_member(MemberId(id), patch)
                .await
                .map_err(storage_error)?;
            split_update(table, id, updated)?
        }
        Table::Projects => {
            let updated = ctx
                .storage
                .update_project(ProjectId(id), patch)
                .await
                .map_err(storage_error)?;
            split_update(table, id, updated)?
        }
    };
    debug!(%table, club_id = club_id.0, id, "row updated");
    Ok(envelope(club_id, table, ChangeKind::Update, Some(new), Some(old)))
}

pub async fn delete_row(
    ctx: &ApiContext,
    club_id: ClubId,
    table: Table,
    id: i64,
) -> Result<ChangeEnvelope, ApiError> {
    ensure_row_in_club(ctx, club_id, table, id).await?;
    let old = match table {
        Table::Speakers => {
            let old = ctx
                .storage
                .delete_speaker(SpeakerId(id))
                .await
                .map_err(internal)?
                .ok_or_else(|| missing(table, id))?;
            to_value(Ok(old))?
        }
        Table::Members => {
            let old = ctx
                .storage
                .delete_member(MemberId(id))
                .await
                .map_err(internal)?
                .ok_or_else(|| missing(table, id))?;
            to_value(Ok(old))?
        }
        Table::Projects => {
            let old = ctx
                .storage
                .delete_project(ProjectId(id))
                .await
                .map_err(internal)?
                .ok_or_else(|| missing(table, id))?;
            to_value(Ok(old))?
        }
    };
    debug!(%table, club_id = club_id.0, id, "row deleted");
    Ok(envelope(club_id, table, ChangeKind::Delete, None, Some(old)))
}

fn split_update<T: Serialize>(
    table: Table,
    id: i64,
    updated: Option<Updated<T>>,
) -> Result<(Value, Value), ApiError> {
    let updated = updated.ok_or_else(|| missing(table, id))?;
    Ok((to_value(Ok(updated.old))?, to_value(Ok(updated.new))?))
}

/// Rows of other clubs read as missing, so ids do not leak across tenants.
async fn ensure_row_in_club(
    ctx: &ApiContext,
    club_id: ClubId,
    table: Table,
    id: i64,
) -> Result<(), ApiError> {
    let owner = ctx
        .storage
        .club_for_row(table, id)
        .await
        .map_err(internal)?;
    if owner != Some(club_id) {
        return Err(missing(table, id));
    }
    Ok(())
}

fn envelope(
    club_id: ClubId,
    table: Table,
    kind: ChangeKind,
    new: Option<Value>,
    old: Option<Value>,
) -> ChangeEnvelope {
    ChangeEnvelope {
        club_id,
        table,
        kind,
        new,
        old,
        committed_at: Utc::now(),
    }
}

async fn ensure_club(ctx: &ApiContext, club_id: ClubId) -> Result<(), ApiError> {
    ctx.storage
        .club(club_id)
        .await
        .map_err(internal)?
        .map(|_| ())
        .ok_or_else(|| ApiError::not_found(format!("club {club_id} not found")))
}

fn ensure_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::validation("name must not be empty"));
    }
    Ok(())
}

fn ensure_position(position: Option<i64>) -> Result<(), ApiError> {
    match position {
        Some(p) if p < 0 => Err(ApiError::validation("position must be non-negative")),
        _ => Ok(()),
    }
}

fn decode_body<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|e| ApiError::validation(format!("invalid record: {e}")))
}

fn to_value<T: Serialize>(row: anyhow::Result<T>) -> Result<Value, ApiError> {
    let row = row.map_err(storage_error)?;
    serde_json::to_value(row).map_err(|e| ApiError::new(ErrorCode::Internal, e.to_string()))
}

fn to_values<T: Serialize>(rows: anyhow::Result<Vec<T>>) -> Result<Vec<Value>, ApiError> {
    let rows = rows.map_err(storage_error)?;
    rows.into_iter().map(|row| to_value(Ok(row))).collect()
}

fn missing(table: Table, id: i64) -> ApiError {
    ApiError::not_found(format!("{table} row {id} not found"))
}

/// Patch and column errors are the caller's fault; anything else is ours.
fn storage_error(err: anyhow::Error) -> ApiError {
    match err.downcast_ref::<PatchError>() {
        Some(patch_error) => ApiError::validation(patch_error.to_string()),
        None => internal(err),
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
