use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::Value;
use server_api::{
    club_rows_route, create_club, delete_row, insert_row, list_clubs, list_rows, realtime_route,
    row_route, update_row, ApiContext,
};
use shared::{
    domain::{Club, ClubId},
    error::{ApiError, ErrorCode},
    protocol::{CreateClubRequest, Patch, SelectQuery, Table},
};
use storage::Storage;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod realtime;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

type HttpResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState::new(ApiContext { storage }, settings.event_buffer);
    let app = build_router(Arc::new(state), settings.max_body_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "club store listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/clubs", get(http_list_clubs).post(http_create_club))
        .route(
            club_rows_route(),
            get(http_list_rows).post(http_insert_row),
        )
        .route(
            row_route(),
            axum::routing::patch(http_update_row).delete(http_delete_row),
        )
        .route(realtime_route(), get(realtime::ws_handler))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub(crate) fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status =
        StatusCode::from_u16(err.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err))
}

fn parse_table(raw: &str) -> HttpResult<Table> {
    raw.parse::<Table>()
        .map_err(|e| reject(ApiError::not_found(e.to_string())))
}

/// `?order=a.asc,b.desc` sets ordering; every other parameter is an
/// equality filter.
fn select_query_from_params(params: HashMap<String, String>) -> SelectQuery {
    let mut query = SelectQuery::new();
    let mut filters: Vec<_> = params.into_iter().collect();
    filters.sort();
    for (key, value) in filters {
        if key == "order" {
            query.order = SelectQuery::parse_order_param(&value);
        } else {
            query = query.eq(key, value);
        }
    }
    query
}

async fn healthz(State(state): State<Arc<AppState>>) -> HttpResult<&'static str> {
    state.api.storage.health_check().await.map_err(|e| {
        reject(ApiError::new(ErrorCode::ServiceUnavailable, e.to_string()))
    })?;
    Ok("ok")
}

async fn http_list_clubs(State(state): State<Arc<AppState>>) -> HttpResult<Json<Vec<Club>>> {
    let clubs = list_clubs(&state.api).await.map_err(reject)?;
    Ok(Json(clubs))
}

async fn http_create_club(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateClubRequest>,
) -> HttpResult<(StatusCode, Json<Club>)> {
    let club = create_club(&state.api, &req).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(club)))
}

async fn http_list_rows(
    State(state): State<Arc<AppState>>,
    Path((club_id, table)): Path<(i64, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> HttpResult<Json<Vec<Value>>> {
    let table = parse_table(&table)?;
    let query = select_query_from_params(params);
    let rows = list_rows(&state.api, ClubId(club_id), table, &query)
        .await
        .map_err(reject)?;
    Ok(Json(rows))
}

async fn http_insert_row(
    State(state): State<Arc<AppState>>,
    Path((club_id, table)): Path<(i64, String)>,
    Json(body): Json<Value>,
) -> HttpResult<(StatusCode, Json<Value>)> {
    let table = parse_table(&table)?;
    let (row, change) = insert_row(&state.api, ClubId(club_id), table, body)
        .await
        .map_err(reject)?;
    state.publish(change);
    Ok((StatusCode::CREATED, Json(row)))
}

async fn http_update_row(
    State(state): State<Arc<AppState>>,
    Path((club_id, table, id)): Path<(i64, String, i64)>,
    Json(patch): Json<Patch>,
) -> HttpResult<StatusCode> {
    let table = parse_table(&table)?;
    let change = update_row(&state.api, ClubId(club_id), table, id, &patch)
        .await
        .map_err(reject)?;
    state.publish(change);
    Ok(StatusCode::NO_CONTENT)
}

async fn http_delete_row(
    State(state): State<Arc<AppState>>,
    Path((club_id, table, id)): Path<(i64, String, i64)>,
) -> HttpResult<StatusCode> {
    let table = parse_table(&table)?;
    let change = delete_row(&state.api, ClubId(club_id), table, id)
        .await
        .map_err(reject)?;
    state.publish(change);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
