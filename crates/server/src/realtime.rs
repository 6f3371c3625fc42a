use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use shared::{
    domain::ClubId,
    error::{ApiError, ErrorCode},
    protocol::{ChangeEnvelope, ChangeMask, ServerEvent, Table},
};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{app_state::AppState, reject};

#[derive(Debug, Deserialize)]
pub(crate) struct RealtimeQuery {
    club_id: i64,
    table: String,
    #[serde(default)]
    events: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Subscription {
    club_id: ClubId,
    table: Table,
    mask: ChangeMask,
}

impl Subscription {
    fn matches(&self, change: &ChangeEnvelope) -> bool {
        change.club_id == self.club_id && change.table == self.table && self.mask.allows(change.kind)
    }
}

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<RealtimeQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let table: Table = q
        .table
        .parse()
        .map_err(|e: shared::domain::UnknownVariant| reject(ApiError::not_found(e.to_string())))?;
    let subscription = Subscription {
        club_id: ClubId(q.club_id),
        table,
        mask: q
            .events
            .as_deref()
            .map(ChangeMask::from_query)
            .unwrap_or_default(),
    };
    Ok(ws.on_upgrade(move |socket| ws_connection(state, socket, subscription)))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket, subscription: Subscription) {
    let connection_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let mut changes = BroadcastStream::new(state.changes.subscribe());
    info!(
        %connection_id,
        club_id = subscription.club_id.0,
        table = %subscription.table,
        "realtime subscriber connected"
    );

    let send_task = tokio::spawn(async move {
        let ack = ServerEvent::Subscribed {
            club_id: subscription.club_id,
            table: subscription.table,
        };
        if send_event(&mut sender, &ack).await.is_err() {
            return;
        }
        while let Some(item) = changes.next().await {
            match item {
                Ok(change) => {
                    if !subscription.matches(&change) {
                        continue;
                    }
                    if send_event(&mut sender, &ServerEvent::RowChanged(change))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(%connection_id, skipped, "realtime subscriber lagged; closing channel");
                    let lagged = ApiError::new(
                        ErrorCode::ServiceUnavailable,
                        format!("subscriber missed {skipped} changes; refetch required"),
                    );
                    let _ = send_event(&mut sender, &ServerEvent::Error(lagged)).await;
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }

    send_task.abort();
    info!(%connection_id, "realtime subscriber disconnected");
}

async fn send_event<S>(sender: &mut S, event: &ServerEvent) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(error) => {
            warn!(%error, "dropping unserializable realtime event");
            return Ok(());
        }
    };
    sender.send(Message::Text(text)).await
}
