use std::{marker::PhantomData, time::Duration};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use shared::{
    domain::ClubId,
    error::{ApiError, ErrorCode},
    protocol::{ChangeMask, Patch, SelectQuery, ServerEvent},
};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::StoreError,
    record::Record,
    remote::{ChangeEvent, ChangeFeed, FeedItem, RemoteStore},
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const FEED_BUFFER: usize = 64;

/// [`RemoteStore`] over the store service's REST routes and realtime
/// websocket, scoped to one club.
pub struct HttpRemoteStore<T> {
    http: Client,
    base: Url,
    club_id: ClubId,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for HttpRemoteStore<T> {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            base: self.base.clone(),
            club_id: self.club_id,
            _record: PhantomData,
        }
    }
}

impl<T: Record> HttpRemoteStore<T> {
    pub fn new(server_url: &str, club_id: ClubId) -> Result<Self, StoreError> {
        Self::with_timeout(server_url, club_id, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        server_url: &str,
        club_id: ClubId,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let mut base = Url::parse(server_url.trim())
            .map_err(|e| StoreError::Config(format!("invalid server url '{server_url}': {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(StoreError::Config(
                "server url must start with http:// or https://".into(),
            ));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;
        Ok(Self {
            http,
            base,
            club_id,
            _record: PhantomData,
        })
    }

    pub fn club_id(&self) -> ClubId {
        self.club_id
    }

    fn url(&self, path: &str) -> Result<Url, StoreError> {
        self.base
            .join(path)
            .map_err(|e| StoreError::Config(format!("bad request path '{path}': {e}")))
    }

    fn rows_url(&self) -> Result<Url, StoreError> {
        self.url(&format!("clubs/{}/{}", self.club_id, T::TABLE))
    }

    fn row_url(&self, id: T::Id) -> Result<Url, StoreError> {
        self.url(&format!("clubs/{}/{}/{}", self.club_id, T::TABLE, id))
    }

    fn realtime_url(&self, mask: ChangeMask) -> Result<Url, StoreError> {
        let mut url = self.url("realtime")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| StoreError::Config(format!("cannot derive websocket url from {url}")))?;
        url.query_pairs_mut()
            .append_pair("club_id", &self.club_id.to_string())
            .append_pair("table", T::TABLE.as_str())
            .append_pair("events", &mask.to_query());
        Ok(url)
    }
}

/// Non-2xx responses become [`StoreError::Api`]. The JSON error body wins
/// when there is one; otherwise the status code decides.
async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let err = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| {
        let message = if body.trim().is_empty() {
            status.to_string()
        } else {
            body.trim().to_string()
        };
        ApiError::new(ErrorCode::from_http_status(status.as_u16()), message)
    });
    Err(StoreError::Api(err))
}

#[async_trait]
impl<T: Record> RemoteStore<T> for HttpRemoteStore<T> {
    async fn select(&self, query: &SelectQuery) -> Result<Vec<T>, StoreError> {
        let mut params = query.filters.clone();
        if let Some(order) = query.order_param() {
            params.push(("order".into(), order));
        }
        let response = self
            .http
            .get(self.rows_url()?)
            .query(&params)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn insert(&self, draft: &T::Draft) -> Result<T, StoreError> {
        let response = self.http.post(self.rows_url()?).json(draft).send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn update(&self, id: T::Id, patch: &Patch) -> Result<(), StoreError> {
        let response = self.http.patch(self.row_url(id)?).json(patch).send().await?;
        check(response).await?;
        Ok(())
    }

    async fn delete(&self, id: T::Id) -> Result<(), StoreError> {
        let response = self.http.delete(self.row_url(id)?).send().await?;
        check(response).await?;
        Ok(())
    }

    /// Resolves once the server has acknowledged the subscription, so no
    /// change committed after this returns is missed.
    async fn subscribe(&self, mask: ChangeMask) -> Result<ChangeFeed<T>, StoreError> {
        let url = self.realtime_url(mask)?;
        let (mut socket, _) = connect_async(url.as_str()).await?;

        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(ServerEvent::Subscribed { club_id, table }) => {
                        info!(club_id = club_id.0, %table, "realtime channel open");
                        break;
                    }
                    Ok(ServerEvent::Error(err)) => return Err(StoreError::Api(err)),
                    Ok(other) => debug!(?other, "ignoring event before subscription ack"),
                    Err(err) => return Err(StoreError::decode("server event", err)),
                },
                Some(Ok(Message::Close(_))) | None => return Err(StoreError::ChannelClosed),
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err.into()),
            }
        }

        let (tx, rx) = mpsc::channel::<FeedItem<T>>(FEED_BUFFER);
        let pump = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = tx.closed() => {
                        let _ = socket.close(None).await;
                        return;
                    }
                    frame = socket.next() => frame,
                };
                let item = match frame {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(ServerEvent::RowChanged(envelope)) => ChangeEvent::from_envelope(envelope),
                        Ok(ServerEvent::Error(err)) => Err(StoreError::Api(err)),
                        Ok(ServerEvent::Subscribed { .. }) => continue,
                        Err(err) => Err(StoreError::decode("server event", err)),
                    },
                    Some(Ok(Message::Close(_))) | None => Err(StoreError::ChannelClosed),
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => Err(err.into()),
                };
                let fatal = matches!(&item, Err(err) if !matches!(err, StoreError::Decode { .. }));
                if tx.send(item).await.is_err() || fatal {
                    if fatal {
                        warn!("realtime channel ended");
                    }
                    return;
                }
            }
        });
        Ok(ChangeFeed::with_pump(rx, pump))
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
