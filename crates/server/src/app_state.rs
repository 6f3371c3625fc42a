use server_api::ApiContext;
use shared::protocol::ChangeEnvelope;
use tokio::sync::broadcast;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) changes: broadcast::Sender<ChangeEnvelope>,
}

impl AppState {
    pub(crate) fn new(api: ApiContext, event_buffer: usize) -> Self {
        let (changes, _) = broadcast::channel(event_buffer.max(1));
        Self { api, changes }
    }

    /// Fans a committed change out to realtime subscribers. Having nobody
    /// listening is not an error.
    pub(crate) fn publish(&self, change: ChangeEnvelope) {
        let receivers = self.changes.send(change).unwrap_or(0);
        tracing::trace!(receivers, "change published");
    }
}
