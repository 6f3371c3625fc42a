use async_trait::async_trait;
use shared::protocol::{ChangeEnvelope, ChangeKind, ChangeMask, Patch, SelectQuery};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{error::StoreError, record::Record};

/// Row CRUD plus table-change subscription for one record type, scoped to
/// a single club.
#[async_trait]
pub trait RemoteStore<T: Record>: Send + Sync + 'static {
    async fn select(&self, query: &SelectQuery) -> Result<Vec<T>, StoreError>;
    async fn insert(&self, draft: &T::Draft) -> Result<T, StoreError>;
    async fn update(&self, id: T::Id, patch: &Patch) -> Result<(), StoreError>;
    async fn delete(&self, id: T::Id) -> Result<(), StoreError>;
    async fn subscribe(&self, mask: ChangeMask) -> Result<ChangeFeed<T>, StoreError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent<T> {
    pub kind: ChangeKind,
    pub new: Option<T>,
    pub old: Option<T>,
}

impl<T: Record> ChangeEvent<T> {
    pub fn insert(row: T) -> Self {
        Self {
            kind: ChangeKind::Insert,
            new: Some(row),
            old: None,
        }
    }

    pub fn update(row: T) -> Self {
        Self {
            kind: ChangeKind::Update,
            new: Some(row),
            old: None,
        }
    }

    pub fn delete(row: T) -> Self {
        Self {
            kind: ChangeKind::Delete,
            new: None,
            old: Some(row),
        }
    }

    /// Id of the row this event is about: `new` for inserts and updates,
    /// `old` for deletes.
    pub fn id(&self) -> Option<T::Id> {
        match self.kind {
            ChangeKind::Insert | ChangeKind::Update => self.new.as_ref().map(Record::id),
            ChangeKind::Delete => self.old.as_ref().or(self.new.as_ref()).map(Record::id),
        }
    }

    pub fn from_envelope(envelope: ChangeEnvelope) -> Result<Self, StoreError> {
        let decode = |value: Option<serde_json::Value>| {
            value
                .map(serde_json::from_value::<T>)
                .transpose()
                .map_err(|e| StoreError::decode("change row", e))
        };
        Ok(Self {
            kind: envelope.kind,
            new: decode(envelope.new)?,
            old: decode(envelope.old)?,
        })
    }
}

pub type FeedItem<T> = Result<ChangeEvent<T>, StoreError>;

/// Receiving end of a table subscription. Dropping it (or calling
/// [`ChangeFeed::close`]) releases the underlying channel.
#[derive(Debug)]
pub struct ChangeFeed<T> {
    events: mpsc::Receiver<FeedItem<T>>,
    pump: Option<JoinHandle<()>>,
}

impl<T> ChangeFeed<T> {
    /// A feed fed by hand; used by in-process stores and tests.
    pub fn channel(buffer: usize) -> (mpsc::Sender<FeedItem<T>>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            tx,
            Self {
                events: rx,
                pump: None,
            },
        )
    }

    /// A feed whose events are produced by `pump`; the task is aborted when
    /// the feed goes away.
    pub fn with_pump(events: mpsc::Receiver<FeedItem<T>>, pump: JoinHandle<()>) -> Self {
        Self {
            events,
            pump: Some(pump),
        }
    }

    /// `None` once the channel is closed on the remote side.
    pub async fn next(&mut self) -> Option<FeedItem<T>> {
        self.events.recv().await
    }

    /// Consumes the feed; `Drop` closes the channel and stops the pump.
    pub fn close(self) {
        drop(self);
    }
}

impl<T> Drop for ChangeFeed<T> {
    fn drop(&mut self) {
        self.events.close();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/remote_tests.rs"]
mod tests;
