//! Fixtures and an in-memory store shared by the unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use shared::{
    domain::{ClubId, Speaker, SpeakerId, SpeakerStatus},
    protocol::{ChangeMask, Patch, SelectQuery},
};
use tokio::sync::mpsc;

use crate::{
    error::StoreError,
    remote::{ChangeFeed, FeedItem, RemoteStore},
};

pub(crate) fn ts() -> DateTime<Utc> {
    "2025-01-05T10:00:00Z".parse().expect("timestamp")
}

pub(crate) fn speaker(id: i64, name: &str, status: SpeakerStatus, position: i64) -> Speaker {
    Speaker {
        id: SpeakerId(id),
        club_id: ClubId(1),
        name: name.to_string(),
        email: None,
        phone: None,
        organization: None,
        topic: None,
        status,
        position,
        scheduled_date: None,
        is_rotarian: false,
        notes: None,
        created_at: ts(),
        updated_at: ts(),
    }
}

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("date")
}

/// Speaker table held in memory. Writes mutate `rows`; queued failures are
/// returned (one per call) before any write or read touches the rows.
#[derive(Default)]
pub(crate) struct MemoryStore {
    pub rows: Mutex<Vec<Speaker>>,
    pub failures: Mutex<VecDeque<StoreError>>,
    pub feeds: Mutex<Vec<mpsc::Sender<FeedItem<Speaker>>>>,
    pub subscribe_failures: Mutex<VecDeque<StoreError>>,
    pub selects: AtomicU32,
    pub updates: Mutex<Vec<(SpeakerId, Patch)>>,
    pub subscribes: AtomicU32,
}

impl MemoryStore {
    pub fn with_rows(rows: Vec<Speaker>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    pub fn fail_next(&self, err: StoreError) {
        self.failures.lock().expect("lock").push_back(err);
    }

    pub fn rows(&self) -> Vec<Speaker> {
        self.rows.lock().expect("lock").clone()
    }

    /// Sender for the most recent subscription.
    pub fn feed(&self) -> mpsc::Sender<FeedItem<Speaker>> {
        self.feeds
            .lock()
            .expect("lock")
            .last()
            .cloned()
            .expect("subscribed")
    }

    fn take_failure(&self) -> Result<(), StoreError> {
        match self.failures.lock().expect("lock").pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore<Speaker> for MemoryStore {
    async fn select(&self, _query: &SelectQuery) -> Result<Vec<Speaker>, StoreError> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;
        Ok(self.rows())
    }

    async fn insert(&self, draft: &shared::domain::NewSpeaker) -> Result<Speaker, StoreError> {
        self.take_failure()?;
        let mut rows = self.rows.lock().expect("lock");
        let id = rows.iter().map(|r| r.id.0).max().unwrap_or(0) + 1;
        let position = draft.position.unwrap_or_else(|| {
            rows.iter().filter(|r| r.status == draft.status).count() as i64
        });
        let mut row = speaker(id, &draft.name, draft.status, position);
        row.topic = draft.topic.clone();
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, id: SpeakerId, patch: &Patch) -> Result<(), StoreError> {
        self.take_failure()?;
        self.updates
            .lock()
            .expect("lock")
            .push((id, patch.clone()));
        let mut rows = self.rows.lock().expect("lock");
        let Some(row) = rows.iter_mut().find(|r| r.id == id) else {
            return Err(shared::error::ApiError::not_found("speaker").into());
        };
        let mut value = serde_json::to_value(&*row).expect("json");
        if let Some(object) = value.as_object_mut() {
            for (k, v) in patch {
                object.insert(k.clone(), v.clone());
            }
        }
        *row = serde_json::from_value(value).expect("patched row");
        Ok(())
    }

    async fn delete(&self, id: SpeakerId) -> Result<(), StoreError> {
        self.take_failure()?;
        self.rows.lock().expect("lock").retain(|r| r.id != id);
        Ok(())
    }

    async fn subscribe(&self, _mask: ChangeMask) -> Result<ChangeFeed<Speaker>, StoreError> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.subscribe_failures.lock().expect("lock").pop_front() {
            return Err(err);
        }
        let (tx, feed) = ChangeFeed::channel(16);
        self.feeds.lock().expect("lock").push(tx);
        Ok(feed)
    }
}
