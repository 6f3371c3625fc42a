use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use serde_json::Value;
use shared::{
    error::ApiError,
    protocol::{ChangeMask, Patch, SelectQuery, Table},
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    cache::{Applied, CacheState, EntityCache},
    error::StoreError,
    ordering::{self, PositionChange},
    record::{Pipelined, Record},
    remote::{ChangeEvent, RemoteStore},
    retry::{with_retry, RetryConfig},
    subscription::RealtimeSubscription,
};

const DEFAULT_REDIRECT_AFTER: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied(usize),
    /// A newer fetch started while this one was in flight; its rows were
    /// dropped.
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetailView<T> {
    Found(T),
    /// The row is gone; send the user back to the list after `after`.
    Redirect { to: Table, after: Duration },
}

struct Shared<T: Record, S> {
    store: Arc<S>,
    cache: RwLock<EntityCache<T>>,
    query: SelectQuery,
    retry: RetryConfig,
    redirect_after: Duration,
    fetch_generation: AtomicU64,
}

/// One cached table view: local cache, remote store, and the optimistic
/// mutation protocol between them. Cheap to clone.
pub struct Collection<T: Record, S> {
    shared: Arc<Shared<T, S>>,
}

impl<T: Record, S> Clone for Collection<T, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Record, S: RemoteStore<T>> Collection<T, S> {
    pub fn new(store: Arc<S>, query: SelectQuery) -> Self {
        Self::with_retry(store, query, RetryConfig::default())
    }

    pub fn with_retry(store: Arc<S>, query: SelectQuery, retry: RetryConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                cache: RwLock::new(EntityCache::new()),
                query,
                retry,
                redirect_after: DEFAULT_REDIRECT_AFTER,
                fetch_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.shared.retry
    }

    pub fn store(&self) -> &Arc<S> {
        &self.shared.store
    }

    pub async fn items(&self) -> Vec<T> {
        self.shared.cache.read().await.items().to_vec()
    }

    pub async fn state(&self) -> CacheState {
        self.shared.cache.read().await.state()
    }

    pub async fn is_loading(&self) -> bool {
        self.state().await == CacheState::Loading
    }

    pub async fn error(&self) -> Option<StoreError> {
        self.shared.cache.read().await.last_error().cloned()
    }

    /// Reloads the whole table. A refetch that is overtaken by a newer one
    /// discards its result.
    pub async fn refetch(&self) -> Result<FetchOutcome, StoreError> {
        let generation = self.shared.fetch_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.cache.write().await.begin_fetch();

        let store = &self.shared.store;
        let query = &self.shared.query;
        let result = with_retry(&self.shared.retry, "select", move || store.select(query)).await;

        let mut cache = self.shared.cache.write().await;
        if self.shared.fetch_generation.load(Ordering::SeqCst) != generation {
            debug!(table = %T::TABLE, generation, "discarding superseded fetch");
            return Ok(FetchOutcome::Superseded);
        }
        let count = cache.finish_fetch(result)?;
        info!(table = %T::TABLE, rows = count, "collection loaded");
        Ok(FetchOutcome::Applied(count))
    }

    /// Inserts remotely, then caches the stored row. The realtime echo of
    /// the insert is deduplicated by id.
    pub async fn create(&self, draft: &T::Draft) -> Result<T, StoreError> {
        let store = &self.shared.store;
        let row = match with_retry(&self.shared.retry, "insert", move || store.insert(draft)).await {
            Ok(row) => row,
            Err(err) => {
                self.shared.cache.write().await.record_error(&err);
                return Err(err);
            }
        };
        self.shared.cache.write().await.upsert_local(row.clone());
        Ok(row)
    }

    /// Applies `patch` to the cached row right away, then persists it.
    pub async fn update(&self, id: T::Id, patch: Patch) -> Result<(), StoreError> {
        {
            let mut cache = self.shared.cache.write().await;
            if let Some(current) = cache.get(id) {
                let patched = merge_patch(current, &patch)?;
                cache.upsert_local(patched);
            }
        }
        let store = &self.shared.store;
        let patch = &patch;
        let result = with_retry(&self.shared.retry, "update", move || store.update(id, patch)).await;
        self.settle("update", result).await
    }

    pub async fn delete(&self, id: T::Id) -> Result<(), StoreError> {
        self.shared.cache.write().await.remove_local(id);
        let store = &self.shared.store;
        let result = with_retry(&self.shared.retry, "delete", move || store.delete(id)).await;
        self.settle("delete", result).await
    }

    /// Confirmation is a no-op; failure throws the optimistic state away by
    /// reloading from the store, then reports the original error.
    async fn settle(&self, operation: &str, result: Result<(), StoreError>) -> Result<(), StoreError> {
        let Err(err) = result else {
            return Ok(());
        };
        warn!(table = %T::TABLE, operation, error = %err, "write failed; refetching");
        if let Err(refetch_err) = self.refetch().await {
            warn!(table = %T::TABLE, error = %refetch_err, "refetch after failed write also failed");
        }
        self.shared.cache.write().await.record_error(&err);
        Err(err)
    }

    pub async fn detail(&self, id: T::Id) -> DetailView<T> {
        match self.shared.cache.read().await.get(id) {
            Some(row) => DetailView::Found(row.clone()),
            None => DetailView::Redirect {
                to: T::TABLE,
                after: self.shared.redirect_after,
            },
        }
    }

    pub async fn apply_remote(&self, event: &ChangeEvent<T>) -> Applied {
        let applied = self.shared.cache.write().await.apply(event);
        debug!(table = %T::TABLE, kind = ?event.kind, ?applied, "realtime change");
        applied
    }

    /// A realtime subscription feeding this collection; call `start` on it.
    pub fn subscription(&self, mask: ChangeMask) -> RealtimeSubscription<T, S> {
        RealtimeSubscription::new(self.clone(), mask)
    }
}

impl<T: Pipelined, S: RemoteStore<T>> Collection<T, S> {
    /// Drag-and-drop within one status column. The new order shows up
    /// locally at once; changed positions are then written one by one.
    pub async fn reorder(
        &self,
        status: T::Status,
        from: usize,
        to: usize,
    ) -> Result<Vec<PositionChange<T::Id>>, StoreError> {
        let changes = {
            let mut cache = self.shared.cache.write().await;
            ordering::reorder_partition(cache.items_mut(), status, from, to)
                .map_err(|e| StoreError::Api(ApiError::validation(e.to_string())))?
        };

        for change in &changes {
            let patch = &position_patch(change.position);
            let store = &self.shared.store;
            let id = change.id;
            let result =
                with_retry(&self.shared.retry, "update position", move || store.update(id, patch))
                    .await;
            self.settle("reorder", result).await?;
        }
        Ok(changes)
    }

    /// Drag across columns: the row goes to the end of the `status` column.
    pub async fn move_to_status(
        &self,
        id: T::Id,
        status: T::Status,
    ) -> Result<Option<PositionChange<T::Id>>, StoreError> {
        let change = {
            let mut cache = self.shared.cache.write().await;
            ordering::move_to_status(cache.items_mut(), id, status)
                .map_err(|e| StoreError::Api(ApiError::not_found(e.to_string())))?
        };
        let Some(change) = change else {
            return Ok(None);
        };

        let mut patch = position_patch(change.position);
        let status_value =
            serde_json::to_value(status).map_err(|e| StoreError::decode("status", e))?;
        patch.insert("status".into(), status_value);
        let store = &self.shared.store;
        let patch = &patch;
        let result = with_retry(&self.shared.retry, "move", move || store.update(id, patch)).await;
        self.settle("move", result).await?;
        Ok(Some(change))
    }
}

fn position_patch(position: i64) -> Patch {
    let mut patch = Patch::new();
    patch.insert("position".into(), Value::from(position));
    patch
}

/// The row as it will read once `patch` is stored.
fn merge_patch<T: Record>(row: &T, patch: &Patch) -> Result<T, StoreError> {
    let mut value = serde_json::to_value(row).map_err(|e| StoreError::decode("cached row", e))?;
    if let Some(object) = value.as_object_mut() {
        for (column, new_value) in patch {
            object.insert(column.clone(), new_value.clone());
        }
    }
    serde_json::from_value(value).map_err(|e| {
        StoreError::Api(ApiError::validation(format!("patch does not fit {}: {e}", T::TABLE)))
    })
}

#[cfg(test)]
#[path = "tests/collection_tests.rs"]
mod tests;
