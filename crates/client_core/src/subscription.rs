use shared::protocol::ChangeMask;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    collection::Collection,
    error::StoreError,
    record::Record,
    remote::{ChangeFeed, RemoteStore},
    retry::with_retry,
};

/// Keeps a [`Collection`] in sync with table changes while running.
///
/// The owner calls [`start`](Self::start) when its view appears and
/// [`stop`](Self::stop) (or just drops the subscription) when it goes away.
/// If the channel errors or closes, the task resubscribes with the
/// collection's retry backoff and then refetches the table to cover any
/// changes missed while disconnected.
pub struct RealtimeSubscription<T: Record, S: RemoteStore<T>> {
    collection: Collection<T, S>,
    mask: ChangeMask,
    task: Option<JoinHandle<()>>,
}

impl<T: Record, S: RemoteStore<T>> RealtimeSubscription<T, S> {
    pub fn new(collection: Collection<T, S>, mask: ChangeMask) -> Self {
        Self {
            collection,
            mask,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Opens the channel and starts applying events. Starting a running
    /// subscription does nothing.
    pub async fn start(&mut self) -> Result<(), StoreError> {
        if self.is_running() {
            return Ok(());
        }
        let feed = subscribe(&self.collection, self.mask).await?;
        info!(table = %T::TABLE, "realtime subscription started");
        let collection = self.collection.clone();
        let mask = self.mask;
        self.task = Some(tokio::spawn(run(collection, mask, feed)));
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!(table = %T::TABLE, "realtime subscription stopped");
        }
    }
}

impl<T: Record, S: RemoteStore<T>> Drop for RealtimeSubscription<T, S> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn subscribe<T: Record, S: RemoteStore<T>>(
    collection: &Collection<T, S>,
    mask: ChangeMask,
) -> Result<ChangeFeed<T>, StoreError> {
    let store = collection.store();
    with_retry(collection.retry_config(), "subscribe", move || store.subscribe(mask)).await
}

async fn run<T: Record, S: RemoteStore<T>>(
    collection: Collection<T, S>,
    mask: ChangeMask,
    mut feed: ChangeFeed<T>,
) {
    loop {
        let reason = pump(&collection, &mut feed).await;
        warn!(table = %T::TABLE, error = %reason, "realtime channel lost; resubscribing");
        drop(feed);
        feed = resubscribe(&collection, mask).await;
        if let Err(err) = collection.refetch().await {
            error!(table = %T::TABLE, error = %err, "refetch after resubscribe failed");
        }
    }
}

/// Applies events until the channel fails; returns why it stopped.
async fn pump<T: Record, S: RemoteStore<T>>(
    collection: &Collection<T, S>,
    feed: &mut ChangeFeed<T>,
) -> StoreError {
    loop {
        match feed.next().await {
            Some(Ok(event)) => {
                collection.apply_remote(&event).await;
            }
            // A bad row is not a broken channel.
            Some(Err(err @ StoreError::Decode { .. })) => {
                error!(table = %T::TABLE, error = %err, "dropping undecodable change");
            }
            Some(Err(err)) => return err,
            None => return StoreError::ChannelClosed,
        }
    }
}

/// Retries until a channel opens. Waits grow with the retry schedule and
/// stay at its cap once reached.
async fn resubscribe<T: Record, S: RemoteStore<T>>(
    collection: &Collection<T, S>,
    mask: ChangeMask,
) -> ChangeFeed<T> {
    let config = collection.retry_config();
    let mut attempt = 0u32;
    loop {
        let delay = config.delay_for(attempt);
        tokio::time::sleep(delay).await;
        match collection.store().subscribe(mask).await {
            Ok(feed) => {
                info!(table = %T::TABLE, attempt = attempt + 1, "realtime subscription restored");
                return feed;
            }
            Err(err) => {
                attempt = attempt.saturating_add(1);
                warn!(
                    table = %T::TABLE,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "resubscribe failed"
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/subscription_tests.rs"]
mod tests;
