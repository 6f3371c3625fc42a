use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use shared::{
    domain::{Speaker, SpeakerStatus},
    error::{ApiError, ErrorCode},
    protocol::SelectQuery,
};

use super::*;
use crate::{
    remote::ChangeEvent,
    retry::RetryConfig,
    tests_support::{speaker, MemoryStore},
};

fn fast_retry() -> RetryConfig {
    RetryConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        ..RetryConfig::default()
    }
}

async fn loaded(rows: Vec<Speaker>) -> (Arc<MemoryStore>, Collection<Speaker, MemoryStore>) {
    let store = Arc::new(MemoryStore::with_rows(rows));
    let collection = Collection::with_retry(store.clone(), SelectQuery::new(), fast_retry());
    collection.refetch().await.expect("initial fetch");
    (store, collection)
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

async fn names(collection: &Collection<Speaker, MemoryStore>) -> Vec<String> {
    collection.items().await.into_iter().map(|s| s.name).collect()
}

#[tokio::test]
async fn events_flow_into_the_collection() {
    let (store, collection) = loaded(vec![speaker(1, "Ada", SpeakerStatus::Ideas, 0)]).await;
    let mut subscription = collection.subscription(ChangeMask::ALL);
    subscription.start().await.expect("start");
    assert!(subscription.is_running());

    let feed = store.feed();
    feed.send(Ok(ChangeEvent::insert(speaker(2, "Grace", SpeakerStatus::Ideas, 1))))
        .await
        .expect("send");
    feed.send(Ok(ChangeEvent::delete(speaker(1, "Ada", SpeakerStatus::Ideas, 0))))
        .await
        .expect("send");

    let c = &collection;
    eventually("insert and delete applied", move || async move {
        names(c).await == ["Grace"]
    })
    .await;
}

#[tokio::test]
async fn starting_twice_keeps_one_channel() {
    let (store, collection) = loaded(vec![]).await;
    let mut subscription = collection.subscription(ChangeMask::ALL);
    subscription.start().await.expect("start");
    subscription.start().await.expect("start again");
    assert_eq!(store.subscribes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stop_and_drop_release_the_channel() {
    let (store, collection) = loaded(vec![]).await;

    let mut subscription = collection.subscription(ChangeMask::ALL);
    subscription.start().await.expect("start");
    let first = store.feed();
    subscription.stop();
    assert!(!subscription.is_running());
    let first = &first;
    eventually("stopped channel closed", move || async move { first.is_closed() }).await;

    let mut subscription = collection.subscription(ChangeMask::ALL);
    subscription.start().await.expect("start");
    let second = store.feed();
    drop(subscription);
    let second = &second;
    eventually("dropped channel closed", move || async move { second.is_closed() }).await;
}

#[tokio::test]
async fn closed_channel_resubscribes_then_refetches() {
    let (store, collection) = loaded(vec![speaker(1, "Ada", SpeakerStatus::Ideas, 0)]).await;
    let mut subscription = collection.subscription(ChangeMask::ALL);
    subscription.start().await.expect("start");
    let selects_before = store.selects.load(Ordering::SeqCst);

    // A change lands while the channel is down and is never delivered.
    store
        .rows
        .lock()
        .expect("lock")
        .push(speaker(2, "Missed", SpeakerStatus::Agreed, 0));
    store
        .subscribe_failures
        .lock()
        .expect("lock")
        .push_back(StoreError::Network("connection refused".into()));
    store.feeds.lock().expect("lock").clear();

    let (s, c) = (&*store, &collection);
    eventually("second resubscribe attempt", move || async move {
        s.subscribes.load(Ordering::SeqCst) >= 3
    })
    .await;
    eventually("refetch picked up missed row", move || async move {
        names(c).await == ["Ada", "Missed"]
    })
    .await;
    assert!(store.selects.load(Ordering::SeqCst) > selects_before);
    assert!(subscription.is_running());
}

#[tokio::test]
async fn channel_error_message_also_triggers_recovery() {
    let (store, collection) = loaded(vec![]).await;
    let mut subscription = collection.subscription(ChangeMask::ALL);
    subscription.start().await.expect("start");

    store
        .feed()
        .send(Err(StoreError::Api(ApiError::new(
            ErrorCode::ServiceUnavailable,
            "subscriber lagged",
        ))))
        .await
        .expect("send");

    let s = &*store;
    eventually("resubscribed", move || async move {
        s.subscribes.load(Ordering::SeqCst) == 2
    })
    .await;
}

#[tokio::test]
async fn undecodable_change_is_logged_and_skipped() {
    let (store, collection) = loaded(vec![]).await;
    let mut subscription = collection.subscription(ChangeMask::ALL);
    subscription.start().await.expect("start");

    let feed = store.feed();
    feed.send(Err(StoreError::Decode {
        what: "change row",
        reason: "missing field `id`".into(),
    }))
    .await
    .expect("send");
    feed.send(Ok(ChangeEvent::insert(speaker(3, "Linus", SpeakerStatus::Ideas, 0))))
        .await
        .expect("send");

    let c = &collection;
    eventually("later event applied", move || async move {
        names(c).await == ["Linus"]
    })
    .await;
    assert_eq!(store.subscribes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn start_surfaces_non_transient_subscribe_failure() {
    let (store, collection) = loaded(vec![]).await;
    store
        .subscribe_failures
        .lock()
        .expect("lock")
        .push_back(StoreError::Api(ApiError::new(ErrorCode::Forbidden, "no realtime")));

    let mut subscription = collection.subscription(ChangeMask::ALL);
    let err = subscription.start().await.expect_err("should fail");
    assert_eq!(err.code(), ErrorCode::Forbidden);
    assert!(!subscription.is_running());
    assert_eq!(store.subscribes.load(Ordering::SeqCst), 1);
}
