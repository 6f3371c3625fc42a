use shared::{
    domain::{Speaker, SpeakerId, SpeakerStatus},
    error::{ApiError, ErrorCode},
};

use super::*;
use crate::tests_support::speaker;

fn ids(cache: &EntityCache<Speaker>) -> Vec<i64> {
    cache.items().iter().map(|s| s.id.0).collect()
}

#[test]
fn fetch_lifecycle_moves_through_states() {
    let mut cache = EntityCache::<Speaker>::new();
    assert_eq!(cache.state(), CacheState::Empty);

    cache.begin_fetch();
    assert_eq!(cache.state(), CacheState::Loading);

    let loaded = cache.finish_fetch(Ok(vec![speaker(1, "Ada", SpeakerStatus::Ideas, 0)]));
    assert_eq!(loaded, Ok(1));
    assert_eq!(cache.state(), CacheState::Populated);
    assert!(cache.last_error().is_none());
}

#[test]
fn failed_fetch_keeps_prior_state_and_rows() {
    let mut cache = EntityCache::<Speaker>::new();
    cache.begin_fetch();
    let err = StoreError::Timeout("slow".into());
    assert_eq!(cache.finish_fetch(Err(err.clone())), Err(err.clone()));
    assert_eq!(cache.state(), CacheState::Empty);

    cache.begin_fetch();
    cache
        .finish_fetch(Ok(vec![speaker(1, "Ada", SpeakerStatus::Ideas, 0)]))
        .expect("load");
    cache.begin_fetch();
    cache.begin_fetch();
    assert!(cache.finish_fetch(Err(err.clone())).is_err());
    assert_eq!(cache.state(), CacheState::Populated);
    assert_eq!(ids(&cache), vec![1]);
    assert_eq!(cache.last_error(), Some(&err));
}

#[test]
fn refetch_replaces_whole_collection() {
    let mut cache = EntityCache::<Speaker>::new();
    cache.upsert_local(speaker(9, "Stale", SpeakerStatus::Ideas, 0));
    cache.begin_fetch();
    cache
        .finish_fetch(Ok(vec![
            speaker(1, "Ada", SpeakerStatus::Ideas, 0),
            speaker(2, "Grace", SpeakerStatus::Agreed, 0),
        ]))
        .expect("load");
    assert_eq!(ids(&cache), vec![1, 2]);
}

#[test]
fn reconciliation_follows_arrival_order() {
    let mut cache = EntityCache::<Speaker>::new();
    let ada = speaker(1, "Ada", SpeakerStatus::Ideas, 0);
    let grace = speaker(2, "Grace", SpeakerStatus::Ideas, 1);
    let mut ada_agreed = ada.clone();
    ada_agreed.status = SpeakerStatus::Agreed;

    assert_eq!(cache.apply(&ChangeEvent::insert(ada.clone())), Applied::Inserted);
    assert_eq!(cache.apply(&ChangeEvent::insert(grace.clone())), Applied::Inserted);
    // duplicate delivery
    assert_eq!(cache.apply(&ChangeEvent::insert(ada.clone())), Applied::Ignored);
    assert_eq!(cache.apply(&ChangeEvent::update(ada_agreed.clone())), Applied::Replaced);
    assert_eq!(ids(&cache), vec![1, 2]);
    assert_eq!(cache.get(SpeakerId(1)).map(|s| s.status), Some(SpeakerStatus::Agreed));

    assert_eq!(cache.apply(&ChangeEvent::delete(ada)), Applied::Removed);
    assert_eq!(ids(&cache), vec![2]);
}

#[test]
fn update_and_delete_of_unknown_id_are_noops() {
    let mut cache = EntityCache::<Speaker>::new();
    cache.upsert_local(speaker(1, "Ada", SpeakerStatus::Ideas, 0));
    let ghost = speaker(42, "Ghost", SpeakerStatus::Ideas, 3);

    assert_eq!(cache.apply(&ChangeEvent::update(ghost.clone())), Applied::Ignored);
    assert_eq!(cache.apply(&ChangeEvent::delete(ghost)), Applied::Ignored);
    assert_eq!(ids(&cache), vec![1]);
}

#[test]
fn event_without_snapshot_is_ignored() {
    let mut cache = EntityCache::<Speaker>::new();
    let event = ChangeEvent::<Speaker> {
        kind: ChangeKind::Update,
        new: None,
        old: None,
    };
    assert_eq!(cache.apply(&event), Applied::Ignored);
}

#[test]
fn update_preserves_iteration_order_of_others() {
    let mut cache = EntityCache::<Speaker>::new();
    for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
        cache.upsert_local(speaker(id, name, SpeakerStatus::Ideas, id - 1));
    }
    let mut b = speaker(2, "b2", SpeakerStatus::Ideas, 1);
    b.topic = Some("updated".into());
    cache.apply(&ChangeEvent::update(b));
    assert_eq!(ids(&cache), vec![1, 2, 3]);
    assert_eq!(cache.items()[1].name, "b2");
}

#[test]
fn local_edits_are_visible_immediately() {
    let mut cache = EntityCache::<Speaker>::new();
    cache.upsert_local(speaker(1, "Ada", SpeakerStatus::Ideas, 0));

    assert!(cache.patch_local(SpeakerId(1), |s| s.topic = Some("Engines".into())));
    assert!(!cache.patch_local(SpeakerId(5), |s| s.topic = None));
    assert_eq!(
        cache.get(SpeakerId(1)).and_then(|s| s.topic.as_deref()),
        Some("Engines")
    );

    // Realtime echo of an older snapshot lands after the local edit and wins.
    cache.apply(&ChangeEvent::update(speaker(1, "Ada", SpeakerStatus::Ideas, 0)));
    assert_eq!(cache.get(SpeakerId(1)).and_then(|s| s.topic.as_deref()), None);

    assert!(cache.remove_local(SpeakerId(1)).is_some());
    assert!(cache.remove_local(SpeakerId(1)).is_none());
    assert!(cache.is_empty());
}

#[test]
fn recorded_errors_are_exposed() {
    let mut cache = EntityCache::<Speaker>::new();
    let err = StoreError::Api(ApiError::new(ErrorCode::Forbidden, "nope"));
    cache.record_error(&err);
    assert_eq!(cache.last_error().map(StoreError::code), Some(ErrorCode::Forbidden));
}
