use chrono::Utc;
use shared::{
    domain::{ClubId, Speaker},
    protocol::Table,
};

use super::*;
use crate::tests_support::speaker;

fn envelope(kind: ChangeKind, new: Option<&Speaker>, old: Option<&Speaker>) -> ChangeEnvelope {
    ChangeEnvelope {
        club_id: ClubId(1),
        table: Table::Speakers,
        kind,
        new: new.map(|s| serde_json::to_value(s).expect("json")),
        old: old.map(|s| serde_json::to_value(s).expect("json")),
        committed_at: Utc::now(),
    }
}

#[test]
fn envelope_decodes_into_typed_event() {
    let row = speaker(7, "Ada", shared::domain::SpeakerStatus::Agreed, 0);
    let event = ChangeEvent::<Speaker>::from_envelope(envelope(ChangeKind::Delete, None, Some(&row)))
        .expect("decode");
    assert_eq!(event.kind, ChangeKind::Delete);
    assert_eq!(event.id(), Some(row.id));
    assert!(event.new.is_none());
}

#[test]
fn malformed_row_is_a_decode_error() {
    let mut bad = envelope(ChangeKind::Insert, None, None);
    bad.new = Some(serde_json::json!({ "id": "not-a-number" }));
    let err = ChangeEvent::<Speaker>::from_envelope(bad).expect_err("should fail");
    assert!(matches!(err, StoreError::Decode { .. }));
}

#[tokio::test]
async fn dropping_feed_closes_sender_side() {
    let (tx, feed) = ChangeFeed::<Speaker>::channel(4);
    assert!(!tx.is_closed());
    feed.close();
    assert!(tx.is_closed());
}

#[tokio::test]
async fn dropping_feed_aborts_pump_task() {
    let (tx, rx) = mpsc::channel::<FeedItem<Speaker>>(1);
    let pump = tokio::spawn(async move {
        let _tx = tx;
        std::future::pending::<()>().await;
    });
    let abort = pump.abort_handle();
    let feed = ChangeFeed::with_pump(rx, pump);
    drop(feed);
    tokio::time::timeout(std::time::Duration::from_secs(1), async {
        while !abort.is_finished() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("pump aborted");
}
