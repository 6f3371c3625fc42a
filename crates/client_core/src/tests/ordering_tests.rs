use shared::domain::{Speaker, SpeakerId, SpeakerStatus};

use super::*;
use crate::tests_support::speaker;

fn board() -> Vec<Speaker> {
    vec![
        speaker(1, "a", SpeakerStatus::Ideas, 0),
        speaker(2, "b", SpeakerStatus::Ideas, 1),
        speaker(3, "c", SpeakerStatus::Ideas, 2),
        speaker(4, "d", SpeakerStatus::Ideas, 3),
        speaker(5, "x", SpeakerStatus::Agreed, 0),
    ]
}

fn column_names(items: &[Speaker], status: SpeakerStatus) -> Vec<String> {
    partition(items, status)
        .into_iter()
        .filter_map(|id| items.iter().find(|s| s.id == id))
        .map(|s| s.name.clone())
        .collect()
}

#[test]
fn reorder_moves_item_and_reports_changed_positions() {
    let mut items = board();
    let changes = reorder_partition(&mut items, SpeakerStatus::Ideas, 3, 1).expect("reorder");

    assert_eq!(column_names(&items, SpeakerStatus::Ideas), ["a", "d", "b", "c"]);
    assert_eq!(
        changes,
        vec![
            PositionChange { id: SpeakerId(4), position: 1 },
            PositionChange { id: SpeakerId(2), position: 2 },
            PositionChange { id: SpeakerId(3), position: 3 },
        ]
    );
    assert!(is_dense(&items, SpeakerStatus::Ideas));
    // other columns are untouched
    assert_eq!(items[4].position, 0);
}

#[test]
fn reorder_densifies_gappy_column() {
    let mut items = vec![
        speaker(1, "a", SpeakerStatus::Agreed, 4),
        speaker(2, "b", SpeakerStatus::Agreed, 9),
        speaker(3, "c", SpeakerStatus::Agreed, 4),
    ];
    assert!(!is_dense(&items, SpeakerStatus::Agreed));

    reorder_partition(&mut items, SpeakerStatus::Agreed, 0, 0).expect("reorder");

    assert!(is_dense(&items, SpeakerStatus::Agreed));
    assert_eq!(column_names(&items, SpeakerStatus::Agreed), ["a", "c", "b"]);
}

#[test]
fn every_reorder_leaves_column_dense() {
    for from in 0..4 {
        for to in 0..4 {
            let mut items = board();
            reorder_partition(&mut items, SpeakerStatus::Ideas, from, to).expect("reorder");
            let mut positions: Vec<_> = items
                .iter()
                .filter(|s| s.status == SpeakerStatus::Ideas)
                .map(|s| s.position)
                .collect();
            positions.sort_unstable();
            assert_eq!(positions, vec![0, 1, 2, 3], "from {from} to {to}");
        }
    }
}

#[test]
fn reorder_rejects_out_of_range_index() {
    let mut items = board();
    assert_eq!(
        reorder_partition(&mut items, SpeakerStatus::Agreed, 0, 1),
        Err(OrderingError::IndexOutOfRange { index: 1, len: 1 })
    );
    assert_eq!(
        reorder_partition(&mut items, SpeakerStatus::Spoken, 0, 0),
        Err(OrderingError::IndexOutOfRange { index: 0, len: 0 })
    );
}

#[test]
fn move_appends_to_target_and_leaves_origin_gap() {
    let mut items = board();
    let change = move_to_status(&mut items, SpeakerId(2), SpeakerStatus::Agreed).expect("move");

    assert_eq!(change, Some(PositionChange { id: SpeakerId(2), position: 1 }));
    assert_eq!(column_names(&items, SpeakerStatus::Agreed), ["x", "b"]);
    assert!(is_dense(&items, SpeakerStatus::Agreed));
    // origin column now reads 0, 2, 3
    assert!(!is_dense(&items, SpeakerStatus::Ideas));

    reorder_partition(&mut items, SpeakerStatus::Ideas, 0, 0).expect("repair");
    assert!(is_dense(&items, SpeakerStatus::Ideas));
}

#[test]
fn move_into_column_with_gap_lands_after_its_last_item() {
    let mut items = vec![
        speaker(1, "a", SpeakerStatus::Agreed, 0),
        speaker(2, "z", SpeakerStatus::Agreed, 2),
        speaker(5, "new", SpeakerStatus::Ideas, 0),
    ];

    let change = move_to_status(&mut items, SpeakerId(5), SpeakerStatus::Agreed).expect("move");

    assert_eq!(change, Some(PositionChange { id: SpeakerId(5), position: 3 }));
    assert_eq!(column_names(&items, SpeakerStatus::Agreed), ["a", "z", "new"]);
}

#[test]
fn move_into_empty_column_starts_at_zero() {
    let mut items = board();
    let change = move_to_status(&mut items, SpeakerId(1), SpeakerStatus::Scheduled).expect("move");
    assert_eq!(change.map(|c| c.position), Some(0));
}

#[test]
fn move_to_same_status_or_unknown_id() {
    let mut items = board();
    assert_eq!(
        move_to_status(&mut items, SpeakerId(5), SpeakerStatus::Agreed),
        Ok(None)
    );
    assert_eq!(
        move_to_status(&mut items, SpeakerId(99), SpeakerStatus::Agreed),
        Err(OrderingError::UnknownId(99))
    );
}
