use super::*;
use shared::protocol::{OrderBy, SelectQuery};

async fn storage_with_club() -> (Storage, ClubId) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let club_id = storage
        .create_club("Georgetown Rotary", ClubKind::Rotary)
        .await
        .expect("club");
    (storage, club_id)
}

#[tokio::test]
async fn seed_demo_fills_every_table() {
    let (storage, club_id) = storage_with_club().await;

    let summary = seed_demo(&storage, club_id).await.expect("seed");

    assert_eq!(
        summary,
        SeedSummary {
            speakers: 5,
            members: 3,
            projects: 3,
        }
    );
    let speakers = storage
        .list_speakers(club_id, &SelectQuery::new())
        .await
        .expect("speakers");
    assert_eq!(speakers.len(), 5);
    assert!(speakers.iter().all(|s| s.position == 0));
}

#[tokio::test]
async fn seed_demo_rejects_unknown_club() {
    let (storage, _) = storage_with_club().await;
    let err = seed_demo(&storage, ClubId(404)).await.expect_err("no club");
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn renumber_closes_gaps_left_by_moves() {
    let (storage, club_id) = storage_with_club().await;
    for (name, position) in [("a", 0), ("b", 2), ("c", 5)] {
        let draft = NewSpeaker {
            name: name.into(),
            status: SpeakerStatus::Agreed,
            position: Some(position),
            ..NewSpeaker::default()
        };
        storage.insert_speaker(club_id, &draft).await.expect("insert");
    }

    let changed = renumber(&storage, club_id, Table::Speakers, None)
        .await
        .expect("renumber");
    assert_eq!(changed, 2);

    let query = SelectQuery::new()
        .eq("status", "agreed")
        .order(OrderBy::asc("position"));
    let rows = storage.list_speakers(club_id, &query).await.expect("list");
    let order: Vec<_> = rows.iter().map(|s| (s.name.as_str(), s.position)).collect();
    assert_eq!(order, [("a", 0), ("b", 1), ("c", 2)]);
}

#[tokio::test]
async fn renumber_refuses_members() {
    let (storage, club_id) = storage_with_club().await;
    assert!(renumber(&storage, club_id, Table::Members, None).await.is_err());
}

#[test]
fn cli_parses_renumber_with_status() {
    let cli = Cli::try_parse_from([
        "tools",
        "--database-url",
        "sqlite::memory:",
        "renumber",
        "3",
        "projects",
        "--status",
        "planning",
    ])
    .expect("parse");
    match cli.command {
        Command::Renumber {
            club_id,
            table,
            status,
        } => {
            assert_eq!(club_id, 3);
            assert_eq!(table, Table::Projects);
            assert_eq!(status.as_deref(), Some("planning"));
        }
        other => panic!("unexpected command {other:?}"),
    }
}
