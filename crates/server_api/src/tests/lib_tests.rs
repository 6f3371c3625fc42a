use super::*;
use serde_json::json;
use shared::domain::ClubKind;

async fn test_context() -> (ApiContext, ClubId) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let ctx = ApiContext { storage };
    let club = create_club(
        &ctx,
        &CreateClubRequest {
            name: "Georgetown Rotary".to_string(),
            kind: ClubKind::Rotary,
        },
    )
    .await
    .expect("club");
    (ctx, club.id)
}

#[tokio::test]
async fn insert_produces_an_insert_change_with_the_new_row() {
    let (ctx, club) = test_context().await;
    let (row, change) = insert_row(
        &ctx,
        club,
        Table::Speakers,
        json!({ "name": "Ada Lovelace", "status": "agreed" }),
    )
    .await
    .expect("insert");

    assert_eq!(row["name"], "Ada Lovelace");
    assert_eq!(row["position"], 0);
    assert_eq!(change.kind, ChangeKind::Insert);
    assert_eq!(change.club_id, club);
    assert_eq!(change.new.as_ref(), Some(&row));
    assert!(change.old.is_none());
}

#[tokio::test]
async fn insert_rejects_blank_names_and_unknown_clubs() {
    let (ctx, club) = test_context().await;
    let err = insert_row(&ctx, club, Table::Members, json!({ "name": "  " }))
        .await
        .expect_err("blank name");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = insert_row(&ctx, ClubId(404), Table::Members, json!({ "name": "Ada" }))
        .await
        .expect_err("unknown club");
    assert_eq!(err.code, ErrorCode::NotFound);

    let err = insert_row(
        &ctx,
        club,
        Table::Speakers,
        json!({ "name": "Ada", "status": "famous" }),
    )
    .await
    .expect_err("unknown status");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn update_carries_old_and_new_rows() {
    let (ctx, club) = test_context().await;
    let (row, _) = insert_row(&ctx, club, Table::Projects, json!({ "name": "Food drive" }))
        .await
        .expect("insert");
    let id = row["id"].as_i64().expect("id");

    let patch = json!({ "status": "planning", "lead": "Grace" });
    let change = update_row(&ctx, club, Table::Projects, id, patch.as_object().expect("object"))
        .await
        .expect("update");

    assert_eq!(change.kind, ChangeKind::Update);
    assert_eq!(change.old.as_ref().expect("old")["status"], "idea");
    assert_eq!(change.new.as_ref().expect("new")["status"], "planning");
    assert_eq!(change.new.as_ref().expect("new")["lead"], "Grace");
}

#[tokio::test]
async fn update_maps_patch_errors_to_validation_and_missing_rows_to_not_found() {
    let (ctx, club) = test_context().await;
    let (row, _) = insert_row(&ctx, club, Table::Speakers, json!({ "name": "Ada" }))
        .await
        .expect("insert");
    let id = row["id"].as_i64().expect("id");

    let bad = json!({ "club_id": 9 });
    let err = update_row(&ctx, club, Table::Speakers, id, bad.as_object().expect("object"))
        .await
        .expect_err("read-only column");
    assert_eq!(err.code, ErrorCode::Validation);

    let ok = json!({ "name": "Ada King" });
    let err = update_row(&ctx, club, Table::Speakers, 999, ok.as_object().expect("object"))
        .await
        .expect_err("missing row");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn delete_produces_a_delete_change_with_the_old_row() {
    let (ctx, club) = test_context().await;
    let (row, _) = insert_row(&ctx, club, Table::Members, json!({ "name": "Ada" }))
        .await
        .expect("insert");
    let id = row["id"].as_i64().expect("id");

    let change = delete_row(&ctx, club, Table::Members, id).await.expect("delete");
    assert_eq!(change.kind, ChangeKind::Delete);
    assert!(change.new.is_none());
    assert_eq!(change.old.as_ref().expect("old")["id"], id);

    let err = delete_row(&ctx, club, Table::Members, id)
        .await
        .expect_err("already gone");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn rows_of_another_club_cannot_be_changed() {
    let (ctx, club) = test_context().await;
    let other = ctx
        .storage
        .create_club("Pitchmasters", ClubKind::Toastmasters)
        .await
        .expect("other club");
    let (row, _) = insert_row(&ctx, club, Table::Speakers, json!({ "name": "Ada" }))
        .await
        .expect("insert");
    let id = row["id"].as_i64().expect("id");

    let patch = json!({ "name": "Hijacked" });
    let err = update_row(&ctx, other, Table::Speakers, id, patch.as_object().expect("object"))
        .await
        .expect_err("foreign update");
    assert_eq!(err.code, ErrorCode::NotFound);
    let err = delete_row(&ctx, other, Table::Speakers, id)
        .await
        .expect_err("foreign delete");
    assert_eq!(err.code, ErrorCode::NotFound);

    let speaker = ctx
        .storage
        .speaker(SpeakerId(id))
        .await
        .expect("read")
        .expect("still there");
    assert_eq!(speaker.name, "Ada");
    assert_eq!(speaker.club_id, club);
}

#[tokio::test]
async fn list_rows_honours_filters() {
    let (ctx, club) = test_context().await;
    for (name, status) in [("a", "ideas"), ("b", "spoken"), ("c", "ideas")] {
        insert_row(
            &ctx,
            club,
            Table::Speakers,
            json!({ "name": name, "status": status }),
        )
        .await
        .expect("insert");
    }
    let rows = list_rows(
        &ctx,
        club,
        Table::Speakers,
        &SelectQuery::new().eq("status", "ideas"),
    )
    .await
    .expect("list");
    let names: Vec<_> = rows.iter().map(|r| r["name"].as_str().expect("name")).collect();
    assert_eq!(names, vec!["a", "c"]);

    let err = list_rows(
        &ctx,
        club,
        Table::Speakers,
        &SelectQuery::new().eq("nope", "x"),
    )
    .await
    .expect_err("unknown column");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[test]
fn routes_are_table_generic() {
    assert_eq!(club_rows_route(), "/clubs/:club_id/:table");
    assert_eq!(row_route(), "/clubs/:club_id/:table/:id");
    assert_eq!(realtime_route(), "/realtime");
}
