mod common;

use common::{count, ids, open_fixture, registry, save, text};
use relsync_core::{
    LoadedRelation, RelationOutcome, RelationSyncService, RootEntity, SqliteStore, SyncConfig,
    SyncError,
};
use rusqlite::Connection;
use serde_json::json;

fn seeded() -> Connection {
    let conn = open_fixture();
    conn.execute_batch(
        "INSERT INTO posts (id, title) VALUES (1, 'first'), (2, 'second');
         INSERT INTO comments (id, post_id, body, position) VALUES
            (1, 1, 'one', 7),
            (2, 1, 'two', 8),
            (3, NULL, 'loose', NULL),
            (4, 2, 'other post', NULL);",
    )
    .unwrap();
    conn
}

#[test]
fn full_replace_deletes_missing_updates_listed_and_creates_new() {
    let conn = seeded();

    let saved = save(
        &conn,
        "post",
        json!({"id": 1, "comments": [{"id": 1, "body": "A"}, {"body": "B"}]}),
    )
    .unwrap();

    assert_eq!(
        saved.report["comments"],
        RelationOutcome {
            created: 1,
            updated: 1,
            deleted: 1,
            ..RelationOutcome::default()
        }
    );
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM comments WHERE id = 2;"), 0);
    assert_eq!(
        text(&conn, "SELECT body FROM comments WHERE id = 1;").as_deref(),
        Some("A")
    );

    let current = ids(&conn, "SELECT id FROM comments WHERE post_id = 1 ORDER BY id;");
    assert_eq!(current.len(), 2);
    assert_eq!(current[0], 1);
    let created = current[1];
    assert_eq!(
        text(&conn, &format!("SELECT body FROM comments WHERE id = {created};")).as_deref(),
        Some("B")
    );
    assert_eq!(saved.relation("comments").unwrap().ids(), vec![1, created]);
    // rows of other roots and unowned rows are untouched
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM comments WHERE id IN (3, 4);"), 2);
}

#[test]
fn full_replace_keeps_listed_rows_on_the_root() {
    let conn = seeded();

    let saved = save(
        &conn,
        "post",
        json!({"id": 1, "comments": [
            {"id": 1, "post_id": 2, "body": "A"},
            {"post_id": 2, "body": "B"}
        ]}),
    )
    .unwrap();

    let related = ids(&conn, "SELECT id FROM comments WHERE post_id = 1 ORDER BY id;");
    assert_eq!(related.len(), 2);
    assert_eq!(related[0], 1);
    assert_eq!(saved.relation("comments").unwrap().ids(), related);
    assert_eq!(
        text(&conn, "SELECT body FROM comments WHERE id = 1;").as_deref(),
        Some("A")
    );
    assert_eq!(ids(&conn, "SELECT id FROM comments WHERE post_id = 2;"), vec![4]);
}

#[test]
fn full_replace_ignores_foreign_key_only_changes() {
    let conn = seeded();
    let config = SyncConfig {
        position_column: "sort_order".to_string(),
    };
    let service = RelationSyncService::with_config(SqliteStore::new(&conn), registry(), config);

    let saved = service
        .save(
            RootEntity::from_json("post", json!({"id": 1, "comments": [{"id": 1, "post_id": 2}, {"id": 2}]}))
                .unwrap(),
        )
        .unwrap();

    assert!(saved.report["comments"].is_unchanged());
    assert_eq!(count(&conn, "SELECT post_id FROM comments WHERE id = 1;"), 1);
}

#[test]
fn full_replace_assigns_list_index_to_position() {
    let conn = seeded();

    save(
        &conn,
        "post",
        json!({"id": 1, "comments": [{"id": 2}, {"body": "middle"}, {"id": 1}]}),
    )
    .unwrap();

    let positions = ids(
        &conn,
        "SELECT position FROM comments WHERE post_id = 1 ORDER BY position;",
    );
    assert_eq!(positions, vec![0, 1, 2]);
    assert_eq!(count(&conn, "SELECT position FROM comments WHERE id = 2;"), 0);
    assert_eq!(count(&conn, "SELECT position FROM comments WHERE id = 1;"), 2);

    let loaded = RelationSyncService::new(SqliteStore::new(&conn), registry())
        .load("post", 1, &["comments"])
        .unwrap();
    let order = loaded.relation("comments").unwrap().ids();
    assert_eq!(order.first(), Some(&2));
    assert_eq!(order.last(), Some(&1));
}

#[test]
fn full_replace_skips_position_when_column_is_missing() {
    let conn = seeded();
    let config = SyncConfig {
        position_column: "sort_order".to_string(),
    };
    let service = RelationSyncService::with_config(SqliteStore::new(&conn), registry(), config);

    let saved = service
        .save(RootEntity::from_json("post", json!({"id": 1, "comments": [{"id": 2}, {"id": 1}]})).unwrap())
        .unwrap();

    // nothing to write for id-only items
    assert!(saved.report["comments"].is_unchanged());
    assert_eq!(count(&conn, "SELECT position FROM comments WHERE id = 1;"), 7);
    assert_eq!(count(&conn, "SELECT position FROM comments WHERE id = 2;"), 8);
}

#[test]
fn full_replace_rejects_foreign_ids_before_any_write() {
    let conn = seeded();

    let err = save(
        &conn,
        "post",
        json!({"id": 1, "comments": [{"id": 1, "body": "changed"}, {"id": 3}, {"id": 4}]}),
    )
    .unwrap_err();

    match err {
        SyncError::NotFound { table, ids } => {
            assert_eq!(table, "comments");
            assert_eq!(ids, vec![3, 4]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM comments WHERE post_id = 1;"), 2);
    assert_eq!(
        text(&conn, "SELECT body FROM comments WHERE id = 1;").as_deref(),
        Some("one")
    );
}

#[test]
fn empty_list_removes_every_related_row() {
    let conn = seeded();

    let saved = save(&conn, "post", json!({"id": 1, "comments": []})).unwrap();

    assert_eq!(saved.report["comments"].deleted, 2);
    assert_eq!(saved.relation("comments"), Some(&LoadedRelation::Many(Vec::new())));
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM comments;"), 2);
}

#[test]
fn delete_action_only_touches_rows_of_the_root() {
    let conn = seeded();

    let saved = save(
        &conn,
        "post",
        json!({"id": 1, "comments": {"delete": [{"id": 2}, {"id": 3}, {"id": 4}, {"body": "no id"}]}}),
    )
    .unwrap();

    assert_eq!(saved.report["comments"].deleted, 1);
    assert_eq!(ids(&conn, "SELECT id FROM comments ORDER BY id;"), vec![1, 3, 4]);
}

#[test]
fn detach_action_clears_foreign_key_and_keeps_rows() {
    let conn = seeded();

    let saved = save(
        &conn,
        "post",
        json!({"id": 1, "comments": {"detach": [1, 4]}}),
    )
    .unwrap();

    assert_eq!(saved.report["comments"].detached, 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM comments WHERE id = 1 AND post_id IS NULL;"), 1);
    assert_eq!(count(&conn, "SELECT post_id FROM comments WHERE id = 4;"), 2);
    assert_eq!(saved.relation("comments").unwrap().ids(), vec![2]);
}

#[test]
fn attach_action_links_existing_rows_and_skips_linked_ones() {
    let conn = seeded();

    let saved = save(
        &conn,
        "post",
        json!({"id": 1, "comments": {"attach": [{"id": 3}, {"id": 1}, {"id": 4}]}}),
    )
    .unwrap();

    assert_eq!(saved.report["comments"].attached, 2);
    assert_eq!(
        ids(&conn, "SELECT id FROM comments WHERE post_id = 1 ORDER BY id;"),
        vec![1, 2, 3, 4]
    );
}

#[test]
fn attach_action_with_missing_row_fails_with_not_found() {
    let conn = seeded();

    let err = save(&conn, "post", json!({"id": 1, "comments": {"attach": [3, 99]}})).unwrap_err();

    assert!(matches!(err, SyncError::NotFound { ref ids, .. } if ids == &vec![99]));
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM comments WHERE id = 3 AND post_id IS NULL;"), 1);
}

#[test]
fn add_action_creates_new_items_and_links_existing_ones() {
    let conn = seeded();

    let saved = save(
        &conn,
        "post",
        json!({"id": 1, "comments": {"add": [{"body": "fresh"}, {"id": 3}]}}),
    )
    .unwrap();

    assert_eq!(saved.report["comments"].created, 1);
    assert_eq!(saved.report["comments"].attached, 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM comments WHERE post_id = 1;"), 4);
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM comments WHERE post_id = 1 AND body = 'fresh';"),
        1
    );
}

#[test]
fn delete_takes_priority_over_other_actions() {
    let conn = seeded();

    let saved = save(
        &conn,
        "post",
        json!({"id": 1, "comments": {"add": [{"body": "ignored"}], "delete": [{"id": 1}]}}),
    )
    .unwrap();

    assert_eq!(
        saved.report["comments"],
        RelationOutcome {
            deleted: 1,
            ..RelationOutcome::default()
        }
    );
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM comments WHERE body = 'ignored';"), 0);
}

#[test]
fn unsupported_action_and_shape_are_rejected() {
    let conn = seeded();

    let update_only = save(&conn, "post", json!({"id": 1, "comments": {"update": [{"id": 1}]}}));
    assert!(matches!(update_only, Err(SyncError::Validation(_))));

    let single = save(&conn, "post", json!({"id": 1, "comments": {"body": "not a list"}}));
    assert!(matches!(single, Err(SyncError::Validation(_))));

    let scalar = save(&conn, "post", json!({"id": 1, "comments": 5}));
    assert!(matches!(scalar, Err(SyncError::Validation(_))));
}

#[test]
fn null_payload_leaves_collection_alone() {
    let conn = seeded();

    let saved = save(&conn, "post", json!({"id": 1, "comments": null})).unwrap();

    assert!(saved.report["comments"].is_unchanged());
    assert_eq!(saved.relation("comments").unwrap().ids(), vec![1, 2]);
}

#[test]
fn new_root_gets_children_linked_after_insert() {
    let conn = seeded();

    let saved = save(
        &conn,
        "post",
        json!({"title": "new", "comments": [{"body": "x"}, {"body": "y"}]}),
    )
    .unwrap();

    assert_eq!(
        count(
            &conn,
            &format!("SELECT COUNT(*) FROM comments WHERE post_id = {};", saved.id)
        ),
        2
    );
    assert_eq!(saved.attributes["title"], "new");
}
