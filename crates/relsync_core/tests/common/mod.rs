#![allow(dead_code)]

use relsync_core::{
    open_db_in_memory, Attributes, EntitySchema, JoinTable, Migration, SchemaRegistry,
    SqliteStore,
};
use relsync_core::{RelationSyncService, RootEntity, RowId, SavedEntity, SyncResult};
use rusqlite::Connection;
use serde_json::Value;

const BLOG_V1: &str = r#"
CREATE TABLE authors (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE posts (
    id INTEGER PRIMARY KEY,
    title TEXT,
    author_id INTEGER REFERENCES authors(id)
);

CREATE TABLE summaries (
    id INTEGER PRIMARY KEY,
    post_id INTEGER REFERENCES posts(id),
    body TEXT
);

CREATE TABLE comments (
    id INTEGER PRIMARY KEY,
    post_id INTEGER REFERENCES posts(id),
    body TEXT,
    position INTEGER
);

CREATE TABLE tags (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE post_tag (
    post_id INTEGER NOT NULL REFERENCES posts(id),
    tag_id INTEGER NOT NULL REFERENCES tags(id),
    position INTEGER,
    note TEXT,
    PRIMARY KEY (post_id, tag_id)
);
"#;

const BLOG_V2: &str = r#"
CREATE TABLE videos (
    id INTEGER PRIMARY KEY,
    title TEXT
);

CREATE TABLE labels (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE labelables (
    label_id INTEGER NOT NULL REFERENCES labels(id),
    labelable_id INTEGER NOT NULL,
    labelable_type TEXT NOT NULL,
    PRIMARY KEY (label_id, labelable_id, labelable_type)
);
"#;

pub const MIGRATIONS: &[Migration] = &[Migration::new(1, BLOG_V1), Migration::new(2, BLOG_V2)];

pub fn open_fixture() -> Connection {
    open_db_in_memory(MIGRATIONS).unwrap()
}

pub fn registry() -> SchemaRegistry {
    SchemaRegistry::new()
        .with(
            "post",
            EntitySchema::new("posts")
                .owned_reference("author", "authors", "author_id")
                .owned_child("summary", "summaries", "post_id")
                .owned_collection("comments", "comments", "post_id")
                .join_collection(
                    "tags",
                    "tags",
                    JoinTable::new("post_tag", "post_id", "tag_id"),
                )
                .join_collection(
                    "labels",
                    "labels",
                    JoinTable::new("labelables", "labelable_id", "label_id")
                        .morph("labelable_type", "post"),
                ),
        )
        .with(
            "video",
            EntitySchema::new("videos").join_collection(
                "labels",
                "labels",
                JoinTable::new("labelables", "labelable_id", "label_id")
                    .morph("labelable_type", "video"),
            ),
        )
}

/// Saves one JSON root through a fresh service over `conn`.
pub fn save(conn: &Connection, entity_type: &str, value: Value) -> SyncResult<SavedEntity> {
    let service = RelationSyncService::new(SqliteStore::new(conn), registry());
    service.save(RootEntity::from_json(entity_type, value)?)
}

pub fn attrs(value: Value) -> Attributes {
    value.as_object().cloned().unwrap()
}

pub fn ids(conn: &Connection, sql: &str) -> Vec<RowId> {
    let mut stmt = conn.prepare(sql).unwrap();
    let rows = stmt.query_map([], |row| row.get(0)).unwrap();
    rows.collect::<Result<Vec<RowId>, _>>().unwrap()
}

pub fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

pub fn text(conn: &Connection, sql: &str) -> Option<String> {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}
