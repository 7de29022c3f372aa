//! Static relation metadata and the relation classifier.
//!
//! # Responsibility
//! - Describe, per entity type, which relations exist and how they are stored.
//! - Map a relation name to its [`RelationKind`] and the kind to its [`Phase`].
//!
//! # Invariants
//! - A relation name resolves to exactly one kind per entity type.
//! - Kind → phase is a fixed table; payload shape never changes it.

use crate::error::{SyncError, SyncResult};
use crate::model::entity::PRIMARY_KEY;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Relation cardinality plus foreign-key placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// To-one, foreign key on the root row.
    OwnedReference,
    /// To-one, foreign key on the related row.
    OwnedChild,
    /// To-many, foreign key on the related rows.
    OwnedCollection,
    /// Many-to-many through association rows.
    JoinCollection,
}

impl RelationKind {
    pub const ALL: [RelationKind; 4] = [
        RelationKind::OwnedReference,
        RelationKind::OwnedChild,
        RelationKind::OwnedCollection,
        RelationKind::JoinCollection,
    ];

    /// Phase in which relations of this kind are synchronized.
    pub fn phase(self) -> Phase {
        match self {
            Self::OwnedReference => Phase::PrePersist,
            Self::OwnedChild | Self::OwnedCollection | Self::JoinCollection => Phase::PostPersist,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OwnedReference => "owned_reference",
            Self::OwnedChild => "owned_child",
            Self::OwnedCollection => "owned_collection",
            Self::JoinCollection => "join_collection",
        }
    }
}

impl Display for RelationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Save-call phase relative to persisting the root row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Before the root row is written: foreign keys on the root.
    PrePersist,
    /// After the root row has an id: child, collection and join rows.
    PostPersist,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrePersist => "pre_persist",
            Self::PostPersist => "post_persist",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Restricts a shared join table to one owning entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MorphScope {
    pub type_column: String,
    pub type_value: String,
}

/// Association table linking the root (parent) to related rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTable {
    pub table: String,
    /// Column holding the root id.
    pub parent_key: String,
    /// Column holding the related row id.
    pub related_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub morph: Option<MorphScope>,
}

impl JoinTable {
    pub fn new(
        table: impl Into<String>,
        parent_key: impl Into<String>,
        related_key: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            parent_key: parent_key.into(),
            related_key: related_key.into(),
            morph: None,
        }
    }

    /// Scopes every join query to `type_column = type_value`.
    pub fn morph(mut self, type_column: impl Into<String>, type_value: impl Into<String>) -> Self {
        self.morph = Some(MorphScope {
            type_column: type_column.into(),
            type_value: type_value.into(),
        });
        self
    }

    /// Columns owned by the join scope rather than by link attributes:
    /// `id`, both keys and the morph type column.
    pub fn is_scope_column(&self, column: &str) -> bool {
        column == PRIMARY_KEY
            || column == self.parent_key
            || column == self.related_key
            || self
                .morph
                .as_ref()
                .is_some_and(|morph| morph.type_column == column)
    }
}

/// Storage description of one relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationDef {
    OwnedReference {
        related_table: String,
        /// Column on the root table.
        foreign_key: String,
    },
    OwnedChild {
        related_table: String,
        /// Column on the related table.
        foreign_key: String,
    },
    OwnedCollection {
        related_table: String,
        /// Column on the related table.
        foreign_key: String,
    },
    JoinCollection {
        related_table: String,
        join: JoinTable,
    },
}

impl RelationDef {
    pub fn kind(&self) -> RelationKind {
        match self {
            Self::OwnedReference { .. } => RelationKind::OwnedReference,
            Self::OwnedChild { .. } => RelationKind::OwnedChild,
            Self::OwnedCollection { .. } => RelationKind::OwnedCollection,
            Self::JoinCollection { .. } => RelationKind::JoinCollection,
        }
    }

    pub fn related_table(&self) -> &str {
        match self {
            Self::OwnedReference { related_table, .. }
            | Self::OwnedChild { related_table, .. }
            | Self::OwnedCollection { related_table, .. }
            | Self::JoinCollection { related_table, .. } => related_table,
        }
    }

    /// Foreign key column for the three foreign-key kinds.
    pub fn foreign_key(&self) -> Option<&str> {
        match self {
            Self::OwnedReference { foreign_key, .. }
            | Self::OwnedChild { foreign_key, .. }
            | Self::OwnedCollection { foreign_key, .. } => Some(foreign_key),
            Self::JoinCollection { .. } => None,
        }
    }

    pub fn join(&self) -> Option<&JoinTable> {
        match self {
            Self::JoinCollection { join, .. } => Some(join),
            _ => None,
        }
    }
}

/// Table and relations of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub table: String,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationDef>,
}

impl EntitySchema {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            relations: BTreeMap::new(),
        }
    }

    pub fn relation(mut self, name: impl Into<String>, def: RelationDef) -> Self {
        self.relations.insert(name.into(), def);
        self
    }

    pub fn owned_reference(
        self,
        name: impl Into<String>,
        related_table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(
            name,
            RelationDef::OwnedReference {
                related_table: related_table.into(),
                foreign_key: foreign_key.into(),
            },
        )
    }

    pub fn owned_child(
        self,
        name: impl Into<String>,
        related_table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(
            name,
            RelationDef::OwnedChild {
                related_table: related_table.into(),
                foreign_key: foreign_key.into(),
            },
        )
    }

    pub fn owned_collection(
        self,
        name: impl Into<String>,
        related_table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(
            name,
            RelationDef::OwnedCollection {
                related_table: related_table.into(),
                foreign_key: foreign_key.into(),
            },
        )
    }

    pub fn join_collection(
        self,
        name: impl Into<String>,
        related_table: impl Into<String>,
        join: JoinTable,
    ) -> Self {
        self.relation(
            name,
            RelationDef::JoinCollection {
                related_table: related_table.into(),
                join,
            },
        )
    }

    pub fn get(&self, relation: &str) -> Option<&RelationDef> {
        self.relations.get(relation)
    }

    pub fn is_relation(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }
}

/// Entity type name → schema. The relation classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaRegistry {
    entities: BTreeMap<String, EntitySchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a registry from `{"<entity type>": {"table": .., "relations": {..}}}`.
    pub fn from_json_str(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value)
    }

    pub fn register(&mut self, entity_type: impl Into<String>, schema: EntitySchema) {
        self.entities.insert(entity_type.into(), schema);
    }

    pub fn with(mut self, entity_type: impl Into<String>, schema: EntitySchema) -> Self {
        self.register(entity_type, schema);
        self
    }

    pub fn entity(&self, entity_type: &str) -> SyncResult<&EntitySchema> {
        self.entities
            .get(entity_type)
            .ok_or_else(|| SyncError::UnknownEntityType(entity_type.to_string()))
    }

    /// Resolves the storage description of a relation.
    pub fn relation(&self, entity_type: &str, relation: &str) -> SyncResult<&RelationDef> {
        self.entity(entity_type)?
            .get(relation)
            .ok_or_else(|| SyncError::UnknownRelation {
                entity_type: entity_type.to_string(),
                relation: relation.to_string(),
            })
    }

    /// Maps a relation name to its kind.
    pub fn classify(&self, entity_type: &str, relation: &str) -> SyncResult<RelationKind> {
        self.relation(entity_type, relation).map(RelationDef::kind)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::{EntitySchema, JoinTable, Phase, RelationKind, SchemaRegistry};
    use crate::error::SyncError;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new().with(
            "post",
            EntitySchema::new("posts")
                .owned_reference("author", "authors", "author_id")
                .owned_child("summary", "summaries", "post_id")
                .owned_collection("comments", "comments", "post_id")
                .join_collection("tags", "tags", JoinTable::new("post_tag", "post_id", "tag_id")),
        )
    }

    #[test]
    fn classify_resolves_each_declared_kind() {
        let registry = registry();
        assert_eq!(
            registry.classify("post", "author").unwrap(),
            RelationKind::OwnedReference
        );
        assert_eq!(
            registry.classify("post", "summary").unwrap(),
            RelationKind::OwnedChild
        );
        assert_eq!(
            registry.classify("post", "comments").unwrap(),
            RelationKind::OwnedCollection
        );
        assert_eq!(
            registry.classify("post", "tags").unwrap(),
            RelationKind::JoinCollection
        );
    }

    #[test]
    fn classify_rejects_unknown_relation_and_entity() {
        let registry = registry();
        assert!(matches!(
            registry.classify("post", "likes").unwrap_err(),
            SyncError::UnknownRelation { relation, .. } if relation == "likes"
        ));
        assert!(matches!(
            registry.classify("user", "author").unwrap_err(),
            SyncError::UnknownEntityType(name) if name == "user"
        ));
    }

    #[test]
    fn only_owned_reference_runs_before_persist() {
        for kind in RelationKind::ALL {
            let expected = if kind == RelationKind::OwnedReference {
                Phase::PrePersist
            } else {
                Phase::PostPersist
            };
            assert_eq!(kind.phase(), expected, "{kind}");
        }
    }

    #[test]
    fn scope_columns_cover_keys_and_morph_type() {
        let join = JoinTable::new("labelables", "labelable_id", "label_id")
            .morph("labelable_type", "post");
        for column in ["id", "labelable_id", "label_id", "labelable_type"] {
            assert!(join.is_scope_column(column), "{column}");
        }
        assert!(!join.is_scope_column("position"));
        assert!(!JoinTable::new("post_tag", "post_id", "tag_id").is_scope_column("labelable_type"));
    }

    #[test]
    fn registry_loads_from_json_with_morph_scope() {
        let registry = SchemaRegistry::from_json_str(
            r#"{
                "video": {
                    "table": "videos",
                    "relations": {
                        "labels": {
                            "kind": "join_collection",
                            "related_table": "labels",
                            "join": {
                                "table": "labelables",
                                "parent_key": "labelable_id",
                                "related_key": "label_id",
                                "morph": {"type_column": "labelable_type", "type_value": "video"}
                            }
                        },
                        "channel": {
                            "kind": "owned_reference",
                            "related_table": "channels",
                            "foreign_key": "channel_id"
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        let labels = registry.relation("video", "labels").unwrap();
        assert_eq!(labels.kind(), RelationKind::JoinCollection);
        let join = labels.join().unwrap();
        assert_eq!(join.morph.as_ref().unwrap().type_value, "video");
        assert_eq!(
            registry.relation("video", "channel").unwrap().foreign_key(),
            Some("channel_id")
        );
        assert_eq!(registry.entity_types().collect::<Vec<_>>(), vec!["video"]);
    }
}
