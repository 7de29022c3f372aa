//! Reloads the root row and its relations after a save.

use crate::error::SyncResult;
use crate::model::entity::{Attributes, Record, RowId};
use crate::schema::RelationDef;
use crate::store::Store;
use serde::Serialize;
use std::collections::HashMap;

/// Current persisted state of one relation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LoadedRelation {
    One(Option<Record>),
    Many(Vec<Record>),
    Linked(Vec<LinkedRecord>),
}

impl LoadedRelation {
    /// Ids of the loaded related rows, in load order.
    pub fn ids(&self) -> Vec<RowId> {
        match self {
            Self::One(record) => record.iter().map(|record| record.id).collect(),
            Self::Many(records) => records.iter().map(|record| record.id).collect(),
            Self::Linked(linked) => linked.iter().map(|linked| linked.record.id).collect(),
        }
    }
}

/// Related row plus the attributes of the association row linking it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedRecord {
    pub record: Record,
    pub link: Attributes,
}

pub struct RelationLoader<'a> {
    store: &'a dyn Store,
    position_column: &'a str,
}

impl<'a> RelationLoader<'a> {
    pub fn new(store: &'a dyn Store, position_column: &'a str) -> Self {
        Self {
            store,
            position_column,
        }
    }

    /// Loads one relation of `root`.
    ///
    /// Collections are ordered by the position column when the table has
    /// one, by id otherwise.
    pub fn load(&self, root: &Record, def: &RelationDef) -> SyncResult<LoadedRelation> {
        match def {
            RelationDef::OwnedReference {
                related_table,
                foreign_key,
            } => {
                let related = match root.get_i64(foreign_key) {
                    Some(id) => self.store.find_by_id(related_table, id)?,
                    None => None,
                };
                Ok(LoadedRelation::One(related))
            }
            RelationDef::OwnedChild {
                related_table,
                foreign_key,
            } => Ok(LoadedRelation::One(
                self.store
                    .find_where(related_table, foreign_key, root.id)?
                    .into_iter()
                    .next(),
            )),
            RelationDef::OwnedCollection {
                related_table,
                foreign_key,
            } => {
                let mut records = self.store.find_where(related_table, foreign_key, root.id)?;
                if self.store.has_column(related_table, self.position_column)? {
                    records.sort_by_key(|record| {
                        (
                            record.get_i64(self.position_column).unwrap_or(i64::MAX),
                            record.id,
                        )
                    });
                }
                Ok(LoadedRelation::Many(records))
            }
            RelationDef::JoinCollection {
                related_table,
                join,
            } => {
                let mut links = self.store.links(join, root.id)?;
                if self.store.has_column(&join.table, self.position_column)? {
                    links.sort_by_key(|link| {
                        (
                            link.attributes
                                .get(self.position_column)
                                .and_then(serde_json::Value::as_i64)
                                .unwrap_or(i64::MAX),
                            link.related_id,
                        )
                    });
                }

                let ids: Vec<RowId> = links.iter().map(|link| link.related_id).collect();
                let mut records: HashMap<RowId, Record> = self
                    .store
                    .find_by_ids(related_table, &ids)?
                    .into_iter()
                    .map(|record| (record.id, record))
                    .collect();

                Ok(LoadedRelation::Linked(
                    links
                        .into_iter()
                        .filter_map(|link| {
                            records.remove(&link.related_id).map(|record| LinkedRecord {
                                record,
                                link: link.attributes,
                            })
                        })
                        .collect(),
                ))
            }
        }
    }
}
