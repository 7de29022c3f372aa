//! To-many relation whose foreign key lives on the related rows.
//!
//! # Invariants
//! - Exactly one path runs per call: the first of delete, detach, attach,
//!   add present in the bundle, or full replace for a plain list.
//! - `delete`/`detach` only touch rows currently related to the root.
//! - Full replace checks every referenced id before the first write.

use crate::error::{SyncError, SyncResult};
use crate::model::entity::{Attributes, RootEntity, RowId};
use crate::model::payload::{item_ids, last_occurrences, Action, ItemPayload, RelationData};
use crate::schema::{RelationDef, RelationKind};
use crate::store::Store;
use crate::sync::{foreign_key_parts, persisted_root_id, unsupported_shape, RelationOutcome, Synchronizer};
use serde_json::Value;
use std::collections::HashSet;

const ACTION_PRIORITY: [Action; 4] = [Action::Delete, Action::Detach, Action::Attach, Action::Add];

#[derive(Debug, Clone)]
pub struct OwnedCollectionSync {
    position_column: String,
}

impl OwnedCollectionSync {
    pub fn new(position_column: impl Into<String>) -> Self {
        Self {
            position_column: position_column.into(),
        }
    }
}

/// Borrowed view of one collection relation of one persisted root.
struct Collection<'a> {
    store: &'a dyn Store,
    table: &'a str,
    foreign_key: &'a str,
    root_id: RowId,
}

impl Synchronizer for OwnedCollectionSync {
    fn kind(&self) -> RelationKind {
        RelationKind::OwnedCollection
    }

    fn synchronize(
        &self,
        store: &dyn Store,
        root: &mut RootEntity,
        relation: &str,
        def: &RelationDef,
        data: &RelationData,
    ) -> SyncResult<RelationOutcome> {
        let (table, foreign_key) = foreign_key_parts(relation, def)?;
        let collection = Collection {
            store,
            table,
            foreign_key,
            root_id: persisted_root_id(root, relation)?,
        };

        match data {
            RelationData::Scalar(None) => Ok(RelationOutcome::default()),
            RelationData::Actions(bundle) => match bundle.first_of(&ACTION_PRIORITY) {
                Some((Action::Delete, items)) => collection.delete(items),
                Some((Action::Detach, items)) => collection.detach(items),
                Some((Action::Attach, items)) => collection.attach(&item_ids(items)),
                Some((_, items)) => collection.add(items),
                None => Err(SyncError::Validation(format!(
                    "relation `{relation}` ({}) supports only delete|detach|attach|add actions",
                    self.kind()
                ))),
            },
            RelationData::FullList(items) => collection.replace(items, &self.position_column),
            other => Err(unsupported_shape(relation, self.kind(), other)),
        }
    }
}

impl Collection<'_> {
    fn current_ids(&self) -> SyncResult<HashSet<RowId>> {
        Ok(self
            .store
            .find_where(self.table, self.foreign_key, self.root_id)?
            .into_iter()
            .map(|record| record.id)
            .collect())
    }

    /// Listed ids that currently belong to the root.
    fn owned_subset(&self, items: &[ItemPayload]) -> SyncResult<Vec<RowId>> {
        let current = self.current_ids()?;
        Ok(item_ids(items)
            .into_iter()
            .filter(|id| current.contains(id))
            .collect())
    }

    /// Item fields without the foreign key; ownership is never taken from
    /// the payload.
    fn writable_fields(&self, item: &ItemPayload) -> Attributes {
        let mut fields = item.fields.clone();
        fields.remove(self.foreign_key);
        fields
    }

    fn foreign_key_value(&self, value: Value) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(self.foreign_key.to_string(), value);
        attributes
    }

    fn delete(&self, items: &[ItemPayload]) -> SyncResult<RelationOutcome> {
        let targets = self.owned_subset(items)?;
        let deleted = self.store.delete_where_id_in(self.table, &targets)?;
        Ok(RelationOutcome {
            deleted,
            ..RelationOutcome::default()
        })
    }

    fn detach(&self, items: &[ItemPayload]) -> SyncResult<RelationOutcome> {
        let targets = self.owned_subset(items)?;
        let detached = self.store.update_where_id_in(
            self.table,
            &targets,
            &self.foreign_key_value(Value::Null),
        )?;
        Ok(RelationOutcome {
            detached,
            ..RelationOutcome::default()
        })
    }

    /// Rows in `ids` that exist but are not linked to the root yet.
    fn unlinked_rows(&self, ids: &[RowId]) -> SyncResult<Vec<RowId>> {
        let records = self.store.find_by_ids(self.table, ids)?;
        let found: HashSet<RowId> = records.iter().map(|record| record.id).collect();
        let missing: Vec<RowId> = ids.iter().copied().filter(|id| !found.contains(id)).collect();
        if !missing.is_empty() {
            return Err(SyncError::NotFound {
                table: self.table.to_string(),
                ids: missing,
            });
        }

        Ok(records
            .into_iter()
            .filter(|record| record.get_i64(self.foreign_key) != Some(self.root_id))
            .map(|record| record.id)
            .collect())
    }

    fn link(&self, ids: &[RowId]) -> SyncResult<usize> {
        Ok(self.store.update_where_id_in(
            self.table,
            ids,
            &self.foreign_key_value(Value::from(self.root_id)),
        )?)
    }

    fn attach(&self, ids: &[RowId]) -> SyncResult<RelationOutcome> {
        let targets = self.unlinked_rows(ids)?;
        Ok(RelationOutcome {
            attached: self.link(&targets)?,
            ..RelationOutcome::default()
        })
    }

    /// Creates id-less items and links the others, after checking the ids.
    fn add(&self, items: &[ItemPayload]) -> SyncResult<RelationOutcome> {
        let targets = self.unlinked_rows(&item_ids(items))?;

        let mut outcome = RelationOutcome::default();
        for item in items.iter().filter(|item| item.id.is_none()) {
            self.store.create(
                self.table,
                &item.fields_with(self.foreign_key, Value::from(self.root_id)),
            )?;
            outcome.created += 1;
        }
        outcome.attached = self.link(&targets)?;
        Ok(outcome)
    }

    /// Makes the related set exactly the listed rows.
    fn replace(&self, items: &[ItemPayload], position_column: &str) -> SyncResult<RelationOutcome> {
        let current = self.current_ids()?;
        let listed = item_ids(items);

        let foreign: Vec<RowId> = listed
            .iter()
            .copied()
            .filter(|id| !current.contains(id))
            .collect();
        if !foreign.is_empty() {
            return Err(SyncError::NotFound {
                table: self.table.to_string(),
                ids: foreign,
            });
        }

        let mut outcome = RelationOutcome::default();
        let keep: HashSet<RowId> = listed.into_iter().collect();
        let mut stale: Vec<RowId> = current
            .into_iter()
            .filter(|id| !keep.contains(id))
            .collect();
        stale.sort_unstable();
        outcome.deleted = self.store.delete_where_id_in(self.table, &stale)?;

        let positioned = self.store.has_column(self.table, position_column)?;
        let desired: Vec<(Option<RowId>, Attributes)> = last_occurrences(items)
            .into_iter()
            .map(|(index, item)| {
                let mut fields = self.writable_fields(item);
                if positioned {
                    fields.insert(position_column.to_string(), Value::from(index));
                }
                (item.id, fields)
            })
            .collect();

        for (id, fields) in &desired {
            if let Some(id) = id {
                if !fields.is_empty() {
                    self.store.update_by_id(self.table, *id, fields)?;
                    outcome.updated += 1;
                }
            }
        }

        for (_, fields) in desired.iter().filter(|(id, _)| id.is_none()) {
            let mut fields = fields.clone();
            fields.insert(self.foreign_key.to_string(), Value::from(self.root_id));
            self.store.create(self.table, &fields)?;
            outcome.created += 1;
        }

        Ok(outcome)
    }
}
