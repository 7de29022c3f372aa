//! Many-to-many relation through association rows, optionally morph-scoped.
//!
//! # Invariants
//! - Exactly one path runs per call: the first of attach, detach, update
//!   present in the bundle, or full sync for a plain list.
//! - Related rows are never created, updated or deleted here; only links.
//! - Attach never duplicates an existing link.

use crate::error::{SyncError, SyncResult};
use crate::model::entity::{RootEntity, RowId};
use crate::model::payload::{item_ids, last_occurrences, Action, ItemPayload, RelationData};
use crate::schema::{JoinTable, RelationDef, RelationKind};
use crate::store::{Link, LinkChanges, Store};
use crate::sync::{ensure_rows_exist, persisted_root_id, unsupported_shape, RelationOutcome, Synchronizer};
use serde_json::Value;
use std::collections::HashSet;

const ACTION_PRIORITY: [Action; 3] = [Action::Attach, Action::Detach, Action::Update];

#[derive(Debug, Clone)]
pub struct JoinCollectionSync {
    position_column: String,
}

impl JoinCollectionSync {
    pub fn new(position_column: impl Into<String>) -> Self {
        Self {
            position_column: position_column.into(),
        }
    }
}

impl Synchronizer for JoinCollectionSync {
    fn kind(&self) -> RelationKind {
        RelationKind::JoinCollection
    }

    fn synchronize(
        &self,
        store: &dyn Store,
        root: &mut RootEntity,
        relation: &str,
        def: &RelationDef,
        data: &RelationData,
    ) -> SyncResult<RelationOutcome> {
        let RelationDef::JoinCollection {
            related_table,
            join,
        } = def
        else {
            return Err(SyncError::Validation(format!(
                "relation `{relation}` is a {} and has no join table",
                def.kind()
            )));
        };
        let root_id = persisted_root_id(root, relation)?;

        match data {
            RelationData::Scalar(None) => Ok(RelationOutcome::default()),
            RelationData::Actions(bundle) => match bundle.first_of(&ACTION_PRIORITY) {
                Some((Action::Attach, items)) => {
                    let links = links_from(relation, items, None)?;
                    attach(store, related_table, join, root_id, links)
                }
                Some((Action::Detach, items)) => {
                    let detached = store.detach(join, root_id, &item_ids(items))?;
                    Ok(RelationOutcome {
                        detached,
                        ..RelationOutcome::default()
                    })
                }
                Some((_, items)) => {
                    let links = links_from(relation, items, None)?;
                    ensure_rows_exist(store, related_table, &related_ids(&links))?;
                    let changes = store.sync_without_detaching(join, root_id, &links)?;
                    Ok(outcome_of(&changes))
                }
                None => Err(SyncError::Validation(format!(
                    "relation `{relation}` ({}) supports only attach|detach|update actions",
                    self.kind()
                ))),
            },
            RelationData::FullList(items) => {
                let position = store
                    .has_column(&join.table, &self.position_column)?
                    .then_some(self.position_column.as_str());
                let links = links_from(relation, items, position)?;
                ensure_rows_exist(store, related_table, &related_ids(&links))?;
                let changes = store.sync(join, root_id, &links)?;
                Ok(outcome_of(&changes))
            }
            other => Err(unsupported_shape(relation, self.kind(), other)),
        }
    }
}

/// Links the ids not linked yet; already linked ids are left untouched.
fn attach(
    store: &dyn Store,
    related_table: &str,
    join: &JoinTable,
    root_id: RowId,
    links: Vec<Link>,
) -> SyncResult<RelationOutcome> {
    let already: HashSet<RowId> = store
        .linked_ids(join, root_id, &related_ids(&links))?
        .into_iter()
        .collect();
    let fresh: Vec<Link> = links
        .into_iter()
        .filter(|link| !already.contains(&link.related_id))
        .collect();
    ensure_rows_exist(store, related_table, &related_ids(&fresh))?;

    let attached = store.attach(join, root_id, &fresh)?;
    Ok(RelationOutcome {
        attached,
        ..RelationOutcome::default()
    })
}

/// Builds one link per distinct id; non-id fields become link attributes.
fn links_from(
    relation: &str,
    items: &[ItemPayload],
    position_column: Option<&str>,
) -> SyncResult<Vec<Link>> {
    last_occurrences(items)
        .into_iter()
        .map(|(index, item)| {
            let related_id = item.id.ok_or_else(|| {
                SyncError::Validation(format!(
                    "relation `{relation}` links existing rows; item {index} has no `id`"
                ))
            })?;
            let attributes = match position_column {
                Some(column) => item.fields_with(column, Value::from(index)),
                None => item.fields.clone(),
            };
            Ok(Link::new(related_id, attributes))
        })
        .collect()
}

fn related_ids(links: &[Link]) -> Vec<RowId> {
    links.iter().map(|link| link.related_id).collect()
}

fn outcome_of(changes: &LinkChanges) -> RelationOutcome {
    RelationOutcome {
        attached: changes.attached.len(),
        detached: changes.detached.len(),
        updated: changes.updated.len(),
        ..RelationOutcome::default()
    }
}
