//! Relation synchronization: extraction, per-kind synchronizers, dispatch.
//!
//! # Responsibility
//! - Split raw root fields into plain attributes and relation payload.
//! - Converge each relation to its desired state with one synchronizer per
//!   [`RelationKind`], in the phase that kind belongs to.
//! - Orchestrate one save call and reload the composed result.
//!
//! # Invariants
//! - Synchronizers run sequentially, in payload key order.
//! - Post-persist synchronizers only run once the root has an id.
//! - Errors propagate immediately; nothing is retried.

use crate::error::{SyncError, SyncResult};
use crate::model::entity::{RootEntity, RowId};
use crate::model::payload::RelationData;
use crate::schema::{RelationDef, RelationKind};
use crate::store::Store;
use std::collections::{BTreeMap, HashSet};

pub mod context;
pub mod dispatcher;
pub mod extract;
pub mod join_collection;
pub mod loader;
pub mod owned_child;
pub mod owned_collection;
pub mod owned_reference;
pub mod service;

/// Row-level effect of synchronizing one relation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationOutcome {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub attached: usize,
    pub detached: usize,
}

impl RelationOutcome {
    /// Total number of row writes.
    pub fn mutations(&self) -> usize {
        self.created + self.updated + self.deleted + self.attached + self.detached
    }

    pub fn is_unchanged(&self) -> bool {
        self.mutations() == 0
    }
}

/// Relation name → outcome for one save call.
pub type SyncReport = BTreeMap<String, RelationOutcome>;

/// One synchronization algorithm, bound to one relation kind.
pub trait Synchronizer {
    fn kind(&self) -> RelationKind;

    /// Converges `relation` of `root` to `data`.
    fn synchronize(
        &self,
        store: &dyn Store,
        root: &mut RootEntity,
        relation: &str,
        def: &RelationDef,
        data: &RelationData,
    ) -> SyncResult<RelationOutcome>;
}

/// Id of the persisted root, required by every post-persist synchronizer.
pub(crate) fn persisted_root_id(root: &RootEntity, relation: &str) -> SyncResult<RowId> {
    root.id.ok_or_else(|| SyncError::RootNotPersisted {
        relation: relation.to_string(),
    })
}

/// Related table and foreign key of a foreign-key relation.
pub(crate) fn foreign_key_parts<'a>(
    relation: &str,
    def: &'a RelationDef,
) -> SyncResult<(&'a str, &'a str)> {
    def.foreign_key()
        .map(|foreign_key| (def.related_table(), foreign_key))
        .ok_or_else(|| {
            SyncError::Validation(format!(
                "relation `{relation}` is a {} and has no foreign key",
                def.kind()
            ))
        })
}

/// Fails with `NotFound` when any of `ids` is missing from `table`.
pub(crate) fn ensure_rows_exist(store: &dyn Store, table: &str, ids: &[RowId]) -> SyncResult<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let found: HashSet<RowId> = store
        .find_by_ids(table, ids)?
        .into_iter()
        .map(|record| record.id)
        .collect();
    let missing: Vec<RowId> = ids
        .iter()
        .copied()
        .filter(|id| !found.contains(id))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SyncError::NotFound {
            table: table.to_string(),
            ids: missing,
        })
    }
}

pub(crate) fn unsupported_shape(relation: &str, kind: RelationKind, data: &RelationData) -> SyncError {
    SyncError::Validation(format!(
        "relation `{relation}` ({kind}) does not accept a {} payload",
        data.shape()
    ))
}
