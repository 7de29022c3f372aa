//! To-one relation whose foreign key lives on the related row.

use crate::error::SyncResult;
use crate::model::entity::RootEntity;
use crate::model::payload::RelationData;
use crate::schema::{RelationDef, RelationKind};
use crate::store::Store;
use crate::sync::{foreign_key_parts, persisted_root_id, unsupported_shape, RelationOutcome, Synchronizer};
use log::debug;
use serde_json::Value;

/// Four-state machine over (child exists, desired state given).
///
/// | existing | desired | action |
/// |---|---|---|
/// | absent | absent | none |
/// | present | absent | delete child |
/// | absent | present | create child linked to root |
/// | present | present | update child in place |
///
/// The foreign key is never taken from the payload; the child stays with
/// the root.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnedChildSync;

impl Synchronizer for OwnedChildSync {
    fn kind(&self) -> RelationKind {
        RelationKind::OwnedChild
    }

    fn synchronize(
        &self,
        store: &dyn Store,
        root: &mut RootEntity,
        relation: &str,
        def: &RelationDef,
        data: &RelationData,
    ) -> SyncResult<RelationOutcome> {
        let (related_table, foreign_key) = foreign_key_parts(relation, def)?;
        let root_id = persisted_root_id(root, relation)?;
        let desired = match data {
            RelationData::Scalar(None) => None,
            RelationData::Single(item) => Some(item),
            other => return Err(unsupported_shape(relation, self.kind(), other)),
        };

        let existing = store
            .find_where(related_table, foreign_key, root_id)?
            .into_iter()
            .next();

        let mut outcome = RelationOutcome::default();
        match (existing, desired) {
            (None, None) => {}
            (Some(child), None) => {
                store.delete_by_id(related_table, child.id)?;
                outcome.deleted = 1;
            }
            (None, Some(item)) => {
                let id = store.create(related_table, &item.fields_with(foreign_key, Value::from(root_id)))?;
                debug!("event=child_create module=sync status=ok relation={relation} id={id}");
                outcome.created = 1;
            }
            (Some(child), Some(item)) => {
                let mut fields = item.fields.clone();
                fields.remove(foreign_key);
                if !fields.is_empty() {
                    store.update_by_id(related_table, child.id, &fields)?;
                    outcome.updated = 1;
                }
            }
        }
        Ok(outcome)
    }
}
