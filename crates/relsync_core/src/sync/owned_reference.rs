//! To-one relation whose foreign key lives on the root row.
//!
//! Runs before the root is persisted: the resolved id rides along with the
//! root's own create/update as a plain attribute.

use crate::error::{SyncError, SyncResult};
use crate::model::entity::RootEntity;
use crate::model::payload::RelationData;
use crate::schema::{RelationDef, RelationKind};
use crate::store::Store;
use crate::sync::{ensure_rows_exist, foreign_key_parts, unsupported_shape, RelationOutcome, Synchronizer};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default)]
pub struct OwnedReferenceSync;

impl Synchronizer for OwnedReferenceSync {
    fn kind(&self) -> RelationKind {
        RelationKind::OwnedReference
    }

    /// Accepts `null`, a raw id, or an object whose `id` is the target.
    ///
    /// A non-null target must exist in the related table.
    fn synchronize(
        &self,
        store: &dyn Store,
        root: &mut RootEntity,
        relation: &str,
        def: &RelationDef,
        data: &RelationData,
    ) -> SyncResult<RelationOutcome> {
        let (related_table, foreign_key) = foreign_key_parts(relation, def)?;
        let target = match data {
            RelationData::Scalar(id) => *id,
            RelationData::Single(item) if item.id.is_some() || item.fields.is_empty() => item.id,
            RelationData::Single(_) => {
                return Err(SyncError::Validation(format!(
                    "relation `{relation}` references an existing row and needs an `id`"
                )))
            }
            other => return Err(unsupported_shape(relation, self.kind(), other)),
        };

        if let Some(id) = target {
            ensure_rows_exist(store, related_table, &[id])?;
        }

        root.attributes.insert(
            foreign_key.to_string(),
            target.map_or(Value::Null, Value::from),
        );
        Ok(RelationOutcome::default())
    }
}
