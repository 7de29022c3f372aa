//! Scoped state of one save call.

use crate::error::{SyncError, SyncResult};
use crate::model::entity::RootEntity;
use crate::model::payload::RelationPayload;
use crate::schema::EntitySchema;
use crate::sync::SyncReport;

/// Root entity, its relation payload and the outcomes collected so far.
///
/// Created at the start of a save call and dropped when it returns, so the
/// payload never outlives the call.
#[derive(Debug)]
pub struct SyncContext<'a> {
    pub schema: &'a EntitySchema,
    pub root: RootEntity,
    pub payload: RelationPayload,
    pub report: SyncReport,
}

impl<'a> SyncContext<'a> {
    /// # Errors
    /// - `UnknownRelation` when a payload key is not declared in `schema`.
    /// - `Validation` when a payload key is also a plain attribute.
    pub fn new(
        schema: &'a EntitySchema,
        root: RootEntity,
        payload: RelationPayload,
    ) -> SyncResult<Self> {
        for relation in payload.keys() {
            if !schema.is_relation(relation) {
                return Err(SyncError::UnknownRelation {
                    entity_type: root.entity_type.clone(),
                    relation: relation.clone(),
                });
            }
            if root.attributes.contains_key(relation) {
                return Err(SyncError::Validation(format!(
                    "`{relation}` is given both as attribute and as relation"
                )));
            }
        }

        Ok(Self {
            schema,
            root,
            payload,
            report: SyncReport::new(),
        })
    }
}
