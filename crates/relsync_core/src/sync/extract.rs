//! Payload extractor: plain attributes vs. relation payload.

use crate::error::SyncResult;
use crate::model::entity::Attributes;
use crate::model::payload::{RelationData, RelationPayload};
use crate::schema::EntitySchema;

/// Moves every field named like a declared relation into the payload.
///
/// Keys are matched verbatim; callers normalize case beforehand.
pub fn extract(
    schema: &EntitySchema,
    fields: Attributes,
) -> SyncResult<(Attributes, RelationPayload)> {
    let mut attributes = Attributes::new();
    let mut payload = RelationPayload::new();
    for (key, value) in fields {
        if schema.is_relation(&key) {
            let data = RelationData::from_value(&key, value)?;
            payload.insert(key, data);
        } else {
            attributes.insert(key, value);
        }
    }
    Ok((attributes, payload))
}
