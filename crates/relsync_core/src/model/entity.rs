//! Row and root-entity shapes.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Integer primary key of every synchronized table.
pub type RowId = i64;

/// Column name → value map for one row.
pub type Attributes = serde_json::Map<String, Value>;

/// Primary key column shared by root, related and join-linked tables.
pub const PRIMARY_KEY: &str = "id";

/// One persisted row as returned by a [`crate::store::Store`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RowId,
    /// Every column of the row, `id` included.
    pub attributes: Attributes,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    /// Reads an integer column, `None` for null, missing or non-integer values.
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }
}

/// Entity being saved: a type name, an optional id and raw fields.
///
/// Raw fields may still contain relation payload entries; the extractor
/// splits them off before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub struct RootEntity {
    pub entity_type: String,
    /// `None` until the root row has been created.
    pub id: Option<RowId>,
    pub attributes: Attributes,
}

impl RootEntity {
    /// Describes a root row that does not exist yet.
    pub fn new(entity_type: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: None,
            attributes,
        }
    }

    /// Describes an already persisted root row.
    pub fn existing(entity_type: impl Into<String>, id: RowId, attributes: Attributes) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: Some(id),
            attributes,
        }
    }

    /// Builds a root entity from a JSON object; an integer `id` key marks an
    /// existing row and is removed from the attributes.
    pub fn from_json(entity_type: impl Into<String>, value: Value) -> SyncResult<Self> {
        let Value::Object(mut attributes) = value else {
            return Err(SyncError::Validation(
                "root entity payload must be an object".to_string(),
            ));
        };

        let id = match attributes.remove(PRIMARY_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::Number(number)) => Some(number.as_i64().ok_or_else(|| {
                SyncError::Validation(format!("root id `{number}` is not an integer"))
            })?),
            Some(other) => {
                return Err(SyncError::Validation(format!(
                    "root id must be an integer, got `{other}`"
                )))
            }
        };

        Ok(Self {
            entity_type: entity_type.into(),
            id,
            attributes,
        })
    }
}
