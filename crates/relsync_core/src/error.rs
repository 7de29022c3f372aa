//! Error model for relation synchronization.
//!
//! # Invariants
//! - Synchronizers never swallow an error; the first one ends the save call.
//! - Missing rows surface as `NotFound`, whether detected by a synchronizer
//!   or reported by the store.

use crate::model::entity::RowId;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug)]
pub enum SyncError {
    /// Entity type has no registered schema.
    UnknownEntityType(String),
    /// Relation name is not declared for the entity type.
    UnknownRelation {
        entity_type: String,
        relation: String,
    },
    /// Payload shape is malformed or not accepted by the relation kind.
    Validation(String),
    /// Referenced ids do not resolve to rows.
    NotFound { table: String, ids: Vec<RowId> },
    /// A post-persist relation ran before the root had an id.
    RootNotPersisted { relation: String },
    /// Underlying store operation failed.
    Persistence(StoreError),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownEntityType(name) => write!(f, "unknown entity type `{name}`"),
            Self::UnknownRelation {
                entity_type,
                relation,
            } => write!(
                f,
                "relation `{relation}` is not declared for entity type `{entity_type}`"
            ),
            Self::Validation(message) => write!(f, "invalid relation payload: {message}"),
            Self::NotFound { table, ids } => {
                write!(f, "rows not found in `{table}`: {ids:?}")
            }
            Self::RootNotPersisted { relation } => write!(
                f,
                "relation `{relation}` requires a persisted root entity"
            ),
            Self::Persistence(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Persistence(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { table, id } => Self::NotFound {
                table,
                ids: vec![id],
            },
            other => Self::Persistence(other),
        }
    }
}
