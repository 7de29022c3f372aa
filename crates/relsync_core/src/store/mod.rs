//! Persistence collaborator contract used by the synchronizers.
//!
//! # Responsibility
//! - Define the CRUD, lookup, introspection and join-table primitives the
//!   synchronizers need, independent of any storage engine.
//! - Provide `sync`/`sync_without_detaching` on top of the join primitives.
//!
//! # Invariants
//! - Implementations never open transactions on their own; atomicity across
//!   one save call belongs to the caller.
//! - `update_by_id`/`delete_by_id` report missing rows as `NotFound`.
//! - Link lists returned by `links` never contain the parent, related or
//!   morph type columns in their attributes.

use crate::db::DbError;
use crate::model::entity::{Attributes, Record, RowId};
use crate::schema::JoinTable;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod sqlite;

pub use sqlite::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    /// Table or column name outside `[A-Za-z_][A-Za-z0-9_]*`.
    InvalidIdentifier(String),
    NotFound {
        table: String,
        id: RowId,
    },
    /// Persisted data cannot be read back as a record.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidIdentifier(name) => write!(f, "invalid sql identifier `{name}`"),
            Self::NotFound { table, id } => write!(f, "row {id} not found in `{table}`"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidIdentifier(_) => None,
            Self::NotFound { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One association row: related id plus extra join attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Link {
    pub related_id: RowId,
    pub attributes: Attributes,
}

impl Link {
    pub fn new(related_id: RowId, attributes: Attributes) -> Self {
        Self {
            related_id,
            attributes,
        }
    }
}

/// Related ids touched by a join sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkChanges {
    pub attached: Vec<RowId>,
    pub detached: Vec<RowId>,
    pub updated: Vec<RowId>,
}

/// Storage operations required by the synchronizers.
pub trait Store {
    /// Inserts one row and returns its id.
    fn create(&self, table: &str, attributes: &Attributes) -> StoreResult<RowId>;
    /// Updates one row; empty `attributes` only checks existence.
    fn update_by_id(&self, table: &str, id: RowId, attributes: &Attributes) -> StoreResult<()>;
    /// Applies the same attributes to every listed row; returns rows changed.
    fn update_where_id_in(
        &self,
        table: &str,
        ids: &[RowId],
        attributes: &Attributes,
    ) -> StoreResult<usize>;
    fn delete_by_id(&self, table: &str, id: RowId) -> StoreResult<()>;
    /// Deletes every listed row that exists; returns rows deleted.
    fn delete_where_id_in(&self, table: &str, ids: &[RowId]) -> StoreResult<usize>;
    /// Rows whose id is listed, ordered by id. Missing ids are skipped.
    fn find_by_ids(&self, table: &str, ids: &[RowId]) -> StoreResult<Vec<Record>>;
    /// Rows whose `column` equals `value`, ordered by id.
    fn find_where(&self, table: &str, column: &str, value: RowId) -> StoreResult<Vec<Record>>;
    fn has_column(&self, table: &str, column: &str) -> StoreResult<bool>;

    /// Subset of `candidates` already linked to `parent_id`.
    fn linked_ids(
        &self,
        join: &JoinTable,
        parent_id: RowId,
        candidates: &[RowId],
    ) -> StoreResult<Vec<RowId>>;
    /// Every link of `parent_id`, ordered by related id.
    fn links(&self, join: &JoinTable, parent_id: RowId) -> StoreResult<Vec<Link>>;
    /// Inserts association rows; returns rows inserted.
    fn attach(&self, join: &JoinTable, parent_id: RowId, links: &[Link]) -> StoreResult<usize>;
    /// Deletes association rows for `related_ids`; returns rows deleted.
    fn detach(&self, join: &JoinTable, parent_id: RowId, related_ids: &[RowId])
        -> StoreResult<usize>;
    /// Rewrites attributes of one association row; `false` when not linked.
    fn update_link(&self, join: &JoinTable, parent_id: RowId, link: &Link) -> StoreResult<bool>;

    fn find_by_id(&self, table: &str, id: RowId) -> StoreResult<Option<Record>> {
        Ok(self.find_by_ids(table, &[id])?.into_iter().next())
    }

    /// Makes the links of `parent_id` exactly `links`.
    fn sync(&self, join: &JoinTable, parent_id: RowId, links: &[Link]) -> StoreResult<LinkChanges> {
        let current = self.links(join, parent_id)?;
        let desired: HashSet<RowId> = links.iter().map(|link| link.related_id).collect();
        let stale: Vec<RowId> = current
            .iter()
            .map(|link| link.related_id)
            .filter(|id| !desired.contains(id))
            .collect();

        if !stale.is_empty() {
            self.detach(join, parent_id, &stale)?;
        }

        let mut changes = merge_links(self, join, parent_id, &current, links)?;
        changes.detached = stale;
        Ok(changes)
    }

    /// Links missing ids and refreshes attributes of linked ones; other
    /// links are left alone.
    fn sync_without_detaching(
        &self,
        join: &JoinTable,
        parent_id: RowId,
        links: &[Link],
    ) -> StoreResult<LinkChanges> {
        let current = self.links(join, parent_id)?;
        merge_links(self, join, parent_id, &current, links)
    }
}

fn merge_links<S: Store + ?Sized>(
    store: &S,
    join: &JoinTable,
    parent_id: RowId,
    current: &[Link],
    desired: &[Link],
) -> StoreResult<LinkChanges> {
    let current: HashMap<RowId, &Attributes> = current
        .iter()
        .map(|link| (link.related_id, &link.attributes))
        .collect();

    let mut changes = LinkChanges::default();
    let mut fresh = Vec::new();
    for link in desired {
        match current.get(&link.related_id) {
            Some(existing) => {
                let dirty = link.attributes.iter().any(|(column, value)| {
                    !join.is_scope_column(column) && existing.get(column) != Some(value)
                });
                if dirty && store.update_link(join, parent_id, link)? {
                    changes.updated.push(link.related_id);
                }
            }
            None => fresh.push(link.clone()),
        }
    }

    if !fresh.is_empty() {
        store.attach(join, parent_id, &fresh)?;
        changes.attached = fresh.iter().map(|link| link.related_id).collect();
    }
    Ok(changes)
}
