//! Core of the nested relational data synchronizer.
//! Saves a root entity and converges its declared relations in one call.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod schema;
pub mod store;
pub mod sync;

pub use config::{LoggingConfig, SyncConfig, DEFAULT_POSITION_COLUMN};
pub use db::{open_db, open_db_in_memory, DbError, DbResult, Migration};
pub use error::{SyncError, SyncResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::entity::{Attributes, Record, RootEntity, RowId, PRIMARY_KEY};
pub use model::payload::{Action, ActionBundle, ItemPayload, RelationData, RelationPayload};
pub use schema::{EntitySchema, JoinTable, MorphScope, Phase, RelationDef, RelationKind, SchemaRegistry};
pub use store::{Link, LinkChanges, SqliteStore, Store, StoreError, StoreResult};
pub use sync::dispatcher::Dispatcher;
pub use sync::loader::{LinkedRecord, LoadedRelation};
pub use sync::service::{RelationSyncService, SavedEntity};
pub use sync::{RelationOutcome, SyncReport, Synchronizer};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
