//! Save orchestration for one root entity and its nested relations.
//!
//! # Responsibility
//! - Run `pre-persist → persist root → post-persist` for one save call.
//! - Reload the root row and every relation named in the payload.
//!
//! # Invariants
//! - The relation payload is owned by the call's `SyncContext` and dropped
//!   when the call returns, on success and on error.
//! - No transaction is opened here; wrap the store in one for atomicity.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::model::entity::{Attributes, RootEntity, RowId};
use crate::model::payload::RelationPayload;
use crate::schema::{EntitySchema, Phase, SchemaRegistry};
use crate::store::Store;
use crate::sync::context::SyncContext;
use crate::sync::dispatcher::Dispatcher;
use crate::sync::extract::extract;
use crate::sync::loader::{LoadedRelation, RelationLoader};
use crate::sync::SyncReport;
use log::{error, info};
use std::collections::BTreeMap;
use std::time::Instant;

/// Composed result of a save or load.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedEntity {
    pub id: RowId,
    /// Every column of the reloaded root row.
    pub attributes: Attributes,
    pub relations: BTreeMap<String, LoadedRelation>,
    /// Per-relation write counts; empty for plain loads.
    pub report: SyncReport,
}

impl SavedEntity {
    pub fn relation(&self, name: &str) -> Option<&LoadedRelation> {
        self.relations.get(name)
    }
}

/// Save facade over a store, a schema registry and a dispatcher.
pub struct RelationSyncService<S: Store> {
    store: S,
    registry: SchemaRegistry,
    dispatcher: Dispatcher,
    config: SyncConfig,
}

impl<S: Store> RelationSyncService<S> {
    pub fn new(store: S, registry: SchemaRegistry) -> Self {
        Self::with_config(store, registry, SyncConfig::default())
    }

    pub fn with_config(store: S, registry: SchemaRegistry, config: SyncConfig) -> Self {
        Self {
            store,
            registry,
            dispatcher: Dispatcher::new(&config),
            config,
        }
    }

    /// Replaces the default dispatcher.
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Saves `entity`, treating fields named like declared relations as
    /// relation payload.
    pub fn save(&self, entity: RootEntity) -> SyncResult<SavedEntity> {
        let schema = self.registry.entity(&entity.entity_type)?;
        let RootEntity {
            entity_type,
            id,
            attributes,
        } = entity;
        let (attributes, payload) = extract(schema, attributes)?;
        self.run(
            schema,
            RootEntity {
                entity_type,
                id,
                attributes,
            },
            payload,
        )
    }

    /// Saves `entity` with an already parsed relation payload.
    ///
    /// # Errors
    /// - `UnknownRelation` for payload keys the entity type does not declare.
    pub fn save_with_relations(
        &self,
        entity: RootEntity,
        relations: RelationPayload,
    ) -> SyncResult<SavedEntity> {
        let schema = self.registry.entity(&entity.entity_type)?;
        self.run(schema, entity, relations)
    }

    /// Loads a root row and the named relations.
    pub fn load(&self, entity_type: &str, id: RowId, relations: &[&str]) -> SyncResult<SavedEntity> {
        let schema = self.registry.entity(entity_type)?;
        for relation in relations {
            self.registry.relation(entity_type, relation)?;
        }
        self.compose(schema, id, relations.iter().copied(), SyncReport::new())
    }

    fn run(
        &self,
        schema: &EntitySchema,
        root: RootEntity,
        payload: RelationPayload,
    ) -> SyncResult<SavedEntity> {
        let started_at = Instant::now();
        let entity_type = root.entity_type.clone();
        let mode = if root.id.is_some() { "update" } else { "create" };

        let result = self.run_phases(schema, root, payload);
        match &result {
            Ok(saved) => info!(
                "event=entity_save module=sync status=ok entity={} id={} mode={} relations={} duration_ms={}",
                entity_type,
                saved.id,
                mode,
                saved.report.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=entity_save module=sync status=error entity={} mode={} duration_ms={} error={}",
                entity_type,
                mode,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    fn run_phases(
        &self,
        schema: &EntitySchema,
        root: RootEntity,
        payload: RelationPayload,
    ) -> SyncResult<SavedEntity> {
        let mut ctx = SyncContext::new(schema, root, payload)?;

        self.dispatcher
            .run_phase(Phase::PrePersist, &self.store, &mut ctx)?;
        let id = self.persist_root(schema, &ctx.root)?;
        ctx.root.id = Some(id);
        self.dispatcher
            .run_phase(Phase::PostPersist, &self.store, &mut ctx)?;

        let SyncContext {
            payload, report, ..
        } = ctx;
        self.compose(schema, id, payload.keys().map(String::as_str), report)
    }

    fn persist_root(&self, schema: &EntitySchema, root: &RootEntity) -> SyncResult<RowId> {
        match root.id {
            Some(id) => {
                self.store.update_by_id(&schema.table, id, &root.attributes)?;
                Ok(id)
            }
            None => Ok(self.store.create(&schema.table, &root.attributes)?),
        }
    }

    fn compose<'r>(
        &self,
        schema: &EntitySchema,
        id: RowId,
        relations: impl Iterator<Item = &'r str>,
        report: SyncReport,
    ) -> SyncResult<SavedEntity> {
        let root = self
            .store
            .find_by_id(&schema.table, id)?
            .ok_or_else(|| SyncError::NotFound {
                table: schema.table.clone(),
                ids: vec![id],
            })?;

        let loader = RelationLoader::new(&self.store, &self.config.position_column);
        let mut loaded = BTreeMap::new();
        for relation in relations {
            if let Some(def) = schema.get(relation) {
                loaded.insert(relation.to_string(), loader.load(&root, def)?);
            }
        }

        Ok(SavedEntity {
            id,
            attributes: root.attributes,
            relations: loaded,
            report,
        })
    }
}
