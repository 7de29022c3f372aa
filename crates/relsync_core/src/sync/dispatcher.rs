//! Phase-filtered dispatch of relation payloads to kind synchronizers.
//!
//! # Invariants
//! - A phase only runs relations whose kind maps to it; others are skipped
//!   silently and picked up by the other phase.
//! - Relations run one at a time in payload key order; the first error stops
//!   the phase.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::schema::{Phase, RelationKind};
use crate::store::Store;
use crate::sync::context::SyncContext;
use crate::sync::join_collection::JoinCollectionSync;
use crate::sync::owned_child::OwnedChildSync;
use crate::sync::owned_collection::OwnedCollectionSync;
use crate::sync::owned_reference::OwnedReferenceSync;
use crate::sync::Synchronizer;
use log::{error, info};
use std::collections::BTreeMap;
use std::time::Instant;

/// Synchronizer table keyed by relation kind.
pub struct Dispatcher {
    synchronizers: BTreeMap<RelationKind, Box<dyn Synchronizer>>,
}

impl Dispatcher {
    /// Registers the built-in synchronizer for every kind.
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            synchronizers: BTreeMap::new(),
        }
        .with_synchronizer(Box::new(OwnedReferenceSync))
        .with_synchronizer(Box::new(OwnedChildSync))
        .with_synchronizer(Box::new(OwnedCollectionSync::new(
            config.position_column.as_str(),
        )))
        .with_synchronizer(Box::new(JoinCollectionSync::new(
            config.position_column.as_str(),
        )))
    }

    /// Replaces the synchronizer registered for `synchronizer.kind()`.
    pub fn with_synchronizer(mut self, synchronizer: Box<dyn Synchronizer>) -> Self {
        self.synchronizers.insert(synchronizer.kind(), synchronizer);
        self
    }

    /// Runs every payload relation eligible for `phase`.
    pub fn run_phase(
        &self,
        phase: Phase,
        store: &dyn Store,
        ctx: &mut SyncContext<'_>,
    ) -> SyncResult<()> {
        for (relation, data) in &ctx.payload {
            let def = ctx
                .schema
                .get(relation)
                .ok_or_else(|| SyncError::UnknownRelation {
                    entity_type: ctx.root.entity_type.clone(),
                    relation: relation.clone(),
                })?;
            let kind = def.kind();
            if kind.phase() != phase {
                continue;
            }

            let synchronizer = self.synchronizers.get(&kind).ok_or_else(|| {
                SyncError::Validation(format!("no synchronizer registered for {kind}"))
            })?;

            let started_at = Instant::now();
            match synchronizer.synchronize(store, &mut ctx.root, relation, def, data) {
                Ok(outcome) => {
                    info!(
                        "event=relation_sync module=sync status=ok entity={} relation={} kind={} phase={} shape={} created={} updated={} deleted={} attached={} detached={} duration_ms={}",
                        ctx.root.entity_type,
                        relation,
                        kind,
                        phase,
                        data.shape(),
                        outcome.created,
                        outcome.updated,
                        outcome.deleted,
                        outcome.attached,
                        outcome.detached,
                        started_at.elapsed().as_millis()
                    );
                    ctx.report.insert(relation.clone(), outcome);
                }
                Err(err) => {
                    error!(
                        "event=relation_sync module=sync status=error entity={} relation={} kind={} phase={} duration_ms={} error={}",
                        ctx.root.entity_type,
                        relation,
                        kind,
                        phase,
                        started_at.elapsed().as_millis(),
                        err
                    );
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}
