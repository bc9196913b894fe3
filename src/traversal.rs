//! Discovery phase: walk the relationship graph from the root ids and collect,
//! per entity type, the set of ids that must be fetched.
//!
//! Ids already recorded for a type are never expanded again, which is what
//! makes cycles terminate and keeps every entity fetched at most once. The
//! depth bound only catches graphs that keep producing *new* ids.

use crate::entity::EntityType;
use crate::error::FluxError;
use crate::hints::{deep_merge, HintTree};
use crate::serializer::{IncludeColumns, SerializeContext, Serializer};
use crate::value::EntityId;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Wall-clock budget of one serialize call.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub fn new(budget: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// # Errors
    ///
    /// Returns `FluxError::DeadlineExceeded` once the budget is spent.
    pub fn check(&self) -> Result<(), FluxError> {
        match self.budget {
            Some(budget) if self.started.elapsed() >= budget => {
                Err(FluxError::DeadlineExceeded { budget })
            }
            _ => Ok(()),
        }
    }
}

/// Everything discovered for one entity type.
#[derive(Clone)]
pub struct TraversalRecord {
    pub entity: EntityType,
    pub ids: BTreeSet<EntityId>,
    pub preloaded: HintTree,
    pub serializer: Arc<dyn Serializer>,
}

impl fmt::Debug for TraversalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraversalRecord")
            .field("entity", &self.entity)
            .field("ids", &self.ids)
            .field("preloaded", &self.preloaded)
            .finish_non_exhaustive()
    }
}

/// Discovery result keyed by API model name.
pub type TraversalRecords = BTreeMap<String, TraversalRecord>;

/// Union ids and deep-merge hints of `source` into `target`.
pub fn merge_records(target: &mut TraversalRecords, source: TraversalRecords) {
    for (name, record) in source {
        match target.get_mut(&name) {
            Some(existing) => {
                existing.ids.extend(record.ids);
                deep_merge(&mut existing.preloaded, record.preloaded);
            }
            None => {
                target.insert(name, record);
            }
        }
    }
}

/// Depth-first discovery over one serialize call.
pub struct Traversal<'a> {
    ctx: &'a SerializeContext,
    include: &'a IncludeColumns,
    depth_limit: usize,
    deadline: Deadline,
    records: TraversalRecords,
    max_level: usize,
}

impl<'a> Traversal<'a> {
    pub fn new(
        ctx: &'a SerializeContext,
        include: &'a IncludeColumns,
        depth_limit: usize,
        deadline: Deadline,
    ) -> Self {
        Self {
            ctx,
            include,
            depth_limit,
            deadline,
            records: TraversalRecords::new(),
            max_level: 0,
        }
    }

    /// Continue from records accumulated by an earlier traversal.
    pub fn with_records(mut self, records: TraversalRecords) -> Self {
        self.records = records;
        self
    }

    pub fn records(&self) -> &TraversalRecords {
        &self.records
    }

    pub fn into_records(self) -> TraversalRecords {
        self.records
    }

    /// Deepest level that recorded new ids
    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Record `ids` of `entity` and everything reachable from them.
    ///
    /// # Errors
    ///
    /// `RecursionLimitExceeded` when `level` passes the depth limit, the
    /// deadline error once the budget is spent, and any serializer or store
    /// error raised along the way.
    pub fn discover(
        &mut self,
        entity: &EntityType,
        ids: &[EntityId],
        seed: &HintTree,
        level: usize,
    ) -> Result<(), FluxError> {
        if level > self.depth_limit {
            log::warn!(
                "Relationship traversal hit level {level} at '{entity}' (limit {})",
                self.depth_limit
            );
            return Err(FluxError::RecursionLimitExceeded {
                entity: entity.name().to_string(),
                level,
                limit: self.depth_limit,
            });
        }
        self.deadline.check()?;

        let serializer = self.ctx.registry.get_serializer(entity, self.ctx.store.as_ref())?;
        let name = serializer.api_model_name()?.to_string();

        let seen = self.records.get(&name).map(|record| &record.ids);
        let fresh: BTreeSet<EntityId> = ids
            .iter()
            .filter(|id| !seen.is_some_and(|seen| seen.contains(*id)))
            .cloned()
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }
        let fresh_ids: Vec<EntityId> = fresh.iter().cloned().collect();

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::discover_span(&name, level, fresh_ids.len()).entered();
        log::trace!("Discovering {} '{name}' ids at level {level}", fresh_ids.len());
        self.max_level = self.max_level.max(level);

        let data = serializer.dependency_data(&fresh_ids, self.include, level, self.ctx)?;
        let mut preloaded = seed.clone();
        if let Some(hints) = serializer.preloaded(&fresh_ids, &data, level, self.ctx)? {
            deep_merge(&mut preloaded, hints);
        }
        merge_records(
            &mut self.records,
            TraversalRecords::from([(
                name,
                TraversalRecord {
                    entity: entity.clone(),
                    ids: fresh,
                    preloaded,
                    serializer: Arc::clone(&serializer),
                },
            )]),
        );

        for dependency in serializer.prepare_dependencies(&fresh_ids, &data, level, self.ctx)? {
            if !dependency.ids.is_empty() {
                self.discover(&dependency.entity, &dependency.ids, seed, level + 1)?;
            }
        }
        Ok(())
    }
}
