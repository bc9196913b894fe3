//! Assembly phase: fetch every discovered type in one batch and build the
//! normalized output.

use crate::entity::{EntityType, Record};
use crate::error::FluxError;
use crate::pagination::PageMeta;
use crate::serializer::{IncludeColumns, SerializeContext};
use crate::traversal::{Deadline, TraversalRecord, TraversalRecords};
use crate::value::EntityId;
use serde::Serialize;
use serde_json::{Map, Value as Json};
use std::collections::{BTreeMap, HashSet};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Serialized attributes keyed by API model name, then by id string.
pub type EntityMap = BTreeMap<String, BTreeMap<String, Map<String, Json>>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResult {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub objects: Vec<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

/// `{ "entities": ..., "result": ... }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedOutput {
    pub entities: EntityMap,
    pub result: ApiResult,
}

impl NormalizedOutput {
    /// An output with no entities, as returned for an empty listing.
    pub fn empty(api_name: impl Into<String>) -> Self {
        Self {
            entities: EntityMap::new(),
            result: ApiResult {
                entity_type: api_name.into(),
                objects: Vec::new(),
                meta: None,
            },
        }
    }

    /// Attributes of one entity, if it was serialized
    pub fn entity(&self, api_name: &str, id: &EntityId) -> Option<&Map<String, Json>> {
        self.entities.get(api_name)?.get(&id.to_string())
    }

    /// Total number of serialized entities across all types
    pub fn entity_count(&self) -> usize {
        self.entities.values().map(BTreeMap::len).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<Json> {
        serde_json::to_value(self)
    }
}

fn fetch_one(
    record: &TraversalRecord,
    ctx: &SerializeContext,
    deadline: &Deadline,
) -> Result<Vec<Box<dyn Record>>, FluxError> {
    deadline.check()?;
    let ids: Vec<EntityId> = record.ids.iter().cloned().collect();
    log::trace!("Fetching {} '{}' entities", ids.len(), record.entity);
    #[cfg(feature = "metrics")]
    METRICS.record_fetch_batch();
    record.serializer.fetch_entities(&ids, ctx)
}

/// One coroutine per entity type; results are joined in key order.
fn fetch_parallel(
    records: &TraversalRecords,
    ctx: &SerializeContext,
    deadline: &Deadline,
) -> Result<Vec<Vec<Box<dyn Record>>>, FluxError> {
    let handles: Vec<_> = records
        .values()
        .map(|record| {
            let record = record.clone();
            let ctx = ctx.clone();
            let deadline = *deadline;
            may::go!(move || fetch_one(&record, &ctx, &deadline))
        })
        .collect();

    let mut batches = Vec::with_capacity(handles.len());
    for handle in handles {
        let batch = handle
            .join()
            .map_err(|e| FluxError::Store(format!("fetch coroutine panicked: {e:?}")))??;
        batches.push(batch);
    }
    Ok(batches)
}

/// Fetch and serialize every discovered entity.
///
/// `root_ids` keeps its order in `result.objects`; ids whose entity could not
/// be fetched are dropped from both `entities` and `objects`.
pub fn assemble(
    ctx: &SerializeContext,
    root: &EntityType,
    root_ids: &[EntityId],
    records: &TraversalRecords,
    include: &IncludeColumns,
    parallel: bool,
    deadline: &Deadline,
) -> Result<NormalizedOutput, FluxError> {
    let root_name = ctx
        .registry
        .get_serializer(root, ctx.store.as_ref())?
        .api_model_name()?
        .to_string();

    let batches = if parallel && records.len() > 1 {
        fetch_parallel(records, ctx, deadline)?
    } else {
        records
            .values()
            .map(|record| fetch_one(record, ctx, deadline))
            .collect::<Result<Vec<_>, _>>()?
    };

    let first_level: HashSet<&EntityId> = root_ids.iter().collect();
    let mut entities = EntityMap::new();
    for ((name, record), fetched) in records.iter().zip(batches) {
        let serializer = &record.serializer;
        let is_root = *name == root_name;
        let include_columns = include.for_type(name);
        let mut by_id = BTreeMap::new();
        for entity in fetched {
            let id = serializer.primary_id(entity.as_ref())?;
            if !record.ids.contains(&id) {
                continue;
            }
            let key = id.to_string();
            let attrs = serializer.serialize(
                entity.as_ref(),
                record.preloaded.get(&key),
                is_root && first_level.contains(&id),
                include_columns,
                ctx,
            )?;
            by_id.insert(key, attrs);
        }
        let missing = record.ids.len().saturating_sub(by_id.len());
        if missing > 0 {
            log::debug!("{missing} '{name}' entities disappeared before fetch");
        }
        entities.insert(name.clone(), by_id);
    }

    let objects = root_ids
        .iter()
        .filter(|id| {
            entities
                .get(&root_name)
                .is_some_and(|by_id| by_id.contains_key(&id.to_string()))
        })
        .cloned()
        .collect();

    Ok(NormalizedOutput {
        entities,
        result: ApiResult {
            entity_type: root_name,
            objects,
            meta: None,
        },
    })
}
