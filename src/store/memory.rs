//! In-memory entity store.
//!
//! Rows live in per-type tables of [`RowRecord`]s. Every batched fetch and
//! every dependency lookup is logged so callers can assert how often the store
//! was hit.

use crate::entity::{EntitySchema, EntityType, Record, RowRecord};
use crate::error::FluxError;
use crate::pagination::{Filter, ListQuery};
use crate::relation::RelationDef;
use crate::store::EntityStore;
use crate::value::{compare_values, value_to_json, EntityId};
use sea_query::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

/// One `fetch_by_ids` call as seen by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub entity: EntityType,
    pub ids: Vec<EntityId>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    schemas: RwLock<HashMap<EntityType, Arc<EntitySchema>>>,
    tables: RwLock<HashMap<EntityType, Vec<RowRecord>>>,
    fetch_log: Mutex<Vec<FetchCall>>,
    lookup_count: Mutex<usize>,
    failing: Mutex<HashSet<EntityType>>,
}

fn poisoned<E: std::fmt::Display>(what: &str) -> impl FnOnce(E) -> FluxError + '_ {
    move |e| FluxError::Store(format!("Failed to lock {what}: {e}"))
}

fn key_of(row: &RowRecord, key_column: &str) -> Result<Option<EntityId>, FluxError> {
    match row.get(key_column) {
        Some(value) => EntityId::from_value(&value),
        None => Ok(None),
    }
}

fn is_null(value: Option<&Value>) -> bool {
    value.map_or(true, |v| value_to_json(v).is_null())
}

fn matches(row: &RowRecord, filter: &Filter) -> bool {
    let eq = |column: &str, value: &Value| {
        row.get(column)
            .is_some_and(|v| !is_null(Some(&v)) && compare_values(&v, value) == Ordering::Equal)
    };
    match filter {
        Filter::Eq(column, value) => eq(column, value),
        Filter::Ne(column, value) => !is_null(row.get(column).as_ref()) && !eq(column, value),
        Filter::In(column, values) => values.iter().any(|value| eq(column, value)),
        Filter::Gte(column, value) => row
            .get(column)
            .is_some_and(|v| !is_null(Some(&v)) && compare_values(&v, value) != Ordering::Less),
        Filter::Lte(column, value) => row
            .get(column)
            .is_some_and(|v| !is_null(Some(&v)) && compare_values(&v, value) != Ordering::Greater),
        Filter::IsNull(column) => is_null(row.get(column).as_ref()),
        Filter::IsNotNull(column) => !is_null(row.get(column).as_ref()),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an entity type. Replaces an earlier declaration of the same type.
    pub fn add_schema(&self, schema: EntitySchema) -> Result<(), FluxError> {
        let mut schemas = self.schemas.write().map_err(poisoned("schema table"))?;
        schemas.insert(schema.entity.clone(), Arc::new(schema));
        Ok(())
    }

    pub fn with_schema(self, schema: EntitySchema) -> Result<Self, FluxError> {
        self.add_schema(schema)?;
        Ok(self)
    }

    pub fn insert(&self, row: RowRecord) -> Result<(), FluxError> {
        let mut tables = self.tables.write().map_err(poisoned("entity tables"))?;
        tables.entry(row.entity_type()).or_default().push(row);
        Ok(())
    }

    /// Delete every row of `entity` whose `key_column` equals `id`.
    pub fn remove(&self, entity: &EntityType, key_column: &str, id: &EntityId) -> Result<usize, FluxError> {
        let mut tables = self.tables.write().map_err(poisoned("entity tables"))?;
        let Some(rows) = tables.get_mut(entity) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| key_of(row, key_column).ok().flatten().as_ref() != Some(id));
        Ok(before - rows.len())
    }

    /// Make every subsequent fetch of `entity` fail with a store error.
    pub fn fail_fetches_of(&self, entity: impl Into<EntityType>) -> Result<(), FluxError> {
        let mut failing = self.failing.lock().map_err(poisoned("failure set"))?;
        failing.insert(entity.into());
        Ok(())
    }

    pub fn fetch_log(&self) -> Result<Vec<FetchCall>, FluxError> {
        Ok(self.fetch_log.lock().map_err(poisoned("fetch log"))?.clone())
    }

    /// Number of `fetch_by_ids` calls made for `entity`
    pub fn fetch_count(&self, entity: &EntityType) -> Result<usize, FluxError> {
        Ok(self.fetch_log()?.iter().filter(|call| &call.entity == entity).count())
    }

    /// Number of dependency lookups (`project_column` + `project_related`)
    pub fn lookup_count(&self) -> Result<usize, FluxError> {
        Ok(*self.lookup_count.lock().map_err(poisoned("lookup counter"))?)
    }

    pub fn clear_logs(&self) -> Result<(), FluxError> {
        self.fetch_log.lock().map_err(poisoned("fetch log"))?.clear();
        *self.lookup_count.lock().map_err(poisoned("lookup counter"))? = 0;
        Ok(())
    }

    fn rows(&self, entity: &EntityType) -> Result<Vec<RowRecord>, FluxError> {
        let tables = self.tables.read().map_err(poisoned("entity tables"))?;
        Ok(tables.get(entity).cloned().unwrap_or_default())
    }

    fn rows_keyed_by(
        &self,
        entity: &EntityType,
        key_column: &str,
        ids: &[EntityId],
    ) -> Result<Vec<(EntityId, RowRecord)>, FluxError> {
        let wanted: HashSet<&EntityId> = ids.iter().collect();
        let mut found = Vec::new();
        for row in self.rows(entity)? {
            if let Some(id) = key_of(&row, key_column)? {
                if wanted.contains(&id) {
                    found.push((id, row));
                }
            }
        }
        Ok(found)
    }

    fn count_lookup(&self) -> Result<(), FluxError> {
        *self.lookup_count.lock().map_err(poisoned("lookup counter"))? += 1;
        Ok(())
    }
}

impl EntityStore for MemoryStore {
    fn schema(&self, entity: &EntityType) -> Result<Arc<EntitySchema>, FluxError> {
        let schemas = self.schemas.read().map_err(poisoned("schema table"))?;
        schemas
            .get(entity)
            .cloned()
            .ok_or_else(|| FluxError::Configuration(format!("unknown entity type '{entity}'")))
    }

    fn fetch_by_ids(
        &self,
        entity: &EntityType,
        key_column: &str,
        ids: &[EntityId],
    ) -> Result<Vec<Box<dyn Record>>, FluxError> {
        self.fetch_log
            .lock()
            .map_err(poisoned("fetch log"))?
            .push(FetchCall {
                entity: entity.clone(),
                ids: ids.to_vec(),
            });
        if self.failing.lock().map_err(poisoned("failure set"))?.contains(entity) {
            return Err(FluxError::Store(format!("fetch of '{entity}' failed")));
        }
        Ok(self
            .rows_keyed_by(entity, key_column, ids)?
            .into_iter()
            .map(|(_, row)| Box::new(row) as Box<dyn Record>)
            .collect())
    }

    fn project_column(
        &self,
        entity: &EntityType,
        key_column: &str,
        ids: &[EntityId],
        column: &str,
    ) -> Result<Vec<(EntityId, EntityId)>, FluxError> {
        self.count_lookup()?;
        let mut pairs = Vec::new();
        for (id, row) in self.rows_keyed_by(entity, key_column, ids)? {
            let Some(value) = row.get(column) else {
                return Err(FluxError::Configuration(format!(
                    "entity '{entity}' has no column '{column}'"
                )));
            };
            if let Some(target) = EntityId::from_value(&value)? {
                pairs.push((id, target));
            }
        }
        Ok(pairs)
    }

    fn project_related(
        &self,
        relation: &RelationDef,
        key_column: &str,
        ids: &[EntityId],
        target_key: &str,
    ) -> Result<Vec<EntityId>, FluxError> {
        self.count_lookup()?;
        let sources = self.rows_keyed_by(&relation.from, key_column, ids)?;
        let join_values: Vec<Value> = sources
            .iter()
            .filter_map(|(_, row)| row.get(&relation.from_col))
            .filter(|v| !is_null(Some(v)))
            .collect();
        let mut related = Vec::new();
        for row in self.rows(&relation.to)? {
            let Some(value) = row.get(&relation.to_col) else {
                continue;
            };
            if join_values
                .iter()
                .any(|v| compare_values(v, &value) == Ordering::Equal)
            {
                if let Some(target) = key_of(&row, target_key)? {
                    related.push(target);
                }
            }
        }
        Ok(related)
    }

    fn order_value(
        &self,
        entity: &EntityType,
        key_column: &str,
        id: &EntityId,
        column: &str,
    ) -> Result<Option<Value>, FluxError> {
        Ok(self
            .rows_keyed_by(entity, key_column, std::slice::from_ref(id))?
            .into_iter()
            .next()
            .and_then(|(_, row)| row.get(column)))
    }

    fn select_ids(&self, query: &ListQuery, key_column: &str) -> Result<Vec<EntityId>, FluxError> {
        let (order_column, descending) = query.effective_order(key_column);
        let by_key = order_column == key_column;

        let mut candidates = Vec::new();
        for row in self.rows(&query.entity)? {
            if !query.filters.iter().all(|f| matches(&row, f)) {
                continue;
            }
            let Some(id) = key_of(&row, key_column)? else {
                continue;
            };
            let sort_value = if by_key { None } else { row.get(order_column) };
            candidates.push((id, sort_value));
        }

        if let Some(cursor) = &query.after {
            let past = |ord: Ordering| {
                if descending {
                    ord != Ordering::Greater
                } else {
                    ord != Ordering::Less
                }
            };
            if by_key {
                candidates.retain(|(id, _)| past(id.cmp(&cursor.id)));
            } else {
                match &cursor.value {
                    Some(bound) => candidates.retain(|(id, value)| {
                        value.as_ref().is_some_and(|v| {
                            !is_null(Some(v)) && past(compare_values(v, bound).then_with(|| id.cmp(&cursor.id)))
                        })
                    }),
                    None => candidates.clear(),
                }
            }
        }

        candidates.sort_by(|(a_id, a_value), (b_id, b_value)| {
            let mut ord = Ordering::Equal;
            if !by_key {
                let null = Value::Int(None);
                ord = compare_values(a_value.as_ref().unwrap_or(&null), b_value.as_ref().unwrap_or(&null));
                if descending {
                    ord = ord.reverse();
                }
            }
            if ord == Ordering::Equal {
                ord = if descending { b_id.cmp(a_id) } else { a_id.cmp(b_id) };
            }
            ord
        });

        let offset = usize::try_from(query.offset.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        Ok(candidates
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(id, _)| id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ColumnKind;
    use crate::pagination::{Cursor, OrderBy};

    fn store() -> MemoryStore {
        let store = MemoryStore::new()
            .with_schema(
                EntitySchema::new("items", "id")
                    .column("id", ColumnKind::Integer)
                    .column("rank", ColumnKind::Integer)
                    .column("owner_id", ColumnKind::Integer),
            )
            .unwrap();
        for (id, rank, owner) in [(1, 30, Some(10)), (2, 10, Some(10)), (3, 20, None), (4, 10, Some(11))] {
            let mut row = RowRecord::new("items").with("id", id).with("rank", rank);
            row.set("owner_id", Value::Int(owner));
            store.insert(row).unwrap();
        }
        store
    }

    fn ints(ids: &[i64]) -> Vec<EntityId> {
        ids.iter().copied().map(EntityId::Int).collect()
    }

    #[test]
    fn test_fetch_skips_missing_and_logs() {
        let store = store();
        let items = EntityType::new("items");
        let rows = store.fetch_by_ids(&items, "id", &ints(&[1, 99])).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(store.fetch_count(&items).unwrap(), 1);
        assert_eq!(store.fetch_log().unwrap()[0].ids, ints(&[1, 99]));
    }

    #[test]
    fn test_project_column_skips_nulls() {
        let store = store();
        let pairs = store
            .project_column(&EntityType::new("items"), "id", &ints(&[1, 3, 4]), "owner_id")
            .unwrap();
        assert_eq!(
            pairs,
            vec![(EntityId::Int(1), EntityId::Int(10)), (EntityId::Int(4), EntityId::Int(11))]
        );
        assert_eq!(store.lookup_count().unwrap(), 1);
    }

    #[test]
    fn test_select_ids_orders_by_column_then_key() {
        let store = store();
        let query = ListQuery::new("items").order_by(OrderBy::asc("rank"));
        assert_eq!(store.select_ids(&query, "id").unwrap(), ints(&[2, 4, 3, 1]));
        let query = ListQuery::new("items").order_by(OrderBy::desc("rank"));
        assert_eq!(store.select_ids(&query, "id").unwrap(), ints(&[1, 3, 4, 2]));
    }

    #[test]
    fn test_cursor_ties_break_on_key() {
        let store = store();
        let cursor = Cursor {
            id: EntityId::Int(4),
            value: Some(Value::Int(Some(10))),
        };
        let mut query = ListQuery::new("items").order_by(OrderBy::asc("rank"));
        query.after = Some(cursor.clone());
        assert_eq!(store.select_ids(&query, "id").unwrap(), ints(&[4, 3, 1]));

        let mut query = ListQuery::new("items").order_by(OrderBy::desc("rank"));
        query.after = Some(cursor);
        assert_eq!(store.select_ids(&query, "id").unwrap(), ints(&[4, 2]));
    }

    #[test]
    fn test_cursor_without_order_value_lists_nothing() {
        let store = store();
        let mut query = ListQuery::new("items").order_by(OrderBy::asc("rank"));
        query.after = Some(Cursor {
            id: EntityId::Int(4),
            value: None,
        });
        assert!(store.select_ids(&query, "id").unwrap().is_empty());
    }

    #[test]
    fn test_cursor_by_key_is_inclusive() {
        let store = store();
        let mut query = ListQuery::new("items").limit(2);
        query.after = Some(Cursor {
            id: EntityId::Int(2),
            value: None,
        });
        assert_eq!(store.select_ids(&query, "id").unwrap(), ints(&[2, 3]));
    }

    #[test]
    fn test_filters() {
        let store = store();
        let query = ListQuery::new("items").filter(Filter::Eq("owner_id".into(), Value::BigInt(Some(10))));
        assert_eq!(store.select_ids(&query, "id").unwrap(), ints(&[1, 2]));
        let query = ListQuery::new("items").filter(Filter::IsNull("owner_id".into()));
        assert_eq!(store.select_ids(&query, "id").unwrap(), ints(&[3]));
    }

    #[test]
    fn test_remove_and_failure_injection() {
        let store = store();
        let items = EntityType::new("items");
        assert_eq!(store.remove(&items, "id", &EntityId::Int(3)).unwrap(), 1);
        store.fail_fetches_of("items").unwrap();
        let err = store.fetch_by_ids(&items, "id", &ints(&[1])).unwrap_err();
        assert!(matches!(err, FluxError::Store(_)));
    }

    #[test]
    fn test_unknown_schema() {
        let err = store().schema(&EntityType::new("ghosts")).unwrap_err();
        assert!(matches!(err, FluxError::Configuration(_)));
    }
}
