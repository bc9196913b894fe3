//! `PostgreSQL` entity store over a [`FluxExecutor`].

use crate::entity::{EntitySchema, EntityType, FluxModel, Record, RowRecord};
use crate::error::FluxError;
use crate::executor::FluxExecutor;
use crate::pagination::ListQuery;
use crate::relation::RelationDef;
use crate::store::sql;
use crate::store::value_conversion::{decode_column, with_converted_params};
use crate::store::EntityStore;
use crate::value::EntityId;
use may_postgres::Row;
use sea_query::{Value, Values};
use std::collections::HashMap;
use std::sync::Arc;

/// Entity store that runs one `sea-query` statement per operation.
///
/// Schemas are declared up front, either by hand or from a
/// `#[derive(FluxRecord)]` type.
pub struct PgStore<E: FluxExecutor> {
    executor: E,
    schemas: HashMap<EntityType, Arc<EntitySchema>>,
}

impl<E: FluxExecutor> PgStore<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            schemas: HashMap::new(),
        }
    }

    pub fn with_schema(mut self, schema: EntitySchema) -> Self {
        self.schemas.insert(schema.entity.clone(), Arc::new(schema));
        self
    }

    pub fn with_model<M: FluxModel>(self) -> Self {
        self.with_schema(M::entity_schema())
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    fn query(&self, statement: (String, Values)) -> Result<Vec<Row>, FluxError> {
        let (sql, values) = statement;
        with_converted_params(&values, |params| self.executor.query_all(&sql, params))
    }

    fn decode_key(row: &Row, idx: usize) -> Result<Option<EntityId>, FluxError> {
        EntityId::from_value(&decode_column(row, idx)?)
    }
}

impl<E: FluxExecutor> EntityStore for PgStore<E> {
    fn schema(&self, entity: &EntityType) -> Result<Arc<EntitySchema>, FluxError> {
        self.schemas
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
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let schema = self.schema(entity)?;
        let rows = self.query(sql::select_by_ids(&schema, key_column, ids)?)?;
        let mut records: Vec<Box<dyn Record>> = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = RowRecord::new(entity.clone());
            for (idx, column) in row.columns().iter().enumerate() {
                record.set(column.name(), decode_column(row, idx)?);
            }
            records.push(Box::new(record));
        }
        Ok(records)
    }

    fn project_column(
        &self,
        entity: &EntityType,
        key_column: &str,
        ids: &[EntityId],
        column: &str,
    ) -> Result<Vec<(EntityId, EntityId)>, FluxError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let schema = self.schema(entity)?;
        let rows = self.query(sql::project_column(&schema, key_column, ids, column)?)?;
        let mut pairs = Vec::with_capacity(rows.len());
        for row in &rows {
            if let (Some(id), Some(target)) = (Self::decode_key(row, 0)?, Self::decode_key(row, 1)?) {
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
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let schema = self.schema(&relation.from)?;
        let rows = self.query(sql::project_related(&schema, relation, key_column, ids, target_key)?)?;
        let mut related = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(id) = Self::decode_key(row, 0)? {
                related.push(id);
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
        let schema = self.schema(entity)?;
        let rows = self.query(sql::order_value(&schema, key_column, id, column)?)?;
        rows.first().map(|row| decode_column(row, 0)).transpose()
    }

    fn select_ids(&self, query: &ListQuery, key_column: &str) -> Result<Vec<EntityId>, FluxError> {
        let schema = self.schema(&query.entity)?;
        let rows = self.query(sql::select_ids(&schema, query, key_column)?)?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(id) = Self::decode_key(row, 0)? {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}
