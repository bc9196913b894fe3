//! Entity store abstraction.
//!
//! The serializer never talks to a database directly. Everything it needs from
//! storage goes through [`EntityStore`]: schema metadata, batched fetches by
//! key, dependency id lookups and id listings. Two implementations ship with
//! the crate: [`MemoryStore`] for tests and embedding, and [`PgStore`] which
//! builds its statements with `sea-query` and runs them on `may_postgres`.

pub mod memory;
pub mod postgres;
pub mod sql;
pub mod value_conversion;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::entity::{EntitySchema, EntityType, Record};
use crate::error::FluxError;
use crate::pagination::ListQuery;
use crate::relation::RelationDef;
use crate::value::EntityId;
use sea_query::Value;
use std::sync::Arc;

/// Storage collaborator of the serializer.
///
/// Every method takes the key column explicitly because a serializer may key
/// an entity type by something other than its declared primary key.
pub trait EntityStore: Send + Sync {
    /// Declared schema of an entity type
    ///
    /// # Errors
    ///
    /// Returns `FluxError::Configuration` for an unknown entity type.
    fn schema(&self, entity: &EntityType) -> Result<Arc<EntitySchema>, FluxError>;

    /// Fetch every entity whose `key_column` is in `ids`, in any order.
    ///
    /// Ids with no matching row are silently absent from the result.
    fn fetch_by_ids(
        &self,
        entity: &EntityType,
        key_column: &str,
        ids: &[EntityId],
    ) -> Result<Vec<Box<dyn Record>>, FluxError>;

    /// `(key, column)` pairs for the given keys, skipping NULL columns.
    fn project_column(
        &self,
        entity: &EntityType,
        key_column: &str,
        ids: &[EntityId],
        column: &str,
    ) -> Result<Vec<(EntityId, EntityId)>, FluxError>;

    /// Follow `relation` from the entities keyed by `ids` and return the
    /// `target_key` of every related entity (duplicates allowed).
    fn project_related(
        &self,
        relation: &RelationDef,
        key_column: &str,
        ids: &[EntityId],
        target_key: &str,
    ) -> Result<Vec<EntityId>, FluxError>;

    /// Value of `column` on the entity keyed by `id`, `None` if it does not exist.
    fn order_value(
        &self,
        entity: &EntityType,
        key_column: &str,
        id: &EntityId,
        column: &str,
    ) -> Result<Option<Value>, FluxError>;

    /// Ordered keys of the entities matching `query`.
    fn select_ids(&self, query: &ListQuery, key_column: &str) -> Result<Vec<EntityId>, FluxError>;
}
