//! Per-entity-type serialization policy.
//!
//! [`Serializer`] is the extension point: every hook has a default that
//! delegates to the [`ModelSerializer`] returned by [`Serializer::base`], so a
//! custom serializer wraps a `ModelSerializer` and overrides only the hooks it
//! cares about (typically `preloaded` and `serialize`).

use crate::entity::{EntitySchema, EntityType, Record};
use crate::error::FluxError;
use crate::hints::HintTree;
use crate::registry::SerializerRegistry;
use crate::relation::RelationDef;
use crate::store::EntityStore;
use crate::value::{value_to_json, EntityId};
use once_cell::sync::OnceCell;
use serde_json::{Map, Value as Json};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Caller options forwarded untouched to every serializer hook.
#[derive(Debug, Clone, Default)]
pub struct SerializeOptions {
    /// Hint tree every discovered type starts from
    pub preloaded: HintTree,
    /// Overrides the configured deadline for this call
    pub deadline: Option<Duration>,
    /// Free-form options for custom serializers
    pub extra: Map<String, Json>,
}

impl SerializeOptions {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Json) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Extra columns to emit, keyed by API model name.
///
/// Additive: the named columns are serialized on top of the type's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeColumns(BTreeMap<String, BTreeSet<String>>);

impl IncludeColumns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I, S>(mut self, api_name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .entry(api_name.into())
            .or_default()
            .extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn for_type(&self, api_name: &str) -> Option<&BTreeSet<String>> {
        self.0.get(api_name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Shared state of one serialize call.
#[derive(Clone)]
pub struct SerializeContext {
    pub store: Arc<dyn EntityStore>,
    pub registry: Arc<SerializerRegistry>,
    pub options: Arc<SerializeOptions>,
}

impl fmt::Debug for SerializeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializeContext")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Relationships to traverse from one batch of ids.
#[derive(Debug, Clone, Default)]
pub struct DependencyData {
    pub relationships: Vec<RelationDef>,
    /// Room for custom serializers to carry data from `dependency_data` to `preloaded`
    pub extra: HintTree,
}

/// Ids of one related entity type that must be discovered next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub entity: EntityType,
    pub ids: Vec<EntityId>,
}

/// Serialization policy for one entity type.
pub trait Serializer: Send + Sync + fmt::Debug {
    fn base(&self) -> &ModelSerializer;

    /// Bind to `entity`. Called by the registry before first use.
    fn activate(&self, entity: &EntityType, store: &dyn EntityStore) -> Result<(), FluxError> {
        self.base().activate(entity, store)
    }

    fn api_model_name(&self) -> Result<&str, FluxError> {
        self.base().api_model_name()
    }

    fn primary_key_column(&self) -> Result<&str, FluxError> {
        self.base().primary_key_column()
    }

    fn primary_id(&self, record: &dyn Record) -> Result<EntityId, FluxError> {
        self.base().primary_id_of(record)
    }

    fn dependency_data(
        &self,
        ids: &[EntityId],
        include: &IncludeColumns,
        level: usize,
        ctx: &SerializeContext,
    ) -> Result<DependencyData, FluxError> {
        self.base().dependency_data(ids, include, level, ctx)
    }

    fn prepare_dependencies(
        &self,
        ids: &[EntityId],
        data: &DependencyData,
        level: usize,
        ctx: &SerializeContext,
    ) -> Result<Vec<Dependency>, FluxError> {
        self.base().prepare_dependencies(ids, data, level, ctx)
    }

    /// Per-id hints gathered during discovery, keyed by id string.
    fn preloaded(
        &self,
        _ids: &[EntityId],
        _data: &DependencyData,
        _level: usize,
        _ctx: &SerializeContext,
    ) -> Result<Option<HintTree>, FluxError> {
        Ok(None)
    }

    fn serialize(
        &self,
        record: &dyn Record,
        preloaded: Option<&Json>,
        is_first_level: bool,
        include: Option<&BTreeSet<String>>,
        ctx: &SerializeContext,
    ) -> Result<Map<String, Json>, FluxError> {
        self.base().serialize(record, preloaded, is_first_level, include, ctx)
    }

    fn fetch_entities(
        &self,
        ids: &[EntityId],
        ctx: &SerializeContext,
    ) -> Result<Vec<Box<dyn Record>>, FluxError> {
        self.base().fetch_entities(ids, ctx)
    }
}

#[derive(Debug)]
struct Binding {
    entity: EntityType,
    schema: Arc<EntitySchema>,
    /// relationship name -> local column holding the related key
    rel_map: HashMap<String, String>,
}

/// Generic serializer driven entirely by the entity schema.
///
/// By default it emits every declared column and follows every declared
/// relationship. A column list restricts both; a relationship named in the
/// list is emitted under its own name with the related key as value.
#[derive(Debug, Default)]
pub struct ModelSerializer {
    primary_id: Option<String>,
    columns: Option<BTreeSet<String>>,
    api_name: Option<String>,
    binding: OnceCell<Binding>,
}

impl ModelSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key the entity type by `column` instead of its declared primary key.
    pub fn primary_id(mut self, column: impl Into<String>) -> Self {
        self.primary_id = Some(column.into());
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn api_name(mut self, name: impl Into<String>) -> Self {
        self.api_name = Some(name.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.binding.get().is_some()
    }

    fn binding(&self) -> Result<&Binding, FluxError> {
        self.binding.get().ok_or_else(|| {
            FluxError::Configuration("serializer used before being bound to an entity type".to_string())
        })
    }

    pub fn entity(&self) -> Result<&EntityType, FluxError> {
        Ok(&self.binding()?.entity)
    }

    pub fn schema(&self) -> Result<&EntitySchema, FluxError> {
        Ok(self.binding()?.schema.as_ref())
    }

    pub fn activate(&self, entity: &EntityType, store: &dyn EntityStore) -> Result<(), FluxError> {
        let binding = self.binding.get_or_try_init(|| {
            let schema = store.schema(entity)?;
            let key = self.primary_id.as_deref().unwrap_or(&schema.primary_key);
            if key.is_empty() {
                return Err(FluxError::Configuration(format!(
                    "entity type '{entity}' has no resolvable primary key"
                )));
            }
            if !schema.columns.is_empty() && !schema.has_column(key) {
                return Err(FluxError::Configuration(format!(
                    "entity type '{entity}' has no key column '{key}'"
                )));
            }
            let rel_map = schema
                .relations
                .iter()
                .map(|rel| (rel.name.clone(), rel.from_col.clone()))
                .collect();
            log::debug!("Bound serializer for '{entity}' keyed by '{key}'");
            Ok(Binding {
                entity: entity.clone(),
                schema,
                rel_map,
            })
        })?;
        if &binding.entity != entity {
            return Err(FluxError::Configuration(format!(
                "serializer bound to '{}' cannot also serve '{entity}'",
                binding.entity
            )));
        }
        Ok(())
    }

    pub fn api_model_name(&self) -> Result<&str, FluxError> {
        match &self.api_name {
            Some(name) => Ok(name.as_str()),
            None => Ok(self.entity()?.name()),
        }
    }

    pub fn primary_key_column(&self) -> Result<&str, FluxError> {
        match &self.primary_id {
            Some(column) => Ok(column.as_str()),
            None => Ok(self.schema()?.primary_key.as_str()),
        }
    }

    pub fn primary_id_of(&self, record: &dyn Record) -> Result<EntityId, FluxError> {
        let column = self.primary_key_column()?;
        let value = record.get(column).ok_or_else(|| {
            FluxError::Configuration(format!(
                "entity '{}' has no key attribute '{column}'",
                record.entity_type()
            ))
        })?;
        EntityId::from_value(&value)?.ok_or_else(|| {
            FluxError::Configuration(format!(
                "entity '{}' has a NULL key attribute '{column}'",
                record.entity_type()
            ))
        })
    }

    /// Declared columns with relationships folded onto their local column.
    pub fn default_columns(&self) -> Result<BTreeSet<String>, FluxError> {
        let schema = self.schema()?;
        let mut columns: BTreeSet<String> = schema.columns.iter().map(|c| c.name.clone()).collect();
        columns.extend(schema.relations.iter().map(|rel| rel.from_col.clone()));
        columns.insert(self.primary_key_column()?.to_string());
        Ok(columns)
    }

    fn selected_columns(&self, include: Option<&BTreeSet<String>>) -> Result<BTreeSet<String>, FluxError> {
        let mut columns = match &self.columns {
            Some(columns) => columns.clone(),
            None => self.default_columns()?,
        };
        if let Some(extra) = include {
            columns.extend(extra.iter().cloned());
        }
        Ok(columns)
    }

    pub fn dependency_data(
        &self,
        _ids: &[EntityId],
        include: &IncludeColumns,
        _level: usize,
        _ctx: &SerializeContext,
    ) -> Result<DependencyData, FluxError> {
        let schema = self.schema()?;
        // Only explicitly named columns restrict traversal, never the defaults.
        let mut requested = self.columns.clone().unwrap_or_default();
        if let Some(extra) = include.for_type(self.api_model_name()?) {
            requested.extend(extra.iter().cloned());
        }
        let relationships = if requested.is_empty() {
            schema.relations.clone()
        } else {
            schema
                .relations
                .iter()
                .filter(|rel| requested.contains(&rel.name))
                .cloned()
                .collect()
        };
        Ok(DependencyData {
            relationships,
            extra: HintTree::new(),
        })
    }

    pub fn prepare_dependencies(
        &self,
        ids: &[EntityId],
        data: &DependencyData,
        _level: usize,
        ctx: &SerializeContext,
    ) -> Result<Vec<Dependency>, FluxError> {
        let entity = self.entity()?;
        let key = self.primary_key_column()?;
        let mut dependencies = Vec::with_capacity(data.relationships.len());
        for rel in &data.relationships {
            let target = ctx.registry.get_serializer(&rel.to, ctx.store.as_ref())?;
            let target_key = target.primary_key_column()?;
            let related: BTreeSet<EntityId> = if rel.to_col == target_key {
                ctx.store
                    .project_column(entity, key, ids, &rel.from_col)?
                    .into_iter()
                    .map(|(_, target_id)| target_id)
                    .collect()
            } else {
                ctx.store
                    .project_related(rel, key, ids, target_key)?
                    .into_iter()
                    .collect()
            };
            log::trace!(
                "'{entity}'.{} -> {} '{}' ids",
                rel.name,
                related.len(),
                rel.to
            );
            dependencies.push(Dependency {
                entity: rel.to.clone(),
                ids: related.into_iter().collect(),
            });
        }
        Ok(dependencies)
    }

    pub fn serialize(
        &self,
        record: &dyn Record,
        _preloaded: Option<&Json>,
        _is_first_level: bool,
        include: Option<&BTreeSet<String>>,
        _ctx: &SerializeContext,
    ) -> Result<Map<String, Json>, FluxError> {
        let rel_map = &self.binding()?.rel_map;
        let mut attrs = Map::new();
        for name in self.selected_columns(include)? {
            let column = rel_map.get(&name).unwrap_or(&name);
            let value = record.get(column).ok_or_else(|| {
                FluxError::Configuration(format!(
                    "entity '{}' has no attribute '{name}'",
                    record.entity_type()
                ))
            })?;
            attrs.insert(name, value_to_json(&value));
        }
        Ok(attrs)
    }

    pub fn fetch_entities(
        &self,
        ids: &[EntityId],
        ctx: &SerializeContext,
    ) -> Result<Vec<Box<dyn Record>>, FluxError> {
        ctx.store
            .fetch_by_ids(self.entity()?, self.primary_key_column()?, ids)
    }
}

impl Serializer for ModelSerializer {
    fn base(&self) -> &ModelSerializer {
        self
    }

    fn primary_id(&self, record: &dyn Record) -> Result<EntityId, FluxError> {
        self.primary_id_of(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ColumnKind, RowRecord};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn store() -> Arc<MemoryStore> {
        let store = MemoryStore::new()
            .with_schema(
                EntitySchema::new("posts", "id")
                    .column("id", ColumnKind::Integer)
                    .column("title", ColumnKind::Text)
                    .column("slug", ColumnKind::Text)
                    .column("author_id", ColumnKind::Integer)
                    .relation(RelationDef::belongs_to("author", "posts", "author_id", "users", "id")),
            )
            .unwrap()
            .with_schema(
                EntitySchema::new("users", "id")
                    .column("id", ColumnKind::Integer)
                    .column("name", ColumnKind::Text),
            )
            .unwrap();
        Arc::new(store)
    }

    fn ctx(store: Arc<dyn EntityStore>) -> SerializeContext {
        SerializeContext {
            store,
            registry: Arc::new(SerializerRegistry::new()),
            options: Arc::new(SerializeOptions::default()),
        }
    }

    fn post() -> RowRecord {
        RowRecord::new("posts")
            .with("id", 5)
            .with("title", "Hello")
            .with("slug", "hello")
            .with("author_id", 2)
    }

    #[test]
    fn test_unbound_serializer_errors() {
        let serializer = ModelSerializer::new();
        assert!(matches!(serializer.api_model_name(), Err(FluxError::Configuration(_))));
    }

    #[test]
    fn test_default_columns_fold_relationships() {
        let store = store();
        let serializer = ModelSerializer::new();
        serializer.activate(&EntityType::new("posts"), store.as_ref()).unwrap();
        let attrs = serializer
            .serialize(&post(), None, true, None, &ctx(store))
            .unwrap();
        assert_eq!(
            Json::Object(attrs),
            json!({"id": 5, "title": "Hello", "slug": "hello", "author_id": 2})
        );
    }

    #[test]
    fn test_named_relationship_reads_local_column() {
        let store = store();
        let serializer = ModelSerializer::new().columns(["id", "author"]);
        serializer.activate(&EntityType::new("posts"), store.as_ref()).unwrap();
        let include: BTreeSet<String> = ["title".to_string()].into();
        let attrs = serializer
            .serialize(&post(), None, false, Some(&include), &ctx(store))
            .unwrap();
        assert_eq!(Json::Object(attrs), json!({"id": 5, "author": 2, "title": "Hello"}));
    }

    #[test]
    fn test_unknown_attribute_is_configuration_error() {
        let store = store();
        let serializer = ModelSerializer::new().columns(["id", "nope"]);
        serializer.activate(&EntityType::new("posts"), store.as_ref()).unwrap();
        let err = serializer
            .serialize(&post(), None, false, None, &ctx(store))
            .unwrap_err();
        assert!(err.to_string().contains("'nope'"));
    }

    #[test]
    fn test_primary_id_override() {
        let store = store();
        let serializer = ModelSerializer::new().primary_id("slug");
        serializer.activate(&EntityType::new("posts"), store.as_ref()).unwrap();
        assert_eq!(serializer.primary_key_column().unwrap(), "slug");
        assert_eq!(
            serializer.primary_id_of(&post()).unwrap(),
            EntityId::Text("hello".to_string())
        );
    }

    #[test]
    fn test_bad_key_override_fails_activation() {
        let store = store();
        let serializer = ModelSerializer::new().primary_id("missing");
        let err = serializer
            .activate(&EntityType::new("posts"), store.as_ref())
            .unwrap_err();
        assert!(matches!(err, FluxError::Configuration(_)));
        assert!(!serializer.is_active());
    }

    #[test]
    fn test_rebinding_to_other_type_fails() {
        let store = store();
        let serializer = ModelSerializer::new();
        serializer.activate(&EntityType::new("posts"), store.as_ref()).unwrap();
        serializer.activate(&EntityType::new("posts"), store.as_ref()).unwrap();
        assert!(serializer
            .activate(&EntityType::new("users"), store.as_ref())
            .is_err());
    }

    #[test]
    fn test_column_list_limits_followed_relationships() {
        let store = store();
        let ctx = ctx(Arc::clone(&store) as Arc<dyn EntityStore>);
        let serializer = ModelSerializer::new().columns(["id", "title"]);
        serializer.activate(&EntityType::new("posts"), store.as_ref()).unwrap();
        let data = serializer
            .dependency_data(&[], &IncludeColumns::new(), 0, &ctx)
            .unwrap();
        assert!(data.relationships.is_empty());

        let include = IncludeColumns::new().with("posts", ["author"]);
        let data = serializer.dependency_data(&[], &include, 0, &ctx).unwrap();
        assert_eq!(data.relationships.len(), 1);
    }

    #[test]
    fn test_include_names_the_followed_relationships() {
        let store = store();
        let ctx = ctx(Arc::clone(&store) as Arc<dyn EntityStore>);
        let serializer = ModelSerializer::new();
        serializer.activate(&EntityType::new("posts"), store.as_ref()).unwrap();
        let all = serializer
            .dependency_data(&[], &IncludeColumns::new(), 0, &ctx)
            .unwrap();
        assert_eq!(all.relationships.len(), 1);

        let include = IncludeColumns::new().with("posts", ["title"]);
        let data = serializer.dependency_data(&[], &include, 0, &ctx).unwrap();
        assert!(data.relationships.is_empty());
    }

    #[test]
    fn test_prepare_dependencies_projects_local_column() {
        let store = store();
        store.insert(post()).unwrap();
        store
            .insert(post().with("id", 6).with("author_id", 2))
            .unwrap();
        let ctx = ctx(Arc::clone(&store) as Arc<dyn EntityStore>);
        let serializer = ModelSerializer::new();
        serializer.activate(&EntityType::new("posts"), store.as_ref()).unwrap();
        let ids = [EntityId::Int(5), EntityId::Int(6)];
        let data = serializer
            .dependency_data(&ids, &IncludeColumns::new(), 0, &ctx)
            .unwrap();
        let deps = serializer.prepare_dependencies(&ids, &data, 0, &ctx).unwrap();
        assert_eq!(
            deps,
            vec![Dependency {
                entity: EntityType::new("users"),
                ids: vec![EntityId::Int(2)],
            }]
        );
    }
}
