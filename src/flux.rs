//! `FluxSerializer`: the entry points callers use.
//!
//! Every entry point runs the same pipeline: resolve the root ids, discover
//! the reachable graph, then fetch and serialize it into one
//! [`NormalizedOutput`].

use crate::assembler::{assemble, NormalizedOutput};
use crate::config::FluxConfig;
use crate::entity::{EntityType, Record};
use crate::error::FluxError;
use crate::pagination::{Cursor, ListQuery, MetadataProvider, OrderBy};
use crate::registry::SerializerRegistry;
use crate::relation::RelationDef;
use crate::serializer::{IncludeColumns, ModelSerializer, SerializeContext, SerializeOptions, Serializer};
use crate::store::EntityStore;
use crate::traversal::{Deadline, Traversal};
use crate::value::EntityId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Optional arguments of the listing entry points.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub order_by: Option<OrderBy>,
    /// Entity type the listing selects from, instead of the query's own
    pub root_type: Option<EntityType>,
    /// Relationship through which listed ids are mapped to the root ids
    pub secondary_relation: Option<String>,
    /// Rows per page, `FluxConfig::page_size` when unset
    pub page_size: Option<u64>,
    pub include: IncludeColumns,
    pub options: SerializeOptions,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn root_type(mut self, entity: impl Into<EntityType>) -> Self {
        self.root_type = Some(entity.into());
        self
    }

    pub fn secondary_relation(mut self, name: impl Into<String>) -> Self {
        self.secondary_relation = Some(name.into());
        self
    }

    pub fn page_size(mut self, size: u64) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn include(mut self, include: IncludeColumns) -> Self {
        self.include = include;
        self
    }

    pub fn options(mut self, options: SerializeOptions) -> Self {
        self.options = options;
        self
    }
}

/// Normalizing serializer over one entity store.
pub struct FluxSerializer {
    store: Arc<dyn EntityStore>,
    registry: Arc<SerializerRegistry>,
    config: FluxConfig,
}

impl FluxSerializer {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            registry: Arc::new(SerializerRegistry::new()),
            config: FluxConfig::default(),
        }
    }

    /// Build with the configuration from `config/config.toml` and `FLUX__*`.
    pub fn from_env(store: Arc<dyn EntityStore>) -> Result<Self, FluxError> {
        let config = FluxConfig::load().map_err(|e| FluxError::Configuration(e.to_string()))?;
        Ok(Self::new(store).with_config(config))
    }

    pub fn with_config(mut self, config: FluxConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a registry between serializers over the same store.
    pub fn with_registry(mut self, registry: Arc<SerializerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn registry(&self) -> &SerializerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &FluxConfig {
        &self.config
    }

    /// Bind `serializer` to `entity`. Call once per type during setup.
    pub fn register_serializer<S>(&self, entity: impl Into<EntityType>, serializer: S) -> Result<(), FluxError>
    where
        S: Serializer + 'static,
    {
        self.registry
            .register(&entity.into(), Arc::new(serializer), self.store.as_ref())
    }

    /// Register a plain [`ModelSerializer`] for `entity`.
    pub fn register_default(&self, entity: impl Into<EntityType>) -> Result<(), FluxError> {
        self.register_serializer(entity, ModelSerializer::new())
    }

    fn context(&self, options: &SerializeOptions) -> SerializeContext {
        SerializeContext {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            options: Arc::new(options.clone()),
        }
    }

    /// Serialize `ids` of `root` and everything reachable from them.
    ///
    /// # Errors
    ///
    /// Configuration, recursion-limit, deadline and store errors abort the
    /// whole call; ids that no longer resolve are silently dropped.
    pub fn serialize_list(
        &self,
        ids: &[EntityId],
        root: &EntityType,
        include: &IncludeColumns,
        options: &SerializeOptions,
    ) -> Result<NormalizedOutput, FluxError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::serialize_span(root.name(), ids.len()).entered();

        let deadline = Deadline::new(options.deadline.or_else(|| self.config.deadline()));
        let ctx = self.context(options);

        let mut traversal = Traversal::new(&ctx, include, self.config.depth_limit, deadline);
        if !ids.is_empty() {
            traversal.discover(root, ids, &options.preloaded, 0)?;
        }
        let depth = traversal.max_level();
        let records = traversal.into_records();

        let output = assemble(
            &ctx,
            root,
            ids,
            &records,
            include,
            self.config.parallel_fetch,
            &deadline,
        )?;

        #[cfg(feature = "metrics")]
        METRICS.record_serialize(deadline.elapsed(), output.entity_count(), depth);
        log::debug!(
            "Serialized {} '{}' roots into {} entities of {} types (depth {depth}, {:?})",
            output.result.objects.len(),
            output.result.entity_type,
            output.entity_count(),
            output.entities.len(),
            deadline.elapsed()
        );
        Ok(output)
    }

    /// Serialize a single record and its graph.
    pub fn serialize_model(
        &self,
        record: &dyn Record,
        include: &IncludeColumns,
        options: &SerializeOptions,
    ) -> Result<NormalizedOutput, FluxError> {
        let root = record.entity_type();
        let serializer = self.registry.get_serializer(&root, self.store.as_ref())?;
        let id = serializer.primary_id(record)?;
        self.serialize_list(&[id], &root, include, options)
    }

    /// Serialize every row `query` lists, in listing order.
    pub fn serialize_query(&self, query: &ListQuery, params: &QueryParams) -> Result<NormalizedOutput, FluxError> {
        let (listing, key) = self.listing(query, params)?;
        let ids = self.store.select_ids(&listing, &key)?;
        let (root, ids) = self.map_secondary(&listing.entity, &key, ids, params)?;
        self.serialize_list(&ids, &root, &params.include, &params.options)
    }

    /// Serialize one page of `query`, starting at the request's `after` cursor.
    ///
    /// The cursor row itself is the first row of the page. `result.meta` is
    /// set only when at least one more row follows the page.
    pub fn serialize_paginated_query(
        &self,
        query: &ListQuery,
        params: &QueryParams,
        metadata: &dyn MetadataProvider,
    ) -> Result<NormalizedOutput, FluxError> {
        let (mut listing, key) = self.listing(query, params)?;
        let page_size = params.page_size.unwrap_or(self.config.page_size);

        if let Some(raw) = metadata.after_cursor() {
            let schema = self.store.schema(&listing.entity)?;
            let id = EntityId::parse(&raw, schema.column_kind(&key))?;
            let (order_column, _) = listing.effective_order(&key);
            let value = if order_column == key {
                None
            } else {
                match self.store.order_value(&listing.entity, &key, &id, order_column)? {
                    Some(value) => Some(value),
                    None => {
                        log::debug!("Cursor row '{id}' of '{}' no longer exists", listing.entity);
                        let root = self.output_root(&listing.entity, params)?;
                        let name = self
                            .registry
                            .get_serializer(&root, self.store.as_ref())?
                            .api_model_name()?
                            .to_string();
                        return Ok(NormalizedOutput::empty(name));
                    }
                }
            };
            listing.after = Some(Cursor { id, value });
        }
        listing.limit = Some(page_size.saturating_add(1));

        let mut ids = self.store.select_ids(&listing, &key)?;
        let next = match usize::try_from(page_size) {
            Ok(size) if ids.len() > size => {
                let next = ids[size].clone();
                ids.truncate(size);
                Some(next)
            }
            _ => None,
        };

        let (root, ids) = self.map_secondary(&listing.entity, &key, ids, params)?;
        let mut output = self.serialize_list(&ids, &root, &params.include, &params.options)?;
        if let Some(next) = next {
            output.result.meta = metadata.next_link(&next);
        }
        Ok(output)
    }

    /// Effective listing and the key column its ids are read from.
    fn listing(&self, query: &ListQuery, params: &QueryParams) -> Result<(ListQuery, String), FluxError> {
        let mut listing = query.clone();
        if let Some(root) = &params.root_type {
            listing.entity = root.clone();
        }
        if let Some(order) = &params.order_by {
            listing.order = Some(order.clone());
        }
        let serializer = self.registry.get_serializer(&listing.entity, self.store.as_ref())?;
        let key = serializer.primary_key_column()?.to_string();
        Ok((listing, key))
    }

    fn output_root(&self, listed: &EntityType, params: &QueryParams) -> Result<EntityType, FluxError> {
        match &params.secondary_relation {
            None => Ok(listed.clone()),
            Some(name) => Ok(self.secondary(listed, name)?.to.clone()),
        }
    }

    fn secondary(&self, listed: &EntityType, name: &str) -> Result<RelationDef, FluxError> {
        let schema = self.store.schema(listed)?;
        schema.relation_named(name).cloned().ok_or_else(|| {
            FluxError::Configuration(format!("entity type '{listed}' has no relationship '{name}'"))
        })
    }

    /// Map listed ids through the secondary relationship, keeping listing order.
    ///
    /// Listed rows without a related id are skipped, repeated targets kept once.
    fn map_secondary(
        &self,
        listed: &EntityType,
        key: &str,
        ids: Vec<EntityId>,
        params: &QueryParams,
    ) -> Result<(EntityType, Vec<EntityId>), FluxError> {
        let Some(name) = &params.secondary_relation else {
            return Ok((listed.clone(), ids));
        };
        let relation = self.secondary(listed, name)?;
        let mapping: HashMap<EntityId, EntityId> = self
            .store
            .project_column(listed, key, &ids, &relation.from_col)?
            .into_iter()
            .collect();
        let mut seen = HashSet::new();
        let mapped = ids
            .iter()
            .filter_map(|id| mapping.get(id))
            .filter(|target| seen.insert(*target))
            .cloned()
            .collect();
        Ok((relation.to, mapped))
    }
}
