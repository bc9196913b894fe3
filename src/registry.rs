//! Serializer registry.
//!
//! Maps each entity type to the single serializer instance that handles it.
//! Types without an explicit registration get a default [`ModelSerializer`]
//! on first use; the insert happens under the write lock so concurrent first
//! lookups of the same type agree on one instance.

use crate::entity::EntityType;
use crate::error::FluxError;
use crate::serializer::{ModelSerializer, Serializer};
use crate::store::EntityStore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
pub struct SerializerRegistry {
    serializers: RwLock<HashMap<EntityType, Arc<dyn Serializer>>>,
}

fn name_taken(
    serializers: &HashMap<EntityType, Arc<dyn Serializer>>,
    entity: &EntityType,
    api_name: &str,
) -> Option<EntityType> {
    serializers
        .iter()
        .filter(|(other, _)| *other != entity)
        .find(|(_, serializer)| serializer.api_model_name().is_ok_and(|name| name == api_name))
        .map(|(other, _)| other.clone())
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an explicit serializer for `entity`.
    ///
    /// The serializer is bound before it becomes visible.
    ///
    /// # Errors
    ///
    /// Returns `FluxError::Registry` if `entity` already has a serializer or
    /// another type already uses the same API name, and the activation error
    /// if the serializer cannot be bound.
    pub fn register(
        &self,
        entity: &EntityType,
        serializer: Arc<dyn Serializer>,
        store: &dyn EntityStore,
    ) -> Result<(), FluxError> {
        serializer.activate(entity, store)?;
        let api_name = serializer.api_model_name()?.to_string();

        let mut serializers = self
            .serializers
            .write()
            .map_err(|e| FluxError::Registry(format!("Failed to lock serializer registry: {e}")))?;
        if serializers.contains_key(entity) {
            return Err(FluxError::Registry(format!(
                "a serializer for '{entity}' is already registered"
            )));
        }
        if let Some(other) = name_taken(&serializers, entity, &api_name) {
            return Err(FluxError::Registry(format!(
                "API name '{api_name}' of '{entity}' is already used by '{other}'"
            )));
        }
        serializers.insert(entity.clone(), serializer);
        log::debug!("Registered serializer for '{entity}' as '{api_name}'");
        Ok(())
    }

    /// Serializer for `entity`, creating and binding a default one if needed.
    pub fn get_serializer(
        &self,
        entity: &EntityType,
        store: &dyn EntityStore,
    ) -> Result<Arc<dyn Serializer>, FluxError> {
        let existing = self
            .serializers
            .read()
            .map_err(|e| FluxError::Registry(format!("Failed to lock serializer registry: {e}")))?
            .get(entity)
            .cloned();

        let serializer = match existing {
            Some(serializer) => serializer,
            None => {
                let mut serializers = self
                    .serializers
                    .write()
                    .map_err(|e| FluxError::Registry(format!("Failed to lock serializer registry: {e}")))?;
                if !serializers.contains_key(entity) {
                    if let Some(other) = name_taken(&serializers, entity, entity.name()) {
                        return Err(FluxError::Registry(format!(
                            "default API name of '{entity}' is already used by '{other}'"
                        )));
                    }
                    log::trace!("Creating default serializer for '{entity}'");
                }
                Arc::clone(
                    serializers
                        .entry(entity.clone())
                        .or_insert_with(|| Arc::new(ModelSerializer::new())),
                )
            }
        };
        // No-op once bound; a failed bind is retried on the next lookup.
        serializer.activate(entity, store)?;
        Ok(serializer)
    }

    pub fn is_registered(&self, entity: &EntityType) -> bool {
        self.serializers
            .read()
            .map(|serializers| serializers.contains_key(entity))
            .unwrap_or(false)
    }

    pub fn registered_types(&self) -> Result<Vec<EntityType>, FluxError> {
        let serializers = self
            .serializers
            .read()
            .map_err(|e| FluxError::Registry(format!("Failed to lock serializer registry: {e}")))?;
        let mut types: Vec<EntityType> = serializers.keys().cloned().collect();
        types.sort();
        Ok(types)
    }
}
