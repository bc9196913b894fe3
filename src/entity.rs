//! Entity identity, attribute access and schema metadata.
//!
//! The serializer never looks inside concrete entity structs. It only needs the
//! [`Record`] capability (read an attribute by column name) plus the
//! [`EntitySchema`] the store declares for each [`EntityType`].

use crate::relation::RelationDef;
use sea_query::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Opaque identity of a kind of entity, usually its table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityType(Arc<str>);

impl EntityType {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EntityType {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// A concrete entity instance as seen by the serializer.
///
/// `get` returns `None` when the entity has no attribute of that name, and
/// `Some(null value)` when the attribute exists but is NULL.
pub trait Record: Send + Sync + fmt::Debug {
    fn entity_type(&self) -> EntityType;

    fn get(&self, column: &str) -> Option<Value>;
}

/// A record backed by a column map. Stores decode rows into this.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    entity: EntityType,
    values: BTreeMap<String, Value>,
}

impl RowRecord {
    pub fn new(entity: impl Into<EntityType>) -> Self {
        Self {
            entity: entity.into(),
            values: BTreeMap::new(),
        }
    }

    /// Builder-style setter
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl Record for RowRecord {
    fn entity_type(&self) -> EntityType {
        self.entity.clone()
    }

    fn get(&self, column: &str) -> Option<Value> {
        self.values.get(column).cloned()
    }
}

/// Storage type of a column. Used to bind correctly typed query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Boolean,
    SmallInteger,
    Integer,
    BigInteger,
    Float,
    Double,
    Text,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
}

/// Declared shape of an entity type: primary key, scalar columns, relationships.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    pub entity: EntityType,
    pub primary_key: String,
    pub columns: Vec<ColumnDef>,
    pub relations: Vec<RelationDef>,
}

impl EntitySchema {
    pub fn new(entity: impl Into<EntityType>, primary_key: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            primary_key: primary_key.into(),
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn column(mut self, name: impl Into<String>, kind: ColumnKind) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn column_def(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Kind of a column, `Text` when the column is undeclared.
    pub fn column_kind(&self, name: &str) -> ColumnKind {
        self.column_def(name).map_or(ColumnKind::Text, |c| c.kind)
    }

    pub fn relation_named(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_def(name).is_some()
    }
}

/// Static schema for a Rust type, generated by `#[derive(FluxRecord)]`.
pub trait FluxModel: Record {
    fn entity_schema() -> EntitySchema;
}
