//! Relationship metadata between entity types.
//!
//! A relationship always joins `from.from_col = to.to_col`. Whether the local
//! column already holds the target's key (belongs-to) or the target points back
//! at us (has-many) only changes how dependent ids are resolved, never the
//! join condition itself.

use crate::entity::EntityType;

/// Type of relationship between entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    /// One-to-one relationship
    HasOne,
    /// One-to-many relationship
    HasMany,
    /// Many-to-one relationship (belongs_to)
    BelongsTo,
}

/// A declared, named reference from one entity type to another
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationDef {
    /// Attribute name of the relationship on the source entity
    pub name: String,
    pub rel_type: RelationType,
    pub from: EntityType,
    /// Local column used for the join
    pub from_col: String,
    pub to: EntityType,
    /// Target column matched against `from_col`
    pub to_col: String,
}

impl RelationDef {
    /// Post belongs_to User: `posts.author_id = users.id`
    pub fn belongs_to(
        name: impl Into<String>,
        from: impl Into<EntityType>,
        from_col: impl Into<String>,
        to: impl Into<EntityType>,
        to_col: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            rel_type: RelationType::BelongsTo,
            from: from.into(),
            from_col: from_col.into(),
            to: to.into(),
            to_col: to_col.into(),
        }
    }

    /// User has_many Posts: `users.id = posts.author_id`
    pub fn has_many(
        name: impl Into<String>,
        from: impl Into<EntityType>,
        from_col: impl Into<String>,
        to: impl Into<EntityType>,
        to_col: impl Into<String>,
    ) -> Self {
        Self {
            rel_type: RelationType::HasMany,
            ..Self::belongs_to(name, from, from_col, to, to_col)
        }
    }

    /// User has_one Profile: `users.id = profiles.user_id`
    pub fn has_one(
        name: impl Into<String>,
        from: impl Into<EntityType>,
        from_col: impl Into<String>,
        to: impl Into<EntityType>,
        to_col: impl Into<String>,
    ) -> Self {
        Self {
            rel_type: RelationType::HasOne,
            ..Self::belongs_to(name, from, from_col, to, to_col)
        }
    }

    /// Reverse this relation (swap from and to)
    ///
    /// Post -> User (belongs_to) reversed gives User -> Post (has_many).
    pub fn rev(self, name: impl Into<String>) -> Self {
        let rel_type = match self.rel_type {
            RelationType::BelongsTo => RelationType::HasMany,
            RelationType::HasMany | RelationType::HasOne => RelationType::BelongsTo,
        };
        Self {
            name: name.into(),
            rel_type,
            from: self.to,
            from_col: self.to_col,
            to: self.from,
            to_col: self.from_col,
        }
    }

    pub fn is_self_referential(&self) -> bool {
        self.from == self.to
    }
}
