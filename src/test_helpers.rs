//! Blog fixture graph on a [`MemoryStore`].
//!
//! ```text
//! users(id, name, email)
//! posts(id, title, author_id -> users, published_at)      comments: posts.id <- comments.post_id
//! comments(id, body, post_id -> posts, author_id -> users)
//! categories(id, name, parent_id -> categories)
//! ```

use crate::entity::{ColumnKind, EntitySchema, RowRecord};
use crate::error::FluxError;
use crate::relation::RelationDef;
use crate::store::MemoryStore;
use chrono::{NaiveDate, NaiveDateTime};
use sea_query::Value;

pub fn users_schema() -> EntitySchema {
    EntitySchema::new("users", "id")
        .column("id", ColumnKind::Integer)
        .column("name", ColumnKind::Text)
        .column("email", ColumnKind::Text)
}

pub fn posts_schema() -> EntitySchema {
    EntitySchema::new("posts", "id")
        .column("id", ColumnKind::Integer)
        .column("title", ColumnKind::Text)
        .column("author_id", ColumnKind::Integer)
        .column("published_at", ColumnKind::Timestamp)
        .relation(RelationDef::belongs_to("author", "posts", "author_id", "users", "id"))
        .relation(RelationDef::has_many("comments", "posts", "id", "comments", "post_id"))
}

pub fn comments_schema() -> EntitySchema {
    EntitySchema::new("comments", "id")
        .column("id", ColumnKind::Integer)
        .column("body", ColumnKind::Text)
        .column("post_id", ColumnKind::Integer)
        .column("author_id", ColumnKind::Integer)
        .relation(RelationDef::belongs_to("post", "comments", "post_id", "posts", "id"))
        .relation(RelationDef::belongs_to("author", "comments", "author_id", "users", "id"))
}

pub fn categories_schema() -> EntitySchema {
    EntitySchema::new("categories", "id")
        .column("id", ColumnKind::Integer)
        .column("name", ColumnKind::Text)
        .column("parent_id", ColumnKind::Integer)
        .relation(RelationDef::belongs_to("parent", "categories", "parent_id", "categories", "id"))
}

fn published(day: u32) -> Value {
    let at: Option<NaiveDateTime> = NaiveDate::from_ymd_opt(2024, 1, day).and_then(|d| d.and_hms_opt(9, 30, 0));
    Value::from(at)
}

pub fn user(id: i32, name: &str) -> RowRecord {
    RowRecord::new("users")
        .with("id", id)
        .with("name", name)
        .with("email", format!("{}@example.com", name.to_lowercase()))
}

pub fn post(id: i32, title: &str, author_id: i32, day: u32) -> RowRecord {
    RowRecord::new("posts")
        .with("id", id)
        .with("title", title)
        .with("author_id", author_id)
        .with("published_at", published(day))
}

pub fn comment(id: i32, body: &str, post_id: i32, author_id: i32) -> RowRecord {
    RowRecord::new("comments")
        .with("id", id)
        .with("body", body)
        .with("post_id", post_id)
        .with("author_id", author_id)
}

pub fn category(id: i32, name: &str, parent_id: Option<i32>) -> RowRecord {
    RowRecord::new("categories")
        .with("id", id)
        .with("name", name)
        .with("parent_id", Value::Int(parent_id))
}

/// Store with every blog schema declared and no rows.
pub fn empty_blog_store() -> Result<MemoryStore, FluxError> {
    MemoryStore::new()
        .with_schema(users_schema())?
        .with_schema(posts_schema())?
        .with_schema(comments_schema())?
        .with_schema(categories_schema())
}

/// Two users, four posts, three comments and a three-level category tree.
///
/// Posts 11 and 13 share a publication day so ordering by `published_at`
/// has a tie that only the primary key breaks.
pub fn blog_store() -> Result<MemoryStore, FluxError> {
    let store = empty_blog_store()?;
    store.insert(user(1, "Ada"))?;
    store.insert(user(2, "Grace"))?;

    store.insert(post(10, "Ownership", 1, 1))?;
    store.insert(post(11, "Lifetimes", 2, 2))?;
    store.insert(post(12, "Traits", 1, 3))?;
    store.insert(post(13, "Macros", 2, 2))?;

    store.insert(comment(100, "Nice", 10, 2))?;
    store.insert(comment(101, "Thanks", 10, 1))?;
    store.insert(comment(102, "More please", 12, 2))?;

    store.insert(category(1, "Languages", None))?;
    store.insert(category(2, "Rust", Some(1)))?;
    store.insert(category(3, "Async", Some(2)))?;
    Ok(store)
}
