//! Tests for the FluxRecord derive
//!
//! These tests verify that the generated `Record` and `FluxModel`
//! implementations expose the struct the way a hand-written schema would.

use flux_serializer::{
    ColumnKind, EntityId, EntityType, FluxModel, FluxRecord, FluxSerializer, IncludeColumns, MemoryStore,
    Record, RelationType, RowRecord, SerializeOptions,
};
use sea_query::Value;
use std::sync::Arc;

#[derive(FluxRecord, Debug, Clone)]
#[table_name = "users"]
pub struct User {
    #[primary_key]
    pub id: i64,
    pub name: String,
    #[column_name = "email_address"]
    pub email: Option<String>,
}

#[derive(FluxRecord, Debug, Clone)]
#[table_name = "posts"]
#[belongs_to(name = "author", entity = "users", from = "author_id")]
#[has_many(name = "comments", entity = "comments", to = "post_id")]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub author_id: Option<i64>,
    pub published_at: chrono::NaiveDateTime,
    #[skip]
    pub score: f64,
}

#[derive(FluxRecord, Debug)]
pub struct AuditEntry {
    #[primary_key]
    pub entry_id: uuid::Uuid,
    pub payload: serde_json::Value,
}

fn ada() -> User {
    User {
        id: 1,
        name: "Ada".to_string(),
        email: None,
    }
}

#[test]
fn test_record_reads_columns() {
    let user = ada();
    assert_eq!(user.entity_type(), EntityType::new("users"));
    assert_eq!(user.get("id"), Some(Value::BigInt(Some(1))));
    assert_eq!(user.get("name"), Some(Value::String(Some("Ada".to_string()))));
    // renamed column, NULL value
    assert_eq!(user.get("email_address"), Some(Value::String(None)));
    assert_eq!(user.get("email"), None);
}

#[test]
fn test_schema_columns_and_key() {
    let schema = User::entity_schema();
    assert_eq!(schema.entity, EntityType::new("users"));
    assert_eq!(schema.primary_key, "id");
    assert_eq!(schema.column_kind("id"), ColumnKind::BigInteger);
    assert_eq!(schema.column_kind("email_address"), ColumnKind::Text);
    assert_eq!(schema.columns.len(), 3);
}

#[test]
fn test_id_field_is_the_default_key() {
    let schema = Post::entity_schema();
    assert_eq!(schema.primary_key, "id");
    assert_eq!(schema.column_kind("published_at"), ColumnKind::Timestamp);
    assert!(!schema.has_column("score"));
}

#[test]
fn test_relationships() {
    let schema = Post::entity_schema();
    let author = schema.relation_named("author").unwrap();
    assert_eq!(author.rel_type, RelationType::BelongsTo);
    assert_eq!(author.from, EntityType::new("posts"));
    assert_eq!(author.from_col, "author_id");
    assert_eq!(author.to, EntityType::new("users"));
    assert_eq!(author.to_col, "id");

    let comments = schema.relation_named("comments").unwrap();
    assert_eq!(comments.rel_type, RelationType::HasMany);
    assert_eq!(comments.from_col, "id");
    assert_eq!(comments.to_col, "post_id");
}

#[test]
fn test_default_table_name_and_kinds() {
    let schema = AuditEntry::entity_schema();
    assert_eq!(schema.entity, EntityType::new("audit_entrys"));
    assert_eq!(schema.primary_key, "entry_id");
    assert_eq!(schema.column_kind("entry_id"), ColumnKind::Uuid);
    assert_eq!(schema.column_kind("payload"), ColumnKind::Json);
}

#[test]
fn test_derived_record_serializes() {
    let store = MemoryStore::new().with_schema(User::entity_schema()).unwrap();
    store
        .insert(RowRecord::new("users").with("id", 1i64).with("name", "Ada").with("email_address", Value::String(None)))
        .unwrap();
    let flux = FluxSerializer::new(Arc::new(store));

    let output = flux
        .serialize_model(&ada(), &IncludeColumns::new(), &SerializeOptions::default())
        .unwrap();
    assert_eq!(output.result.objects, vec![EntityId::Int(1)]);
    let json = output.to_json().unwrap();
    assert_eq!(json["entities"]["users"]["1"]["name"], "Ada");
}
