//! Listing queries, cursors and next-page metadata.
//!
//! A listing is ordered by an optional column and then by primary key, both
//! ascending unless descending is requested. With an `after` cursor the listing
//! starts *at* the cursor row: a row is kept when its `(ordering value, key)`
//! pair is at or past the cursor row's, so rows that tie with the cursor on the
//! ordering value are split by key and never skipped or repeated.

use crate::entity::EntityType;
use crate::value::EntityId;
use sea_query::Value;
use serde::Serialize;
use std::collections::BTreeMap;

/// Row filter of a listing query
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Ne(String, Value),
    In(String, Vec<Value>),
    Gte(String, Value),
    Lte(String, Value),
    IsNull(String),
    IsNotNull(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

/// Resolved `after` position.
///
/// `value` is the cursor row's ordering value; it is only needed when the
/// listing is ordered by something other than the primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub id: EntityId,
    pub value: Option<Value>,
}

/// An id listing over one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub entity: EntityType,
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
    pub after: Option<Cursor>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ListQuery {
    pub fn new(entity: impl Into<EntityType>) -> Self {
        Self {
            entity: entity.into(),
            filters: Vec::new(),
            order: None,
            after: None,
            limit: None,
            offset: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Column the rows are primarily ordered by, and whether descending.
    pub fn effective_order<'a>(&'a self, key_column: &'a str) -> (&'a str, bool) {
        match &self.order {
            Some(order) => (order.column.as_str(), order.descending),
            None => (key_column, false),
        }
    }
}

/// `result.meta` of a paginated response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub next: String,
}

/// Request-side collaborator of paginated listings.
pub trait MetadataProvider {
    /// Raw `after` cursor of the inbound request
    fn after_cursor(&self) -> Option<String>;

    /// Link descriptor for the page starting at `next_id`
    fn next_link(&self, next_id: &EntityId) -> Option<PageMeta>;
}

/// Provider for callers without a request: no cursor, no links.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

impl MetadataProvider for NoMetadata {
    fn after_cursor(&self) -> Option<String> {
        None
    }

    fn next_link(&self, _next_id: &EntityId) -> Option<PageMeta> {
        None
    }
}

/// Builds next links from the request path and its query arguments, replacing
/// `after` with the next page's first id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStringMetadata {
    path: String,
    args: BTreeMap<String, String>,
}

impl QueryStringMetadata {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: BTreeMap::new(),
        }
    }

    /// Parse `a=1&b=two` style query strings; undecodable pairs are dropped.
    pub fn from_query(path: impl Into<String>, query: &str) -> Self {
        let args = query
            .trim_start_matches('?')
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                let key = urlencoding::decode(&key.replace('+', " ")).ok()?.into_owned();
                let value = urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned();
                Some((key, value))
            })
            .collect();
        Self {
            path: path.into(),
            args,
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

impl MetadataProvider for QueryStringMetadata {
    fn after_cursor(&self) -> Option<String> {
        self.args.get("after").filter(|v| !v.is_empty()).cloned()
    }

    fn next_link(&self, next_id: &EntityId) -> Option<PageMeta> {
        let mut args = self.args.clone();
        args.insert("after".to_string(), next_id.to_string());
        let query = args
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        Some(PageMeta {
            next: format!("{}?{query}", self.path),
        })
    }
}
