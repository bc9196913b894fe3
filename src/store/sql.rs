//! SQL statements issued by [`PgStore`](super::PgStore), built with `sea-query`.
//!
//! Every identifier is table-qualified. A self-referential relationship joins
//! its table under the alias `<table>_related`.

use crate::entity::EntitySchema;
use crate::error::FluxError;
use crate::pagination::{Filter, ListQuery};
use crate::relation::RelationDef;
use crate::value::EntityId;
use sea_query::{
    Asterisk, DynIden, Expr, ExprTrait, Order, PostgresQueryBuilder, Query, SelectStatement, TableName,
    TableRef, Values,
};

fn iden(name: &str) -> DynIden {
    DynIden::from(name.to_string())
}

fn table(name: &str) -> TableRef {
    TableRef::Table(TableName(None, iden(name)), None)
}

fn aliased(name: &str, alias: &str) -> TableRef {
    TableRef::Table(TableName(None, iden(name)), Some(iden(alias)))
}

fn col(table: &str, column: &str) -> Expr {
    Expr::col((iden(table), iden(column)))
}

fn key_values(schema: &EntitySchema, key_column: &str, ids: &[EntityId]) -> Result<Vec<sea_query::Value>, FluxError> {
    let kind = schema.column_kind(key_column);
    ids.iter().map(|id| id.to_value(kind)).collect()
}

fn build(query: &SelectStatement) -> (String, Values) {
    query.build(PostgresQueryBuilder)
}

/// `SELECT <columns> FROM t WHERE t.key IN (...)`
pub fn select_by_ids(
    schema: &EntitySchema,
    key_column: &str,
    ids: &[EntityId],
) -> Result<(String, Values), FluxError> {
    let name = schema.entity.name();
    let mut query = Query::select();
    if schema.columns.is_empty() {
        query.column(Asterisk);
    } else {
        for column in &schema.columns {
            query.column((iden(name), iden(&column.name)));
        }
    }
    query
        .from(table(name))
        .and_where(col(name, key_column).is_in(key_values(schema, key_column, ids)?));
    Ok(build(&query))
}

/// `SELECT t.key, t.column FROM t WHERE t.key IN (...) AND t.column IS NOT NULL`
pub fn project_column(
    schema: &EntitySchema,
    key_column: &str,
    ids: &[EntityId],
    column: &str,
) -> Result<(String, Values), FluxError> {
    let name = schema.entity.name();
    let mut query = Query::select();
    query
        .column((iden(name), iden(key_column)))
        .column((iden(name), iden(column)))
        .from(table(name))
        .and_where(col(name, key_column).is_in(key_values(schema, key_column, ids)?))
        .and_where(col(name, column).is_not_null());
    Ok(build(&query))
}

/// Follow `relation` with an inner join and select the target keys.
pub fn project_related(
    schema: &EntitySchema,
    relation: &RelationDef,
    key_column: &str,
    ids: &[EntityId],
    target_key: &str,
) -> Result<(String, Values), FluxError> {
    let from = relation.from.name();
    let to = relation.to.name();
    let alias = if relation.is_self_referential() {
        format!("{to}_related")
    } else {
        to.to_string()
    };
    let target = if relation.is_self_referential() {
        aliased(to, &alias)
    } else {
        table(to)
    };

    let mut query = Query::select();
    query
        .column((iden(&alias), iden(target_key)))
        .from(table(from))
        .inner_join(
            target,
            col(from, &relation.from_col).equals((iden(&alias), iden(&relation.to_col))),
        )
        .and_where(col(from, key_column).is_in(key_values(schema, key_column, ids)?))
        .and_where(col(&alias, target_key).is_not_null());
    Ok(build(&query))
}

/// `SELECT t.column FROM t WHERE t.key = $1 LIMIT 1`
pub fn order_value(
    schema: &EntitySchema,
    key_column: &str,
    id: &EntityId,
    column: &str,
) -> Result<(String, Values), FluxError> {
    let name = schema.entity.name();
    let mut query = Query::select();
    query
        .column((iden(name), iden(column)))
        .from(table(name))
        .and_where(col(name, key_column).eq(id.to_value(schema.column_kind(key_column))?))
        .limit(1);
    Ok(build(&query))
}

fn filter_expr(name: &str, filter: &Filter) -> Expr {
    match filter {
        Filter::Eq(column, value) => col(name, column).eq(value.clone()),
        Filter::Ne(column, value) => col(name, column).ne(value.clone()),
        Filter::In(column, values) => col(name, column).is_in(values.clone()),
        Filter::Gte(column, value) => col(name, column).gte(value.clone()),
        Filter::Lte(column, value) => col(name, column).lte(value.clone()),
        Filter::IsNull(column) => col(name, column).is_null(),
        Filter::IsNotNull(column) => col(name, column).is_not_null(),
    }
}

/// Ordered id listing. With `after` set, only rows at or past the cursor's
/// `(order value, key)` position are listed.
pub fn select_ids(
    schema: &EntitySchema,
    listing: &ListQuery,
    key_column: &str,
) -> Result<(String, Values), FluxError> {
    let name = schema.entity.name();
    let (order_column, descending) = listing.effective_order(key_column);
    let by_key = order_column == key_column;
    let direction = if descending { Order::Desc } else { Order::Asc };
    let key_kind = schema.column_kind(key_column);

    let mut query = Query::select();
    query.column((iden(name), iden(key_column))).from(table(name));
    for filter in &listing.filters {
        query.and_where(filter_expr(name, filter));
    }

    if let Some(cursor) = &listing.after {
        let id = cursor.id.to_value(key_kind)?;
        let key = col(name, key_column);
        let at_or_past_key = if descending { key.lte(id) } else { key.gte(id) };
        if by_key {
            query.and_where(at_or_past_key);
        } else if let Some(bound) = cursor.value.clone() {
            let column = col(name, order_column);
            let past = if descending {
                column.clone().lt(bound.clone())
            } else {
                column.clone().gt(bound.clone())
            };
            query.and_where(past.or(column.eq(bound).and(at_or_past_key)));
        } else {
            // No order value to resume from: nothing is past the cursor.
            query.and_where(Expr::cust("FALSE"));
        }
    }

    if !by_key {
        query.order_by((iden(name), iden(order_column)), direction.clone());
    }
    query.order_by((iden(name), iden(key_column)), direction);
    if let Some(limit) = listing.limit {
        query.limit(limit);
    }
    if let Some(offset) = listing.offset {
        query.offset(offset);
    }
    Ok(build(&query))
}
