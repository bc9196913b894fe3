//! Value conversion between SeaQuery and may_postgres.
//!
//! Parameters go out in two passes: every `sea_query::Value` is first turned
//! into an owned, correctly typed `ToSql` value, then borrowed as the
//! `&[&dyn ToSql]` slice the executor expects. NULLs keep their column type
//! (`Option<i32>`, `Option<String>`, ...) because PostgreSQL checks the type of
//! NULL parameters too.
//!
//! Rows come back through [`decode_column`], keyed on the PostgreSQL type name.

use crate::error::FluxError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use may_postgres::types::ToSql;
use may_postgres::Row;
use sea_query::{Value, Values};
use serde_json::Value as Json;
use uuid::Uuid;

fn to_sql_param(value: &Value) -> Result<Box<dyn ToSql + Sync>, FluxError> {
    let param: Box<dyn ToSql + Sync> = match value {
        Value::Bool(v) => Box::new(*v),
        Value::TinyInt(v) => Box::new(v.map(i16::from)),
        Value::SmallInt(v) => Box::new(*v),
        Value::Int(v) => Box::new(*v),
        Value::BigInt(v) => Box::new(*v),
        Value::TinyUnsigned(v) => Box::new(v.map(i16::from)),
        Value::SmallUnsigned(v) => Box::new(v.map(i32::from)),
        Value::Unsigned(v) => Box::new(v.map(i64::from)),
        Value::BigUnsigned(v) => {
            let converted = v
                .map(i64::try_from)
                .transpose()
                .map_err(|_| {
                    FluxError::Store(format!(
                        "BigUnsigned value {v:?} exceeds i64::MAX ({}), cannot be safely cast to i64",
                        i64::MAX
                    ))
                })?;
            Box::new(converted)
        }
        Value::Float(v) => Box::new(*v),
        Value::Double(v) => Box::new(*v),
        Value::String(v) => Box::new(v.as_ref().map(|s| s.as_str().to_owned())),
        Value::Char(v) => Box::new(v.map(|c| c.to_string())),
        Value::Bytes(v) => Box::new(v.as_ref().map(|b| b.to_vec())),
        Value::Json(v) => Box::new(v.as_ref().map(|j| Json::clone(j))),
        Value::Uuid(v) => Box::new(v.as_ref().map(|u| Uuid::clone(u))),
        Value::ChronoDate(v) => Box::new(v.as_ref().map(|d| NaiveDate::clone(d))),
        Value::ChronoTime(v) => Box::new(v.as_ref().map(|t| NaiveTime::clone(t))),
        Value::ChronoDateTime(v) => Box::new(v.as_ref().map(|dt| NaiveDateTime::clone(dt))),
        Value::ChronoDateTimeUtc(v) => Box::new(v.as_ref().map(|dt| DateTime::<Utc>::clone(dt))),
        Value::ChronoDateTimeLocal(v) => Box::new(v.as_ref().map(|dt| dt.with_timezone(&Utc))),
        Value::ChronoDateTimeWithTimeZone(v) => Box::new(v.as_ref().map(|dt| dt.with_timezone(&Utc))),
        other => {
            return Err(FluxError::Store(format!(
                "Unsupported value type in query: {other:?}"
            )))
        }
    };
    Ok(param)
}

/// Convert SeaQuery values to may_postgres parameters and run `f` with them.
///
/// # Errors
///
/// Returns `FluxError::Store` if an unsupported value type is encountered,
/// otherwise whatever `f` returns.
pub fn with_converted_params<F, R>(values: &Values, f: F) -> Result<R, FluxError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, FluxError>,
{
    // First pass: own every parameter
    let owned = values
        .iter()
        .map(to_sql_param)
        .collect::<Result<Vec<_>, _>>()?;

    // Second pass: borrow them for the duration of the call
    let params: Vec<&dyn ToSql> = owned.iter().map(|p| p.as_ref() as &dyn ToSql).collect();
    f(&params)
}

fn opt<T: Into<Value>>(value: Option<T>, null: Value) -> Value {
    value.map_or(null, Into::into)
}

/// Decode column `idx` of `row` into a `sea_query::Value`.
///
/// # Errors
///
/// Returns the driver error for a failed decode and `FluxError::Store` for a
/// column type with no mapping.
pub fn decode_column(row: &Row, idx: usize) -> Result<Value, FluxError> {
    let Some(column) = row.columns().get(idx) else {
        return Err(FluxError::Store(format!("row has no column {idx}")));
    };
    let value = match column.type_().name() {
        "bool" => Value::Bool(row.try_get::<_, Option<bool>>(idx)?),
        "int2" => Value::SmallInt(row.try_get::<_, Option<i16>>(idx)?),
        "int4" => Value::Int(row.try_get::<_, Option<i32>>(idx)?),
        "int8" => Value::BigInt(row.try_get::<_, Option<i64>>(idx)?),
        "float4" => Value::Float(row.try_get::<_, Option<f32>>(idx)?),
        "float8" => Value::Double(row.try_get::<_, Option<f64>>(idx)?),
        "text" | "varchar" | "bpchar" | "name" | "citext" => {
            opt(row.try_get::<_, Option<String>>(idx)?, Value::String(None))
        }
        "uuid" => opt(row.try_get::<_, Option<Uuid>>(idx)?, Value::Uuid(None)),
        "date" => opt(row.try_get::<_, Option<NaiveDate>>(idx)?, Value::ChronoDate(None)),
        "time" => opt(row.try_get::<_, Option<NaiveTime>>(idx)?, Value::ChronoTime(None)),
        "timestamp" => opt(
            row.try_get::<_, Option<NaiveDateTime>>(idx)?,
            Value::ChronoDateTime(None),
        ),
        "timestamptz" => opt(
            row.try_get::<_, Option<DateTime<Utc>>>(idx)?,
            Value::ChronoDateTimeUtc(None),
        ),
        "json" | "jsonb" => opt(row.try_get::<_, Option<Json>>(idx)?, Value::Json(None)),
        "bytea" => opt(row.try_get::<_, Option<Vec<u8>>>(idx)?, Value::Bytes(None)),
        other => {
            return Err(FluxError::Store(format!(
                "column '{}' has unsupported type '{other}'",
                column.name()
            )))
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_keep_order_and_count() {
        let values = Values(vec![
            Value::Int(Some(1)),
            Value::String(Some("a".to_string())),
            Value::BigInt(None),
            Value::Uuid(Some(Uuid::nil().into())),
        ]);
        let count = with_converted_params(&values, |params| Ok(params.len())).unwrap();
        assert_eq!(count, 4);
    }

    #[test]
    fn test_big_unsigned_overflow_is_rejected() {
        let values = Values(vec![Value::BigUnsigned(Some(u64::MAX))]);
        let err = with_converted_params(&values, |_| Ok(())).unwrap_err();
        assert!(err.to_string().contains("exceeds i64::MAX"));
    }

    #[test]
    fn test_closure_error_propagates() {
        let values = Values(vec![]);
        let err = with_converted_params::<_, ()>(&values, |_| {
            Err(FluxError::Store("boom".to_string()))
        })
        .unwrap_err();
        assert!(matches!(err, FluxError::Store(_)));
    }
}
