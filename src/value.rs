//! Primary-key normalization and attribute rendering.
//!
//! Records expose their attributes as `sea_query::Value`s. Primary keys are
//! normalized into [`EntityId`] so they can be hashed, ordered and used as JSON
//! object keys; every other attribute is rendered straight to `serde_json`.

use crate::entity::ColumnKind;
use crate::error::FluxError;
use chrono::{NaiveDateTime, Timelike};
use sea_query::Value;
use serde::{Serialize, Serializer};
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// A normalized primary key value.
///
/// Integer keys of any width collapse into `Int`, so `Value::Int(Some(7))` and
/// `Value::BigInt(Some(7))` identify the same entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Int(i64),
    Text(String),
    Uuid(Uuid),
}

impl EntityId {
    /// Normalize an attribute value into a key. `Ok(None)` for SQL NULL.
    pub fn from_value(value: &Value) -> Result<Option<Self>, FluxError> {
        let id = match value {
            Value::TinyInt(v) => v.map(|i| Self::Int(i64::from(i))),
            Value::SmallInt(v) => v.map(|i| Self::Int(i64::from(i))),
            Value::Int(v) => v.map(|i| Self::Int(i64::from(i))),
            Value::BigInt(v) => v.map(Self::Int),
            Value::TinyUnsigned(v) => v.map(|u| Self::Int(i64::from(u))),
            Value::SmallUnsigned(v) => v.map(|u| Self::Int(i64::from(u))),
            Value::Unsigned(v) => v.map(|u| Self::Int(i64::from(u))),
            Value::BigUnsigned(Some(u)) => Some(Self::Int(i64::try_from(*u).map_err(|_| {
                FluxError::Configuration(format!("primary key {u} does not fit in i64"))
            })?)),
            Value::BigUnsigned(None) => None,
            Value::String(v) => v.as_ref().map(|s| Self::Text(s.as_str().to_owned())),
            Value::Char(v) => v.map(|c| Self::Text(c.to_string())),
            Value::Uuid(v) => v.as_ref().map(|u| Self::Uuid(Uuid::clone(u))),
            other => {
                return Err(FluxError::Configuration(format!(
                    "unsupported primary key value: {other:?}"
                )))
            }
        };
        Ok(id)
    }

    /// Convert back into a query parameter typed for a column of `kind`.
    ///
    /// PostgreSQL does not coerce parameter types, so an `int4` key column has
    /// to be bound as `i32`.
    pub fn to_value(&self, kind: ColumnKind) -> Result<Value, FluxError> {
        match (self, kind) {
            (Self::Int(i), ColumnKind::Integer) => i32::try_from(*i)
                .map(Value::from)
                .map_err(|_| FluxError::Configuration(format!("key {i} does not fit an integer column"))),
            (Self::Int(i), ColumnKind::SmallInteger) => i16::try_from(*i)
                .map(Value::from)
                .map_err(|_| FluxError::Configuration(format!("key {i} does not fit a smallint column"))),
            (Self::Int(i), _) => Ok(Value::from(*i)),
            (Self::Text(s), ColumnKind::Uuid) => Uuid::parse_str(s)
                .map(Value::from)
                .map_err(|e| FluxError::Configuration(format!("key '{s}' is not a uuid: {e}"))),
            (Self::Text(s), _) => Ok(Value::from(s.clone())),
            (Self::Uuid(u), _) => Ok(Value::from(*u)),
        }
    }

    /// Parse a key received as text (e.g. an `after` query argument).
    pub fn parse(raw: &str, kind: ColumnKind) -> Result<Self, FluxError> {
        match kind {
            ColumnKind::SmallInteger | ColumnKind::Integer | ColumnKind::BigInteger => raw
                .parse::<i64>()
                .map(Self::Int)
                .map_err(|e| FluxError::Configuration(format!("'{raw}' is not an integer key: {e}"))),
            ColumnKind::Uuid => Uuid::parse_str(raw)
                .map(Self::Uuid)
                .map_err(|e| FluxError::Configuration(format!("'{raw}' is not a uuid key: {e}"))),
            _ => Ok(Self::Text(raw.to_owned())),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
            Self::Uuid(u) => write!(f, "{u}"),
        }
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<i64> for EntityId {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for EntityId {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Uuid> for EntityId {
    fn from(u: Uuid) -> Self {
        Self::Uuid(u)
    }
}

/// ISO-8601 with a trailing `Z`; fractional seconds only when present.
fn iso_utc(dt: &NaiveDateTime) -> String {
    if dt.nanosecond() / 1_000 == 0 {
        format!("{}Z", dt.format("%Y-%m-%dT%H:%M:%S"))
    } else {
        format!("{}Z", dt.format("%Y-%m-%dT%H:%M:%S%.6f"))
    }
}

/// Render an attribute value for the wire.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Bool(Some(b)) => Json::Bool(*b),
        Value::TinyInt(Some(i)) => Json::from(*i),
        Value::SmallInt(Some(i)) => Json::from(*i),
        Value::Int(Some(i)) => Json::from(*i),
        Value::BigInt(Some(i)) => Json::from(*i),
        Value::TinyUnsigned(Some(u)) => Json::from(*u),
        Value::SmallUnsigned(Some(u)) => Json::from(*u),
        Value::Unsigned(Some(u)) => Json::from(*u),
        Value::BigUnsigned(Some(u)) => Json::from(*u),
        // NaN and infinities have no JSON number form
        Value::Float(Some(f)) => serde_json::Number::from_f64(f64::from(*f)).map_or(Json::Null, Json::Number),
        Value::Double(Some(d)) => serde_json::Number::from_f64(*d).map_or(Json::Null, Json::Number),
        Value::String(Some(s)) => Json::String(s.as_str().to_owned()),
        Value::Char(Some(c)) => Json::String(c.to_string()),
        Value::Bytes(Some(b)) => Json::Array(b.iter().map(|byte| Json::from(*byte)).collect()),
        Value::Json(Some(j)) => Json::clone(j),
        Value::Uuid(Some(u)) => Json::String(u.to_string()),
        Value::ChronoDateTime(Some(dt)) => Json::String(iso_utc(dt)),
        Value::ChronoDateTimeUtc(Some(dt)) => Json::String(iso_utc(&dt.naive_utc())),
        Value::ChronoDateTimeLocal(Some(dt)) => Json::String(iso_utc(&dt.naive_utc())),
        Value::ChronoDateTimeWithTimeZone(Some(dt)) => Json::String(iso_utc(&dt.naive_utc())),
        Value::ChronoDate(Some(d)) => Json::String(d.format("%Y-%m-%d").to_string()),
        Value::ChronoTime(Some(t)) => Json::String(t.format("%H:%M:%S").to_string()),
        _ => Json::Null,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::TinyInt(Some(i)) => Some(f64::from(*i)),
        Value::SmallInt(Some(i)) => Some(f64::from(*i)),
        Value::Int(Some(i)) => Some(f64::from(*i)),
        Value::BigInt(Some(i)) => Some(*i as f64),
        Value::TinyUnsigned(Some(u)) => Some(f64::from(*u)),
        Value::SmallUnsigned(Some(u)) => Some(f64::from(*u)),
        Value::Unsigned(Some(u)) => Some(f64::from(*u)),
        Value::BigUnsigned(Some(u)) => Some(*u as f64),
        Value::Float(Some(f)) => Some(f64::from(*f)),
        Value::Double(Some(d)) => Some(*d),
        _ => None,
    }
}

fn timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::ChronoDateTime(Some(dt)) => Some(NaiveDateTime::clone(dt)),
        Value::ChronoDateTimeUtc(Some(dt)) => Some(dt.naive_utc()),
        Value::ChronoDateTimeLocal(Some(dt)) => Some(dt.naive_utc()),
        Value::ChronoDateTimeWithTimeZone(Some(dt)) => Some(dt.naive_utc()),
        _ => None,
    }
}

/// Total order over attribute values, used for in-memory ordering.
///
/// NULLs sort first. Values of unrelated kinds fall back to comparing their
/// rendered JSON text so the order stays total.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let a_null = value_to_json(a).is_null();
    let b_null = value_to_json(b).is_null();
    match (a_null, b_null) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }

    if let (Some(x), Some(y)) = (numeric(a), numeric(b)) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    if let (Some(x), Some(y)) = (timestamp(a), timestamp(b)) {
        return x.cmp(&y);
    }
    match (a, b) {
        (Value::Bool(Some(x)), Value::Bool(Some(y))) => x.cmp(y),
        (Value::String(Some(x)), Value::String(Some(y))) => x.as_str().cmp(y.as_str()),
        (Value::Uuid(Some(x)), Value::Uuid(Some(y))) => Uuid::clone(x).cmp(&Uuid::clone(y)),
        (Value::ChronoDate(Some(x)), Value::ChronoDate(Some(y))) => x.cmp(y),
        _ => value_to_json(a).to_string().cmp(&value_to_json(b).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_integer_widths_normalize() {
        let small = EntityId::from_value(&Value::Int(Some(7))).unwrap();
        let big = EntityId::from_value(&Value::BigInt(Some(7))).unwrap();
        assert_eq!(small, big);
        assert_eq!(small, Some(EntityId::Int(7)));
    }

    #[test]
    fn test_null_key_is_none() {
        assert_eq!(EntityId::from_value(&Value::Int(None)).unwrap(), None);
        assert_eq!(EntityId::from_value(&Value::String(None)).unwrap(), None);
    }

    #[test]
    fn test_unsupported_key_is_configuration_error() {
        let err = EntityId::from_value(&Value::Double(Some(1.5))).unwrap_err();
        assert!(matches!(err, FluxError::Configuration(_)));
    }

    #[test]
    fn test_to_value_respects_column_kind() {
        let id = EntityId::Int(42);
        assert_eq!(id.to_value(ColumnKind::Integer).unwrap(), Value::Int(Some(42)));
        assert_eq!(id.to_value(ColumnKind::BigInteger).unwrap(), Value::BigInt(Some(42)));
        assert!(EntityId::Int(i64::MAX).to_value(ColumnKind::Integer).is_err());
    }

    #[test]
    fn test_parse_cursor_text() {
        assert_eq!(EntityId::parse("12", ColumnKind::Integer).unwrap(), EntityId::Int(12));
        assert!(EntityId::parse("twelve", ColumnKind::Integer).is_err());
        assert_eq!(
            EntityId::parse("abc", ColumnKind::Text).unwrap(),
            EntityId::Text("abc".to_string())
        );
    }

    #[test]
    fn test_ids_serialize_as_strings() {
        let ids = vec![EntityId::Int(3), EntityId::Text("x".to_string())];
        assert_eq!(serde_json::to_value(&ids).unwrap(), json!(["3", "x"]));
    }

    #[test]
    fn test_naive_timestamp_gets_utc_marker() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap();
        assert_eq!(
            value_to_json(&Value::from(dt)),
            json!("2024-03-09T14:05:00Z")
        );
    }

    #[test]
    fn test_fractional_seconds_are_kept() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_micro_opt(14, 5, 0, 250)
            .unwrap();
        assert_eq!(
            value_to_json(&Value::from(dt)),
            json!("2024-03-09T14:05:00.000250Z")
        );
    }

    #[test]
    fn test_aware_timestamp_is_rendered_in_utc() {
        let dt = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(
            value_to_json(&Value::from(dt)),
            json!("2023-12-31T23:59:59Z")
        );
    }

    #[test]
    fn test_scalars_render() {
        assert_eq!(value_to_json(&Value::Int(Some(5))), json!(5));
        assert_eq!(value_to_json(&Value::Bool(Some(true))), json!(true));
        assert_eq!(value_to_json(&Value::String(Some("hi".to_string()))), json!("hi"));
        assert_eq!(value_to_json(&Value::Int(None)), Json::Null);
        assert_eq!(value_to_json(&Value::Double(Some(f64::NAN))), Json::Null);
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&Value::Int(Some(1)), &Value::BigInt(Some(2))), Ordering::Less);
        assert_eq!(compare_values(&Value::Int(None), &Value::Int(Some(0))), Ordering::Less);
        assert_eq!(
            compare_values(
                &Value::String(Some("b".to_string())),
                &Value::String(Some("a".to_string()))
            ),
            Ordering::Greater
        );
    }
}
