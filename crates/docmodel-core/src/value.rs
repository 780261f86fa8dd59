//! Dynamic document values.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, TypeError};

/// A dynamically-typed document value.
///
/// Attributes, identities and foreign keys are all stored as `Value`s. Arrays
/// hold foreign-key lists and embedded collections; maps hold embedded
/// documents in their raw, not yet materialized, form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value
    Null,

    /// Boolean value
    Bool(bool),

    /// 64-bit signed integer
    Int(i64),

    /// 64-bit floating point
    Double(f64),

    /// Text string
    Text(String),

    /// Binary data
    Bytes(Vec<u8>),

    /// Timestamp (microseconds since epoch, UTC)
    Timestamp(i64),

    /// UUID (as 16 bytes), used for document identities
    Uuid([u8; 16]),

    /// Array of values
    Array(Vec<Value>),

    /// Nested document
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Generate a fresh document identity.
    #[must_use]
    pub fn new_id() -> Self {
        Value::Uuid(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Check if this value is null.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the type name of this value.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::Uuid(_) => "uuid",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Try to convert this value to a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Try to convert this value to an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) | Value::Timestamp(v) => Some(*v),
            Value::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Try to convert this value to an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as an array slice.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Try to get this value as a nested document.
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Form-style truthiness: `true`, non-zero integers, `"1"` and `"true"`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(v) => *v,
            Value::Int(v) => *v != 0,
            Value::Text(s) => matches!(s.as_str(), "1" | "true"),
            _ => false,
        }
    }

    /// Blank values fail presence validation: null, empty text, empty collections.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Equality used by selectors: an array value contains the needle, or
    /// the two values are equal.
    pub fn contains_or_eq(&self, needle: &Value) -> bool {
        match self {
            Value::Array(items) if !matches!(needle, Value::Array(_)) => {
                items.iter().any(|item| item == needle)
            }
            other => other == needle,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) | Value::Timestamp(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Uuid(bytes) => write!(f, "{}", uuid::Uuid::from_bytes(*bytes)),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(v: IndexMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Value::Uuid(*v.as_bytes())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

fn type_error(expected: &'static str, actual: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: actual.type_name().to_string(),
        field: None,
    })
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_bool().ok_or_else(|| type_error("bool", &value))
    }
}

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_i64().ok_or_else(|| type_error("int", &value))
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_f64().ok_or_else(|| type_error("double", &value))
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(type_error("text", &other)),
        }
    }
}

impl TryFrom<Value> for uuid::Uuid {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Uuid(bytes) => Ok(uuid::Uuid::from_bytes(bytes)),
            Value::Text(ref s) => uuid::Uuid::parse_str(s).map_err(|_| type_error("uuid", &value)),
            other => Err(type_error("uuid", &other)),
        }
    }
}

impl<T> TryFrom<Value> for Option<T>
where
    T: TryFrom<Value, Error = Error>,
{
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(None),
            v => T::try_from(v).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_id_is_unique_uuid() {
        let a = Value::new_id();
        let b = Value::new_id();
        assert_eq!(a.type_name(), "uuid");
        assert_ne!(a, b);
        assert!(uuid::Uuid::try_from(a).is_ok());
    }

    #[test]
    fn test_from_primitives() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(7_i32), Value::Int(7));
        assert_eq!(Value::from("x"), Value::Text("x".to_string()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3_i64)), Value::Int(3));
    }

    #[test]
    fn test_try_from_mismatch_reports_types() {
        let err = String::try_from(Value::Int(1)).unwrap_err();
        assert_eq!(err.to_string(), "Type error: expected text, found int");
        assert_eq!(i64::try_from(Value::Bool(true)).unwrap(), 1);
        assert_eq!(Option::<String>::try_from(Value::Null).unwrap(), None);
    }

    #[test]
    fn test_contains_or_eq() {
        let ids = Value::Array(vec![Value::Int(1), Value::Int(2)]);
        assert!(ids.contains_or_eq(&Value::Int(2)));
        assert!(!ids.contains_or_eq(&Value::Int(3)));
        assert!(Value::Text("a".into()).contains_or_eq(&Value::Text("a".into())));
        assert!(ids.contains_or_eq(&Value::Array(vec![Value::Int(1), Value::Int(2)])));
    }

    #[test]
    fn test_truthy_and_blank() {
        assert!(Value::Text("1".into()).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Text("0".into()).is_truthy());
        assert!(Value::Text("  ".into()).is_blank());
        assert!(Value::Null.is_blank());
        assert!(!Value::Int(0).is_blank());
    }

    #[test]
    fn test_from_json() {
        let json = serde_json::json!({"name": "x", "tags": [1, 2.5], "ok": null});
        let value = Value::from(json);
        let map = value.as_map().unwrap();
        assert_eq!(map["name"], Value::Text("x".into()));
        assert_eq!(
            map["tags"],
            Value::Array(vec![Value::Int(1), Value::Double(2.5)])
        );
        assert!(map["ok"].is_null());
    }

    #[test]
    fn test_display_uuid_hyphenated() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(Value::from(id).to_string(), id.to_string());
    }
}
