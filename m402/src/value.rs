//! Closed value model for tool arguments and result metadata.
//!
//! Arguments and metadata are open maps, but their values are restricted to
//! strings, numbers, booleans and nested maps. Arrays and `null` are rejected
//! when converting from JSON, so the restriction is enforced once at the codec
//! boundary and never re-checked inside the state machine.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// An ordered map of string keys to [`Value`]s.
pub type Map = BTreeMap<String, Value>;

/// A value inside an argument or metadata map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// A UTF-8 string.
    String(String),
    /// A JSON number.
    Number(serde_json::Number),
    /// A boolean.
    Bool(bool),
    /// A nested map.
    Map(Map),
}

impl Value {
    /// Returns the string if this is a [`Value::String`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number as `u64` if it is a non-negative integer.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    /// Returns the boolean if this is a [`Value::Bool`].
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the nested map if this is a [`Value::Map`].
    #[must_use]
    pub const fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }
}

/// A JSON value that falls outside the closed value model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported {kind} at `{path}`: only strings, numbers, booleans and objects are accepted")]
pub struct UnsupportedValue {
    /// Dotted path of the offending value.
    pub path: String,
    /// JSON kind that was rejected (`"array"` or `"null"`).
    pub kind: &'static str,
}

impl TryFrom<serde_json::Value> for Value {
    type Error = UnsupportedValue;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        convert(value, "")
    }
}

/// Converts a JSON object into a [`Map`], rejecting arrays and `null` anywhere
/// in the tree.
///
/// # Errors
///
/// Returns [`UnsupportedValue`] naming the first offending path.
pub fn map_from_json(
    object: serde_json::Map<String, serde_json::Value>,
) -> Result<Map, UnsupportedValue> {
    convert_object(object, "")
}

fn convert(value: serde_json::Value, path: &str) -> Result<Value, UnsupportedValue> {
    match value {
        serde_json::Value::String(s) => Ok(Value::String(s)),
        serde_json::Value::Number(n) => Ok(Value::Number(n)),
        serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_json::Value::Object(object) => convert_object(object, path).map(Value::Map),
        serde_json::Value::Array(_) => Err(UnsupportedValue {
            path: display_path(path),
            kind: "array",
        }),
        serde_json::Value::Null => Err(UnsupportedValue {
            path: display_path(path),
            kind: "null",
        }),
    }
}

fn convert_object(
    object: serde_json::Map<String, serde_json::Value>,
    path: &str,
) -> Result<Map, UnsupportedValue> {
    object
        .into_iter()
        .map(|(key, value)| {
            let child = if path.is_empty() {
                key.clone()
            } else {
                format!("{path}.{key}")
            };
            convert(value, &child).map(|value| (key, value))
        })
        .collect()
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "$".to_owned()
    } else {
        path.to_owned()
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Self::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::String(s),
            Value::Number(n) => Self::Number(n),
            Value::Bool(b) => Self::Bool(b),
            Value::Map(m) => Self::Object(m.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<Map> for Value {
    fn from(value: Map) -> Self {
        Self::Map(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Map(_) => {
                let json = serde_json::Value::from(self.clone());
                write!(f, "{json}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_objects_are_accepted() {
        let raw = json!({"topping": "pepperoni", "size": 12, "extra": {"cheese": true}});
        let serde_json::Value::Object(object) = raw else {
            unreachable!()
        };
        let map = map_from_json(object).unwrap();
        assert_eq!(map["topping"].as_str(), Some("pepperoni"));
        assert_eq!(map["size"].as_u64(), Some(12));
        assert_eq!(
            map["extra"].as_map().and_then(|m| m["cheese"].as_bool()),
            Some(true)
        );
    }

    #[test]
    fn arrays_are_rejected_with_their_path() {
        let raw = json!({"order": {"items": [1, 2]}});
        let serde_json::Value::Object(object) = raw else {
            unreachable!()
        };
        let err = map_from_json(object).unwrap_err();
        assert_eq!(err.path, "order.items");
        assert_eq!(err.kind, "array");
    }

    #[test]
    fn null_is_rejected() {
        let err = Value::try_from(serde_json::Value::Null).unwrap_err();
        assert_eq!(err.kind, "null");
        assert_eq!(err.path, "$");
    }

    #[test]
    fn serializes_without_tags() {
        let mut map = Map::new();
        map.insert("widget".into(), Value::from(true));
        map.insert("name".into(), Value::from("carousel"));
        let json = serde_json::to_value(Value::Map(map)).unwrap();
        assert_eq!(json, json!({"name": "carousel", "widget": true}));
    }

    #[test]
    fn deserialize_rejects_arrays() {
        let result: Result<Value, _> = serde_json::from_value(json!([1]));
        assert!(result.is_err());
    }
}
