//! Runtime type tags and raw (unwrapped) values.

use serde::{Deserialize, Serialize};

/// Runtime type of a node or raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    String,
    Boolean,
    Number,
    Null,
    Undefined,
    Array,
    Object,
}

impl TypeTag {
    /// True for string, boolean and number.
    pub fn is_primitive(self) -> bool {
        matches!(self, TypeTag::String | TypeTag::Boolean | TypeTag::Number)
    }

    /// True for the types that may hold child nodes.
    pub fn is_composite(self) -> bool {
        matches!(self, TypeTag::Array | TypeTag::Object)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::Boolean => "boolean",
            TypeTag::Number => "number",
            TypeTag::Null => "null",
            TypeTag::Undefined => "undefined",
            TypeTag::Array => "array",
            TypeTag::Object => "object",
        }
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plain value, as stored in or unwrapped from a tree.
///
/// Objects keep insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
}

impl Value {
    /// Runtime type of this value.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Undefined => TypeTag::Undefined,
            Value::Null => TypeTag::Null,
            Value::Bool(_) => TypeTag::Boolean,
            Value::Number(_) => TypeTag::Number,
            Value::String(_) => TypeTag::String,
            Value::Array(_) => TypeTag::Array,
            Value::Object(_) => TypeTag::Object,
        }
    }

    /// Builds an object value from `(key, value)` pairs.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Array(values)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            // Out-of-range integers degrade to NaN rather than failing the load
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_tags() {
        assert!(TypeTag::String.is_primitive());
        assert!(TypeTag::Boolean.is_primitive());
        assert!(TypeTag::Number.is_primitive());
        assert!(!TypeTag::Null.is_primitive());
        assert!(!TypeTag::Undefined.is_primitive());
        assert!(!TypeTag::Array.is_primitive());
        assert!(!TypeTag::Object.is_primitive());
    }

    #[test]
    fn test_value_type_tag() {
        assert_eq!(Value::from(true).type_tag(), TypeTag::Boolean);
        assert_eq!(Value::from(1).type_tag(), TypeTag::Number);
        assert_eq!(Value::from("x").type_tag(), TypeTag::String);
        assert_eq!(Value::Undefined.type_tag(), TypeTag::Undefined);
        assert_eq!(Value::object([("a", Value::Null)]).type_tag(), TypeTag::Object);
    }

    #[test]
    fn test_from_json_keeps_shape() {
        let json = serde_json::json!({ "a": [1, null, "s"], "b": { "c": false } });
        let value = Value::from(json);
        let Value::Object(entries) = value else {
            panic!("expected object");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].1,
            Value::Array(vec![Value::Number(1.0), Value::Null, Value::from("s")])
        );
        assert_eq!(entries[1].1.type_tag(), TypeTag::Object);
    }

    #[test]
    fn test_from_json_keeps_document_key_order() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{ "zeta": 1, "alpha": 2, "mid": 3 }"#).unwrap();
        let Value::Object(entries) = Value::from(json) else {
            panic!("expected object");
        };
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }
}
