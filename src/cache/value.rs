//! Cache Value Module
//!
//! Self-describing value tree stored by every backend, and its MessagePack encoding.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Cache Value ==
/// A structured payload that can be cached without registering a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Integers above `i64::MAX`
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Seq(Vec<CacheValue>),
    Map(BTreeMap<String, CacheValue>),
}

impl CacheValue {
    /// Encodes the value into the backend-agnostic byte format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(self).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    /// Decodes bytes previously produced by [`CacheValue::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    /// Converts any serializable type into a cache value.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Self::from)
            .map_err(|e| CacheError::Serialization(e.to_string()))
    }

    /// Rebuilds a typed value from a cache value.
    pub fn into_deserialize<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(self.into()).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    /// Looks up a field when the value is a map.
    pub fn get(&self, field: &str) -> Option<&CacheValue> {
        match self {
            CacheValue::Map(map) => map.get(field),
            _ => None,
        }
    }
}

// == Conversions ==
impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        CacheValue::Str(value.to_string())
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        CacheValue::Str(value)
    }
}

impl From<i64> for CacheValue {
    fn from(value: i64) -> Self {
        CacheValue::Int(value)
    }
}

impl From<f64> for CacheValue {
    fn from(value: f64) -> Self {
        CacheValue::Float(value)
    }
}

impl From<bool> for CacheValue {
    fn from(value: bool) -> Self {
        CacheValue::Bool(value)
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(value: Vec<u8>) -> Self {
        CacheValue::Bytes(value)
    }
}

impl From<Vec<CacheValue>> for CacheValue {
    fn from(value: Vec<CacheValue>) -> Self {
        CacheValue::Seq(value)
    }
}

impl From<BTreeMap<String, CacheValue>> for CacheValue {
    fn from(value: BTreeMap<String, CacheValue>) -> Self {
        CacheValue::Map(value)
    }
}

impl From<serde_json::Value> for CacheValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => CacheValue::Null,
            Value::Bool(b) => CacheValue::Bool(b),
            Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => CacheValue::Int(i),
                (None, Some(u)) => CacheValue::UInt(u),
                (None, None) => CacheValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => CacheValue::Str(s),
            Value::Array(items) => CacheValue::Seq(items.into_iter().map(Self::from).collect()),
            Value::Object(fields) => CacheValue::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<CacheValue> for serde_json::Value {
    fn from(value: CacheValue) -> Self {
        use serde_json::Value;

        match value {
            CacheValue::Null => Value::Null,
            CacheValue::Bool(b) => Value::Bool(b),
            CacheValue::Int(i) => Value::from(i),
            CacheValue::UInt(u) => Value::from(u),
            CacheValue::Float(f) => Value::from(f),
            CacheValue::Str(s) => Value::String(s),
            CacheValue::Bytes(bytes) => Value::Array(bytes.into_iter().map(Value::from).collect()),
            CacheValue::Seq(items) => Value::Array(items.into_iter().map(Self::from).collect()),
            CacheValue::Map(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect(),
            ),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> CacheValue {
        let mut inner = BTreeMap::new();
        inner.insert("hobbies".to_string(), CacheValue::Seq(vec!["hiking".into(), "biking".into()]));
        inner.insert("scores".to_string(), CacheValue::Seq(vec![1i64.into(), 2.5f64.into()]));
        inner.insert("avatar".to_string(), CacheValue::Bytes(vec![0, 159, 255]));

        let mut outer = BTreeMap::new();
        outer.insert("name".to_string(), "John Doe".into());
        outer.insert("profile".to_string(), CacheValue::Map(inner));
        outer.insert("active".to_string(), true.into());
        outer.insert("nothing".to_string(), CacheValue::Null);
        CacheValue::Map(outer)
    }

    #[test]
    fn test_encode_preserves_nested_shape() {
        let value = nested();
        let decoded = CacheValue::decode(&value.encode().unwrap()).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(
            decoded.get("profile").and_then(|p| p.get("avatar")),
            Some(&CacheValue::Bytes(vec![0, 159, 255]))
        );
    }

    #[test]
    fn test_decode_rejects_foreign_bytes() {
        let result = CacheValue::decode(b"\xc1 definitely not messagepack");
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }

    #[test]
    fn test_typed_conversion() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Payload {
            id: i64,
            name: String,
            hobbies: Vec<String>,
        }

        let payload = Payload {
            id: 1,
            name: "John Doe".to_string(),
            hobbies: vec!["hiking".to_string(), "swimming".to_string()],
        };

        let value = CacheValue::from_serialize(&payload).unwrap();
        assert_eq!(value.get("name"), Some(&CacheValue::Str("John Doe".to_string())));

        let back: Payload = value.into_deserialize().unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_json_numbers_keep_integer_precision() {
        let value = CacheValue::from(serde_json::json!({"big": 9_007_199_254_740_993i64, "ratio": 0.25}));
        assert_eq!(value.get("big"), Some(&CacheValue::Int(9_007_199_254_740_993)));
        assert_eq!(value.get("ratio"), Some(&CacheValue::Float(0.25)));
    }

    #[test]
    fn test_json_integers_above_i64_round_trip() {
        let json = serde_json::json!({"max": u64::MAX, "just_over": 9_223_372_036_854_775_808u64});
        let value = CacheValue::from(json.clone());
        assert_eq!(value.get("max"), Some(&CacheValue::UInt(u64::MAX)));

        let decoded = CacheValue::decode(&value.encode().unwrap()).unwrap();
        assert_eq!(serde_json::Value::from(decoded), json);
    }
}
