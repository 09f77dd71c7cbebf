//! Bridge between [`Value`] and `serde_json`.
//!
//! Peers may send plain JSON text frames instead of CBOR; those are parsed
//! with `serde_json` and lifted into a [`Value`].  The reverse direction is
//! lossy and meant for logs and command-line output.

use chrono::SecondsFormat;
use serde_json::{Map, Number, Value as Json};

use crate::value::Value;

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    Value::from(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => Value::Text(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Json::Object(obj) => Value::Map(
                obj.into_iter()
                    .map(|(k, v)| (Value::Text(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl Value {
    /// Parse a JSON text frame.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<Json>(s).map(Value::from)
    }

    /// Render as JSON.  Bytes become hex strings, timestamps RFC 3339,
    /// URIs and bignums strings; non-finite floats become `null`.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Undefined | Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Integer(i) => Json::from(*i),
            Value::BigInt(b) => Json::String(b.to_string()),
            Value::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Value::Text(s) => Json::String(s.clone()),
            Value::Bytes(b) => Json::String(hex::encode(b)),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(entries) => {
                let mut obj = Map::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = match k {
                        Value::Text(s) => s.clone(),
                        other => other.to_json().to_string(),
                    };
                    obj.insert(key, v.to_json());
                }
                Json::Object(obj)
            }
            Value::Timestamp(t) => Json::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Uri(u) => Json::String(u.to_string()),
            Value::Simple(s) => Json::from(s.code()),
        }
    }
}
