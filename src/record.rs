//! Record model and canonical content hashing
//!
//! A record is one unit of origin data: a flat field map as fetched from a
//! source. The canonical hash is computed with storage-assigned and volatile
//! fields stripped and keys sorted, so two fetches of semantically identical
//! content always hash identically regardless of re-serialization order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Fields excluded from canonical hashing
///
/// These change on every ingestion (timestamps) or are assigned by storage
/// rather than the origin.
const VOLATILE_FIELDS: &[&str] = &[
    "downloaded_at",
    "updated_at",
    "created_at",
    "id",
    "internal_id",
    "_id",
    "source_id",
];

/// Natural-key field names, in precedence order
const KEY_FIELDS: &[&str] = &["id", "_id", "document_id", "guid"];

/// One unit of origin data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Builds a record from a JSON value; non-object values are wrapped
    /// under a single "value" field
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            other => {
                let mut fields = Map::new();
                fields.insert("value".to_string(), other);
                Self { fields }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Explicit natural key, if the record carries one
    pub fn natural_key(&self) -> Option<String> {
        KEY_FIELDS
            .iter()
            .find_map(|field| self.fields.get(*field))
            .and_then(value_as_key)
    }

    /// Feed identity: guid, id, then link, in that precedence order
    pub fn feed_key(&self) -> Option<String> {
        ["guid", "id", "link"]
            .iter()
            .find_map(|field| self.fields.get(*field))
            .and_then(value_as_key)
    }

    /// Natural key, falling back to the canonical content hash
    ///
    /// A record with no stable identity is treated as new whenever its
    /// content changes.
    pub fn key_or_hash(&self) -> String {
        self.natural_key().unwrap_or_else(|| canonical_hash(self))
    }
}

fn value_as_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Computes the canonical SHA-256 content hash of a record
///
/// Volatile fields are stripped and keys serialized in sorted order before
/// hashing; the result is hex-encoded.
pub fn canonical_hash(record: &Record) -> String {
    let canonical = canonical_json(&Value::Object(
        record
            .fields
            .iter()
            .filter(|(key, _)| !VOLATILE_FIELDS.contains(&key.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    ));

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Serializes a JSON value with object keys in sorted order at every level
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let body = keys
                .iter()
                .map(|key| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(key).expect("string serializes"),
                        canonical_json(&map[*key])
                    )
                })
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{}}}", body)
        }
        Value::Array(items) => {
            let body = items
                .iter()
                .map(canonical_json)
                .collect::<Vec<_>>()
                .join(",");
            format!("[{}]", body)
        }
        other => serde_json::to_string(other).expect("scalar serializes"),
    }
}
