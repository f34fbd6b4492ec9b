//! Content-addressed fingerprint of a list query.

use crate::{FleetError, FleetResult, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Lowercase hex SHA-256 over the canonical JSON form of a query.
///
/// Canonical JSON sorts object keys recursively, so two structurally equal
/// values hash identically regardless of the order their fields were written in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryFingerprint(String);

impl QueryFingerprint {
    pub fn of<T: Serialize>(value: &T) -> FleetResult<Self> {
        let value = serde_json::to_value(value).map_err(|e| {
            FleetError::from(ValidationError::InvalidValue {
                field: "query".to_string(),
                reason: format!("not serializable: {}", e),
            })
        })?;
        let canonical = canonicalize(value).to_string();
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(Self(hex::encode(digest)))
    }

    /// Wrap a fingerprint read back from a cache key.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
