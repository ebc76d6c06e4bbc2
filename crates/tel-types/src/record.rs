use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RecordError;

/// The immutable unit of business data appended to a ledger.
///
/// A record is created by the host (or a module) before append and is never
/// mutated once its hash has been computed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Caller-supplied identifier, unique within one ledger.
    pub id: String,
    /// Logical partition, e.g. `"proofs"` or `"assets"`.
    pub stream: String,
    /// Milliseconds since the Unix epoch, caller-supplied.
    pub timestamp: u64,
    /// Business data. Must be a map or a list.
    pub payload: Value,
    /// Optional metadata. Absent and `null` are distinct.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Record {
    pub fn new(
        id: impl Into<String>,
        stream: impl Into<String>,
        timestamp: u64,
        payload: Value,
    ) -> Self {
        Self {
            id: id.into(),
            stream: stream.into(),
            timestamp,
            payload,
            meta: None,
        }
    }

    pub fn with_meta(
        id: impl Into<String>,
        stream: impl Into<String>,
        timestamp: u64,
        payload: Value,
        meta: Value,
    ) -> Self {
        Self {
            meta: Some(meta),
            ..Self::new(id, stream, timestamp, payload)
        }
    }

    /// Check the structural invariants: non-empty `id` and `stream`,
    /// non-zero `timestamp`, and a map or list `payload`.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.id.is_empty() {
            return Err(RecordError::EmptyId);
        }
        if self.stream.is_empty() {
            return Err(RecordError::EmptyStream);
        }
        if self.timestamp == 0 {
            return Err(RecordError::ZeroTimestamp);
        }
        match &self.payload {
            Value::Object(_) | Value::Array(_) => Ok(()),
            other => Err(RecordError::ScalarPayload(value_kind(other))),
        }
    }

    /// Look up a top-level field of a map payload.
    pub fn payload_field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Look up a top-level string field of a map payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload_field(key).and_then(Value::as_str)
    }

    /// Set a top-level field. No-op for list payloads.
    pub fn set_payload_field(&mut self, key: impl Into<String>, value: Value) {
        if let Some(map) = self.payload.as_object_mut() {
            map.insert(key.into(), value);
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}
