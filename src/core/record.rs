use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::core::{Result, SyncError};

/// Stable opaque identity of a workflow order. Never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh UUID-backed id, mainly for fixtures and
    /// locally constructed records.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A workflow order: identity plus an opaque field map.
///
/// Business attributes are carried verbatim in `fields`; the core only
/// interprets stage statuses, the owner reference, and instant-typed
/// revision markers.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn from_parts(id: RecordId, fields: Map<String, Value>) -> Self {
        Self { id, fields }
    }

    /// Builds a record from a wire payload, pulling the identity out of
    /// `_id` (or `id`) and keeping the remaining keys as fields.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(SyncError::MalformedEvent(
                "record payload is not an object".to_string(),
            ));
        };
        let Some(id) = extract_id(&mut fields) else {
            return Err(SyncError::MalformedEvent(
                "record payload carries no id".to_string(),
            ));
        };
        Ok(Self { id, fields })
    }

    /// Serializes back to the wire shape, with the identity under `_id`.
    pub fn to_value(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("_id".to_string(), Value::String(self.id.to_string()));
        Value::Object(object)
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn set_field(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Enumerated workflow-stage status, e.g. `installationStatus`.
    pub fn stage(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn set_stage(&mut self, key: impl Into<String>, status: impl Into<String>) {
        self.fields.insert(key.into(), Value::String(status.into()));
    }

    /// Ordered line items; opaque to the core, replaced wholesale on diff.
    pub fn products(&self) -> Option<&Vec<Value>> {
        self.fields.get("products").and_then(Value::as_array)
    }
}

/// Removes the id key from a wire object. `_id` wins over `id`.
pub(crate) fn extract_id(fields: &mut Map<String, Value>) -> Option<RecordId> {
    for key in ["_id", "id"] {
        if let Some(Value::String(id)) = fields.get(key) {
            let id = RecordId::new(id.clone());
            fields.remove(key);
            return Some(id);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_prefers_underscore_id() {
        let record = Record::from_value(json!({
            "_id": "o-1",
            "id": "shadowed",
            "orderStatus": "Pending",
        }))
        .unwrap();

        assert_eq!(record.id, RecordId::new("o-1"));
        // The alternate key stays behind as an opaque field.
        assert_eq!(record.field("id"), Some(&json!("shadowed")));
    }

    #[test]
    fn test_from_value_rejects_missing_id() {
        assert!(Record::from_value(json!({"orderStatus": "Pending"})).is_err());
        assert!(Record::from_value(json!("not an object")).is_err());
    }

    #[test]
    fn test_round_trip_restores_id_key() {
        let record = Record::from_value(json!({
            "_id": "o-2",
            "paymentStatus": "Received",
        }))
        .unwrap();

        let value = record.to_value();
        assert_eq!(value["_id"], json!("o-2"));
        assert_eq!(value["paymentStatus"], json!("Received"));
    }

    #[test]
    fn test_stage_accessor_ignores_non_strings() {
        let record = Record::from_value(json!({
            "_id": "o-3",
            "installationStatus": "Completed",
            "total": 100,
        }))
        .unwrap();

        assert_eq!(record.stage("installationStatus"), Some("Completed"));
        assert_eq!(record.stage("total"), None);
        assert_eq!(record.stage("missing"), None);
    }

    #[test]
    fn test_products_are_exposed_as_an_ordered_array() {
        let record = Record::from_value(json!({
            "_id": "o-5",
            "products": [
                {"name": "Frame", "qty": 1},
                {"name": "Glass", "qty": 4},
            ],
        }))
        .unwrap();

        let products = record.products().unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0]["name"], json!("Frame"));

        let without = Record::from_value(json!({"_id": "o-6"})).unwrap();
        assert!(without.products().is_none());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(RecordId::generate(), RecordId::generate());
    }
}
