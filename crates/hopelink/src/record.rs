//! The record type persisted by every backend.
//!
//! The store treats a record as an opaque JSON object with a required `id`.
//! Field names follow the camelCase keys used by the persisted data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Key of the advisory display number.
pub const SEQUENCE_NUMBER: &str = "sequenceNumber";

/// Key of the organization tag used for scoping.
pub const CENTER_NAME: &str = "centerName";

/// Key of the server-assigned creation timestamp (cloud only).
pub const CREATED_AT: &str = "createdAt";

/// One registration entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier, assigned once at creation.
    pub id: String,

    /// Everything else, untouched by the store.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create a record with the given id and no payload.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Convert an arbitrary JSON object into a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not an object with a string `id`.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Look up a payload field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Look up a payload field holding a string.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }

    /// Look up a payload field holding an integer.
    #[must_use]
    pub fn int_field(&self, key: &str) -> Option<i64> {
        self.field(key).and_then(Value::as_i64)
    }

    /// The advisory sequence number, if set to an integer.
    #[must_use]
    pub fn sequence_number(&self) -> Option<i64> {
        self.int_field(SEQUENCE_NUMBER)
    }

    /// The organization this record belongs to.
    #[must_use]
    pub fn center_name(&self) -> Option<&str> {
        self.str_field(CENTER_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trips_opaque_fields() {
        let value = json!({
            "id": "1700000000000",
            "sequenceNumber": 3,
            "centerName": "광주광역시 동구 치매안심센터",
            "consentFile": {"name": "a.pdf", "data": "data:application/pdf;base64,AAAA"}
        });

        let record = Record::from_value(value.clone()).unwrap();
        assert_eq!(record.id, "1700000000000");
        assert_eq!(record.sequence_number(), Some(3));
        assert_eq!(record.center_name(), Some("광주광역시 동구 치매안심센터"));
        assert!(!record.fields.contains_key("id"));

        assert_eq!(serde_json::to_value(&record).unwrap(), value);
    }

    #[test]
    fn test_missing_id_is_rejected() {
        assert!(Record::from_value(json!({"name": "x"})).is_err());
    }

    #[test]
    fn test_sequence_number_ignores_non_integers() {
        let record = Record::new("a").with_field(SEQUENCE_NUMBER, Value::Null);
        assert_eq!(record.sequence_number(), None);

        let record = Record::new("b").with_field(SEQUENCE_NUMBER, "7");
        assert_eq!(record.sequence_number(), None);
    }
}
