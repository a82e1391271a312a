//! Opaque catalog records and their identity.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single catalog record.
///
/// The field schema belongs to the catalog; this layer only needs to
/// extract an identifier for deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Value);

impl Record {
    /// Wraps a JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Returns the underlying JSON value.
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Consumes the record, returning the JSON value.
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Returns a top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Extracts a stable identity from records.
///
/// Tries each configured field in order; string and number values are
/// accepted. Records without any of them are identified by their full JSON
/// text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKey {
    fields: Vec<String>,
}

impl RecordKey {
    /// Creates a key extractor over the given fields.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the identifier fields, in priority order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Returns the identity of a record.
    pub fn key_for(&self, record: &Record) -> String {
        for field in &self.fields {
            match record.get(field) {
                Some(Value::String(s)) if !s.is_empty() => return format!("{field}:{s}"),
                Some(Value::Number(n)) => return format!("{field}:{n}"),
                _ => {}
            }
        }
        record.value().to_string()
    }
}

impl Default for RecordKey {
    fn default() -> Self {
        Self::new(["id", "property_id"])
    }
}
