//! Trait definitions for `tollgate`.
//!
//! The catalog's field schema is owned by callers. They plug in at the
//! output boundary through [`RecordMapper`].

use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::models::Record;

/// Maps opaque catalog records into a caller's domain type.
pub trait RecordMapper: Send + Sync {
    /// The domain type produced.
    type Output;

    /// Maps one record.
    fn map(&self, record: &Record) -> Result<Self::Output, CoreError>;

    /// Maps a batch, stopping at the first failure.
    fn map_all(&self, records: &[Record]) -> Result<Vec<Self::Output>, CoreError> {
        records.iter().map(|r| self.map(r)).collect()
    }
}

/// Passes records through as raw JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawRecordMapper;

impl RecordMapper for RawRecordMapper {
    type Output = Value;

    fn map(&self, record: &Record) -> Result<Value, CoreError> {
        Ok(record.value().clone())
    }
}

/// Keeps only the named top-level fields; absent fields map to `null`.
#[derive(Debug, Clone, Default)]
pub struct FieldProjection {
    fields: Vec<String>,
}

impl FieldProjection {
    /// Creates a projection over the given fields.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl RecordMapper for FieldProjection {
    type Output = Value;

    fn map(&self, record: &Record) -> Result<Value, CoreError> {
        let Value::Object(source) = record.value() else {
            return Err(CoreError::InvalidData(
                "record is not a JSON object".to_string(),
            ));
        };

        let projected: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.clone(), source.get(f).cloned().unwrap_or(Value::Null)))
            .collect();
        Ok(Value::Object(projected))
    }
}
