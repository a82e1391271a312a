//! Paging types.
//!
//! - [`FilterSet`] - Opaque search criteria
//! - [`PageRequest`] - One page worth of work
//! - [`PageResult`] - What the provider returned for that page

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::models::record::Record;

// ============================================================================
// Filter Set
// ============================================================================

/// Opaque, serializable search criteria.
///
/// The orchestrator never looks inside; catalog clients merge it into their
/// request bodies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet(Map<String, Value>);

impl FilterSet {
    /// Creates an empty filter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a criterion, replacing any previous value for `key`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a criterion.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns a criterion by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns true if no criteria are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Iterates over the criteria.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for FilterSet {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// ============================================================================
// Page Request
// ============================================================================

/// A request for one page of results.
///
/// Immutable once issued: retries re-send the same request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Offset of the first record in the page.
    pub result_index: u64,
    /// Number of records requested.
    pub page_size: u32,
    /// Search criteria.
    pub filter_set: FilterSet,
}

impl PageRequest {
    /// Creates a new page request.
    pub fn new(result_index: u64, page_size: u32, filter_set: FilterSet) -> Self {
        Self {
            result_index,
            page_size,
            filter_set,
        }
    }

    /// Checks `1 <= page_size <= max_page_size`.
    pub fn validate(&self, max_page_size: u32) -> Result<(), CoreError> {
        if self.page_size == 0 {
            return Err(CoreError::InvalidRequest(
                "page size must be at least 1".to_string(),
            ));
        }
        if self.page_size > max_page_size {
            return Err(CoreError::InvalidRequest(format!(
                "page size {} exceeds provider maximum {}",
                self.page_size, max_page_size
            )));
        }
        Ok(())
    }

    /// Offset just past the end of this page if it came back full.
    pub fn end_index(&self) -> u64 {
        self.result_index + u64::from(self.page_size)
    }
}

// ============================================================================
// Page Result
// ============================================================================

/// One page of records returned by the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    /// Records in provider order.
    pub records: Vec<Record>,
    /// Total matching records as reported on this page.
    ///
    /// Authoritative, but may drift between pages.
    pub total_count: u64,
    /// Provider's hint for the next offset, if any.
    pub next_index: Option<u64>,
}

impl PageResult {
    /// Creates a page result.
    pub fn new(records: Vec<Record>, total_count: u64) -> Self {
        Self {
            records,
            total_count,
            next_index: None,
        }
    }

    /// Sets the advisory next index.
    pub fn with_next_index(mut self, next_index: u64) -> Self {
        self.next_index = Some(next_index);
        self
    }

    /// Number of records on the page.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the page carried no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Offset of the next page when walking sequentially from `result_index`.
    pub fn following_index(&self, result_index: u64) -> u64 {
        result_index + self.records.len() as u64
    }
}

// ============================================================================
// Tests
// ============================================================================
