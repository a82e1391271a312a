//! Search response parsing.
//!
//! The search API answers `{response: [...], result_count, record_count}`.
//! Older deployments used other envelopes, all of which are accepted:
//!
//! | Shape | Records | Total |
//! |-------|---------|-------|
//! | `response[]` | `response` | `result_count` |
//! | `data[]` | `data` | top-level total |
//! | `data{}` | `data.properties` or `data.results` | `data.total` or `data.count` |
//! | `properties[]` | `properties` | `total` |
//! | `results[]` | `results` | `total` |
//! | bare array | the array | its length |
//!
//! When no total is given, `result_count`, `total`, and `count` are tried
//! at the top level before falling back to the record count.

use serde_json::Value;
use tollgate_core::{PageRequest, PageResult, Record};
use tracing::debug;

use crate::error::CatalogError;

/// Parses one search response into a page.
pub fn parse_search_response(
    body: Value,
    request: &PageRequest,
) -> Result<PageResult, CatalogError> {
    let (records, total) = match body {
        Value::Array(items) => {
            let count = items.len() as u64;
            (items, Some(count))
        }
        Value::Object(mut map) => {
            let top_total = |map: &serde_json::Map<String, Value>| {
                ["result_count", "total", "count"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_u64))
            };

            let (items, nested_total) = if let Some(Value::Array(items)) = map.remove("response") {
                (items, None)
            } else if let Some(data) = map.remove("data") {
                match data {
                    Value::Array(items) => (items, None),
                    Value::Object(mut inner) => {
                        let items = ["properties", "results"]
                            .iter()
                            .find_map(|k| match inner.remove(*k) {
                                Some(Value::Array(items)) => Some(items),
                                _ => None,
                            })
                            .unwrap_or_default();
                        let total = ["total", "count"]
                            .iter()
                            .find_map(|k| inner.get(*k).and_then(Value::as_u64))
                            .filter(|t| *t > 0);
                        (items, total)
                    }
                    other => {
                        return Err(CatalogError::InvalidResponse(format!(
                            "unexpected data field: {}",
                            type_name(&other)
                        )));
                    }
                }
            } else if let Some(Value::Array(items)) = map.remove("properties") {
                (items, None)
            } else if let Some(Value::Array(items)) = map.remove("results") {
                (items, None)
            } else {
                let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                return Err(CatalogError::InvalidResponse(format!(
                    "no record list in response (keys: {})",
                    keys.join(", ")
                )));
            };

            let total = nested_total.or_else(|| top_total(&map).filter(|t| *t > 0));
            let record_count = map.get("record_count").and_then(Value::as_u64);
            let page = build_page(items, total);
            return Ok(match record_count {
                Some(count) => page.with_next_index(request.result_index + count),
                None => page,
            });
        }
        other => {
            return Err(CatalogError::InvalidResponse(format!(
                "expected object or array, got {}",
                type_name(&other)
            )));
        }
    };

    Ok(build_page(records, total))
}

fn build_page(items: Vec<Value>, total: Option<u64>) -> PageResult {
    let len = items.len() as u64;
    let total = total.unwrap_or(len);
    debug!(records = len, total, "Parsed search page");
    PageResult::new(items.into_iter().map(Record::new).collect(), total)
}

/// First entry of an autocomplete response, if any.
pub fn first_autocomplete_match(body: &Value) -> Option<&Value> {
    let list = match body {
        Value::Array(items) => items,
        Value::Object(map) => ["data", "results", "response"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))?,
        _ => return None,
    };
    list.first().filter(|entry| entry.is_object())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
