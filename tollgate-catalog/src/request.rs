//! Search request construction.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tollgate_core::{FilterSet, PageRequest};
use url::Url;

use crate::location::Location;

/// Filter key holding the location list.
pub const LOCATIONS_KEY: &str = "locations";

// ============================================================================
// Search Filters
// ============================================================================

/// Optional search criteria merged into every page request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Minimum price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_min: Option<u64>,
    /// Maximum price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_max: Option<u64>,
    /// Minimum bedrooms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beds_min: Option<u32>,
    /// Minimum bathrooms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baths_min: Option<f32>,
    /// Minimum square footage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqft_min: Option<u64>,
}

impl SearchFilters {
    /// Returns true if no criterion is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Builds the opaque filter set for `locations` plus these criteria.
    pub fn to_filter_set(&self, locations: &[Location]) -> FilterSet {
        let mut filters = FilterSet::new().with(
            LOCATIONS_KEY,
            serde_json::to_value(locations).unwrap_or(Value::Array(Vec::new())),
        );
        if let Ok(Value::Object(criteria)) = serde_json::to_value(self) {
            for (key, value) in criteria {
                filters.insert(key, value);
            }
        }
        filters
    }
}

// ============================================================================
// Bodies and URLs
// ============================================================================

/// Body of one search API call.
///
/// Paging fields always win over filter keys of the same name.
pub fn build_search_body(request: &PageRequest) -> Value {
    let mut body: Map<String, Value> = request.filter_set.as_map().clone();
    body.insert("size".to_string(), json!(request.page_size));
    body.insert("result_index".to_string(), json!(request.result_index));
    body.insert("house".to_string(), Value::Bool(true));
    body.entry(LOCATIONS_KEY.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    Value::Object(body)
}

/// Search page URL carrying the location filter, as a browser would open it.
pub fn search_page_url(search_page: &Url, locations: &[Location]) -> Url {
    let filters = json!({ LOCATIONS_KEY: locations });
    let mut url = search_page.clone();
    url.query_pairs_mut()
        .append_pair("filters", &filters.to_string());
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_has_paging_and_locations() {
        let filters = SearchFilters::default().to_filter_set(&[Location::parse("Dallas, TX")]);
        let body = build_search_body(&PageRequest::new(500, 250, filters));

        assert_eq!(body["size"], 250);
        assert_eq!(body["result_index"], 500);
        assert_eq!(body["house"], true);
        assert_eq!(body["locations"][0]["searchType"], "C");
        assert_eq!(body["locations"][0]["city"], "Dallas");
        assert!(body.get("price_min").is_none());
    }

    #[test]
    fn test_filters_are_merged() {
        let criteria = SearchFilters {
            price_min: Some(100_000),
            beds_min: Some(3),
            baths_min: Some(1.5),
            ..SearchFilters::default()
        };
        let body = build_search_body(&PageRequest::new(
            0,
            50,
            criteria.to_filter_set(&[Location::parse("75201")]),
        ));

        assert_eq!(body["price_min"], 100_000);
        assert_eq!(body["beds_min"], 3);
        assert_eq!(body["baths_min"], 1.5);
        assert!(body.get("price_max").is_none());
        assert!(!criteria.is_empty());
        assert!(SearchFilters::default().is_empty());
    }

    #[test]
    fn test_paging_fields_override_filter_keys() {
        let filters = FilterSet::new().with("size", 9).with("house", false);
        let body = build_search_body(&PageRequest::new(0, 25, filters));
        assert_eq!(body["size"], 25);
        assert_eq!(body["house"], true);
        assert_eq!(body["locations"], json!([]));
    }

    #[test]
    fn test_search_page_url_encodes_locations() {
        let base = Url::parse("https://www.catalog.example/search").unwrap();
        let url = search_page_url(&base, &[Location::parse("Dallas, TX")]);

        let (key, value) = url.query_pairs().next().unwrap();
        assert_eq!(key, "filters");
        let decoded: Value = serde_json::from_str(&value).unwrap();
        assert_eq!(decoded["locations"][0]["title"], "Dallas, TX");
    }
}
