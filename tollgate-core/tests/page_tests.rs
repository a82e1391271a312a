//! Integration tests for core paging and token types.

use serde_json::json;
use tollgate_core::{
    AcquisitionStrategy, FilterSet, PageRequest, PageResult, Record, RecordKey, TokenBundle,
};

#[test]
fn test_page_request_roundtrip_preserves_filters() {
    let request = PageRequest::new(500, 250, FilterSet::new().with("beds_min", 3));
    let json = serde_json::to_string(&request).unwrap();
    let parsed: PageRequest = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, request);
    assert_eq!(parsed.end_index(), 750);
}

#[test]
fn test_dedup_keys_across_pages() {
    let key = RecordKey::default();
    let first = PageResult::new(vec![Record::new(json!({"id": 6})), Record::new(json!({"id": 7}))], 3);
    let second = PageResult::new(vec![Record::new(json!({"id": 7})), Record::new(json!({"id": 8}))], 3);

    let mut seen = std::collections::HashSet::new();
    let unique: Vec<_> = first
        .records
        .iter()
        .chain(second.records.iter())
        .filter(|r| seen.insert(key.key_for(r)))
        .collect();
    assert_eq!(unique.len(), 3);
}

#[test]
fn test_stale_bundle_is_not_fresh() {
    let bundle = TokenBundle::from_pairs([("datadome", "abc")], AcquisitionStrategy::LightweightHandshake)
        .acquired_at(chrono::Utc::now() - chrono::TimeDelta::hours(24));
    assert!(bundle.is_stale());
}
