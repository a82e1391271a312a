//! Serde tests for the persisted and wire-facing core types.

use chrono::{TimeZone, Utc};
use serde_json::json;

use crate::{AcquisitionStrategy, DEFAULT_TOKEN_TTL_SECS, FetchMetrics, TokenBundle};

// ============================================================================
// TokenBundle Serde Tests
// ============================================================================

#[test]
fn test_token_bundle_wire_shape() {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let bundle = TokenBundle::from_pairs([("datadome", "abc")], AcquisitionStrategy::BrowserAutomation)
        .acquired_at(at);

    let value = serde_json::to_value(&bundle).unwrap();
    assert_eq!(value["cookies"], json!({"datadome": "abc"}));
    assert_eq!(value["timestamp"], json!("2024-03-01T12:00:00Z"));
    assert_eq!(value["ttl_secs"], json!(DEFAULT_TOKEN_TTL_SECS));
    assert_eq!(value["source"], json!("browser_automation"));
}

#[test]
fn test_token_bundle_legacy_entry_defaults() {
    // Entries written without ttl/source still load.
    let raw = r#"{"cookies": {"datadome": "abc"}, "timestamp": "2024-03-01T12:00:00Z"}"#;
    let bundle: TokenBundle = serde_json::from_str(raw).unwrap();
    assert_eq!(bundle.ttl_secs, DEFAULT_TOKEN_TTL_SECS);
    assert_eq!(bundle.source, AcquisitionStrategy::BrowserAutomation);
    assert_eq!(bundle.cookie("datadome"), Some("abc"));
}

#[test]
fn test_strategy_snake_case() {
    assert_eq!(
        serde_json::to_string(&AcquisitionStrategy::LightweightHandshake).unwrap(),
        r#""lightweight_handshake""#
    );
    let parsed: Result<AcquisitionStrategy, _> = serde_json::from_str(r#""stealth""#);
    assert!(parsed.is_err());
}

// ============================================================================
// FetchMetrics Serde Tests
// ============================================================================

#[test]
fn test_metrics_serialize_all_counters() {
    let metrics = FetchMetrics {
        pages_fetched: 60,
        retries: 2,
        ..Default::default()
    };
    let value = serde_json::to_value(metrics).unwrap();
    assert_eq!(value["pages_fetched"], json!(60));
    assert_eq!(value["retries"], json!(2));
    assert_eq!(value["duplicates_dropped"], json!(0));
    assert!(!metrics.is_clean());
}
