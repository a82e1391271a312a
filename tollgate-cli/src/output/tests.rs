//! CLI output formatting tests.
//!
//! These tests verify that CLI output is correctly formatted for both
//! text and JSON output modes.

#[cfg(test)]
mod text_formatter_tests {
    use super::super::json::{CacheOutput, SearchOutput};
    use super::super::text::{TextFormatter, format_remaining};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tollgate_core::{AcquisitionStrategy, FetchMetrics, TokenBundle};
    use tollgate_fetch::{Completion, FetchError, FetchOutcome, PartialResultError, SessionError};

    fn outcome(completion: Completion) -> FetchOutcome {
        FetchOutcome {
            records: vec![],
            completion,
            metrics: FetchMetrics {
                pages_fetched: 3,
                tokens_acquired: 1,
                ..FetchMetrics::default()
            },
        }
    }

    #[test]
    fn test_search_lists_records_then_summary() {
        let formatter = TextFormatter::new(false);
        let output = SearchOutput::finished(
            "Dallas, TX",
            vec![json!({"id": 1}), json!({"id": 2})],
            &outcome(Completion::Exhausted),
        );

        let text = formatter.format_search(&output);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], r#"{"id":1}"#);
        assert_eq!(lines[1], r#"{"id":2}"#);
        assert!(text.contains("2 records for Dallas, TX (complete)"));
        assert!(text.contains("pages 3"));
        assert!(!text.contains("Resume"));
    }

    #[test]
    fn test_cancelled_search_shows_resume_hint() {
        let formatter = TextFormatter::new(false);
        let output = SearchOutput::finished(
            "75201",
            vec![],
            &outcome(Completion::Cancelled { resume_index: 40 }),
        );

        let text = formatter.format_summary(&output);
        assert!(text.contains("(cancelled)"));
        assert!(text.contains("Resume with --offset 40"));
        assert!(output.is_partial());
    }

    #[test]
    fn test_failed_search_shows_error() {
        let formatter = TextFormatter::new(true);
        let err = PartialResultError {
            records: vec![],
            resume_index: 500,
            source: FetchError::Aborted {
                resume_index: 500,
                emitted: 500,
                source: SessionError::Rejected { status: 400 },
            },
        };
        let output = SearchOutput::failed("Dallas, TX", vec![], &err, FetchMetrics::default());

        let text = formatter.format_summary(&output);
        assert!(text.contains("\x1b[31m"), "errors should be red");
        assert!(text.contains("HTTP 400"));
        assert!(text.contains("--offset 500"));
    }

    #[test]
    fn test_cache_without_token() {
        let formatter = TextFormatter::new(false);
        let output = CacheOutput::new("tollgate:credentials:catalog", "memory", None);
        let text = formatter.format_cache(&output);
        assert!(text.contains("no fresh token"));
        assert!(!text.contains("Cookies"));
    }

    #[test]
    fn test_cache_lists_cookie_names_only() {
        let formatter = TextFormatter::new(false);
        let cookies: BTreeMap<String, String> = [
            ("datadome".to_string(), "s3cret".to_string()),
            ("session".to_string(), "abc".to_string()),
        ]
        .into_iter()
        .collect();
        let bundle = TokenBundle::new(cookies, AcquisitionStrategy::LightweightHandshake)
            .with_ttl(Duration::from_secs(3600));
        let output = CacheOutput::new("k", "redis", Some(&bundle));

        let text = formatter.format_cache(&output);
        assert!(text.contains("datadome, session"));
        assert!(!text.contains("s3cret"));
        assert!(text.contains("fresh"));
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(40), "40s");
        assert_eq!(format_remaining(12 * 60), "12m");
        assert_eq!(format_remaining(5 * 3600 + 12 * 60), "5h 12m");
    }
}

#[cfg(test)]
mod json_formatter_tests {
    use super::super::json::{CacheOutput, JsonFormatter, SearchOutput};
    use serde_json::{Value, json};
    use tollgate_core::FetchMetrics;
    use tollgate_fetch::{Completion, FetchOutcome};

    #[test]
    fn test_search_output_shape() {
        let outcome = FetchOutcome {
            records: vec![],
            completion: Completion::Capped,
            metrics: FetchMetrics::default(),
        };
        let output = SearchOutput::finished("Dallas, TX", vec![json!({"id": 7})], &outcome);
        let formatter = JsonFormatter::new(false);
        let value: Value = serde_json::from_str(&formatter.format(&output).unwrap()).unwrap();

        assert_eq!(value["query"], "Dallas, TX");
        assert_eq!(value["count"], 1);
        assert_eq!(value["records"][0]["id"], 7);
        assert_eq!(value["completion"]["status"], "capped");
        assert!(value.get("resumeIndex").is_none());
        assert!(value.get("error").is_none());
        assert_eq!(value["metrics"]["pages_fetched"], 0);
    }

    #[test]
    fn test_cancelled_output_has_resume_index() {
        let outcome = FetchOutcome {
            records: vec![],
            completion: Completion::Cancelled { resume_index: 250 },
            metrics: FetchMetrics::default(),
        };
        let output = SearchOutput::finished("x", vec![], &outcome);
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["resumeIndex"], 250);
        assert_eq!(value["completion"]["resume_index"], 250);
    }

    #[test]
    fn test_pretty_output_is_indented() {
        let output = CacheOutput::new("k", "memory", None);
        let pretty = JsonFormatter::new(true).format(&output).unwrap();
        assert!(pretty.contains("\n  \"key\""));
        let compact = JsonFormatter::new(false).format(&output).unwrap();
        assert!(!compact.contains('\n'));
    }
}
