//! JSON output formatting.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tollgate_core::{FetchMetrics, TokenBundle};
use tollgate_fetch::{Completion, FetchOutcome, PartialResultError};

// ============================================================================
// Output Types
// ============================================================================

/// Result of one search.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutput {
    pub query: String,
    pub count: usize,
    pub records: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<Completion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metrics: FetchMetrics,
}

impl SearchOutput {
    /// Output for a search that ran to an end.
    pub fn finished(query: &str, records: Vec<Value>, outcome: &FetchOutcome) -> Self {
        let resume_index = match outcome.completion {
            Completion::Cancelled { resume_index } => Some(resume_index),
            Completion::Exhausted | Completion::Capped => None,
        };
        Self {
            query: query.to_string(),
            count: records.len(),
            records,
            completion: Some(outcome.completion),
            resume_index,
            error: None,
            metrics: outcome.metrics,
        }
    }

    /// Output for a search that stopped on an error.
    pub fn failed(
        query: &str,
        records: Vec<Value>,
        err: &PartialResultError,
        metrics: FetchMetrics,
    ) -> Self {
        Self {
            query: query.to_string(),
            count: records.len(),
            records,
            completion: None,
            resume_index: Some(err.resume_index),
            error: Some(err.source.to_string()),
            metrics,
        }
    }

    /// Returns true if the search did not deliver everything it asked for.
    pub fn is_partial(&self) -> bool {
        self.resume_index.is_some()
    }
}

/// Cached token status. Cookie values are never printed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheOutput {
    pub key: String,
    pub backend: String,
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquired_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<u64>,
    pub cookies: Vec<String>,
}

impl CacheOutput {
    /// Describes the entry under `key`.
    pub fn new(key: &str, backend: &str, bundle: Option<&TokenBundle>) -> Self {
        Self {
            key: key.to_string(),
            backend: backend.to_string(),
            present: bundle.is_some(),
            source: bundle.map(|b| b.source.to_string()),
            acquired_at: bundle.map(|b| b.acquired_at),
            expires_at: bundle.map(TokenBundle::expires_at),
            remaining_secs: bundle.map(|b| b.remaining().as_secs()),
            cookies: bundle
                .map(|b| b.cookies.keys().cloned().collect())
                .unwrap_or_default(),
        }
    }
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON output formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats any serializable value.
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }
}
