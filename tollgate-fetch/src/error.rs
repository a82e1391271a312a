//! Fetch error types.
//!
//! Errors are layered: the transport reports raw failure categories, the
//! token acquirer reports acquisition failures, and the session manager
//! reclassifies both into [`SessionError`]. The orchestrator only ever sees
//! session errors.

use std::time::Duration;
use thiserror::Error;
use tollgate_core::{AcquisitionStrategy, Record};

// ============================================================================
// Failure Category
// ============================================================================

/// Coarse classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    /// Connection refused, reset, timed out, or other I/O failure.
    Network,
    /// The gateway rejected our authorization (401/403).
    Auth,
    /// Too many requests (429).
    RateLimited,
    /// Upstream 5xx; treated like a network failure.
    Server,
    /// Any other client error; not retryable.
    Client,
}

impl FailureCategory {
    /// Returns true if the same request may succeed later without
    /// re-authorizing.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimited | Self::Server)
    }
}

// ============================================================================
// Transport Error
// ============================================================================

/// Error type for transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Could not connect.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Request timed out.
    #[error("Request timed out")]
    Timeout,

    /// Other request-level failure (body, redirect, protocol).
    #[error("Request failed: {0}")]
    Request(String),

    /// Authorization rejected.
    #[error("Authorization rejected (HTTP {status})")]
    AuthRejected {
        /// HTTP status (401 or 403).
        status: u16,
    },

    /// Rate limited.
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Server-provided wait, if any.
        retry_after: Option<Duration>,
    },

    /// Upstream server error.
    #[error("Server error (HTTP {status})")]
    Server {
        /// HTTP status.
        status: u16,
    },

    /// Other non-success status.
    #[error("Unexpected HTTP status {status}")]
    Status {
        /// HTTP status.
        status: u16,
    },

    /// Domain not allowed.
    #[error("Domain not allowed: {0}")]
    DomainNotAllowed(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid proxy endpoint.
    #[error("Invalid proxy: {0}")]
    InvalidProxy(String),
}

impl TransportError {
    /// Classifies a non-success HTTP status.
    ///
    /// Returns `None` for 2xx/3xx.
    pub fn from_status(status: u16, retry_after: Option<Duration>) -> Option<Self> {
        match status {
            200..=399 => None,
            401 | 403 => Some(Self::AuthRejected { status }),
            429 => Some(Self::RateLimited { retry_after }),
            500..=599 => Some(Self::Server { status }),
            _ => Some(Self::Status { status }),
        }
    }

    /// Returns the failure category.
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::Connect(_) | Self::Timeout | Self::Request(_) => FailureCategory::Network,
            Self::AuthRejected { .. } => FailureCategory::Auth,
            Self::RateLimited { .. } => FailureCategory::RateLimited,
            Self::Server { .. } => FailureCategory::Server,
            Self::Status { .. }
            | Self::DomainNotAllowed(_)
            | Self::InvalidUrl(_)
            | Self::InvalidProxy(_) => FailureCategory::Client,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

// ============================================================================
// Acquisition Error
// ============================================================================

/// Error type for token acquisition.
#[derive(Debug, Clone, Error)]
pub enum AcquisitionError {
    /// A page in the acquisition sequence failed to load.
    #[error("Navigation to {url} failed: {reason}")]
    Navigation {
        /// Page URL.
        url: String,
        /// Failure detail.
        reason: String,
    },

    /// A page in the acquisition sequence did not load in time.
    #[error("Navigation to {url} timed out after {after:?}")]
    Timeout {
        /// Page URL.
        url: String,
        /// Configured timeout.
        after: Duration,
    },

    /// The sequence finished but the gateway never issued its cookie.
    #[error("{strategy} finished without the {cookie} cookie")]
    MissingCookie {
        /// Required cookie name.
        cookie: String,
        /// Strategy that ran.
        strategy: AcquisitionStrategy,
    },

    /// No engine is available for this strategy.
    #[error("Acquisition engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The engine cannot route through the session's proxy.
    #[error("Engine cannot use proxy {0}")]
    ProxyUnsupported(String),

    /// The strategy does not acquire tokens.
    #[error("{0} does not acquire tokens")]
    NotAcquiring(AcquisitionStrategy),

    /// Transport failure during the handshake.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

// ============================================================================
// Session Error
// ============================================================================

/// Error type for authorized calls.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Authorization was rejected even after forced re-acquisition.
    #[error("Authorization exhausted after {attempts} rejected attempts")]
    AuthExhausted {
        /// Rejected attempts.
        attempts: u32,
    },

    /// Still rate limited after all retries.
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Last server-provided wait, if any.
        retry_after: Option<Duration>,
    },

    /// Network failures persisted after all retries.
    #[error("Endpoint unreachable after {attempts} attempts: {last_error}")]
    Unreachable {
        /// Attempts made.
        attempts: u32,
        /// Last transport error.
        last_error: String,
    },

    /// No strategy could produce a token bundle.
    #[error("Token acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    /// The endpoint refused the request for a non-retryable reason.
    #[error("Request rejected with HTTP {status}")]
    Rejected {
        /// HTTP status.
        status: u16,
    },

    /// The request could not be sent at all.
    #[error("Request invalid: {0}")]
    InvalidRequest(String),

    /// The response body could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

// ============================================================================
// Fetch Errors
// ============================================================================

/// Error terminating a record stream.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// A page failed; no further pages were scheduled.
    #[error("Fetch aborted at result index {resume_index} after {emitted} records: {source}")]
    Aborted {
        /// First result index that was not delivered.
        resume_index: u64,
        /// Records emitted before the failure.
        emitted: u64,
        /// The page failure.
        source: SessionError,
    },

    /// The worker driving the fetch stopped unexpectedly.
    #[error("Fetch interrupted at result index {resume_index}: {reason}")]
    Interrupted {
        /// First result index that was not delivered.
        resume_index: u64,
        /// What happened.
        reason: String,
    },
}

impl FetchError {
    /// Result index to restart from.
    pub fn resume_index(&self) -> u64 {
        match self {
            Self::Aborted { resume_index, .. } | Self::Interrupted { resume_index, .. } => {
                *resume_index
            }
        }
    }
}

/// A fetch that failed part-way, with everything delivered before the
/// failure.
///
/// Restart with a plan starting at [`resume_index`](Self::resume_index).
#[derive(Debug, Error)]
#[error("partial result: {} records before result index {resume_index}: {source}", .records.len())]
pub struct PartialResultError {
    /// Records emitted before the failure, in emission order.
    pub records: Vec<Record>,
    /// First result index that was not delivered.
    pub resume_index: u64,
    /// What stopped the fetch.
    pub source: FetchError,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(TransportError::from_status(200, None).is_none());
        assert_eq!(
            TransportError::from_status(401, None).unwrap().category(),
            FailureCategory::Auth
        );
        assert_eq!(
            TransportError::from_status(403, None).unwrap().category(),
            FailureCategory::Auth
        );
        assert_eq!(
            TransportError::from_status(429, Some(Duration::from_secs(5)))
                .unwrap()
                .category(),
            FailureCategory::RateLimited
        );
        assert_eq!(
            TransportError::from_status(503, None).unwrap().category(),
            FailureCategory::Server
        );
        assert_eq!(
            TransportError::from_status(404, None).unwrap().category(),
            FailureCategory::Client
        );
    }

    #[test]
    fn test_transient_categories() {
        assert!(FailureCategory::Network.is_transient());
        assert!(FailureCategory::Server.is_transient());
        assert!(!FailureCategory::Auth.is_transient());
        assert!(!FailureCategory::Client.is_transient());
    }

    #[test]
    fn test_partial_result_message() {
        let err = PartialResultError {
            records: vec![],
            resume_index: 750,
            source: FetchError::Aborted {
                resume_index: 750,
                emitted: 0,
                source: SessionError::AuthExhausted { attempts: 2 },
            },
        };
        assert!(err.to_string().contains("750"));
        assert_eq!(err.source.resume_index(), 750);
    }
}
