//! Authorization token types.
//!
//! - [`TokenBundle`] - Cookies issued by the gateway plus their acquisition time
//! - [`AcquisitionStrategy`] - The ways a bundle can be obtained

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Default bundle lifetime: 12 hours.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 12 * 60 * 60;

/// Upper bound for TTL arithmetic (100 years).
const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

fn default_ttl_secs() -> u64 {
    DEFAULT_TOKEN_TTL_SECS
}

fn default_source() -> AcquisitionStrategy {
    AcquisitionStrategy::BrowserAutomation
}

// ============================================================================
// Acquisition Strategy
// ============================================================================

/// How an authorization bundle is obtained.
///
/// Variants are ordered by ascending cost, so `CachedReuse <
/// LightweightHandshake < BrowserAutomation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionStrategy {
    /// Reuse a fresh bundle from the credential store.
    CachedReuse,
    /// Replay the landing/search/bootstrap request sequence over plain HTTP.
    LightweightHandshake,
    /// Drive a real browser through the same pages and harvest its cookies.
    BrowserAutomation,
}

impl AcquisitionStrategy {
    /// Returns all strategies in cost order.
    pub fn all() -> &'static [AcquisitionStrategy] {
        &[
            Self::CachedReuse,
            Self::LightweightHandshake,
            Self::BrowserAutomation,
        ]
    }

    /// Returns the display name for this strategy.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::CachedReuse => "Cached Reuse",
            Self::LightweightHandshake => "Lightweight Handshake",
            Self::BrowserAutomation => "Browser Automation",
        }
    }

    /// Returns the strategy tried after this one fails to produce a bundle.
    ///
    /// Cached reuse never "fails" in that sense, so it has no alternate.
    pub fn alternate(&self) -> Option<AcquisitionStrategy> {
        match self {
            Self::CachedReuse => None,
            Self::LightweightHandshake => Some(Self::BrowserAutomation),
            Self::BrowserAutomation => Some(Self::LightweightHandshake),
        }
    }

    /// Returns true if this strategy performs network work.
    pub fn is_acquisition(&self) -> bool {
        !matches!(self, Self::CachedReuse)
    }
}

impl fmt::Display for AcquisitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Token Bundle
// ============================================================================

/// A set of gateway cookies and the moment they were obtained.
///
/// A bundle is *fresh* while `now - acquired_at < ttl` and *stale* afterwards.
/// Stale bundles must never be attached to a request.
///
/// Serialized as `{cookies, timestamp, ttl_secs, source}`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBundle {
    /// Cookie name to value.
    pub cookies: BTreeMap<String, String>,
    /// When the bundle was acquired.
    #[serde(rename = "timestamp")]
    pub acquired_at: DateTime<Utc>,
    /// Lifetime in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Strategy that produced this bundle.
    #[serde(default = "default_source")]
    pub source: AcquisitionStrategy,
}

impl TokenBundle {
    /// Creates a bundle acquired now with the default TTL.
    pub fn new(cookies: BTreeMap<String, String>, source: AcquisitionStrategy) -> Self {
        Self {
            cookies,
            acquired_at: Utc::now(),
            ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            source,
        }
    }

    /// Builds a bundle from `(name, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I, source: AcquisitionStrategy) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let cookies = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::new(cookies, source)
    }

    /// Sets the TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = ttl.as_secs();
        self
    }

    /// Sets the acquisition time.
    pub fn acquired_at(mut self, at: DateTime<Utc>) -> Self {
        self.acquired_at = at;
        self
    }

    /// Returns the TTL as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    fn ttl_delta(&self) -> TimeDelta {
        // Bounded above, so the conversion cannot overflow.
        #[allow(clippy::cast_possible_wrap)]
        TimeDelta::seconds(self.ttl_secs.min(MAX_TTL_SECS) as i64)
    }

    /// Returns when this bundle becomes stale.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.acquired_at + self.ttl_delta()
    }

    /// Returns true if the bundle is fresh at the given instant.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.acquired_at) < self.ttl_delta()
    }

    /// Returns true if the bundle is fresh right now.
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }

    /// Returns true if the bundle is stale right now.
    pub fn is_stale(&self) -> bool {
        !self.is_fresh()
    }

    /// Returns the remaining lifetime, or zero if stale.
    pub fn remaining(&self) -> Duration {
        (self.expires_at() - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }

    /// Returns true if a cookie with this name is present and non-empty.
    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookies.get(name).is_some_and(|v| !v.is_empty())
    }

    /// Returns a cookie value by name.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Renders the bundle as a `Cookie` header value.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Returns the number of cookies.
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Returns true if the bundle holds no cookies.
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

// Cookie values are credentials; keep them out of logs.
impl fmt::Debug for TokenBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBundle")
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .field("acquired_at", &self.acquired_at)
            .field("ttl_secs", &self.ttl_secs)
            .field("source", &self.source)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
