//! Fetch session counters.

use serde::{Deserialize, Serialize};

/// Point-in-time view of a fetch session's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchMetrics {
    /// Pages successfully fetched.
    pub pages_fetched: u64,
    /// Requests re-sent after a transient failure.
    pub retries: u64,
    /// Bundles obtained by handshake or browser.
    pub tokens_acquired: u64,
    /// Forced re-acquisitions after an authorization rejection.
    pub reauthorizations: u64,
    /// 429 responses observed.
    pub rate_limit_hits: u64,
    /// Records handed to the caller.
    pub records_emitted: u64,
    /// Records dropped as duplicates.
    pub duplicates_dropped: u64,
}

impl FetchMetrics {
    /// Returns true if no network-level trouble was observed.
    pub fn is_clean(&self) -> bool {
        self.retries == 0 && self.reauthorizations == 0 && self.rate_limit_hits == 0
    }
}
