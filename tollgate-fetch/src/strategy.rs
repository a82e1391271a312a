//! Acquisition strategy selection.
//!
//! Strategies are tried cheapest first: a cached bundle, then a plain HTTP
//! handshake, then a full browser session. Which one runs is a pure
//! function of the cache state and what already failed during the current
//! call, so the escalation path can be tested without any I/O.

use std::fmt;

use tollgate_core::AcquisitionStrategy;

// ============================================================================
// Strategy Inputs
// ============================================================================

/// Everything [`select_strategy`] looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StrategyInputs {
    /// A fresh bundle is in the credential store.
    pub cache_fresh: bool,
    /// Strategy forced by the caller, e.g. after an authorization rejection.
    pub forced: Option<AcquisitionStrategy>,
    /// Strategy that already failed during this call.
    pub prior_failure: Option<AcquisitionStrategy>,
    /// A handshake bundle was accepted recently for this endpoint.
    pub fast_path_recent: bool,
    /// A browser engine is configured and can launch.
    pub browser_available: bool,
}

impl StrategyInputs {
    /// Inputs for a call that finds the cache in the given state.
    pub fn new(cache_fresh: bool) -> Self {
        Self {
            cache_fresh,
            ..Self::default()
        }
    }

    /// Forces a strategy.
    pub fn forced(mut self, strategy: AcquisitionStrategy) -> Self {
        self.forced = Some(strategy);
        self
    }

    /// Records a failed strategy.
    pub fn after_failure(mut self, strategy: AcquisitionStrategy) -> Self {
        self.prior_failure = Some(strategy);
        self
    }

    /// Sets whether the fast path was observed recently.
    pub fn fast_path_recent(mut self, recent: bool) -> Self {
        self.fast_path_recent = recent;
        self
    }

    /// Sets whether a browser engine is available.
    pub fn browser_available(mut self, available: bool) -> Self {
        self.browser_available = available;
        self
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Why a strategy was chosen. Logged with each acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    /// The cache holds a fresh bundle.
    CacheHit,
    /// The caller forced the strategy.
    Forced,
    /// The previous strategy failed; this is its alternate.
    Fallback,
    /// A handshake succeeded recently.
    FastPath,
    /// No recent handshake success.
    Default,
    /// Browser wanted but unavailable.
    BrowserUnavailable,
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CacheHit => "cache hit",
            Self::Forced => "forced",
            Self::Fallback => "fallback",
            Self::FastPath => "fast path",
            Self::Default => "default",
            Self::BrowserUnavailable => "browser unavailable",
        };
        f.write_str(s)
    }
}

/// A chosen strategy and the reason for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyChoice {
    /// Strategy to run.
    pub strategy: AcquisitionStrategy,
    /// Why.
    pub reason: SelectionReason,
}

/// Chooses the acquisition strategy for one step of an authorized call.
///
/// Rules, in order:
/// 1. Fresh cache and nothing forced: reuse the cache.
/// 2. A forced strategy wins.
/// 3. After a failure, switch to the failed strategy's alternate.
/// 4. Otherwise the handshake if it worked recently, else the browser.
///
/// A browser choice degrades to the handshake when no engine can launch.
pub fn select_strategy(inputs: StrategyInputs) -> StrategyChoice {
    let (strategy, reason) = if inputs.cache_fresh && inputs.forced.is_none() {
        (AcquisitionStrategy::CachedReuse, SelectionReason::CacheHit)
    } else if let Some(forced) = inputs.forced {
        (forced, SelectionReason::Forced)
    } else if let Some(alternate) = inputs.prior_failure.and_then(|s| s.alternate()) {
        (alternate, SelectionReason::Fallback)
    } else if inputs.fast_path_recent {
        (
            AcquisitionStrategy::LightweightHandshake,
            SelectionReason::FastPath,
        )
    } else {
        (
            AcquisitionStrategy::BrowserAutomation,
            SelectionReason::Default,
        )
    };

    if strategy == AcquisitionStrategy::BrowserAutomation && !inputs.browser_available {
        return StrategyChoice {
            strategy: AcquisitionStrategy::LightweightHandshake,
            reason: SelectionReason::BrowserUnavailable,
        };
    }

    StrategyChoice { strategy, reason }
}

// ============================================================================
// Tests
// ============================================================================
