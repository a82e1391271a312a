//! Authorized calls.
//!
//! The [`SessionManager`] wraps every catalog request with the work needed
//! to get it through the gateway:
//!
//! 1. Find a fresh bundle in the credential store, or acquire one.
//! 2. Wait for the rate governor, attach the cookies, send.
//! 3. On 401/403 invalidate the bundle and retry once with a forced
//!    browser acquisition.
//! 4. On 429 back off exponentially; on network errors and 5xx back off
//!    linearly.
//!
//! Each call runs as an explicit [`CallState`] machine so every transition
//! is visible in one place.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tollgate_core::{AcquisitionStrategy, TokenBundle};
use tollgate_store::CredentialStore;
use tracing::{debug, info, instrument, warn};

use crate::acquirer::{SessionBinding, TokenAcquirer};
use crate::context::SessionMetrics;
use crate::error::{FailureCategory, SessionError, TransportError};
use crate::governor::RateGovernor;
use crate::host::http::{OutboundRequest, RawResponse, Transport};
use crate::retry::RetryPolicy;
use crate::strategy::{StrategyInputs, select_strategy};

// ============================================================================
// Call State
// ============================================================================

/// One step of an authorized call.
#[derive(Debug)]
pub enum CallState {
    /// No bundle yet; look in the store unless acquisition is forced.
    Unauthenticated {
        /// Strategy forced by an earlier rejection.
        forced: Option<AcquisitionStrategy>,
        /// Bundles acquired at or before this instant were rejected.
        rejected_at: Option<DateTime<Utc>>,
    },
    /// Acquiring a new bundle.
    Authenticating {
        /// Strategy forced by an earlier rejection.
        forced: Option<AcquisitionStrategy>,
        /// Bundles acquired at or before this instant were rejected.
        rejected_at: Option<DateTime<Utc>>,
    },
    /// Holding a bundle; the next step sends the request.
    Authorized {
        /// Bundle to attach.
        bundle: TokenBundle,
    },
    /// The gateway rejected the bundle.
    Reauthenticating {
        /// The rejected bundle.
        rejected: TokenBundle,
    },
    /// Terminal: the call succeeded.
    Success(RawResponse),
    /// Terminal: the call failed.
    Exhausted(SessionError),
}

impl CallState {
    /// Returns true for `Success` and `Exhausted`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Exhausted(_))
    }
}

/// Attempt counters for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallAttempts {
    /// Authorization rejections seen.
    pub auth_rejections: u32,
    /// 429 responses seen.
    pub rate_limited: u32,
    /// Network-level failures seen.
    pub network: u32,
    /// Acquisitions started.
    pub acquisitions: u32,
}

// ============================================================================
// Session Manager
// ============================================================================

/// Sends requests with a valid authorization bundle attached.
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    acquirer: Arc<TokenAcquirer>,
    transport: Arc<dyn Transport>,
    governor: Arc<RateGovernor>,
    binding: SessionBinding,
    key: String,
    policy: RetryPolicy,
    metrics: Arc<SessionMetrics>,
    acquire_lock: Mutex<()>,
}

impl SessionManager {
    /// Creates a manager with default pacing and retry limits.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        acquirer: Arc<TokenAcquirer>,
        transport: Arc<dyn Transport>,
        binding: SessionBinding,
        key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            acquirer,
            transport,
            governor: Arc::new(RateGovernor::default()),
            binding,
            key: key.into(),
            policy: RetryPolicy::default(),
            metrics: Arc::new(SessionMetrics::default()),
            acquire_lock: Mutex::new(()),
        }
    }

    /// Sets the rate governor.
    ///
    /// Pass the acquirer's governor to pace handshakes and API calls as
    /// one stream.
    pub fn with_governor(mut self, governor: impl Into<Arc<RateGovernor>>) -> Self {
        self.governor = governor.into();
        self
    }

    /// Sets the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Shares a metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<SessionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Credential store key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The session's egress binding.
    pub fn binding(&self) -> &SessionBinding {
        &self.binding
    }

    /// Session metrics.
    pub fn metrics(&self) -> &Arc<SessionMetrics> {
        &self.metrics
    }

    /// The token acquirer.
    pub fn acquirer(&self) -> &Arc<TokenAcquirer> {
        &self.acquirer
    }

    /// Sends `request` with authorization, recovering from expiry,
    /// rejection, rate limiting, and transient failures.
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn authorized_call(
        &self,
        request: OutboundRequest,
    ) -> Result<RawResponse, SessionError> {
        let mut attempts = CallAttempts::default();
        let mut state = CallState::Unauthenticated {
            forced: None,
            rejected_at: None,
        };

        loop {
            state = match state {
                CallState::Unauthenticated {
                    forced,
                    rejected_at,
                } => match forced {
                    None => match self.cached_bundle().await {
                        Some(bundle) => CallState::Authorized { bundle },
                        None => CallState::Authenticating {
                            forced,
                            rejected_at,
                        },
                    },
                    Some(_) => CallState::Authenticating {
                        forced,
                        rejected_at,
                    },
                },

                CallState::Authenticating {
                    forced,
                    rejected_at,
                } => match self.obtain_bundle(forced, rejected_at, &mut attempts).await {
                    Ok(bundle) => CallState::Authorized { bundle },
                    Err(e) => CallState::Exhausted(e),
                },

                CallState::Authorized { bundle } => {
                    self.send_authorized(&request, bundle, &mut attempts).await
                }

                CallState::Reauthenticating { rejected } => {
                    attempts.auth_rejections += 1;
                    self.invalidate().await;
                    if rejected.source == AcquisitionStrategy::LightweightHandshake {
                        self.acquirer.note_fast_path(false);
                    }

                    if attempts.auth_rejections > self.policy.auth_retries {
                        warn!(attempts = attempts.auth_rejections, "Authorization exhausted");
                        CallState::Exhausted(SessionError::AuthExhausted {
                            attempts: attempts.auth_rejections,
                        })
                    } else {
                        info!("Authorization rejected, forcing browser acquisition");
                        self.metrics.record_reauthorization();
                        CallState::Unauthenticated {
                            forced: Some(AcquisitionStrategy::BrowserAutomation),
                            rejected_at: Some(rejected.acquired_at),
                        }
                    }
                }

                CallState::Success(response) => return Ok(response),
                CallState::Exhausted(err) => return Err(err),
            };
        }
    }

    /// Sends a request and decodes its JSON body.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        request: OutboundRequest,
    ) -> Result<T, SessionError> {
        let response = self.authorized_call(request).await?;
        response
            .json()
            .map_err(|e| SessionError::InvalidResponse(e.to_string()))
    }

    /// Drops the cached bundle for this session's key.
    pub async fn invalidate(&self) {
        if let Err(e) = self.store.invalidate(&self.key).await {
            warn!(key = %self.key, error = %e, "Credential invalidation failed");
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// One send with `bundle` attached, classified into the next state.
    async fn send_authorized(
        &self,
        request: &OutboundRequest,
        bundle: TokenBundle,
        attempts: &mut CallAttempts,
    ) -> CallState {
        self.governor.await_turn().await;

        // The pacing wait may have outlived the bundle.
        if bundle.is_stale() {
            debug!("Bundle went stale while waiting, re-acquiring");
            return CallState::Unauthenticated {
                forced: None,
                rejected_at: None,
            };
        }

        let outbound = request.clone().with_cookies(&bundle.cookie_header());
        let result = self
            .transport
            .send(outbound, &self.binding.profile, self.binding.proxy.as_ref())
            .await
            .and_then(RawResponse::error_for_status);

        let err = match result {
            Ok(response) => {
                if bundle.source == AcquisitionStrategy::LightweightHandshake {
                    self.acquirer.note_fast_path(true);
                }
                return CallState::Success(response);
            }
            Err(err) => err,
        };

        match err.category() {
            FailureCategory::Auth => {
                warn!(error = %err, "Authorization rejected");
                CallState::Reauthenticating { rejected: bundle }
            }
            FailureCategory::RateLimited => {
                let retry_after = match err {
                    TransportError::RateLimited { retry_after } => retry_after,
                    _ => None,
                };
                self.metrics.record_rate_limit();
                attempts.rate_limited += 1;

                if attempts.rate_limited > self.policy.rate_limit_retries {
                    warn!(attempts = attempts.rate_limited, "Rate limit retries exhausted");
                    return CallState::Exhausted(SessionError::RateLimited { retry_after });
                }

                let delay = self
                    .policy
                    .rate_limit_delay(attempts.rate_limited - 1, retry_after);
                warn!(
                    attempt = attempts.rate_limited,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, backing off"
                );
                self.metrics.record_retry();
                tokio::time::sleep(delay).await;
                CallState::Authorized { bundle }
            }
            FailureCategory::Network | FailureCategory::Server => {
                attempts.network += 1;

                if attempts.network > self.policy.network_retries {
                    warn!(attempts = attempts.network, error = %err, "Endpoint unreachable");
                    return CallState::Exhausted(SessionError::Unreachable {
                        attempts: attempts.network,
                        last_error: err.to_string(),
                    });
                }

                let delay = self.policy.network_delay(attempts.network);
                warn!(
                    attempt = attempts.network,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying"
                );
                self.metrics.record_retry();
                tokio::time::sleep(delay).await;
                CallState::Authorized { bundle }
            }
            FailureCategory::Client => CallState::Exhausted(match err {
                TransportError::Status { status } => SessionError::Rejected { status },
                other => SessionError::InvalidRequest(other.to_string()),
            }),
        }
    }

    /// Reads a fresh bundle from the store. Store errors count as misses.
    async fn cached_bundle(&self) -> Option<TokenBundle> {
        match self.store.get(&self.key).await {
            Ok(Some(bundle)) if bundle.is_fresh() => Some(bundle),
            Ok(_) => None,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Credential store read failed");
                None
            }
        }
    }

    /// Acquires a bundle, single-flight per session.
    ///
    /// Tries the selected strategy, then its alternate once.
    async fn obtain_bundle(
        &self,
        forced: Option<AcquisitionStrategy>,
        rejected_at: Option<DateTime<Utc>>,
        attempts: &mut CallAttempts,
    ) -> Result<TokenBundle, SessionError> {
        let _guard = self.acquire_lock.lock().await;

        // Another worker may have finished an acquisition while we waited.
        if let Some(bundle) = self.cached_bundle().await {
            let newer = rejected_at.is_none_or(|at| bundle.acquired_at > at);
            if forced.is_none() || newer {
                debug!("Using bundle acquired by another worker");
                return Ok(bundle);
            }
        }

        let mut inputs = StrategyInputs::new(false)
            .fast_path_recent(self.acquirer.fast_path_recent())
            .browser_available(self.acquirer.browser_available());
        if let Some(strategy) = forced {
            inputs = inputs.forced(strategy);
        }

        let first = select_strategy(inputs);
        info!(strategy = %first.strategy, reason = %first.reason, "Selected acquisition strategy");
        attempts.acquisitions += 1;
        let first_err = match self.acquirer.acquire(first.strategy, &self.binding).await {
            Ok(bundle) => return Ok(self.store_bundle(bundle).await),
            Err(e) => e,
        };

        let retry = select_strategy(StrategyInputs {
            forced: None,
            prior_failure: Some(first.strategy),
            ..inputs
        });
        warn!(
            failed = %first.strategy,
            retry = %retry.strategy,
            error = %first_err,
            "Acquisition failed, trying alternate strategy"
        );
        attempts.acquisitions += 1;
        match self.acquirer.acquire(retry.strategy, &self.binding).await {
            Ok(bundle) => Ok(self.store_bundle(bundle).await),
            Err(e) => Err(SessionError::Acquisition(e)),
        }
    }

    async fn store_bundle(&self, bundle: TokenBundle) -> TokenBundle {
        self.metrics.record_token();
        if let Err(e) = self.store.put(&self.key, bundle.clone()).await {
            warn!(key = %self.key, error = %e, "Credential store write failed");
        }
        bundle
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("key", &self.key)
            .field("store", &self.store.backend_name())
            .field("binding", &self.binding)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
