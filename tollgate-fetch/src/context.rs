//! Fetch sessions.
//!
//! A [`FetchSession`] is created per top-level search. It binds one proxy
//! endpoint and one fingerprint profile, owns the session's rate governor
//! and metrics, and references a credential store that may outlive it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tollgate_core::FetchMetrics;
use tollgate_store::{Config, CredentialStore};
use tracing::{debug, info};

use crate::acquirer::{AcquisitionPlan, FastPathMemo, SessionBinding, TokenAcquirer};
use crate::error::SessionError;
use crate::governor::RateGovernor;
use crate::host::browser::BrowserEngine;
use crate::host::http::{HttpTransport, Transport};
use crate::orchestrator::{FetchOrchestrator, PageSource};
use crate::profile::ProfilePool;
use crate::proxy::ProxyPool;
use crate::retry::RetryPolicy;
use crate::session::SessionManager;

/// Highest allowed in-flight page concurrency per session.
pub const MAX_CONCURRENCY: usize = 3;

// ============================================================================
// Session Metrics
// ============================================================================

/// Live counters for one fetch session.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    pages_fetched: AtomicU64,
    retries: AtomicU64,
    tokens_acquired: AtomicU64,
    reauthorizations: AtomicU64,
    rate_limit_hits: AtomicU64,
    records_emitted: AtomicU64,
    duplicates_dropped: AtomicU64,
}

impl SessionMetrics {
    /// A page arrived.
    pub fn record_page(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    /// A request is being re-sent.
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// A bundle was acquired.
    pub fn record_token(&self) {
        self.tokens_acquired.fetch_add(1, Ordering::Relaxed);
    }

    /// A forced re-acquisition started.
    pub fn record_reauthorization(&self) {
        self.reauthorizations.fetch_add(1, Ordering::Relaxed);
    }

    /// A 429 arrived.
    pub fn record_rate_limit(&self) {
        self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records were handed to the caller.
    pub fn record_emitted(&self, count: u64) {
        self.records_emitted.fetch_add(count, Ordering::Relaxed);
    }

    /// A duplicate record was dropped.
    pub fn record_duplicate(&self) {
        self.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> FetchMetrics {
        FetchMetrics {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            tokens_acquired: self.tokens_acquired.load(Ordering::Relaxed),
            reauthorizations: self.reauthorizations.load(Ordering::Relaxed),
            rate_limit_hits: self.rate_limit_hits.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Session Settings
// ============================================================================

/// Settings for one fetch session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Credential store key.
    pub credential_key: String,
    /// Lower bound of the inter-request interval.
    pub min_delay: Duration,
    /// Upper bound of the inter-request interval.
    pub max_delay: Duration,
    /// In-flight page limit.
    pub concurrency: usize,
    /// Retry limits.
    pub policy: RetryPolicy,
    /// How long a handshake success keeps the fast path open.
    pub fast_path_window: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Domains the transport may contact; empty means any.
    pub allowed_domains: Vec<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            credential_key: "tollgate:credentials:catalog".to_string(),
            min_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(8),
            concurrency: 2,
            policy: RetryPolicy::default(),
            fast_path_window: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(30),
            allowed_domains: Vec::new(),
        }
    }
}

impl SessionSettings {
    /// Builds settings from configuration.
    pub fn from_config(config: &Config) -> Self {
        let session = &config.session;
        Self {
            credential_key: config.credential_key(),
            min_delay: Duration::from_millis(session.min_delay_ms),
            max_delay: Duration::from_millis(session.max_delay_ms),
            concurrency: session.concurrency,
            policy: RetryPolicy::from_config(session),
            fast_path_window: Duration::from_secs(session.fast_path_window_secs),
            request_timeout: Duration::from_secs(session.request_timeout_secs),
            allowed_domains: config.catalog.allowed_domains.clone(),
        }
    }

    /// Settings with no pacing or backoff waits. For tests.
    pub fn immediate() -> Self {
        Self {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            policy: RetryPolicy::immediate(),
            ..Self::default()
        }
    }

    /// Sets the credential key.
    pub fn with_credential_key(mut self, key: impl Into<String>) -> Self {
        self.credential_key = key.into();
        self
    }

    /// Sets the concurrency limit.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Concurrency clamped to `1..=MAX_CONCURRENCY`.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

// ============================================================================
// Fetch Session
// ============================================================================

/// Per-search aggregate of a session manager and its settings.
#[derive(Debug, Clone)]
pub struct FetchSession {
    manager: Arc<SessionManager>,
    settings: SessionSettings,
    metrics: Arc<SessionMetrics>,
}

impl FetchSession {
    /// Creates a builder for the given acquisition plan.
    pub fn builder(plan: AcquisitionPlan) -> FetchSessionBuilder {
        FetchSessionBuilder::new(plan)
    }

    /// Creates a builder from configuration.
    ///
    /// Proxies, settings, and (with the `browser` feature) a Chromium engine
    /// are taken from `config`.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn CredentialStore>,
    ) -> Result<FetchSessionBuilder, SessionError> {
        let plan = AcquisitionPlan::from_config(config)?;
        let mut proxies = ProxyPool::from_urls(&config.proxies.endpoints)
            .map_err(|e| SessionError::InvalidRequest(e.to_string()))?;
        if let Some(param) = &config.proxies.sticky_session_param {
            proxies = proxies.with_sticky_session(param.clone());
        }

        let builder = FetchSessionBuilder::new(plan)
            .store(store)
            .settings(SessionSettings::from_config(config))
            .proxies(proxies);

        #[cfg(feature = "browser")]
        let builder = if config.browser.enabled {
            let mut engine = crate::host::browser::ChromiumEngine::new();
            if let Some(path) = &config.browser.executable {
                engine = engine.with_executable(path.clone());
            }
            builder.browser(Arc::new(engine))
        } else {
            builder
        };

        Ok(builder)
    }

    /// The session manager.
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Session settings.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// The egress binding.
    pub fn binding(&self) -> &SessionBinding {
        self.manager.binding()
    }

    /// Live metrics.
    pub fn metrics(&self) -> &Arc<SessionMetrics> {
        &self.metrics
    }

    /// The fast path memo. Hand it to the next session's builder so a
    /// recent handshake success carries over.
    pub fn fast_path(&self) -> Arc<FastPathMemo> {
        Arc::clone(self.manager.acquirer().fast_path())
    }

    /// An orchestrator over `source` with this session's concurrency and
    /// metrics.
    pub fn orchestrator(&self, source: Arc<dyn PageSource>) -> FetchOrchestrator {
        FetchOrchestrator::new(source)
            .with_concurrency(self.settings.effective_concurrency())
            .with_metrics(Arc::clone(&self.metrics))
    }
}

// ============================================================================
// Fetch Session Builder
// ============================================================================

/// Builder for constructing a `FetchSession`.
pub struct FetchSessionBuilder {
    plan: AcquisitionPlan,
    store: Option<Arc<dyn CredentialStore>>,
    transport: Option<Arc<dyn Transport>>,
    browser: Option<Arc<dyn BrowserEngine>>,
    fast_path: Option<Arc<FastPathMemo>>,
    settings: SessionSettings,
    proxies: ProxyPool,
    profiles: ProfilePool,
}

impl FetchSessionBuilder {
    /// Creates a new builder.
    pub fn new(plan: AcquisitionPlan) -> Self {
        Self {
            plan,
            store: None,
            transport: None,
            browser: None,
            fast_path: None,
            settings: SessionSettings::default(),
            proxies: ProxyPool::direct(),
            profiles: ProfilePool::default(),
        }
    }

    /// Sets the credential store.
    pub fn store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the browser engine.
    pub fn browser(mut self, browser: Arc<dyn BrowserEngine>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Shares a fast path memo with earlier sessions of the same
    /// credential key. Without one the session starts with the fast path
    /// closed.
    pub fn fast_path(mut self, memo: Arc<FastPathMemo>) -> Self {
        self.fast_path = Some(memo);
        self
    }

    /// Sets the session settings.
    pub fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the proxy pool.
    pub fn proxies(mut self, proxies: ProxyPool) -> Self {
        self.proxies = proxies;
        self
    }

    /// Sets the profile rotation pool.
    pub fn profiles(mut self, profiles: ProfilePool) -> Self {
        self.profiles = profiles;
        self
    }

    /// Builds the session, checking out its proxy and picking its profile.
    pub fn build(mut self) -> FetchSession {
        let binding = SessionBinding::new(self.proxies.checkout(), self.profiles.pick());
        info!(
            profile = binding.profile.id,
            proxy = binding.proxy.as_ref().map(ToString::to_string).as_deref().unwrap_or("direct"),
            "Session bound"
        );

        let settings = self.settings;
        let transport = self.transport.unwrap_or_else(|| {
            Arc::new(
                HttpTransport::with_timeout(settings.request_timeout)
                    .with_allowed_domains(settings.allowed_domains.clone()),
            )
        });
        let store = self.store.unwrap_or_else(|| {
            debug!("No credential store given, using in-process cache");
            Arc::new(tollgate_store::MemoryCredentialStore::new())
        });

        let governor = Arc::new(RateGovernor::new(settings.min_delay, settings.max_delay));
        let fast_path = self
            .fast_path
            .unwrap_or_else(|| Arc::new(FastPathMemo::new(settings.fast_path_window)));
        let mut acquirer = TokenAcquirer::new(Arc::clone(&transport), self.plan)
            .with_fast_path(fast_path)
            .with_governor(Arc::clone(&governor));
        if let Some(browser) = self.browser {
            acquirer = acquirer.with_browser(browser);
        }

        let metrics = Arc::new(SessionMetrics::default());
        let manager = SessionManager::new(
            store,
            Arc::new(acquirer),
            transport,
            binding,
            settings.credential_key.clone(),
        )
        .with_governor(governor)
        .with_policy(settings.policy.clone())
        .with_metrics(Arc::clone(&metrics));

        FetchSession {
            manager: Arc::new(manager),
            settings,
            metrics,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AcquisitionError;
    use crate::host::http::{OutboundRequest, RawResponse};
    use crate::profile::FingerprintProfile;
    use crate::testing::{FakeBrowser, FakeTransport, with_cookie};
    use serde_json::json;
    use tollgate_core::AcquisitionStrategy;
    use tollgate_store::MemoryCredentialStore;
    use url::Url;

    fn plan() -> AcquisitionPlan {
        AcquisitionPlan::new(
            Url::parse("https://www.catalog.example/").unwrap(),
            Url::parse("https://www.catalog.example/search").unwrap(),
            Url::parse("https://www.catalog.example/session-variable").unwrap(),
        )
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.session.concurrency = 7;
        config.session.min_delay_ms = 100;
        let settings = SessionSettings::from_config(&config);

        assert_eq!(settings.credential_key, "tollgate:credentials:catalog");
        assert_eq!(settings.min_delay, Duration::from_millis(100));
        assert_eq!(settings.effective_concurrency(), MAX_CONCURRENCY);
        assert_eq!(
            SessionSettings::default().with_concurrency(0).effective_concurrency(),
            1
        );
    }

    #[test]
    fn test_builder_binds_proxy_and_profile() {
        let session = FetchSession::builder(plan())
            .proxies(ProxyPool::from_urls(&["http://a:1"]).unwrap())
            .profiles(ProfilePool::single(FingerprintProfile::EDGE_99))
            .settings(SessionSettings::immediate().with_credential_key("k"))
            .build();

        assert_eq!(session.binding().profile.id, "edge99");
        assert_eq!(
            session.binding().proxy.as_ref().map(ToString::to_string).as_deref(),
            Some("http://a:1")
        );
        assert_eq!(session.manager().key(), "k");
    }

    #[test]
    fn test_builder_defaults_to_direct() {
        let session = FetchSession::builder(plan()).build();
        assert!(session.binding().proxy.is_none());
    }

    fn search() -> OutboundRequest {
        OutboundRequest::post(
            Url::parse("https://api.catalog.example/api/property_search").unwrap(),
        )
        .json(json!({"size": 250}))
    }

    #[test]
    fn test_new_session_starts_with_fast_path_closed() {
        let session = FetchSession::builder(plan()).build();
        assert!(!session.fast_path().is_recent());
    }

    #[tokio::test]
    async fn test_shared_fast_path_carries_to_next_session() {
        let plan = plan().with_handshake_pause(Duration::ZERO);
        let transport = Arc::new(
            FakeTransport::new()
                .route("/", vec![with_cookie(200, "datadome", "handshake")])
                .route(
                    "/api/property_search",
                    vec![Ok(RawResponse::json_ok(&json!({"response": []})))],
                ),
        );

        // The first session falls back to the handshake, which the API accepts.
        let first = FetchSession::builder(plan.clone())
            .transport(transport.clone())
            .browser(Arc::new(FakeBrowser::failing(
                AcquisitionError::EngineUnavailable("crashed".to_string()),
            )))
            .settings(SessionSettings::immediate())
            .build();
        first.manager().authorized_call(search()).await.unwrap();
        assert!(first.fast_path().is_recent());

        let browser = Arc::new(FakeBrowser::with_cookies(&[("datadome", "browser")]));
        let store = Arc::new(MemoryCredentialStore::new());
        let second = FetchSession::builder(plan)
            .transport(transport)
            .browser(browser.clone())
            .store(store.clone())
            .fast_path(first.fast_path())
            .settings(SessionSettings::immediate())
            .build();
        second.manager().authorized_call(search()).await.unwrap();

        assert_eq!(browser.calls(), 0);
        let stored = store.get(second.manager().key()).await.unwrap().unwrap();
        assert_eq!(stored.source, AcquisitionStrategy::LightweightHandshake);
    }

    #[test]
    fn test_from_config_rejects_bad_proxy() {
        let mut config = Config::default();
        config.proxies.endpoints = vec!["ftp://nope:21".to_string()];
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());

        assert!(matches!(
            FetchSession::from_config(&config, store),
            Err(SessionError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = SessionMetrics::default();
        metrics.record_page();
        metrics.record_page();
        metrics.record_retry();
        metrics.record_emitted(250);
        metrics.record_duplicate();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.pages_fetched, 2);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.records_emitted, 250);
        assert_eq!(snapshot.duplicates_dropped, 1);
        assert!(!snapshot.is_clean());
    }
}
