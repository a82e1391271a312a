//! Token acquisition.
//!
//! The [`TokenAcquirer`] obtains a fresh [`TokenBundle`] for a session
//! binding using one of two strategies:
//!
//! - **Lightweight handshake**: plain HTTP through the session transport,
//!   walking landing page, search page, and session bootstrap while
//!   collecting every `Set-Cookie`.
//! - **Browser automation**: an injected [`BrowserEngine`] visits the same
//!   pages through the same proxy and returns its cookie jar.
//!
//! Either way the gateway's required cookie must be present, or the
//! acquisition fails.
//!
//! Handshake requests wait on the session's [`RateGovernor`] like every
//! other call on the binding. Browser navigation is paced by the page
//! settle times instead.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header;
use serde_json::json;
use tokio::time::Instant;
use tollgate_core::{AcquisitionStrategy, TokenBundle};
use tollgate_store::Config;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{AcquisitionError, FailureCategory, TransportError};
use crate::governor::RateGovernor;
use crate::host::browser::{BrowserEngine, BrowserLaunch, NavigationStep};
use crate::host::http::{OutboundRequest, RawResponse, Transport};
use crate::profile::{FingerprintProfile, RequestKind};
use crate::proxy::ProxyEndpoint;

/// Attempts kept in the acquisition history.
const MAX_ATTEMPT_HISTORY: usize = 32;

// ============================================================================
// Session Binding
// ============================================================================

/// The egress identity a session keeps for its whole lifetime.
#[derive(Debug, Clone, Default)]
pub struct SessionBinding {
    /// Upstream proxy; `None` connects directly.
    pub proxy: Option<ProxyEndpoint>,
    /// Header profile.
    pub profile: FingerprintProfile,
}

impl SessionBinding {
    /// Creates a binding.
    pub fn new(proxy: Option<ProxyEndpoint>, profile: FingerprintProfile) -> Self {
        Self { proxy, profile }
    }

    /// A direct binding with the given profile.
    pub fn direct(profile: FingerprintProfile) -> Self {
        Self::new(None, profile)
    }
}

// ============================================================================
// Acquisition Plan
// ============================================================================

/// Browser launch settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSettings {
    /// Viewport width and height.
    pub viewport: (u32, u32),
    /// Browser locale.
    pub locale: String,
    /// IANA timezone.
    pub timezone: String,
    /// Settle time after the landing page.
    pub landing_settle: Duration,
    /// Settle time after the search page.
    pub search_settle: Duration,
    /// Per-page navigation timeout.
    pub navigation_timeout: Duration,
    /// Run headless.
    pub headless: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            viewport: (1920, 1200),
            locale: "en-US".to_string(),
            timezone: "America/New_York".to_string(),
            landing_settle: Duration::from_secs(5),
            search_settle: Duration::from_secs(3),
            navigation_timeout: Duration::from_secs(30),
            headless: true,
        }
    }
}

/// Where and how tokens are acquired.
#[derive(Debug, Clone)]
pub struct AcquisitionPlan {
    /// Landing page.
    pub landing: Url,
    /// Search page, visited after the landing page.
    pub search_page: Url,
    /// Session bootstrap endpoint.
    pub bootstrap: Url,
    /// `Origin` sent with the bootstrap call.
    pub origin: String,
    /// Cookie that proves authorization.
    pub required_cookie: String,
    /// Pause between handshake steps.
    pub handshake_pause: Duration,
    /// Lifetime of acquired bundles.
    pub token_ttl: Duration,
    /// Browser launch settings.
    pub browser: BrowserSettings,
}

impl AcquisitionPlan {
    /// Creates a plan with default timing for the given pages.
    pub fn new(landing: Url, search_page: Url, bootstrap: Url) -> Self {
        let origin = landing.origin().ascii_serialization();
        Self {
            landing,
            search_page,
            bootstrap,
            origin,
            required_cookie: "datadome".to_string(),
            handshake_pause: Duration::from_secs(2),
            token_ttl: Duration::from_secs(tollgate_core::DEFAULT_TOKEN_TTL_SECS),
            browser: BrowserSettings::default(),
        }
    }

    /// Builds a plan from configuration.
    pub fn from_config(config: &Config) -> Result<Self, AcquisitionError> {
        let parse = |raw: &str| {
            Url::parse(raw).map_err(|e| {
                AcquisitionError::Transport(TransportError::InvalidUrl(format!("{raw}: {e}")))
            })
        };
        let catalog = &config.catalog;
        let browser = &config.browser;

        let mut plan = Self::new(
            parse(&catalog.landing_url)?,
            parse(&catalog.search_page_url)?,
            parse(&catalog.bootstrap_url)?,
        );
        plan.origin.clone_from(&catalog.origin);
        plan.required_cookie.clone_from(&catalog.required_cookie);
        plan.handshake_pause = Duration::from_millis(config.session.handshake_pause_ms);
        plan.token_ttl = Duration::from_secs(config.session.token_ttl_secs);
        plan.browser = BrowserSettings {
            viewport: (browser.viewport_width, browser.viewport_height),
            locale: browser.locale.clone(),
            timezone: browser.timezone.clone(),
            landing_settle: Duration::from_millis(browser.landing_settle_ms),
            search_settle: Duration::from_millis(browser.search_settle_ms),
            navigation_timeout: Duration::from_secs(browser.navigation_timeout_secs),
            headless: browser.headless,
        };
        Ok(plan)
    }

    /// Sets the handshake pause.
    pub fn with_handshake_pause(mut self, pause: Duration) -> Self {
        self.handshake_pause = pause;
        self
    }

    /// Sets the required cookie.
    pub fn with_required_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.required_cookie = cookie.into();
        self
    }

    /// Sets the bundle lifetime.
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    fn browser_launch(&self, binding: &SessionBinding) -> BrowserLaunch {
        let settings = &self.browser;
        BrowserLaunch {
            pages: vec![
                NavigationStep::new(self.landing.clone(), settings.landing_settle),
                NavigationStep::new(self.search_page.clone(), settings.search_settle),
            ],
            proxy: binding.proxy.clone(),
            user_agent: binding.profile.user_agent.to_string(),
            viewport: settings.viewport,
            locale: settings.locale.clone(),
            timezone: settings.timezone.clone(),
            navigation_timeout: settings.navigation_timeout,
            headless: settings.headless,
        }
    }
}

// ============================================================================
// Acquisition Attempt
// ============================================================================

/// Record of a single acquisition attempt.
#[derive(Debug, Clone)]
pub struct AcquisitionAttempt {
    /// Strategy that ran.
    pub strategy: AcquisitionStrategy,
    /// Whether it produced a bundle.
    pub success: bool,
    /// Error if it failed.
    pub error: Option<String>,
    /// How long it took.
    pub duration: Duration,
}

// ============================================================================
// Fast Path Memo
// ============================================================================

/// Remembers when a handshake bundle was last accepted by the API.
///
/// Share one memo (behind an `Arc`) between the sessions of a credential
/// key so a handshake success in one session opens the fast path for the
/// next.
#[derive(Debug)]
pub struct FastPathMemo {
    window: Duration,
    last_success: Mutex<Option<Instant>>,
}

impl FastPathMemo {
    /// Creates a closed memo that stays open for `window` after a success.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_success: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns true if a success was recorded within the window.
    pub fn is_recent(&self) -> bool {
        self.last_success
            .lock()
            .ok()
            .and_then(|last| *last)
            .is_some_and(|at| at.elapsed() < self.window)
    }

    /// Opens the memo on acceptance, closes it on rejection.
    pub fn record(&self, accepted: bool) {
        if let Ok(mut last) = self.last_success.lock() {
            *last = accepted.then(Instant::now);
        }
    }
}

// ============================================================================
// Token Acquirer
// ============================================================================

/// Produces fresh token bundles.
pub struct TokenAcquirer {
    transport: Arc<dyn Transport>,
    browser: Option<Arc<dyn BrowserEngine>>,
    plan: AcquisitionPlan,
    fast_path: Arc<FastPathMemo>,
    governor: Arc<RateGovernor>,
    attempts: Mutex<Vec<AcquisitionAttempt>>,
}

impl TokenAcquirer {
    /// Creates an acquirer without a browser engine.
    pub fn new(transport: Arc<dyn Transport>, plan: AcquisitionPlan) -> Self {
        Self {
            transport,
            browser: None,
            plan,
            fast_path: Arc::new(FastPathMemo::new(Duration::from_secs(3600))),
            governor: Arc::new(RateGovernor::disabled()),
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Adds a browser engine.
    pub fn with_browser(mut self, engine: Arc<dyn BrowserEngine>) -> Self {
        self.browser = Some(engine);
        self
    }

    /// Sets how long a handshake success keeps the fast path open.
    pub fn with_fast_path_window(mut self, window: Duration) -> Self {
        self.fast_path = Arc::new(FastPathMemo::new(window));
        self
    }

    /// Uses a memo shared with other acquirers.
    pub fn with_fast_path(mut self, memo: Arc<FastPathMemo>) -> Self {
        self.fast_path = memo;
        self
    }

    /// Paces handshake requests with the session's governor.
    pub fn with_governor(mut self, governor: Arc<RateGovernor>) -> Self {
        self.governor = governor;
        self
    }

    /// The fast path memo, for sharing with later sessions.
    pub fn fast_path(&self) -> &Arc<FastPathMemo> {
        &self.fast_path
    }

    /// The acquisition plan.
    pub fn plan(&self) -> &AcquisitionPlan {
        &self.plan
    }

    /// Returns true if a browser engine is configured and can launch.
    pub fn browser_available(&self) -> bool {
        self.browser.as_ref().is_some_and(|b| b.is_available())
    }

    /// Returns true if a handshake bundle was accepted within the window.
    pub fn fast_path_recent(&self) -> bool {
        self.fast_path.is_recent()
    }

    /// Reports whether a handshake bundle was accepted by the API.
    pub fn note_fast_path(&self, accepted: bool) {
        debug!(accepted, "Fast path outcome");
        self.fast_path.record(accepted);
    }

    /// Recent acquisition attempts, oldest first.
    pub fn attempts(&self) -> Vec<AcquisitionAttempt> {
        self.attempts
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    /// Acquires a bundle with the given strategy.
    #[instrument(skip(self, binding), fields(strategy = %strategy, profile = binding.profile.id))]
    pub async fn acquire(
        &self,
        strategy: AcquisitionStrategy,
        binding: &SessionBinding,
    ) -> Result<TokenBundle, AcquisitionError> {
        let start = Instant::now();
        info!("Acquiring token");

        let result = match strategy {
            AcquisitionStrategy::CachedReuse => Err(AcquisitionError::NotAcquiring(strategy)),
            AcquisitionStrategy::LightweightHandshake => self.handshake(binding).await,
            AcquisitionStrategy::BrowserAutomation => self.browser_harvest(binding).await,
        }
        .and_then(|cookies| self.finish(cookies, strategy));

        let duration = start.elapsed();
        match &result {
            Ok(bundle) => info!(
                cookies = bundle.len(),
                duration_ms = duration.as_millis() as u64,
                "Token acquired"
            ),
            Err(e) => warn!(error = %e, "Token acquisition failed"),
        }
        self.record(AcquisitionAttempt {
            strategy,
            success: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
            duration,
        });

        result
    }

    fn finish(
        &self,
        cookies: BTreeMap<String, String>,
        strategy: AcquisitionStrategy,
    ) -> Result<TokenBundle, AcquisitionError> {
        let bundle = TokenBundle::new(cookies, strategy).with_ttl(self.plan.token_ttl);
        if !bundle.has_cookie(&self.plan.required_cookie) {
            return Err(AcquisitionError::MissingCookie {
                cookie: self.plan.required_cookie.clone(),
                strategy,
            });
        }
        Ok(bundle)
    }

    fn record(&self, attempt: AcquisitionAttempt) {
        if let Ok(mut attempts) = self.attempts.lock() {
            if attempts.len() == MAX_ATTEMPT_HISTORY {
                attempts.remove(0);
            }
            attempts.push(attempt);
        }
    }

    // ========================================================================
    // Strategies
    // ========================================================================

    async fn handshake(
        &self,
        binding: &SessionBinding,
    ) -> Result<BTreeMap<String, String>, AcquisitionError> {
        let plan = &self.plan;
        let mut jar = BTreeMap::new();

        let landing = OutboundRequest::get(plan.landing.clone()).kind(RequestKind::Document);
        self.handshake_step(landing, binding, &mut jar).await?;
        tokio::time::sleep(plan.handshake_pause).await;

        let search = OutboundRequest::get(plan.search_page.clone())
            .kind(RequestKind::Document)
            .referer(plan.landing.as_str());
        self.handshake_step(search, binding, &mut jar).await?;
        tokio::time::sleep(plan.handshake_pause).await;

        let bootstrap = OutboundRequest::post(plan.bootstrap.clone())
            .header(header::ORIGIN, &plan.origin)
            .referer(plan.landing.as_str())
            .json(json!({}));
        if let Err(e) = self.handshake_step(bootstrap, binding, &mut jar).await {
            debug!(error = %e, "Session bootstrap failed");
        }
        tokio::time::sleep(plan.handshake_pause).await;

        debug!(cookies = ?jar.keys().collect::<Vec<_>>(), "Handshake finished");
        Ok(jar)
    }

    /// Sends one handshake request with the cookies collected so far and
    /// merges the response's cookies into the jar.
    async fn handshake_step(
        &self,
        request: OutboundRequest,
        binding: &SessionBinding,
        jar: &mut BTreeMap<String, String>,
    ) -> Result<RawResponse, AcquisitionError> {
        let url = request.url.to_string();
        let cookie_header = jar
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");

        self.governor.await_turn().await;
        let response = self
            .transport
            .send(
                request.with_cookies(&cookie_header),
                &binding.profile,
                binding.proxy.as_ref(),
            )
            .await
            .map_err(|e| match e.category() {
                FailureCategory::Client => AcquisitionError::Transport(e),
                _ => AcquisitionError::Navigation {
                    url: url.clone(),
                    reason: e.to_string(),
                },
            })?;

        debug!(url = %url, status = response.status, "Handshake step");
        jar.extend(response.set_cookies());
        Ok(response)
    }

    async fn browser_harvest(
        &self,
        binding: &SessionBinding,
    ) -> Result<BTreeMap<String, String>, AcquisitionError> {
        let engine = self.browser.as_ref().ok_or_else(|| {
            AcquisitionError::EngineUnavailable("no browser engine configured".to_string())
        })?;
        if !engine.is_available() {
            return Err(AcquisitionError::EngineUnavailable(format!(
                "{} cannot launch",
                engine.name()
            )));
        }

        debug!(engine = engine.name(), "Harvesting cookies with browser");
        engine.harvest(&self.plan.browser_launch(binding)).await
    }
}

impl std::fmt::Debug for TokenAcquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAcquirer")
            .field("plan", &self.plan)
            .field("browser", &self.browser.as_ref().map(|b| b.name().to_string()))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
