//! Headless browser cookie harvesting.
//!
//! Browser acquisition drives a real engine through the catalog's landing
//! and search pages, lets the gateway's client-side checks run, and reads
//! back the cookie jar.
//!
//! ## Engines
//!
//! - **Chromium** (feature `browser`): launched through the DevTools
//!   protocol. Proxies with credentials are rejected because Chromium
//!   takes no proxy credentials on the command line.
//!
//! Engines apply no fingerprint-evasion scripts. The gateway may still
//! recognize an automated browser.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::AcquisitionError;
use crate::proxy::ProxyEndpoint;

// ============================================================================
// Launch Plan
// ============================================================================

/// One page visit in a harvest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationStep {
    /// Page to load.
    pub url: Url,
    /// Time to let the page settle after it loads.
    pub settle: Duration,
}

impl NavigationStep {
    /// Creates a step.
    pub fn new(url: Url, settle: Duration) -> Self {
        Self { url, settle }
    }
}

/// Everything an engine needs for one harvest.
#[derive(Debug, Clone)]
pub struct BrowserLaunch {
    /// Pages to visit, in order.
    pub pages: Vec<NavigationStep>,
    /// Session proxy, if any.
    pub proxy: Option<ProxyEndpoint>,
    /// User agent to present.
    pub user_agent: String,
    /// Viewport width and height.
    pub viewport: (u32, u32),
    /// Browser locale, e.g. `en-US`.
    pub locale: String,
    /// IANA timezone, e.g. `America/New_York`.
    pub timezone: String,
    /// Per-page load timeout.
    pub navigation_timeout: Duration,
    /// Run without a visible window.
    pub headless: bool,
}

impl BrowserLaunch {
    /// URLs of every page in the plan.
    pub fn urls(&self) -> Vec<String> {
        self.pages.iter().map(|p| p.url.to_string()).collect()
    }
}

// ============================================================================
// Engine Trait
// ============================================================================

/// A browser engine that can harvest gateway cookies.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// Returns true if the engine can launch on this host.
    fn is_available(&self) -> bool {
        true
    }

    /// Visits the launch plan's pages and returns the cookie jar.
    async fn harvest(
        &self,
        launch: &BrowserLaunch,
    ) -> Result<BTreeMap<String, String>, AcquisitionError>;
}

// ============================================================================
// Chromium Engine
// ============================================================================

#[cfg(feature = "browser")]
pub use chromium::ChromiumEngine;

#[cfg(feature = "browser")]
mod chromium {
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::time::Duration;

    use async_trait::async_trait;
    use chromiumoxide::cdp::browser_protocol::emulation::SetTimezoneOverrideParams;
    use chromiumoxide::cdp::browser_protocol::network::{
        GetCookiesParams, SetUserAgentOverrideParams,
    };
    use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
    use chromiumoxide::error::CdpError;
    use chromiumoxide::{Browser, BrowserConfig, Page};
    use futures::StreamExt;
    use tracing::{debug, info, instrument, warn};

    use super::{BrowserEngine, BrowserLaunch};
    use crate::error::AcquisitionError;

    /// Binary names searched on `PATH`.
    const CHROMIUM_BINARIES: &[&str] = &[
        "chromium",
        "chromium-browser",
        "google-chrome",
        "google-chrome-stable",
    ];

    /// Interval between `document.readyState` checks.
    const LOAD_POLL: Duration = Duration::from_millis(100);

    /// True once the document and its subresources have loaded.
    fn is_loaded(ready_state: &str) -> bool {
        ready_state == "complete"
    }

    /// Navigates and waits for the load event.
    ///
    /// Gateway checks run as page scripts, so the settle time only starts
    /// once the document reports `complete`. A page that cannot be
    /// evaluated (non-HTML content) counts as loaded.
    async fn navigate_and_load(page: &Page, params: NavigateParams) -> Result<(), CdpError> {
        page.execute(params).await?;
        page.wait_for_navigation().await?;
        loop {
            let state = match page.evaluate("document.readyState").await {
                Ok(result) => result.into_value::<String>().unwrap_or_default(),
                Err(e) => {
                    debug!(error = %e, "Ready state unavailable");
                    return Ok(());
                }
            };
            if is_loaded(&state) {
                debug!(state = %state, "Page loaded");
                return Ok(());
            }
            tokio::time::sleep(LOAD_POLL).await;
        }
    }

    /// Chromium driven over the DevTools protocol.
    #[derive(Debug, Clone, Default)]
    pub struct ChromiumEngine {
        executable: Option<PathBuf>,
    }

    impl ChromiumEngine {
        /// Creates an engine that locates Chromium on `PATH`.
        pub fn new() -> Self {
            Self::default()
        }

        /// Uses a specific Chromium binary.
        pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
            self.executable = Some(path.into());
            self
        }

        fn resolve_executable(&self) -> Option<PathBuf> {
            if let Some(path) = &self.executable {
                return path.exists().then(|| path.clone());
            }
            CHROMIUM_BINARIES
                .iter()
                .find_map(|name| which::which(name).ok())
        }

        fn config(&self, launch: &BrowserLaunch) -> Result<BrowserConfig, AcquisitionError> {
            let executable = self.resolve_executable().ok_or_else(|| {
                AcquisitionError::EngineUnavailable("no Chromium binary found".to_string())
            })?;

            let (width, height) = launch.viewport;
            let mut builder = BrowserConfig::builder()
                .chrome_executable(executable)
                .window_size(width, height)
                .arg(format!("--lang={}", launch.locale));

            if !launch.headless {
                builder = builder.with_head();
            }

            if let Some(proxy) = &launch.proxy {
                if proxy.has_credentials() {
                    return Err(AcquisitionError::ProxyUnsupported(proxy.to_string()));
                }
                builder = builder.arg(format!("--proxy-server={}", proxy.server()));
            }

            builder
                .build()
                .map_err(AcquisitionError::EngineUnavailable)
        }
    }

    #[async_trait]
    impl BrowserEngine for ChromiumEngine {
        fn name(&self) -> &str {
            "chromium"
        }

        fn is_available(&self) -> bool {
            self.resolve_executable().is_some()
        }

        #[instrument(skip(self, launch), fields(pages = launch.pages.len()))]
        async fn harvest(
            &self,
            launch: &BrowserLaunch,
        ) -> Result<BTreeMap<String, String>, AcquisitionError> {
            let config = self.config(launch)?;
            let engine_err = |e: chromiumoxide::error::CdpError| {
                AcquisitionError::EngineUnavailable(e.to_string())
            };

            info!("Launching Chromium");
            let (mut browser, mut handler) = Browser::launch(config).await.map_err(engine_err)?;
            let handler_task = tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            let result = async {
                let page = browser.new_page("about:blank").await.map_err(engine_err)?;
                page.execute(SetUserAgentOverrideParams::new(launch.user_agent.clone()))
                    .await
                    .map_err(engine_err)?;
                if let Err(e) = page
                    .execute(SetTimezoneOverrideParams::new(launch.timezone.clone()))
                    .await
                {
                    warn!(timezone = %launch.timezone, error = %e, "Timezone override rejected");
                }

                for step in &launch.pages {
                    let url = step.url.to_string();
                    debug!(url = %url, "Navigating");
                    let params = NavigateParams::builder().url(url.clone()).build().map_err(
                        |reason| AcquisitionError::Navigation {
                            url: url.clone(),
                            reason,
                        },
                    )?;

                    match tokio::time::timeout(
                        launch.navigation_timeout,
                        navigate_and_load(&page, params),
                    )
                    .await
                    {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => {
                            return Err(AcquisitionError::Navigation {
                                url,
                                reason: e.to_string(),
                            });
                        }
                        Err(_) => {
                            return Err(AcquisitionError::Timeout {
                                url,
                                after: launch.navigation_timeout,
                            });
                        }
                    }
                    tokio::time::sleep(step.settle).await;
                }

                let cookies = page
                    .execute(GetCookiesParams::builder().urls(launch.urls()).build())
                    .await
                    .map_err(engine_err)?
                    .result
                    .cookies;
                debug!(count = cookies.len(), "Collected cookies");

                Ok(cookies
                    .into_iter()
                    .map(|c| (c.name, c.value))
                    .collect::<BTreeMap<_, _>>())
            }
            .await;

            if let Err(e) = browser.close().await {
                debug!(error = %e, "Browser close failed");
            }
            handler_task.abort();

            result
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_settle_waits_for_complete_document() {
            assert!(!is_loaded("loading"));
            assert!(!is_loaded("interactive"));
            assert!(!is_loaded(""));
            assert!(is_loaded("complete"));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn launch() -> BrowserLaunch {
        BrowserLaunch {
            pages: vec![
                NavigationStep::new(
                    Url::parse("https://www.catalog.example/").unwrap(),
                    Duration::from_secs(5),
                ),
                NavigationStep::new(
                    Url::parse("https://www.catalog.example/search").unwrap(),
                    Duration::from_secs(3),
                ),
            ],
            proxy: None,
            user_agent: "UA".to_string(),
            viewport: (1920, 1200),
            locale: "en-US".to_string(),
            timezone: "America/New_York".to_string(),
            navigation_timeout: Duration::from_secs(30),
            headless: true,
        }
    }

    #[test]
    fn test_launch_urls_in_order() {
        assert_eq!(
            launch().urls(),
            vec![
                "https://www.catalog.example/".to_string(),
                "https://www.catalog.example/search".to_string()
            ]
        );
    }

    #[cfg(feature = "browser")]
    #[tokio::test]
    async fn test_chromium_rejects_authenticated_proxy() {
        let engine = ChromiumEngine::new().with_executable("/bin/sh");
        let mut plan = launch();
        plan.proxy = Some(ProxyEndpoint::parse("http://user:pw@proxy.local:8000").unwrap());

        let err = engine.harvest(&plan).await.unwrap_err();
        assert!(matches!(err, AcquisitionError::ProxyUnsupported(_)));
    }

    #[cfg(feature = "browser")]
    #[test]
    fn test_chromium_missing_executable_is_unavailable() {
        let engine = ChromiumEngine::new().with_executable("/nonexistent/chromium");
        assert!(!engine.is_available());
    }
}
