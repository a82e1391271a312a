//! Client fingerprint profiles.
//!
//! A profile fixes the header set a session presents: user agent, client
//! hints, and fetch metadata. Header sets must be internally consistent
//! with the browser family they claim, e.g. Safari sends no client hints.
//! A session picks one profile at creation and keeps it.

use rand::seq::SliceRandom;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use std::fmt;

// ============================================================================
// Browser Family
// ============================================================================

/// Browser family a profile claims to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserFamily {
    /// Google Chrome.
    Chrome,
    /// Microsoft Edge (Chromium).
    Edge,
    /// Apple Safari.
    Safari,
}

impl BrowserFamily {
    /// Returns true if this family sends `sec-ch-ua` client hints.
    pub fn sends_client_hints(&self) -> bool {
        matches!(self, Self::Chrome | Self::Edge)
    }
}

// ============================================================================
// Request Kind
// ============================================================================

/// What kind of request the headers are for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestKind {
    /// Top-level page navigation.
    Document,
    /// XHR/fetch call from a page.
    #[default]
    Api,
}

// ============================================================================
// Fingerprint Profile
// ============================================================================

/// A consistent client header identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintProfile {
    /// Stable identifier, e.g. `chrome120`.
    pub id: &'static str,
    /// Browser family.
    pub family: BrowserFamily,
    /// `User-Agent` value.
    pub user_agent: &'static str,
    /// `sec-ch-ua` value (Chromium families only).
    pub client_hints: Option<&'static str>,
    /// `sec-ch-ua-platform` value (Chromium families only).
    pub platform: Option<&'static str>,
    /// Whether the browser sends `Sec-Fetch-*` metadata.
    pub fetch_metadata: bool,
}

const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const ACCEPT_DOCUMENT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const ACCEPT_API: &str = "application/json, text/plain, */*";

impl FingerprintProfile {
    /// Chrome 120 on Windows.
    pub const CHROME_120: Self = Self {
        id: "chrome120",
        family: BrowserFamily::Chrome,
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        client_hints: Some(r#""Not_A Brand";v="8", "Chromium";v="120", "Google Chrome";v="120""#),
        platform: Some(r#""Windows""#),
        fetch_metadata: true,
    };

    /// Chrome 116 on Windows.
    pub const CHROME_116: Self = Self {
        id: "chrome116",
        family: BrowserFamily::Chrome,
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36",
        client_hints: Some(r#""Chromium";v="116", "Not)A;Brand";v="24", "Google Chrome";v="116""#),
        platform: Some(r#""Windows""#),
        fetch_metadata: true,
    };

    /// Chrome 110 on macOS.
    pub const CHROME_110: Self = Self {
        id: "chrome110",
        family: BrowserFamily::Chrome,
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36",
        client_hints: Some(r#""Chromium";v="110", "Not A(Brand";v="24", "Google Chrome";v="110""#),
        platform: Some(r#""macOS""#),
        fetch_metadata: true,
    };

    /// Edge 101 on Windows.
    pub const EDGE_101: Self = Self {
        id: "edge101",
        family: BrowserFamily::Edge,
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/101.0.4951.64 Safari/537.36 Edg/101.0.1210.47",
        client_hints: Some(r#"" Not A;Brand";v="99", "Chromium";v="101", "Microsoft Edge";v="101""#),
        platform: Some(r#""Windows""#),
        fetch_metadata: true,
    };

    /// Edge 99 on Windows.
    pub const EDGE_99: Self = Self {
        id: "edge99",
        family: BrowserFamily::Edge,
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/99.0.4844.51 Safari/537.36 Edg/99.0.1150.30",
        client_hints: Some(r#"" Not A;Brand";v="99", "Chromium";v="99", "Microsoft Edge";v="99""#),
        platform: Some(r#""Windows""#),
        fetch_metadata: true,
    };

    /// Safari 15.5 on macOS.
    pub const SAFARI_15_5: Self = Self {
        id: "safari15_5",
        family: BrowserFamily::Safari,
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.5 Safari/605.1.15",
        client_hints: None,
        platform: None,
        fetch_metadata: false,
    };

    /// Safari 15.3 on macOS.
    pub const SAFARI_15_3: Self = Self {
        id: "safari15_3",
        family: BrowserFamily::Safari,
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.3 Safari/605.1.15",
        client_hints: None,
        platform: None,
        fetch_metadata: false,
    };

    /// All built-in profiles.
    pub fn builtin() -> &'static [FingerprintProfile] {
        &[
            Self::CHROME_120,
            Self::CHROME_116,
            Self::CHROME_110,
            Self::EDGE_101,
            Self::EDGE_99,
            Self::SAFARI_15_5,
            Self::SAFARI_15_3,
        ]
    }

    /// Looks up a built-in profile by id.
    pub fn by_id(id: &str) -> Option<FingerprintProfile> {
        Self::builtin().iter().find(|p| p.id == id).cloned()
    }

    /// Returns the header set for a request of the given kind.
    pub fn headers(&self, kind: RequestKind) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(self.user_agent));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static(ACCEPT_LANGUAGE),
        );

        match kind {
            RequestKind::Document => {
                headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT_DOCUMENT));
                headers.insert(
                    header::UPGRADE_INSECURE_REQUESTS,
                    HeaderValue::from_static("1"),
                );
            }
            RequestKind::Api => {
                headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT_API));
            }
        }

        if let (Some(hints), Some(platform)) = (self.client_hints, self.platform) {
            headers.insert(
                HeaderName::from_static("sec-ch-ua"),
                HeaderValue::from_static(hints),
            );
            headers.insert(
                HeaderName::from_static("sec-ch-ua-mobile"),
                HeaderValue::from_static("?0"),
            );
            headers.insert(
                HeaderName::from_static("sec-ch-ua-platform"),
                HeaderValue::from_static(platform),
            );
        }

        if self.fetch_metadata {
            let (mode, dest, site) = match kind {
                RequestKind::Document => ("navigate", "document", "none"),
                RequestKind::Api => ("cors", "empty", "same-site"),
            };
            headers.insert(
                HeaderName::from_static("sec-fetch-mode"),
                HeaderValue::from_static(mode),
            );
            headers.insert(
                HeaderName::from_static("sec-fetch-dest"),
                HeaderValue::from_static(dest),
            );
            headers.insert(
                HeaderName::from_static("sec-fetch-site"),
                HeaderValue::from_static(site),
            );
        }

        headers
    }
}

impl Default for FingerprintProfile {
    fn default() -> Self {
        Self::CHROME_120
    }
}

impl fmt::Display for FingerprintProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

// ============================================================================
// Profile Pool
// ============================================================================

/// Rotation pool sessions draw their profile from.
#[derive(Debug, Clone)]
pub struct ProfilePool {
    profiles: Vec<FingerprintProfile>,
}

impl ProfilePool {
    /// Creates a pool. An empty list falls back to the default profile.
    pub fn new(profiles: Vec<FingerprintProfile>) -> Self {
        if profiles.is_empty() {
            return Self::single(FingerprintProfile::default());
        }
        Self { profiles }
    }

    /// A pool that always yields one profile.
    pub fn single(profile: FingerprintProfile) -> Self {
        Self {
            profiles: vec![profile],
        }
    }

    /// Number of profiles in rotation.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Returns true if the pool holds no profiles.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Picks a profile for a new session.
    pub fn pick(&self) -> FingerprintProfile {
        self.profiles
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for ProfilePool {
    fn default() -> Self {
        Self::new(FingerprintProfile::builtin().to_vec())
    }
}
