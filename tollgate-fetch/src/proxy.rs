//! Upstream proxy endpoints and session binding.
//!
//! Token acquisition and every later API call of a session must leave
//! through the same egress. A session checks out one endpoint from its own
//! [`ProxyPool`] cursor and keeps it for its lifetime.

use rand::Rng;
use std::fmt;
use url::Url;

use crate::error::TransportError;

// ============================================================================
// Proxy Endpoint
// ============================================================================

/// One upstream proxy.
///
/// Credentials are kept apart from the server address so they can be
/// handed to clients that take them separately. `Display` and `Debug`
/// never show them.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    server: Url,
    username: Option<String>,
    password: Option<String>,
}

impl ProxyEndpoint {
    /// Parses `scheme://[user[:pass]@]host[:port]`.
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| TransportError::InvalidProxy(format!("{}: {e}", redact(raw))))?;

        if !matches!(url.scheme(), "http" | "https" | "socks5" | "socks5h") {
            return Err(TransportError::InvalidProxy(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(TransportError::InvalidProxy("missing host".to_string()));
        }

        let username = Some(url.username().to_string()).filter(|u| !u.is_empty());
        let password = url.password().map(String::from);

        let mut server = url;
        // Neither setter fails on a URL that has a host.
        let _ = server.set_username("");
        let _ = server.set_password(None);
        server.set_path("");

        Ok(Self {
            server,
            username,
            password,
        })
    }

    /// Server address without credentials, e.g. `http://proxy.local:8000`.
    pub fn server(&self) -> String {
        self.server.as_str().trim_end_matches('/').to_string()
    }

    /// Proxy username.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Proxy password.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Returns true if the proxy needs authentication.
    pub fn has_credentials(&self) -> bool {
        self.username.is_some()
    }

    /// Returns a copy whose username carries `;<param>.<id>` so the
    /// upstream pins one exit address.
    pub fn with_sticky_session(&self, param: &str, id: u32) -> Self {
        let mut pinned = self.clone();
        if let Some(user) = pinned.username.as_mut() {
            user.push_str(&format!(";{param}.{id}"));
        }
        pinned
    }

    /// Identity used to share HTTP clients between requests.
    pub(crate) fn client_key(&self) -> String {
        format!(
            "{}|{}",
            self.server(),
            self.username.as_deref().unwrap_or_default()
        )
    }
}

fn redact(raw: &str) -> String {
    match raw.rsplit_once('@') {
        Some((_, host)) => format!("***@{host}"),
        None => raw.to_string(),
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.server())
    }
}

impl fmt::Debug for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyEndpoint")
            .field("server", &self.server())
            .field("authenticated", &self.has_credentials())
            .finish()
    }
}

// ============================================================================
// Proxy Pool
// ============================================================================

/// Ordered set of upstream endpoints with a session-local cursor.
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    endpoints: Vec<ProxyEndpoint>,
    cursor: usize,
    sticky_param: Option<String>,
}

impl ProxyPool {
    /// Creates a pool starting at a random endpoint.
    pub fn new(endpoints: Vec<ProxyEndpoint>) -> Self {
        let cursor = if endpoints.is_empty() {
            0
        } else {
            rand::thread_rng().gen_range(0..endpoints.len())
        };
        Self {
            endpoints,
            cursor,
            sticky_param: None,
        }
    }

    /// Parses a list of endpoint URLs.
    pub fn from_urls<S: AsRef<str>>(urls: &[S]) -> Result<Self, TransportError> {
        let endpoints = urls
            .iter()
            .map(|u| ProxyEndpoint::parse(u.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(endpoints))
    }

    /// A pool with no proxies: sessions connect directly.
    pub fn direct() -> Self {
        Self::default()
    }

    /// Enables sticky sessions with the given username parameter.
    pub fn with_sticky_session(mut self, param: impl Into<String>) -> Self {
        self.sticky_param = Some(param.into());
        self
    }

    /// Moves the cursor to `index` (modulo the pool size).
    pub fn with_cursor(mut self, index: usize) -> Self {
        self.cursor = index;
        self
    }

    /// Number of endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Returns true if sessions connect directly.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Checks out the next endpoint for a new session binding.
    pub fn checkout(&mut self) -> Option<ProxyEndpoint> {
        if self.endpoints.is_empty() {
            return None;
        }
        let endpoint = &self.endpoints[self.cursor % self.endpoints.len()];
        self.cursor = self.cursor.wrapping_add(1);

        Some(match &self.sticky_param {
            Some(param) => endpoint.with_sticky_session(param, rand::thread_rng().gen_range(1..=99_999)),
            None => endpoint.clone(),
        })
    }
}
