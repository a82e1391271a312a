//! HTTP transport with fingerprint headers, proxy binding, and tracing.
//!
//! This module provides:
//! - [`Transport`], the seam every outbound request goes through
//! - [`HttpTransport`], the reqwest implementation (rustls TLS)
//! - [`OutboundRequest`] / [`RawResponse`], transport-neutral request and
//!   response types
//!
//! Transports return a [`RawResponse`] for every HTTP status; callers
//! classify it with [`RawResponse::error_for_status`]. Only failures that
//! produce no response at all come back as errors.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::error::TransportError;
use crate::profile::{FingerprintProfile, RequestKind};
use crate::proxy::ProxyEndpoint;

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Outbound Request
// ============================================================================

/// Request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// JSON body.
    Json(Value),
    /// URL-encoded form body.
    Form(Vec<(String, String)>),
}

/// A transport-neutral HTTP request.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// HTTP method.
    pub method: Method,
    /// Target URL.
    pub url: Url,
    /// Navigation or API call; selects the profile header set.
    pub kind: RequestKind,
    /// Extra headers; these override profile headers.
    pub headers: HeaderMap,
    /// Optional body.
    pub body: Option<RequestBody>,
}

impl OutboundRequest {
    /// Creates a request.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            kind: RequestKind::Api,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// GET request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// POST request.
    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// Sets the request kind.
    pub fn kind(mut self, kind: RequestKind) -> Self {
        self.kind = kind;
        self
    }

    /// Adds a header. Invalid values are dropped.
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Sets the `Referer` header.
    pub fn referer(self, referer: &str) -> Self {
        self.header(header::REFERER, referer)
    }

    /// Sets a JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Sets a form body.
    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(fields));
        self
    }

    /// Sets the `Cookie` header, replacing any previous one.
    pub fn with_cookies(mut self, cookie_header: &str) -> Self {
        if cookie_header.is_empty() {
            self.headers.remove(header::COOKIE);
            return self;
        }
        self.header(header::COOKIE, cookie_header)
    }
}

// ============================================================================
// Raw Response
// ============================================================================

/// A fully-read HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Creates a 200 response with a JSON body.
    pub fn json_ok(body: &Value) -> Self {
        Self::new(200, body.to_string())
    }

    /// Adds a header.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.append(name, value);
        }
        self
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `Retry-After` in seconds, if given as a number.
    pub fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .map(Duration::from_secs)
    }

    /// `name=value` pairs from every `Set-Cookie` header.
    pub fn set_cookies(&self) -> Vec<(String, String)> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect()
    }

    /// Classifies the status, passing successful responses through.
    pub fn error_for_status(self) -> Result<Self, TransportError> {
        match TransportError::from_status(self.status, self.retry_after()) {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Body as text, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Extracts `name=value` from a `Set-Cookie` header value.
fn parse_set_cookie(raw: &str) -> Option<(String, String)> {
    let pair = raw.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().trim_matches('"').to_string()))
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Executes HTTP requests on behalf of a session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request with the session's profile through its proxy.
    async fn send(
        &self,
        request: OutboundRequest,
        profile: &FingerprintProfile,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<RawResponse, TransportError>;
}

// ============================================================================
// HTTP Transport
// ============================================================================

/// reqwest-backed transport with one client per proxy endpoint.
#[derive(Debug)]
pub struct HttpTransport {
    timeout: Duration,
    allowed_domains: Option<Vec<String>>,
    clients: Mutex<HashMap<String, Client>>,
}

impl HttpTransport {
    /// Creates a transport with default settings.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a transport with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            allowed_domains: None,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Restricts requests to the given domains and their subdomains.
    ///
    /// An empty list lifts the restriction.
    pub fn with_allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = Some(domains).filter(|d| !d.is_empty());
        self
    }

    /// Checks if a URL's domain is allowed.
    fn is_domain_allowed(&self, url: &Url) -> Result<(), TransportError> {
        let Some(ref allowed) = self.allowed_domains else {
            return Ok(());
        };

        let host = url
            .host_str()
            .ok_or_else(|| TransportError::InvalidUrl("No host in URL".to_string()))?;

        let allowed = allowed
            .iter()
            .any(|domain| host == domain || host.ends_with(&format!(".{domain}")));

        if allowed {
            Ok(())
        } else {
            Err(TransportError::DomainNotAllowed(host.to_string()))
        }
    }

    /// Returns the client for a proxy, building it on first use.
    fn client_for(&self, proxy: Option<&ProxyEndpoint>) -> Result<Client, TransportError> {
        let key = proxy.map(ProxyEndpoint::client_key).unwrap_or_default();

        let mut clients = self
            .clients
            .lock()
            .map_err(|_| TransportError::Request("client cache poisoned".to_string()))?;
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder().timeout(self.timeout);
        if let Some(proxy) = proxy {
            let mut upstream = reqwest::Proxy::all(proxy.server())
                .map_err(|e| TransportError::InvalidProxy(e.to_string()))?;
            if let Some(user) = proxy.username() {
                upstream = upstream.basic_auth(user, proxy.password().unwrap_or_default());
            }
            builder = builder.proxy(upstream);
        }
        let client = builder.build().map_err(|e| {
            TransportError::Request(format!("failed to build HTTP client: {e}"))
        })?;

        clients.insert(key, client.clone());
        Ok(client)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, request, profile, proxy), fields(method = %request.method, url = %request.url, profile = profile.id))]
    async fn send(
        &self,
        request: OutboundRequest,
        profile: &FingerprintProfile,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<RawResponse, TransportError> {
        self.is_domain_allowed(&request.url)?;
        let client = self.client_for(proxy)?;

        let mut headers = profile.headers(request.kind);
        for (name, value) in &request.headers {
            headers.insert(name.clone(), value.clone());
        }

        let mut builder = client
            .request(request.method.clone(), request.url.clone())
            .headers(headers);
        builder = match request.body {
            Some(RequestBody::Json(body)) => builder.json(&body),
            Some(RequestBody::Form(fields)) => builder.form(&fields),
            None => builder,
        };

        debug!("Sending request");
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        debug!(status, bytes = body.len(), "Response received");

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header as header_is, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[test]
    fn test_domain_allowlist() {
        let transport = HttpTransport::new().with_allowed_domains(vec![
            "catalog.example".to_string(),
            "api.other.example".to_string(),
        ]);

        let ok = |u: &str| transport.is_domain_allowed(&Url::parse(u).unwrap()).is_ok();
        assert!(ok("https://catalog.example/search"));
        assert!(ok("https://api.catalog.example/api"));
        assert!(ok("https://api.other.example/v1"));
        assert!(!ok("https://evil.example/steal"));
        assert!(!ok("https://other.example/"));
    }

    #[test]
    fn test_no_domain_restrictions() {
        let transport = HttpTransport::new().with_allowed_domains(Vec::new());
        assert!(
            transport
                .is_domain_allowed(&Url::parse("https://any.domain.com").unwrap())
                .is_ok()
        );
    }

    #[test]
    fn test_parse_set_cookie() {
        assert_eq!(
            parse_set_cookie("datadome=abc123; Max-Age=31536000; Domain=.catalog.example; Path=/"),
            Some(("datadome".to_string(), "abc123".to_string()))
        );
        assert_eq!(parse_set_cookie("=novalue"), None);
        assert_eq!(parse_set_cookie("garbage"), None);
    }

    #[test]
    fn test_error_for_status() {
        let limited = RawResponse::new(429, "").with_header(header::RETRY_AFTER, "7");
        assert!(matches!(
            limited.error_for_status(),
            Err(TransportError::RateLimited { retry_after: Some(d) }) if d == Duration::from_secs(7)
        ));
        assert!(RawResponse::new(204, "").error_for_status().is_ok());
    }

    #[tokio::test]
    async fn test_send_applies_profile_and_request_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/search"))
            .and(header_is("user-agent", FingerprintProfile::CHROME_120.user_agent))
            .and(header_is("cookie", "datadome=abc"))
            .and(body_json(json!({"size": 250})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new();
        let request = OutboundRequest::post(url(&server, "/api/search"))
            .with_cookies("datadome=abc")
            .json(json!({"size": 250}));
        let response = transport
            .send(request, &FingerprintProfile::CHROME_120, None)
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.json::<Value>().unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_send_returns_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("set-cookie", "datadome=challenge; Path=/"),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new();
        let response = transport
            .send(
                OutboundRequest::get(url(&server, "/")).kind(RequestKind::Document),
                &FingerprintProfile::SAFARI_15_5,
                None,
            )
            .await
            .unwrap();

        assert_eq!(response.status, 403);
        assert_eq!(
            response.set_cookies(),
            vec![("datadome".to_string(), "challenge".to_string())]
        );
        assert!(matches!(
            response.error_for_status(),
            Err(TransportError::AuthRejected { status: 403 })
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_failure() {
        let transport = HttpTransport::with_timeout(Duration::from_secs(2));
        let err = transport
            .send(
                OutboundRequest::get(Url::parse("http://127.0.0.1:9/").unwrap()),
                &FingerprintProfile::default(),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.category(), crate::error::FailureCategory::Network);
    }

    #[tokio::test]
    async fn test_disallowed_domain_is_not_sent() {
        let transport = HttpTransport::new().with_allowed_domains(vec!["catalog.example".to_string()]);
        let err = transport
            .send(
                OutboundRequest::get(Url::parse("https://elsewhere.example/").unwrap()),
                &FingerprintProfile::default(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::DomainNotAllowed(_)));
    }
}
