//! In-process fakes shared by the unit tests of this crate.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header;

use crate::error::{AcquisitionError, TransportError};
use crate::host::browser::{BrowserEngine, BrowserLaunch};
use crate::host::http::{OutboundRequest, RawResponse, RequestBody, Transport};
use crate::profile::FingerprintProfile;
use crate::proxy::ProxyEndpoint;

/// What the fake transport saw.
#[derive(Debug, Clone)]
pub(crate) struct SentRequest {
    pub method: Method,
    pub path: String,
    pub cookie: Option<String>,
    pub referer: Option<String>,
    pub proxy: Option<String>,
    pub profile: &'static str,
    pub body: Option<RequestBody>,
}

pub(crate) type Scripted = Result<RawResponse, TransportError>;

/// Transport answering from per-path scripts.
///
/// Each path holds a queue of responses; the last one repeats. Unrouted
/// paths answer `200 {}`.
#[derive(Default)]
pub(crate) struct FakeTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    sent: Mutex<Vec<SentRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, path: &str, responses: Vec<Scripted>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), responses.into());
        self
    }

    pub fn requests(&self) -> Vec<SentRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<SentRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(
        &self,
        request: OutboundRequest,
        profile: &FingerprintProfile,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<RawResponse, TransportError> {
        let path = request.url.path().to_string();
        let header_text = |name: header::HeaderName| {
            request
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        self.sent.lock().unwrap().push(SentRequest {
            method: request.method.clone(),
            path: path.clone(),
            cookie: header_text(header::COOKIE),
            referer: header_text(header::REFERER),
            proxy: proxy.map(ProxyEndpoint::server),
            profile: profile.id,
            body: request.body.clone(),
        });

        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(&path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap(),
            None => Ok(RawResponse::new(200, "{}")),
        }
    }
}

/// Response with a `Set-Cookie` header.
pub(crate) fn with_cookie(status: u16, name: &str, value: &str) -> Scripted {
    Ok(RawResponse::new(status, "").with_header(
        header::SET_COOKIE,
        &format!("{name}={value}; Path=/; Secure"),
    ))
}

/// Browser engine returning canned cookies.
pub(crate) struct FakeBrowser {
    cookies: BTreeMap<String, String>,
    failure: Option<AcquisitionError>,
    available: bool,
    calls: AtomicUsize,
    launches: Mutex<Vec<BrowserLaunch>>,
}

impl FakeBrowser {
    pub fn with_cookies(pairs: &[(&str, &str)]) -> Self {
        Self {
            cookies: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            failure: None,
            available: true,
            calls: AtomicUsize::new(0),
            launches: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: AcquisitionError) -> Self {
        Self {
            failure: Some(error),
            ..Self::with_cookies(&[])
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> Vec<BrowserLaunch> {
        self.launches.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserEngine for FakeBrowser {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn harvest(
        &self,
        launch: &BrowserLaunch,
    ) -> Result<BTreeMap<String, String>, AcquisitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.launches.lock().unwrap().push(launch.clone());
        tokio::task::yield_now().await;
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(self.cookies.clone()),
        }
    }
}
