//! Host APIs for tollgate sessions.
//!
//! This module provides abstractions for reaching the outside world:
//!
//! - [`http`] - HTTP transport with fingerprint headers, proxies, and a
//!   domain allowlist
//! - [`browser`] - Headless browser cookie harvesting

pub mod browser;
pub mod http;

// Re-export key types
#[cfg(feature = "browser")]
pub use browser::ChromiumEngine;
pub use browser::{BrowserEngine, BrowserLaunch, NavigationStep};
pub use http::{HttpTransport, OutboundRequest, RawResponse, RequestBody, Transport};
