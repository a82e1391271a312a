// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `tollgate` Fetch
//!
//! Token acquisition, session management, and paginated fetch orchestration.
//!
//! This crate turns a gateway-protected catalog API into a plain stream of
//! records. It includes:
//!
//! ## Host APIs
//!
//! The [`host`] module provides abstractions for reaching the outside world:
//!
//! - [`host::http`] - HTTP transport with fingerprint headers and proxies
//! - [`host::browser`] - Headless browser cookie harvesting
//!
//! ## Session Layer
//!
//! - [`acquirer::TokenAcquirer`] - Obtains token bundles by handshake or browser
//! - [`strategy::select_strategy`] - Picks the cheapest viable strategy
//! - [`governor::RateGovernor`] - Randomized spacing between outbound calls
//! - [`session::SessionManager`] - Authorized calls with re-auth and retry
//!
//! ## Fetch Orchestration
//!
//! - [`orchestrator::FetchOrchestrator`] - Walks result sets page by page
//! - [`context::FetchSession`] - Wires everything from configuration
//!
//! ## Example
//!
//! ```ignore
//! use tollgate_fetch::{FetchPlan, FetchSession};
//! use tollgate_store::{Config, open_credential_store};
//!
//! let config = Config::load().await?;
//! let store = open_credential_store(&config.cache).await;
//! let session = FetchSession::from_config(&config, store)?.build();
//!
//! let orchestrator = session.orchestrator(source);
//! let outcome = orchestrator.fetch_all(FetchPlan::new(filters)).await?;
//! ```

// Core modules
pub mod acquirer;
pub mod context;
pub mod error;
pub mod governor;
pub mod host;
pub mod orchestrator;
pub mod profile;
pub mod proxy;
pub mod retry;
pub mod session;
pub mod strategy;

#[cfg(test)]
mod testing;

// Re-export key types at crate root

// Errors
pub use error::{
    AcquisitionError, FailureCategory, FetchError, PartialResultError, SessionError,
    TransportError,
};

// Host APIs
#[cfg(feature = "browser")]
pub use host::ChromiumEngine;
pub use host::{
    BrowserEngine, BrowserLaunch, HttpTransport, NavigationStep, OutboundRequest, RawResponse,
    RequestBody, Transport,
};

// Session layer
pub use acquirer::{
    AcquisitionAttempt, AcquisitionPlan, BrowserSettings, FastPathMemo, SessionBinding,
    TokenAcquirer,
};
pub use governor::RateGovernor;
pub use profile::{BrowserFamily, FingerprintProfile, ProfilePool, RequestKind};
pub use proxy::{ProxyEndpoint, ProxyPool};
pub use retry::RetryPolicy;
pub use session::{CallAttempts, CallState, SessionManager};
pub use strategy::{SelectionReason, StrategyChoice, StrategyInputs, select_strategy};

// Orchestration
pub use context::{
    FetchSession, FetchSessionBuilder, MAX_CONCURRENCY, SessionMetrics, SessionSettings,
};
pub use orchestrator::{
    CancellationSignal, Completion, EmitOrder, FetchOrchestrator, FetchOutcome, FetchPlan,
    PageSource, RecordStream,
};
