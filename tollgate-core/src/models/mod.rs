//! Domain models for `tollgate`.
//!
//! ## Submodules
//!
//! - [`token`] - Authorization bundles and acquisition strategies
//! - [`page`] - Page requests, page results, and filter sets
//! - [`record`] - Opaque records and record identity
//! - [`metrics`] - Session counters

mod metrics;
mod page;
mod record;
mod token;

// Re-export everything at the models level
pub use metrics::FetchMetrics;
pub use page::{FilterSet, PageRequest, PageResult};
pub use record::{Record, RecordKey};
pub use token::{AcquisitionStrategy, DEFAULT_TOKEN_TTL_SECS, TokenBundle};
#[cfg(test)]
mod serde_tests;
