// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `tollgate` Core
//!
//! Core types, models, and traits shared by all `tollgate` crates.
//!
//! This crate provides the foundational abstractions for acquiring
//! authorization tokens from a gateway-protected catalog and walking its
//! paginated result sets:
//!
//! - Domain models (token bundles, acquisition strategies, pages, records)
//! - Error types
//! - The record mapping trait used at the output boundary
//!
//! ## Key Types
//!
//! ### Authorization
//! - [`TokenBundle`] - Cookie set issued by the gateway, with its acquisition time
//! - [`AcquisitionStrategy`] - How a bundle is obtained, ordered by cost
//!
//! ### Paging
//! - [`PageRequest`] - Immutable request for one page of results
//! - [`PageResult`] - One page of records plus the provider's total count
//! - [`FilterSet`] - Opaque search criteria carried on every page request
//! - [`Record`] / [`RecordKey`] - Opaque catalog records and their identity
//!
//! ### Metrics
//! - [`FetchMetrics`] - Counters collected over one fetch session

pub mod error;
pub mod models;
pub mod traits;

// Re-export error types
pub use error::CoreError;

// Re-export all model types
pub use models::{
    // Authorization
    AcquisitionStrategy,
    DEFAULT_TOKEN_TTL_SECS,
    TokenBundle,
    // Paging
    FilterSet,
    PageRequest,
    PageResult,
    Record,
    RecordKey,
    // Metrics
    FetchMetrics,
};

// Re-export traits
pub use traits::{FieldProjection, RawRecordMapper, RecordMapper};
