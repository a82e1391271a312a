// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `tollgate` Catalog
//!
//! Bindings for a gateway-protected property catalog's search API.
//!
//! This crate knows the catalog's request and response shapes; everything
//! about authorization, pacing, and paging lives in `tollgate-fetch`. It
//! includes:
//!
//! - **Descriptor**: Endpoints, origin, page size limits, record identity
//! - **Location**: Autocomplete-backed location resolution with local fallback
//! - **Request**: Search filters and request bodies
//! - **Response**: Tolerant envelope parsing
//! - **Source**: The [`PageSource`](tollgate_fetch::PageSource) implementation
//! - **Client**: Resolve, warm up, and page through a search
//!
//! ## Usage
//!
//! ```ignore
//! use tollgate_catalog::{CatalogClient, SearchQuery};
//! use tollgate_fetch::CancellationSignal;
//!
//! let client = CatalogClient::from_config(&config, store)?;
//! let query = SearchQuery::new("Dallas County, TX").limit(1_000);
//! let outcome = client.search(&query, CancellationSignal::new()).await?;
//! println!("{} records", outcome.records.len());
//! ```

pub mod client;
pub mod descriptor;
pub mod error;
pub mod location;
pub mod request;
pub mod response;
pub mod source;

// Re-export key types
pub use client::{CatalogClient, SearchQuery};
pub use descriptor::CatalogDescriptor;
pub use error::CatalogError;
pub use location::{Location, SearchType, resolve_location};
pub use request::{SearchFilters, build_search_body, search_page_url};
pub use response::parse_search_response;
pub use source::CatalogPageSource;
