//! Catalog errors.

use thiserror::Error;
use tollgate_fetch::{AcquisitionError, SessionError};
use tollgate_store::StoreError;

/// Catalog errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A configured endpoint is not a valid URL.
    #[error("Invalid catalog URL {url}: {reason}")]
    InvalidUrl {
        /// The offending value.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The response did not match any known envelope.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(#[from] StoreError),

    /// The authorized call failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<AcquisitionError> for CatalogError {
    fn from(err: AcquisitionError) -> Self {
        CatalogError::Session(SessionError::Acquisition(err))
    }
}

impl From<CatalogError> for SessionError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Session(e) => e,
            CatalogError::InvalidResponse(msg) => SessionError::InvalidResponse(msg),
            other => SessionError::InvalidRequest(other.to_string()),
        }
    }
}
