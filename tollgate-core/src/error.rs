//! Core error types for `tollgate`.

use thiserror::Error;

/// Errors raised by the core models and record mappers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A page request violated its bounds.
    #[error("Invalid page request: {0}")]
    InvalidRequest(String),

    /// A record did not have the shape a mapper needs.
    #[error("Unmappable record: {0}")]
    InvalidData(String),
}
