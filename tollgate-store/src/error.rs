//! Store error types.

use thiserror::Error;

/// Errors that can occur in the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The cache backend could not be reached or rejected a command.
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// A cached entry could not be decoded.
    #[error("Corrupt cache entry for {key}: {reason}")]
    CorruptEntry {
        /// Cache key.
        key: String,
        /// Decode failure.
        reason: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout error.
    #[error("Operation timed out")]
    Timeout,
}

impl StoreError {
    /// Returns true if this is a transient error that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Backend(_) | StoreError::Timeout | StoreError::Io(_)
        )
    }
}

#[cfg(feature = "redis-backend")]
impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        if err.is_timeout() {
            StoreError::Timeout
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}
