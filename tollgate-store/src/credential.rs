//! Credential store contract.
//!
//! A credential store maps an endpoint key to the most recent
//! [`TokenBundle`]. Staleness is evaluated on read: `get` never returns a
//! bundle whose TTL has elapsed, and there is no background sweeper.

use std::sync::Arc;

use async_trait::async_trait;
use tollgate_core::TokenBundle;
use tracing::{info, warn};

use crate::config::CacheConfig;
use crate::error::StoreError;
use crate::memory::MemoryCredentialStore;
#[cfg(feature = "redis-backend")]
use crate::tiered::TieredCredentialStore;

/// TTL-aware cache of token bundles.
///
/// Implementations must be safe under concurrent callers.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Returns the bundle for `key` if one exists and is fresh.
    async fn get(&self, key: &str) -> Result<Option<TokenBundle>, StoreError>;

    /// Stores a bundle, replacing any previous entry.
    async fn put(&self, key: &str, bundle: TokenBundle) -> Result<(), StoreError>;

    /// Removes the entry for `key`. Removing a missing key is not an error.
    async fn invalidate(&self, key: &str) -> Result<(), StoreError>;
}

/// Opens the store described by the cache configuration.
///
/// With a Redis URL and the `redis-backend` feature, returns a tiered store
/// backed by Redis. If Redis is unreachable at startup, or the feature is
/// disabled, falls back to an in-process store.
pub async fn open_credential_store(config: &CacheConfig) -> Arc<dyn CredentialStore> {
    let Some(url) = config.redis_url.as_deref() else {
        return Arc::new(MemoryCredentialStore::new());
    };

    #[cfg(feature = "redis-backend")]
    {
        match crate::redis_store::RedisCredentialStore::connect(url).await {
            Ok(redis) => {
                info!("Using Redis credential cache");
                return Arc::new(TieredCredentialStore::new(Arc::new(redis)));
            }
            Err(e) => {
                warn!(error = %e, "Redis unavailable, using in-process credential cache");
            }
        }
    }

    #[cfg(not(feature = "redis-backend"))]
    {
        let _ = url;
        warn!("Redis URL configured but built without redis-backend; using in-process cache");
    }

    info!("Using in-process credential cache");
    Arc::new(MemoryCredentialStore::new())
}
