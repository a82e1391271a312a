//! Redis-backed credential store for sharing bundles across processes.
//!
//! Entries are written with `SET key value EX ttl` so Redis reclaims bundles
//! nobody reads again. Staleness is still checked on read, since the
//! expiry only approximates the bundle's own TTL.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::{ConnectionLike, ConnectionManager};
use tollgate_core::TokenBundle;
use tracing::{debug, warn};

use crate::credential::CredentialStore;
use crate::error::StoreError;

/// Redis-backed credential storage.
///
/// Generic over the async connection; production code uses a
/// [`ConnectionManager`], which reconnects on its own.
pub struct RedisCredentialStore<C = ConnectionManager> {
    conn: C,
}

impl RedisCredentialStore<ConnectionManager> {
    /// Connects to Redis.
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::Backend(format!("Redis connection error: {e}")))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Backend(format!("Redis connection manager error: {e}")))?;

        Ok(Self::with_connection(conn))
    }
}

impl<C> RedisCredentialStore<C>
where
    C: ConnectionLike + Clone + Send + Sync,
{
    /// Wraps an established connection.
    pub fn with_connection(conn: C) -> Self {
        Self { conn }
    }

    async fn drop_entry(&self, conn: &mut C, key: &str) -> Result<(), StoreError> {
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

#[async_trait]
impl<C> CredentialStore for RedisCredentialStore<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<TokenBundle>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let bundle: TokenBundle = match serde_json::from_str(&raw) {
            Ok(bundle) => bundle,
            Err(e) => {
                let err = StoreError::CorruptEntry {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "Dropping undecodable credential entry");
                self.drop_entry(&mut conn, key).await?;
                return Ok(None);
            }
        };

        if bundle.is_stale() {
            debug!(key, "Removing stale credential entry");
            self.drop_entry(&mut conn, key).await?;
            return Ok(None);
        }

        Ok(Some(bundle))
    }

    async fn put(&self, key: &str, bundle: TokenBundle) -> Result<(), StoreError> {
        let remaining = bundle.remaining().as_secs();
        if remaining == 0 {
            debug!(key, "Not caching an already stale bundle");
            return Ok(());
        }

        let value = serde_json::to_string(&bundle)?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(remaining)
            .query_async(&mut conn)
            .await?;
        debug!(key, ttl_secs = remaining, "Cached credential bundle in Redis");
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.drop_entry(&mut conn, key).await
    }
}

// ============================================================================
// Tests
// ============================================================================
