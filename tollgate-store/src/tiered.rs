//! Distributed credential store with an in-process fallback.
//!
//! Every write lands in both tiers. Reads prefer the primary and only fall
//! back when it fails. A primary that answers "absent" is authoritative:
//! another process may have invalidated the entry, so the fallback copy is
//! dropped too. Primary failures are logged and never surface to callers.

use std::sync::Arc;

use async_trait::async_trait;
use tollgate_core::TokenBundle;
use tracing::warn;

use crate::credential::CredentialStore;
use crate::error::StoreError;
use crate::memory::MemoryCredentialStore;

/// Primary store backed by an in-process fallback.
pub struct TieredCredentialStore {
    primary: Arc<dyn CredentialStore>,
    fallback: MemoryCredentialStore,
}

impl TieredCredentialStore {
    /// Wraps a primary store.
    pub fn new(primary: Arc<dyn CredentialStore>) -> Self {
        Self {
            primary,
            fallback: MemoryCredentialStore::new(),
        }
    }

    /// Returns the fallback tier.
    pub fn fallback(&self) -> &MemoryCredentialStore {
        &self.fallback
    }
}

#[async_trait]
impl CredentialStore for TieredCredentialStore {
    fn backend_name(&self) -> &'static str {
        self.primary.backend_name()
    }

    async fn get(&self, key: &str) -> Result<Option<TokenBundle>, StoreError> {
        match self.primary.get(key).await {
            Ok(Some(bundle)) => Ok(Some(bundle)),
            Ok(None) => {
                self.fallback.invalidate(key).await?;
                Ok(None)
            }
            Err(e) => {
                warn!(
                    backend = self.primary.backend_name(),
                    error = %e,
                    transient = e.is_transient(),
                    "Credential read failed, using fallback"
                );
                self.fallback.get(key).await
            }
        }
    }

    async fn put(&self, key: &str, bundle: TokenBundle) -> Result<(), StoreError> {
        if let Err(e) = self.primary.put(key, bundle.clone()).await {
            warn!(
                backend = self.primary.backend_name(),
                error = %e,
                transient = e.is_transient(),
                "Credential write failed, kept in fallback"
            );
        }
        self.fallback.put(key, bundle).await
    }

    async fn invalidate(&self, key: &str) -> Result<(), StoreError> {
        if let Err(e) = self.primary.invalidate(key).await {
            warn!(
                backend = self.primary.backend_name(),
                error = %e,
                transient = e.is_transient(),
                "Credential invalidation failed on primary"
            );
        }
        self.fallback.invalidate(key).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::AcquisitionStrategy;

    /// Primary that is always down.
    struct DownStore;

    #[async_trait]
    impl CredentialStore for DownStore {
        fn backend_name(&self) -> &'static str {
            "down"
        }

        async fn get(&self, _key: &str) -> Result<Option<TokenBundle>, StoreError> {
            Err(StoreError::Backend("connection refused".to_string()))
        }

        async fn put(&self, _key: &str, _bundle: TokenBundle) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection refused".to_string()))
        }

        async fn invalidate(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Timeout)
        }
    }

    fn bundle() -> TokenBundle {
        TokenBundle::from_pairs([("datadome", "abc")], AcquisitionStrategy::LightweightHandshake)
    }

    #[tokio::test]
    async fn test_primary_failure_served_by_fallback() {
        let store = TieredCredentialStore::new(Arc::new(DownStore));
        store.put("k", bundle()).await.unwrap();

        let cached = store.get("k").await.unwrap();
        assert_eq!(cached.unwrap().cookie("datadome"), Some("abc"));

        store.invalidate("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_primary_is_preferred() {
        let primary = MemoryCredentialStore::new();
        primary.put("k", bundle()).await.unwrap();

        let store = TieredCredentialStore::new(Arc::new(primary.clone()));
        assert!(store.fallback().is_empty().await);
        assert!(store.get("k").await.unwrap().is_some());
        assert_eq!(store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_primary_absence_beats_fallback_copy() {
        let shared = MemoryCredentialStore::new();
        let store = TieredCredentialStore::new(Arc::new(shared.clone()));
        store.put("k", bundle()).await.unwrap();

        // Another process invalidates through the shared primary.
        shared.invalidate("k").await.unwrap();

        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.fallback().is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate_clears_both_tiers() {
        let primary = MemoryCredentialStore::new();
        let store = TieredCredentialStore::new(Arc::new(primary.clone()));
        store.put("k", bundle()).await.unwrap();
        assert_eq!(primary.len().await, 1);

        store.invalidate("k").await.unwrap();
        assert!(primary.is_empty().await);
        assert!(store.fallback().is_empty().await);
    }
}
