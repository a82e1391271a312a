//! In-process credential store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tollgate_core::TokenBundle;
use tracing::debug;

use crate::credential::CredentialStore;
use crate::error::StoreError;

/// Credential store backed by a guarded map.
///
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    entries: Arc<RwLock<HashMap<String, TokenBundle>>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries, stale ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<TokenBundle>, StoreError> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(bundle) if bundle.is_fresh() => return Ok(Some(bundle.clone())),
                Some(_) => {}
            }
        }

        // Stale: remove unless a fresh bundle replaced it in the meantime.
        let mut entries = self.entries.write().await;
        let now = Utc::now();
        if entries.get(key).is_some_and(|b| !b.is_fresh_at(now)) {
            entries.remove(key);
            debug!(key, "Removed stale credential entry");
        }
        Ok(entries.get(key).filter(|b| b.is_fresh_at(now)).cloned())
    }

    async fn put(&self, key: &str, bundle: TokenBundle) -> Result<(), StoreError> {
        debug!(key, cookies = bundle.len(), "Caching credential bundle");
        self.entries.write().await.insert(key.to_string(), bundle);
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), StoreError> {
        if self.entries.write().await.remove(key).is_some() {
            debug!(key, "Invalidated credential entry");
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tollgate_core::AcquisitionStrategy;

    fn fresh() -> TokenBundle {
        TokenBundle::from_pairs([("datadome", "fresh")], AcquisitionStrategy::BrowserAutomation)
    }

    fn stale() -> TokenBundle {
        fresh().acquired_at(Utc::now() - TimeDelta::hours(13))
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = MemoryCredentialStore::new();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryCredentialStore::new();
        store.put("k", fresh()).await.unwrap();
        let bundle = store.get("k").await.unwrap().unwrap();
        assert_eq!(bundle.cookie("datadome"), Some("fresh"));
    }

    #[tokio::test]
    async fn test_stale_entry_is_absent_and_removed() {
        let store = MemoryCredentialStore::new();
        store.put("k", stale()).await.unwrap();
        assert_eq!(store.len().await, 1);

        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_put_replaces_entry() {
        let store = MemoryCredentialStore::new();
        store.put("k", stale()).await.unwrap();
        store.put("k", fresh()).await.unwrap();
        assert!(store.get("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let store = MemoryCredentialStore::new();
        store.put("k", fresh()).await.unwrap();
        store.invalidate("k").await.unwrap();
        store.invalidate("missing").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let store = MemoryCredentialStore::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("k{}", i % 4);
                store.put(&key, fresh()).await.unwrap();
                store.get(&key).await.unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
        assert_eq!(store.len().await, 4);
    }
}
