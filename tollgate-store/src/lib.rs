// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # tollgate Store
//!
//! Credential storage and configuration for tollgate.
//!
//! This crate provides:
//!
//! - **CredentialStore**: TTL-aware cache of gateway token bundles
//!   - [`MemoryCredentialStore`] for a single process
//!   - `RedisCredentialStore` (feature `redis-backend`) shared across processes
//!   - [`TieredCredentialStore`] distributed primary with in-process fallback
//! - **Config**: JSON configuration with environment overrides
//! - **Persistence**: File I/O helpers for JSON data
//!
//! ## Usage
//!
//! ```ignore
//! use tollgate_store::{Config, open_credential_store};
//!
//! let config = Config::load().await?;
//! let store = open_credential_store(&config.cache).await;
//!
//! if let Some(bundle) = store.get(&config.credential_key()).await? {
//!     println!("cached bundle expires at {}", bundle.expires_at());
//! }
//! ```

pub mod config;
pub mod credential;
pub mod error;
pub mod memory;
pub mod persistence;
#[cfg(feature = "redis-backend")]
pub mod redis_store;
pub mod tiered;

pub use config::{
    BrowserConfig, CacheConfig, CatalogConfig, Config, GeneralConfig, ProxyConfig, SessionConfig,
};
pub use credential::{CredentialStore, open_credential_store};
pub use error::StoreError;
pub use memory::MemoryCredentialStore;
pub use persistence::{
    default_cache_dir, default_config_dir, default_config_path, load_json, save_json,
};
#[cfg(feature = "redis-backend")]
pub use redis_store::RedisCredentialStore;
pub use tiered::TieredCredentialStore;
