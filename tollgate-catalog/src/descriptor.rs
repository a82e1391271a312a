//! Catalog descriptor.
//!
//! A descriptor holds the static facts about one catalog deployment:
//! - Endpoints (search API, autocomplete, public search page)
//! - The `Origin` its API expects
//! - Page size limits
//! - How records are identified

use tollgate_core::RecordKey;
use tollgate_store::CatalogConfig;
use url::Url;

use crate::error::CatalogError;

// ============================================================================
// Catalog Descriptor
// ============================================================================

/// Static configuration of a catalog.
#[derive(Debug, Clone)]
pub struct CatalogDescriptor {
    /// Catalog name.
    pub name: String,
    /// Paginated search API.
    pub search_api: Url,
    /// Location autocomplete API.
    pub autocomplete: Url,
    /// Public search page, used as referer and for warm-up visits.
    pub search_page: Url,
    /// `Origin` sent on API calls.
    pub origin: String,
    /// Largest page the API accepts.
    pub max_page_size: u32,
    /// Page size used when the caller does not pick one.
    pub default_page_size: u32,
    /// Record identity used for deduplication.
    pub record_key: RecordKey,
}

impl CatalogDescriptor {
    /// Creates a descriptor with 250-record pages.
    ///
    /// The origin is taken from the search page.
    pub fn new(search_api: Url, autocomplete: Url, search_page: Url) -> Self {
        let origin = search_page.origin().ascii_serialization();
        Self {
            name: "catalog".to_string(),
            search_api,
            autocomplete,
            search_page,
            origin,
            max_page_size: 250,
            default_page_size: 250,
            record_key: RecordKey::default(),
        }
    }

    /// Builds a descriptor from the `catalog` config section.
    pub fn from_config(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let mut descriptor = Self::new(
            parse_url(&config.search_api_url)?,
            parse_url(&config.autocomplete_url)?,
            parse_url(&config.search_page_url)?,
        )
        .with_origin(config.origin.clone())
        .with_page_sizes(config.default_page_size, config.max_page_size);
        descriptor.name.clone_from(&config.name);
        if !config.record_id_fields.is_empty() {
            descriptor.record_key = RecordKey::new(config.record_id_fields.iter().cloned());
        }
        Ok(descriptor)
    }

    /// Sets the origin.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Sets the default and maximum page sizes.
    ///
    /// The default never exceeds the maximum.
    pub fn with_page_sizes(mut self, default: u32, max: u32) -> Self {
        self.max_page_size = max.max(1);
        self.default_page_size = default.clamp(1, self.max_page_size);
        self
    }

    /// Sets the record identity.
    pub fn with_record_key(mut self, key: RecordKey) -> Self {
        self.record_key = key;
        self
    }
}

fn parse_url(raw: &str) -> Result<Url, CatalogError> {
    Url::parse(raw).map_err(|e| CatalogError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_config() {
        let descriptor = CatalogDescriptor::from_config(&CatalogConfig::default()).unwrap();
        assert_eq!(descriptor.name, "catalog");
        assert_eq!(descriptor.max_page_size, 250);
        assert_eq!(descriptor.record_key.fields(), ["id", "property_id"]);
        assert!(descriptor.search_api.path().ends_with("property_search"));
    }

    #[test]
    fn test_invalid_url_is_reported() {
        let config = CatalogConfig {
            search_api_url: "not a url".to_string(),
            ..CatalogConfig::default()
        };
        let err = CatalogDescriptor::from_config(&config).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidUrl { url, .. } if url == "not a url"));
    }

    #[test]
    fn test_default_page_size_never_exceeds_max() {
        let descriptor = CatalogDescriptor::new(
            Url::parse("https://api.catalog.example/search").unwrap(),
            Url::parse("https://api.catalog.example/auto").unwrap(),
            Url::parse("https://www.catalog.example/search").unwrap(),
        )
        .with_page_sizes(500, 100);

        assert_eq!(descriptor.default_page_size, 100);
        assert_eq!(descriptor.origin, "https://www.catalog.example");
    }
}
