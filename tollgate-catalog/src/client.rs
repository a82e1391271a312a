//! High-level catalog search.

use std::sync::Arc;

use tollgate_core::{FetchMetrics, FilterSet};
use tollgate_fetch::{
    CancellationSignal, EmitOrder, FetchOrchestrator, FetchOutcome, FetchPlan, FetchSession,
    OutboundRequest, PartialResultError, RecordStream, RequestKind,
};
use tollgate_store::{Config, CredentialStore};
use tracing::{debug, info, instrument, warn};

use crate::descriptor::CatalogDescriptor;
use crate::error::CatalogError;
use crate::location::{Location, resolve_location};
use crate::request::{SearchFilters, search_page_url};
use crate::source::CatalogPageSource;

// ============================================================================
// Search Query
// ============================================================================

/// One location search.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Free-text location.
    pub location: String,
    /// Optional criteria.
    pub filters: SearchFilters,
    /// Index of the first result.
    pub offset: u64,
    /// Stop after this many records.
    pub limit: Option<u64>,
    /// Records per page; the catalog default when unset.
    pub page_size: Option<u32>,
    /// Emission order.
    pub order: EmitOrder,
}

impl SearchQuery {
    /// A query for `location` with no filters.
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    /// Sets the filters.
    pub fn filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Sets the start offset.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Caps the number of records.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the page size.
    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Sets the emission order.
    pub fn order(mut self, order: EmitOrder) -> Self {
        self.order = order;
        self
    }
}

// ============================================================================
// Catalog Client
// ============================================================================

/// Searches one catalog through one fetch session.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    session: FetchSession,
    descriptor: Arc<CatalogDescriptor>,
}

impl CatalogClient {
    /// Creates a client over an existing session.
    pub fn new(session: FetchSession, descriptor: CatalogDescriptor) -> Self {
        Self {
            session,
            descriptor: Arc::new(descriptor),
        }
    }

    /// Wires a session and descriptor from configuration.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, CatalogError> {
        let descriptor = CatalogDescriptor::from_config(&config.catalog)?;
        let session = FetchSession::from_config(config, store)?.build();
        Ok(Self::new(session, descriptor))
    }

    /// The fetch session.
    pub fn session(&self) -> &FetchSession {
        &self.session
    }

    /// The catalog descriptor.
    pub fn descriptor(&self) -> &CatalogDescriptor {
        &self.descriptor
    }

    /// Session counters so far.
    pub fn metrics(&self) -> FetchMetrics {
        self.session.metrics().snapshot()
    }

    /// Resolves free text into a structured location.
    pub async fn resolve_location(&self, query: &str) -> Location {
        resolve_location(self.session.manager(), &self.descriptor, query).await
    }

    /// Opens the search page for `locations` as a browser would.
    ///
    /// Failures are logged and ignored.
    #[instrument(skip(self, locations))]
    pub async fn warm_up(&self, locations: &[Location]) {
        let url = search_page_url(&self.descriptor.search_page, locations);
        let request = OutboundRequest::get(url)
            .kind(RequestKind::Document)
            .referer(self.descriptor.search_page.as_str());

        match self.session.manager().authorized_call(request).await {
            Ok(_) => debug!("Search page warm-up done"),
            Err(e) => warn!(error = %e, "Search page warm-up failed, continuing"),
        }
    }

    /// Resolves the location, warms up the session, and builds the plan.
    pub async fn prepare(&self, query: &SearchQuery) -> FetchPlan {
        let location = self.resolve_location(&query.location).await;
        info!(title = %location.title, search_type = ?location.search_type, "Searching");
        let locations = [location];
        self.warm_up(&locations).await;

        self.plan_for(query, query.filters.to_filter_set(&locations))
    }

    /// The orchestrator for this client's session and catalog.
    pub fn orchestrator(&self, cancel: CancellationSignal) -> FetchOrchestrator {
        let source = CatalogPageSource::new(
            Arc::clone(self.session.manager()),
            Arc::clone(&self.descriptor),
        );
        self.session
            .orchestrator(Arc::new(source))
            .with_max_page_size(self.descriptor.max_page_size)
            .with_record_key(self.descriptor.record_key.clone())
            .with_cancellation(cancel)
    }

    /// Streams the records of `query`.
    pub async fn stream(&self, query: &SearchQuery, cancel: CancellationSignal) -> RecordStream {
        let plan = self.prepare(query).await;
        self.orchestrator(cancel).stream(plan)
    }

    /// Collects the records of `query`.
    ///
    /// On failure the records delivered so far come back inside the error.
    pub async fn search(
        &self,
        query: &SearchQuery,
        cancel: CancellationSignal,
    ) -> Result<FetchOutcome, PartialResultError> {
        let plan = self.prepare(query).await;
        self.orchestrator(cancel).fetch_all(plan).await
    }

    fn plan_for(&self, query: &SearchQuery, filters: FilterSet) -> FetchPlan {
        let mut plan = FetchPlan::new(filters)
            .starting_at(query.offset)
            .page_size(query.page_size.unwrap_or(self.descriptor.default_page_size))
            .order(query.order);
        if let Some(limit) = query.limit {
            plan = plan.max_results(limit);
        }
        plan
    }
}
