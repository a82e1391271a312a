//! Catalog page source.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tollgate_core::{PageRequest, PageResult};
use tollgate_fetch::{OutboundRequest, PageSource, RequestKind, SessionError, SessionManager};
use tracing::{debug, instrument};

use crate::descriptor::CatalogDescriptor;
use crate::request::build_search_body;
use crate::response::parse_search_response;

/// Fetches search pages through an authorized session.
#[derive(Debug, Clone)]
pub struct CatalogPageSource {
    session: Arc<SessionManager>,
    descriptor: Arc<CatalogDescriptor>,
}

impl CatalogPageSource {
    /// Creates a source over `session`.
    pub fn new(session: Arc<SessionManager>, descriptor: Arc<CatalogDescriptor>) -> Self {
        Self {
            session,
            descriptor,
        }
    }

    /// The search API request for `request`.
    pub fn outbound(&self, request: &PageRequest) -> OutboundRequest {
        OutboundRequest::post(self.descriptor.search_api.clone())
            .kind(RequestKind::Api)
            .referer(self.descriptor.search_page.as_str())
            .header(reqwest::header::ORIGIN, &self.descriptor.origin)
            .json(build_search_body(request))
    }
}

#[async_trait]
impl PageSource for CatalogPageSource {
    #[instrument(skip(self, request), fields(result_index = request.result_index, size = request.page_size))]
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult, SessionError> {
        request
            .validate(self.descriptor.max_page_size)
            .map_err(|e| SessionError::InvalidRequest(e.to_string()))?;

        let body: Value = self.session.call_json(self.outbound(request)).await?;
        let page = parse_search_response(body, request)?;
        debug!(
            records = page.len(),
            total = page.total_count,
            "Fetched search page"
        );
        Ok(page)
    }
}
