use async_trait::async_trait;

use crate::xml::Element;
use crate::{ApiError, CollectionQuery};

/// A completed HTTP exchange, as written to the request log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub method: &'static str,
    pub uri: String,
    pub status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePage {
    pub exchange: Exchange,
    /// Items in response order, not yet decoded.
    pub items: Vec<Element>,
    /// Upstream signalled at least one further page.
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFetch {
    pub exchange: Exchange,
    pub element: Element,
}

/// Upstream API contract.
///
/// Nothing here retries: a failed exchange is returned as-is and the next
/// scheduled run tries again under the backoff policy.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// One page of a collection.
    async fn fetch_page(&self, query: &CollectionQuery) -> Result<ResourcePage, ApiError>;

    /// A single resource by path relative to the API root, e.g. `contacts/5/`.
    async fn fetch_resource(&self, path: &str, item: &str) -> Result<ResourceFetch, ApiError>;

    /// `PATCH registrations/{id}/` with an XML diff document.
    async fn patch_registration(
        &self,
        registration_id: i64,
        diff_xml: &str,
    ) -> Result<Exchange, ApiError>;
}
