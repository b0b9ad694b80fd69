//! The external entitlement feed and its paginated reader.

pub mod discord;
pub mod fetcher;

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{ExternalEntitlement, FetchResult, Snowflake};

pub use discord::DiscordEntitlementSource;
pub use fetcher::{EntitlementFetcher, PAGE_LIMIT};

/// One page request against the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitlementQuery {
    /// Exclusive lower bound on the entitlement id; `None` starts from the beginning
    pub after: Option<Snowflake>,
    pub limit: u32,
    /// Ask the server to drop entitlements whose `ends_at` has passed
    pub exclude_ended: bool,
}

/// A read-only, id-ordered collection of entitlements.
#[async_trait]
pub trait EntitlementSource: Send + Sync {
    /// Return at most `query.limit` entitlements with id greater than
    /// `query.after`, in ascending id order.
    async fn list(&self, query: EntitlementQuery) -> FetchResult<Vec<ExternalEntitlement>>;
}

#[async_trait]
impl<S: EntitlementSource + ?Sized> EntitlementSource for Arc<S> {
    async fn list(&self, query: EntitlementQuery) -> FetchResult<Vec<ExternalEntitlement>> {
        (**self).list(query).await
    }
}
