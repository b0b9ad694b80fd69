use tracing::debug;

use super::{EntitlementQuery, EntitlementSource};
use crate::core::{ExternalEntitlement, FetchError, FetchResult};

/// Page size requested from the feed; a shorter page marks the end.
pub const PAGE_LIMIT: u32 = 100;

/// Reads the complete active entitlement set, page by page.
pub struct EntitlementFetcher<S> {
    source: S,
}

impl<S: EntitlementSource> EntitlementFetcher<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Fetch every non-ended entitlement, in ascending id order.
    ///
    /// Any failed page fails the whole fetch; pages already read are dropped.
    pub async fn fetch_all(&self) -> FetchResult<Vec<ExternalEntitlement>> {
        let mut entitlements: Vec<ExternalEntitlement> = Vec::new();
        let mut after = None;

        loop {
            debug!(
                after = ?after,
                limit = PAGE_LIMIT,
                total = entitlements.len(),
                "Fetching page of entitlements"
            );

            let page = self
                .source
                .list(EntitlementQuery {
                    after,
                    limit: PAGE_LIMIT,
                    exclude_ended: true,
                })
                .await?;

            let fetched = page.len();
            let max_id = page.iter().map(|entitlement| entitlement.id).max();
            entitlements.extend(page);

            if fetched < PAGE_LIMIT as usize {
                return Ok(entitlements);
            }

            // A full page always has a max id; a cursor that fails to move
            // forward would page forever.
            match (max_id, after) {
                (Some(next), Some(previous)) if next <= previous => {
                    return Err(FetchError::Payload(format!(
                        "pagination cursor did not advance past {previous}"
                    )));
                }
                (next, _) => after = next,
            }
        }
    }
}
