use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::core::{Sku, Snowflake, StoreResult};
use crate::store::EntitlementStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkuResolution {
    Resolved(Sku),
    /// No local SKU is mapped to this id yet. Not an error: the entitlement
    /// waits until a later run can resolve it.
    Unknown,
}

/// Run-scoped SKU lookup cache.
///
/// Each Discord SKU id hits the store at most once per resolver; hits and
/// misses are both remembered. Build a fresh resolver for every run so SKUs
/// added between runs are picked up.
#[derive(Debug, Default)]
pub struct SkuResolver {
    cache: HashMap<Snowflake, Sku>,
    unknown: HashSet<Snowflake>,
}

impl SkuResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve<St: EntitlementStore>(
        &mut self,
        store: &St,
        tx: &mut St::Tx,
        sku_id: Snowflake,
    ) -> StoreResult<SkuResolution> {
        if self.unknown.contains(&sku_id) {
            debug!(sku_id, "Skipping unknown SKU");
            return Ok(SkuResolution::Unknown);
        }

        if let Some(sku) = self.cache.get(&sku_id) {
            return Ok(SkuResolution::Resolved(sku.clone()));
        }

        match store.get_sku(tx, sku_id).await? {
            Some(sku) => {
                self.cache.insert(sku_id, sku.clone());
                Ok(SkuResolution::Resolved(sku))
            }
            None => {
                debug!(sku_id, "SKU not found in discord_store_skus");
                self.unknown.insert(sku_id);
                Ok(SkuResolution::Unknown)
            }
        }
    }

    pub fn unknown_count(&self) -> usize {
        self.unknown.len()
    }
}
