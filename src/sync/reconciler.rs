use std::collections::HashSet;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::guard::{GuardDecision, RemovalGuard, RemovalVeto};
use super::resolver::{SkuResolution, SkuResolver};
use crate::core::{ExternalEntitlement, NewEntitlement, Snowflake, StoreResult};
use crate::store::EntitlementStore;

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Entitlements in the fetched active set
    pub fetched: usize,
    /// Entitlements created and linked
    pub created: usize,
    /// Links removed because Discord flagged them deleted
    pub removed_deleted: usize,
    /// Links removed because they vanished from the active set
    pub removed_absent: usize,
    /// Entitlements skipped because their SKU is not mapped locally
    pub skipped_unknown_sku: usize,
    /// Distinct Discord SKU ids with no local mapping
    pub unknown_skus: usize,
    /// Set when the absence batch hit the removal threshold
    pub veto: Option<RemovalVeto>,
}

/// Applies an active entitlement set to the store inside one transaction.
pub struct Reconciler<'a, St: EntitlementStore> {
    store: &'a St,
    guard: RemovalGuard,
}

impl<'a, St: EntitlementStore> Reconciler<'a, St> {
    pub fn new(store: &'a St, guard: RemovalGuard) -> Self {
        Self { store, guard }
    }

    /// Run both passes. Nothing is committed here; on error the caller must
    /// roll `tx` back.
    pub async fn reconcile(
        &self,
        tx: &mut St::Tx,
        active: &[ExternalEntitlement],
    ) -> StoreResult<ReconcileReport> {
        let mut report = ReconcileReport {
            fetched: active.len(),
            ..ReconcileReport::default()
        };

        let mut resolver = SkuResolver::new();
        self.apply_entitlements(tx, &mut resolver, active, &mut report)
            .await?;
        report.unknown_skus = resolver.unknown_count();
        self.remove_absent(tx, active, &mut report).await?;

        Ok(report)
    }

    async fn apply_entitlements(
        &self,
        tx: &mut St::Tx,
        resolver: &mut SkuResolver,
        active: &[ExternalEntitlement],
        report: &mut ReconcileReport,
    ) -> StoreResult<()> {
        for entitlement in active {
            let sku = match resolver.resolve(self.store, tx, entitlement.sku_id).await? {
                SkuResolution::Resolved(sku) => sku,
                SkuResolution::Unknown => {
                    report.skipped_unknown_sku += 1;
                    continue;
                }
            };

            if entitlement.deleted {
                let Some(entitlement_id) = self
                    .store
                    .get_linked_entitlement(tx, entitlement.id)
                    .await?
                else {
                    continue;
                };

                info!(
                    discord_id = entitlement.id,
                    entitlement_id = %entitlement_id,
                    "Found deleted entitlement"
                );
                self.store.delete_entitlement(tx, entitlement_id).await?;
                report.removed_deleted += 1;
                continue;
            }

            // No check for an existing link: a re-observed id gets a fresh
            // row, and relinking retires the row it pointed at.
            let created = self
                .store
                .create_entitlement(tx, NewEntitlement::from_external(entitlement, &sku))
                .await?;
            self.store.create_link(tx, entitlement.id, created.id).await?;
            report.created += 1;

            debug!(
                discord_id = entitlement.id,
                entitlement_id = %created.id,
                sku = %sku.label,
                "Created entitlement"
            );
        }

        Ok(())
    }

    /// Delete linked entitlements that are no longer in the active set at
    /// all, e.g. revoked test entitlements that were never flagged deleted.
    async fn remove_absent(
        &self,
        tx: &mut St::Tx,
        active: &[ExternalEntitlement],
        report: &mut ReconcileReport,
    ) -> StoreResult<()> {
        let links = self.store.list_links(tx).await?;
        let active_ids: HashSet<Snowflake> = active.iter().map(|e| e.id).collect();

        let candidates: Vec<(Snowflake, Uuid)> = links
            .into_iter()
            .filter(|(discord_id, _)| !active_ids.contains(discord_id))
            .collect();

        match self.guard.filter(candidates) {
            GuardDecision::Vetoed(veto) => {
                warn!(
                    count = veto.candidates,
                    threshold = veto.threshold,
                    "MAX_REMOVALS_THRESHOLD exceeded, not deleting entitlements"
                );
                report.veto = Some(veto);
            }
            GuardDecision::Approved(candidates) => {
                for (discord_id, entitlement_id) in candidates {
                    info!(
                        discord_id,
                        entitlement_id = %entitlement_id,
                        "Deleting missing entitlement"
                    );
                    self.store.delete_entitlement(tx, entitlement_id).await?;
                    report.removed_absent += 1;
                }
            }
        }

        Ok(())
    }
}
