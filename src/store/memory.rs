use super::EntitlementStore;
use crate::core::{
    EntitlementOrigin, NewEntitlement, PersistedEntitlement, Sku, Snowflake, StoreError,
    StoreResult,
};
use crate::transaction::{Change, Transaction, TransactionId};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;
use uuid::Uuid;

/// Contents of the in-memory store.
#[derive(Debug, Clone, Default)]
pub struct StoreTables {
    /// Keyed by Discord store SKU id
    pub skus: HashMap<Snowflake, Sku>,
    pub entitlements: HashMap<Uuid, PersistedEntitlement>,
    /// Discord entitlement id -> local entitlement id
    pub links: BTreeMap<Snowflake, Uuid>,
}

impl StoreTables {
    fn undo(&mut self, changes: Vec<Change>) {
        for change in changes {
            match change {
                Change::InsertEntitlement { id } => {
                    self.entitlements.remove(&id);
                }
                Change::DeleteEntitlement { entitlement, links } => {
                    let id = entitlement.id;
                    self.entitlements.insert(id, entitlement);
                    for external_id in links {
                        self.links.insert(external_id, id);
                    }
                }
                Change::UpsertLink {
                    external_id,
                    previous,
                } => match previous {
                    Some(previous) => {
                        self.links.insert(external_id, previous);
                    }
                    None => {
                        self.links.remove(&external_id);
                    }
                },
            }
        }
    }
}

/// Entitlement store held entirely in memory.
///
/// A transaction holds the table lock from `begin` until it is committed,
/// rolled back or dropped, so transactions are fully serialized. Writes are
/// applied in place and undone from the transaction's change log on rollback.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEntitlementStore {
    tables: Arc<Mutex<StoreTables>>,
}

/// Open transaction against an [`InMemoryEntitlementStore`].
///
/// Dropping it without committing rolls it back.
pub struct MemoryTransaction {
    txn: Transaction,
    tables: OwnedMutexGuard<StoreTables>,
}

impl MemoryTransaction {
    /// Delete a row and every link that targets it.
    fn delete_row(&mut self, id: Uuid) -> StoreResult<()> {
        let Some(entitlement) = self.tables.entitlements.get(&id).cloned() else {
            return Ok(());
        };

        let links: Vec<Snowflake> = self
            .tables
            .links
            .iter()
            .filter(|(_, target)| **target == id)
            .map(|(external_id, _)| *external_id)
            .collect();

        self.txn.record_change(Change::DeleteEntitlement {
            entitlement,
            links: links.clone(),
        })?;

        self.tables.entitlements.remove(&id);
        for external_id in links {
            self.tables.links.remove(&external_id);
        }
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.txn.state().is_active()
            && let Ok(changes) = self.txn.rollback()
        {
            self.tables.undo(changes);
        }
    }
}

impl InMemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a local SKU for a Discord store SKU id.
    pub async fn insert_sku(&self, external_id: Snowflake, label: &str) -> Sku {
        let sku = Sku {
            id: Uuid::new_v4(),
            external_id,
            label: label.to_string(),
        };
        self.tables
            .lock()
            .await
            .skus
            .insert(external_id, sku.clone());
        sku
    }

    /// Insert a row directly, outside of any transaction.
    pub async fn insert_entitlement(&self, entitlement: NewEntitlement) -> PersistedEntitlement {
        let row = PersistedEntitlement {
            id: Uuid::new_v4(),
            subscriber: entitlement.subscriber,
            sku_id: entitlement.sku_id,
            source: entitlement.source,
            expires_at: entitlement.expires_at,
        };
        self.tables
            .lock()
            .await
            .entitlements
            .insert(row.id, row.clone());
        row
    }

    /// Insert a link directly, outside of any transaction.
    pub async fn insert_link(&self, external_id: Snowflake, entitlement_id: Uuid) {
        self.tables
            .lock()
            .await
            .links
            .insert(external_id, entitlement_id);
    }

    /// Copy of the committed tables. Waits for any open transaction to finish.
    pub async fn snapshot(&self) -> StoreTables {
        self.tables.lock().await.clone()
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> StoreResult<MemoryTransaction> {
        let tables = self.tables.clone().lock_owned().await;
        Ok(MemoryTransaction {
            txn: Transaction::new(TransactionId::new()),
            tables,
        })
    }

    async fn commit(&self, mut tx: MemoryTransaction) -> StoreResult<()> {
        let changes = tx.txn.change_count();
        tx.txn.commit()?;
        trace!(txn = %tx.txn.id(), changes, duration = ?tx.txn.duration(), "Committed");
        Ok(())
    }

    async fn rollback(&self, mut tx: MemoryTransaction) -> StoreResult<()> {
        let changes = tx.txn.rollback()?;
        trace!(txn = %tx.txn.id(), changes = changes.len(), "Rolled back");
        tx.tables.undo(changes);
        Ok(())
    }

    async fn get_sku(
        &self,
        tx: &mut MemoryTransaction,
        external_sku_id: Snowflake,
    ) -> StoreResult<Option<Sku>> {
        Ok(tx.tables.skus.get(&external_sku_id).cloned())
    }

    async fn create_entitlement(
        &self,
        tx: &mut MemoryTransaction,
        entitlement: NewEntitlement,
    ) -> StoreResult<PersistedEntitlement> {
        if !tx.tables.skus.values().any(|sku| sku.id == entitlement.sku_id) {
            return Err(StoreError::ConstraintViolation(format!(
                "sku {} does not exist",
                entitlement.sku_id
            )));
        }

        let row = PersistedEntitlement {
            id: Uuid::new_v4(),
            subscriber: entitlement.subscriber,
            sku_id: entitlement.sku_id,
            source: entitlement.source,
            expires_at: entitlement.expires_at,
        };
        tx.txn
            .record_change(Change::InsertEntitlement { id: row.id })?;
        tx.tables.entitlements.insert(row.id, row.clone());
        Ok(row)
    }

    async fn delete_entitlement(&self, tx: &mut MemoryTransaction, id: Uuid) -> StoreResult<()> {
        tx.delete_row(id)
    }

    async fn create_link(
        &self,
        tx: &mut MemoryTransaction,
        external_id: Snowflake,
        entitlement_id: Uuid,
    ) -> StoreResult<()> {
        match tx.tables.entitlements.get(&entitlement_id) {
            Some(row) if row.source == EntitlementOrigin::Discord => {}
            Some(row) => {
                return Err(StoreError::ConstraintViolation(format!(
                    "entitlement {} has source {}, only discord entitlements can be linked",
                    entitlement_id, row.source
                )));
            }
            None => {
                return Err(StoreError::ConstraintViolation(format!(
                    "entitlement {} does not exist",
                    entitlement_id
                )));
            }
        }

        let previous = tx.tables.links.get(&external_id).copied();
        tx.txn.record_change(Change::UpsertLink {
            external_id,
            previous,
        })?;
        tx.tables.links.insert(external_id, entitlement_id);

        // The replaced row is no longer reachable from any link
        match previous {
            Some(previous) if previous != entitlement_id => tx.delete_row(previous),
            _ => Ok(()),
        }
    }

    async fn get_linked_entitlement(
        &self,
        tx: &mut MemoryTransaction,
        external_id: Snowflake,
    ) -> StoreResult<Option<Uuid>> {
        Ok(tx.tables.links.get(&external_id).copied())
    }

    async fn list_links(&self, tx: &mut MemoryTransaction) -> StoreResult<BTreeMap<Snowflake, Uuid>> {
        Ok(tx.tables.links.clone())
    }
}
