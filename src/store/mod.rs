//! Persisted entitlement store.
//!
//! Every data operation takes the run's transaction handle explicitly; nothing
//! is written outside of a transaction. Implementations must roll an
//! uncommitted transaction back when its handle is dropped.

pub mod memory;
pub mod postgres;

use std::collections::BTreeMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::{NewEntitlement, PersistedEntitlement, Sku, Snowflake, StoreResult};

pub use memory::{InMemoryEntitlementStore, MemoryTransaction};
pub use postgres::PgEntitlementStore;

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> StoreResult<Self::Tx>;
    async fn commit(&self, tx: Self::Tx) -> StoreResult<()>;
    async fn rollback(&self, tx: Self::Tx) -> StoreResult<()>;

    /// Look up the local SKU mapped to a Discord store SKU id.
    async fn get_sku(&self, tx: &mut Self::Tx, external_sku_id: Snowflake)
    -> StoreResult<Option<Sku>>;

    /// Insert a new entitlement row. Returns the stored row.
    async fn create_entitlement(
        &self,
        tx: &mut Self::Tx,
        entitlement: NewEntitlement,
    ) -> StoreResult<PersistedEntitlement>;

    /// Delete an entitlement by id. Links pointing at it go with it.
    async fn delete_entitlement(&self, tx: &mut Self::Tx, id: Uuid) -> StoreResult<()>;

    /// Link a Discord entitlement id to a local entitlement. A previous
    /// target for that id is replaced, and its row deleted.
    async fn create_link(
        &self,
        tx: &mut Self::Tx,
        external_id: Snowflake,
        entitlement_id: Uuid,
    ) -> StoreResult<()>;

    async fn get_linked_entitlement(
        &self,
        tx: &mut Self::Tx,
        external_id: Snowflake,
    ) -> StoreResult<Option<Uuid>>;

    /// Every link, keyed by Discord entitlement id.
    async fn list_links(&self, tx: &mut Self::Tx) -> StoreResult<BTreeMap<Snowflake, Uuid>>;
}
