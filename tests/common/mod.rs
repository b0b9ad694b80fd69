#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use entitlement_sync::SyncConfig;
use entitlement_sync::core::{
    EntitlementOrigin, ExternalEntitlement, FetchError, FetchResult, NewEntitlement, PersistedEntitlement, Sku,
    Snowflake, StoreError, StoreResult, Subscriber,
};
use entitlement_sync::source::{EntitlementQuery, EntitlementSource};
use entitlement_sync::store::memory::StoreTables;
use entitlement_sync::store::{EntitlementStore, InMemoryEntitlementStore, MemoryTransaction};

pub fn entitlement(id: Snowflake, sku_id: Snowflake) -> ExternalEntitlement {
    ExternalEntitlement {
        id,
        sku_id,
        subscriber: Subscriber::guild(1_000 + id),
        ends_at: None,
        deleted: false,
    }
}

pub fn deleted(id: Snowflake, sku_id: Snowflake) -> ExternalEntitlement {
    ExternalEntitlement {
        deleted: true,
        ..entitlement(id, sku_id)
    }
}

/// What each link resolves to, without the local row ids, which change
/// whenever an id is relinked.
pub fn linked_rows(
    tables: &StoreTables,
) -> BTreeMap<Snowflake, (Subscriber, Uuid, EntitlementOrigin, Option<DateTime<Utc>>)> {
    tables
        .links
        .iter()
        .filter_map(|(external_id, entitlement_id)| {
            let row = tables.entitlements.get(entitlement_id)?;
            Some((
                *external_id,
                (row.subscriber, row.sku_id, row.source, row.expires_at),
            ))
        })
        .collect()
}

pub fn config() -> SyncConfig {
    SyncConfig::new(1, "test-token", "postgres://unused")
        .daemon(false)
        .execution_timeout(Duration::from_secs(60))
        .max_removals_threshold(100)
}

/// In-process feed that answers cursor queries over a fixed list and
/// records every query it receives.
#[derive(Default)]
pub struct StaticSource {
    entitlements: Mutex<Vec<ExternalEntitlement>>,
    queries: Mutex<Vec<EntitlementQuery>>,
    fail_on_request: Option<usize>,
    delay: Option<Duration>,
}

impl StaticSource {
    pub fn new(mut entitlements: Vec<ExternalEntitlement>) -> Self {
        entitlements.sort_by_key(|e| e.id);
        Self {
            entitlements: Mutex::new(entitlements),
            ..Self::default()
        }
    }

    /// Fail the nth request (1-based) with an API error.
    pub fn failing_on_request(mut self, request: usize) -> Self {
        self.fail_on_request = Some(request);
        self
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn replace(&self, mut entitlements: Vec<ExternalEntitlement>) {
        entitlements.sort_by_key(|e| e.id);
        *self.entitlements.lock().unwrap() = entitlements;
    }

    pub fn queries(&self) -> Vec<EntitlementQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl EntitlementSource for StaticSource {
    async fn list(&self, query: EntitlementQuery) -> FetchResult<Vec<ExternalEntitlement>> {
        let request = {
            let mut queries = self.queries.lock().unwrap();
            queries.push(query);
            queries.len()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_on_request == Some(request) {
            return Err(FetchError::Api {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }

        let now = Utc::now();
        Ok(self
            .entitlements
            .lock()
            .unwrap()
            .iter()
            .filter(|e| query.after.is_none_or(|after| e.id > after))
            .filter(|e| !query.exclude_ended || e.ends_at.is_none_or(|ends| ends > now))
            .take(query.limit as usize)
            .cloned()
            .collect())
    }
}

/// Wraps the in-memory store to inject failures and delays into
/// `create_entitlement`, `commit` and `rollback`, and to count the creates.
#[derive(Clone, Default)]
pub struct FaultyStore {
    pub inner: InMemoryEntitlementStore,
    creates: std::sync::Arc<AtomicUsize>,
    fail_on_create: Option<usize>,
    stall_on_create: Option<(usize, Duration)>,
    stall_on_rollback: Option<Duration>,
    stall_on_commit: Option<Duration>,
}

impl FaultyStore {
    pub fn new(inner: InMemoryEntitlementStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Fail the nth create (1-based).
    pub fn failing_on_create(mut self, create: usize) -> Self {
        self.fail_on_create = Some(create);
        self
    }

    /// Sleep for `delay` inside the nth create (1-based).
    pub fn stalling_on_create(mut self, create: usize, delay: Duration) -> Self {
        self.stall_on_create = Some((create, delay));
        self
    }

    /// Sleep for `delay` before every rollback.
    pub fn stalling_on_rollback(mut self, delay: Duration) -> Self {
        self.stall_on_rollback = Some(delay);
        self
    }

    /// Sleep for `delay` before every commit.
    pub fn stalling_on_commit(mut self, delay: Duration) -> Self {
        self.stall_on_commit = Some(delay);
        self
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntitlementStore for FaultyStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        self.inner.begin().await
    }

    async fn commit(&self, tx: Self::Tx) -> StoreResult<()> {
        if let Some(delay) = self.stall_on_commit {
            tokio::time::sleep(delay).await;
        }
        self.inner.commit(tx).await
    }

    async fn rollback(&self, tx: Self::Tx) -> StoreResult<()> {
        if let Some(delay) = self.stall_on_rollback {
            tokio::time::sleep(delay).await;
        }
        self.inner.rollback(tx).await
    }

    async fn get_sku(&self, tx: &mut Self::Tx, external_sku_id: Snowflake) -> StoreResult<Option<Sku>> {
        self.inner.get_sku(tx, external_sku_id).await
    }

    async fn create_entitlement(
        &self,
        tx: &mut Self::Tx,
        entitlement: NewEntitlement,
    ) -> StoreResult<PersistedEntitlement> {
        let call = self.creates.fetch_add(1, Ordering::SeqCst) + 1;

        if self.fail_on_create == Some(call) {
            return Err(StoreError::Execution(format!("injected failure on create {call}")));
        }
        if let Some((stall_at, delay)) = self.stall_on_create
            && stall_at == call
        {
            tokio::time::sleep(delay).await;
        }

        self.inner.create_entitlement(tx, entitlement).await
    }

    async fn delete_entitlement(&self, tx: &mut Self::Tx, id: Uuid) -> StoreResult<()> {
        self.inner.delete_entitlement(tx, id).await
    }

    async fn create_link(
        &self,
        tx: &mut Self::Tx,
        external_id: Snowflake,
        entitlement_id: Uuid,
    ) -> StoreResult<()> {
        self.inner.create_link(tx, external_id, entitlement_id).await
    }

    async fn get_linked_entitlement(
        &self,
        tx: &mut Self::Tx,
        external_id: Snowflake,
    ) -> StoreResult<Option<Uuid>> {
        self.inner.get_linked_entitlement(tx, external_id).await
    }

    async fn list_links(&self, tx: &mut Self::Tx) -> StoreResult<BTreeMap<Snowflake, Uuid>> {
        self.inner.list_links(tx).await
    }
}
