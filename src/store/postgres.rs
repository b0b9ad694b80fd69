use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres};
use uuid::Uuid;

use super::EntitlementStore;
use crate::config::SyncConfig;
use crate::core::{
    EntitlementOrigin, NewEntitlement, PersistedEntitlement, Sku, Snowflake, StoreResult,
    Subscriber,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Postgres-backed store. Each run holds one `sqlx` transaction, which sqlx
/// rolls back if it is dropped uncommitted.
#[derive(Clone)]
pub struct PgEntitlementStore {
    pool: PgPool,
}

impl PgEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &SyncConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect(&config.database_uri)
            .await?;

        Ok(Self::new(pool))
    }
}

// Snowflakes only use 63 bits, so they round-trip through BIGINT unchanged.
fn to_db_id(id: Snowflake) -> i64 {
    id as i64
}

fn from_db_id(id: i64) -> Snowflake {
    id as u64
}

#[derive(FromRow)]
struct SkuRow {
    id: Uuid,
    discord_id: i64,
    label: String,
}

impl From<SkuRow> for Sku {
    fn from(row: SkuRow) -> Self {
        Sku {
            id: row.id,
            external_id: from_db_id(row.discord_id),
            label: row.label,
        }
    }
}

#[derive(FromRow)]
struct EntitlementRow {
    id: Uuid,
    guild_id: Option<i64>,
    user_id: Option<i64>,
    sku_id: Uuid,
    source: EntitlementOrigin,
    expires_at: Option<DateTime<Utc>>,
}

impl From<EntitlementRow> for PersistedEntitlement {
    fn from(row: EntitlementRow) -> Self {
        PersistedEntitlement {
            id: row.id,
            subscriber: Subscriber {
                guild_id: row.guild_id.map(from_db_id),
                user_id: row.user_id.map(from_db_id),
            },
            sku_id: row.sku_id,
            source: row.source,
            expires_at: row.expires_at,
        }
    }
}

#[async_trait]
impl EntitlementStore for PgEntitlementStore {
    type Tx = sqlx::Transaction<'static, Postgres>;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> StoreResult<()> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> StoreResult<()> {
        tx.rollback().await?;
        Ok(())
    }

    async fn get_sku(
        &self,
        tx: &mut Self::Tx,
        external_sku_id: Snowflake,
    ) -> StoreResult<Option<Sku>> {
        let row = sqlx::query_as::<_, SkuRow>(
            r#"
            SELECT skus.id, discord_store_skus.discord_id, skus.label
            FROM discord_store_skus
            INNER JOIN skus ON skus.id = discord_store_skus.sku_id
            WHERE discord_store_skus.discord_id = $1
            "#,
        )
        .bind(to_db_id(external_sku_id))
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(Sku::from))
    }

    async fn create_entitlement(
        &self,
        tx: &mut Self::Tx,
        entitlement: NewEntitlement,
    ) -> StoreResult<PersistedEntitlement> {
        let row = sqlx::query_as::<_, EntitlementRow>(
            r#"
            INSERT INTO entitlements (id, guild_id, user_id, sku_id, source, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, guild_id, user_id, sku_id, source, expires_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entitlement.subscriber.guild_id.map(to_db_id))
        .bind(entitlement.subscriber.user_id.map(to_db_id))
        .bind(entitlement.sku_id)
        .bind(entitlement.source)
        .bind(entitlement.expires_at)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.into())
    }

    async fn delete_entitlement(&self, tx: &mut Self::Tx, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM entitlements WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    async fn create_link(
        &self,
        tx: &mut Self::Tx,
        external_id: Snowflake,
        entitlement_id: Uuid,
    ) -> StoreResult<()> {
        let previous = sqlx::query_scalar::<_, Uuid>(
            "SELECT entitlement_id FROM discord_entitlements WHERE discord_id = $1 FOR UPDATE",
        )
        .bind(to_db_id(external_id))
        .fetch_optional(&mut **tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO discord_entitlements (discord_id, entitlement_id)
            VALUES ($1, $2)
            ON CONFLICT (discord_id) DO UPDATE SET entitlement_id = EXCLUDED.entitlement_id
            "#,
        )
        .bind(to_db_id(external_id))
        .bind(entitlement_id)
        .execute(&mut **tx)
        .await?;

        // The replaced row is no longer reachable from any link
        if let Some(previous) = previous
            && previous != entitlement_id
        {
            sqlx::query("DELETE FROM entitlements WHERE id = $1 AND source = 'discord'")
                .bind(previous)
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }

    async fn get_linked_entitlement(
        &self,
        tx: &mut Self::Tx,
        external_id: Snowflake,
    ) -> StoreResult<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "SELECT entitlement_id FROM discord_entitlements WHERE discord_id = $1",
        )
        .bind(to_db_id(external_id))
        .fetch_optional(&mut **tx)
        .await?;

        Ok(id)
    }

    async fn list_links(&self, tx: &mut Self::Tx) -> StoreResult<BTreeMap<Snowflake, Uuid>> {
        let rows = sqlx::query_as::<_, (i64, Uuid)>(
            "SELECT discord_id, entitlement_id FROM discord_entitlements",
        )
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(discord_id, entitlement_id)| (from_db_id(discord_id), entitlement_id))
            .collect())
    }
}
