use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Discord-issued 64-bit identifier.
pub type Snowflake = u64;

/// Who holds an entitlement. Discord grants either to a guild or a user;
/// both halves are kept because user-scoped grants may still carry a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Subscriber {
    pub guild_id: Option<Snowflake>,
    pub user_id: Option<Snowflake>,
}

impl Subscriber {
    pub fn guild(guild_id: Snowflake) -> Self {
        Self {
            guild_id: Some(guild_id),
            user_id: None,
        }
    }

    pub fn user(user_id: Snowflake) -> Self {
        Self {
            guild_id: None,
            user_id: Some(user_id),
        }
    }
}

/// An entitlement as reported by the external feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalEntitlement {
    pub id: Snowflake,
    pub sku_id: Snowflake,
    pub subscriber: Subscriber,
    pub ends_at: Option<DateTime<Utc>>,
    pub deleted: bool,
}

/// Where a persisted entitlement came from.
///
/// Only [`EntitlementOrigin::Discord`] rows are ever touched by the sync;
/// the other origins share the table and must be left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "entitlement_source", rename_all = "snake_case")]
pub enum EntitlementOrigin {
    Discord,
    Patreon,
    VotingPackage,
}

impl EntitlementOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntitlementOrigin::Discord => "discord",
            EntitlementOrigin::Patreon => "patreon",
            EntitlementOrigin::VotingPackage => "voting_package",
        }
    }
}

impl std::fmt::Display for EntitlementOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the local entitlements table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEntitlement {
    pub id: Uuid,
    pub subscriber: Subscriber,
    pub sku_id: Uuid,
    pub source: EntitlementOrigin,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Payload for inserting an entitlement; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntitlement {
    pub subscriber: Subscriber,
    pub sku_id: Uuid,
    pub source: EntitlementOrigin,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewEntitlement {
    /// Build the local row for a Discord entitlement whose SKU resolved to `sku`.
    pub fn from_external(entitlement: &ExternalEntitlement, sku: &Sku) -> Self {
        Self {
            subscriber: entitlement.subscriber,
            sku_id: sku.id,
            source: EntitlementOrigin::Discord,
            expires_at: entitlement.ends_at,
        }
    }
}

/// A local SKU, looked up through its Discord store SKU id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sku {
    pub id: Uuid,
    pub external_id: Snowflake,
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_display_matches_database_label() {
        assert_eq!(EntitlementOrigin::Discord.to_string(), "discord");
        assert_eq!(EntitlementOrigin::VotingPackage.as_str(), "voting_package");
    }

    #[test]
    fn test_new_entitlement_copies_subscriber_and_expiry() {
        let sku = Sku {
            id: Uuid::new_v4(),
            external_id: 77,
            label: "premium".to_string(),
        };
        let external = ExternalEntitlement {
            id: 1,
            sku_id: 77,
            subscriber: Subscriber::guild(42),
            ends_at: Some(Utc::now()),
            deleted: false,
        };

        let new = NewEntitlement::from_external(&external, &sku);
        assert_eq!(new.subscriber, Subscriber::guild(42));
        assert_eq!(new.sku_id, sku.id);
        assert_eq!(new.source, EntitlementOrigin::Discord);
        assert_eq!(new.expires_at, external.ends_at);
    }
}
