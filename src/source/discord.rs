//! Discord application entitlements over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Deserializer, de};
use tracing::{debug, warn};

use super::{EntitlementQuery, EntitlementSource};
use crate::config::DiscordConfig;
use crate::core::{ExternalEntitlement, FetchError, FetchResult, Snowflake, Subscriber};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `GET /applications/{application_id}/entitlements`
#[derive(Debug, Clone)]
pub struct DiscordEntitlementSource {
    base_url: String,
    application_id: u64,
    token: String,
    http: Client,
}

impl DiscordEntitlementSource {
    pub fn new(config: &DiscordConfig) -> FetchResult<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("entitlement-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_http_client(
            config.api_base(),
            config.application_id,
            &config.token,
            http,
        ))
    }

    /// Build against an arbitrary API root, e.g. a local mock server
    pub fn with_http_client(base_url: String, application_id: u64, token: &str, http: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            application_id,
            token: token.to_string(),
            http,
        }
    }

    fn entitlements_url(&self) -> String {
        format!(
            "{}/applications/{}/entitlements",
            self.base_url, self.application_id
        )
    }
}

#[async_trait]
impl EntitlementSource for DiscordEntitlementSource {
    async fn list(&self, query: EntitlementQuery) -> FetchResult<Vec<ExternalEntitlement>> {
        let mut params: Vec<(&str, String)> = vec![
            ("limit", query.limit.to_string()),
            ("exclude_ended", query.exclude_ended.to_string()),
        ];
        if let Some(after) = query.after {
            params.push(("after", after.to_string()));
        }

        let response = self
            .http
            .get(self.entitlements_url())
            .header("Authorization", format!("Bot {}", self.token))
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Entitlement request rejected");
            return Err(FetchError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let payloads: Vec<EntitlementPayload> =
            serde_json::from_slice(&body).map_err(|e| FetchError::Payload(e.to_string()))?;

        debug!(count = payloads.len(), after = ?query.after, "Received entitlement page");
        Ok(payloads.into_iter().map(ExternalEntitlement::from).collect())
    }
}

/// Wire shape of a Discord entitlement; fields we do not use are ignored.
#[derive(Debug, Deserialize)]
struct EntitlementPayload {
    #[serde(deserialize_with = "snowflake")]
    id: Snowflake,
    #[serde(deserialize_with = "snowflake")]
    sku_id: Snowflake,
    #[serde(default, deserialize_with = "optional_snowflake")]
    guild_id: Option<Snowflake>,
    #[serde(default, deserialize_with = "optional_snowflake")]
    user_id: Option<Snowflake>,
    #[serde(default)]
    ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    deleted: bool,
}

impl From<EntitlementPayload> for ExternalEntitlement {
    fn from(payload: EntitlementPayload) -> Self {
        ExternalEntitlement {
            id: payload.id,
            sku_id: payload.sku_id,
            subscriber: Subscriber {
                guild_id: payload.guild_id,
                user_id: payload.user_id,
            },
            ends_at: payload.ends_at,
            deleted: payload.deleted,
        }
    }
}

// Discord sends snowflakes as strings; accept bare integers too.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSnowflake {
    Text(String),
    Number(u64),
}

impl RawSnowflake {
    fn parse<E: de::Error>(self) -> Result<Snowflake, E> {
        match self {
            RawSnowflake::Text(text) => text
                .parse()
                .map_err(|_| E::custom(format!("invalid snowflake {text:?}"))),
            RawSnowflake::Number(id) => Ok(id),
        }
    }
}

fn snowflake<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Snowflake, D::Error> {
    RawSnowflake::deserialize(deserializer)?.parse()
}

fn optional_snowflake<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Snowflake>, D::Error> {
    Option::<RawSnowflake>::deserialize(deserializer)?
        .map(RawSnowflake::parse)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_parses_discord_shape() {
        let json = r#"[{
            "id": "1019653849998299136",
            "sku_id": "1019475255913222144",
            "application_id": "1019370614521200640",
            "user_id": "771129655544643584",
            "guild_id": null,
            "type": 8,
            "deleted": false,
            "starts_at": "2022-09-14T17:00:18.704163+00:00",
            "ends_at": "2022-10-14T17:00:18.704163+00:00",
            "consumed": false
        }]"#;

        let payloads: Vec<EntitlementPayload> = serde_json::from_str(json).unwrap();
        let entitlement = ExternalEntitlement::from(payloads.into_iter().next().unwrap());

        assert_eq!(entitlement.id, 1019653849998299136);
        assert_eq!(entitlement.sku_id, 1019475255913222144);
        assert_eq!(entitlement.subscriber, Subscriber::user(771129655544643584));
        assert!(entitlement.ends_at.is_some());
        assert!(!entitlement.deleted);
    }

    #[test]
    fn test_payload_defaults_missing_optional_fields() {
        let json = r#"{"id": 5, "sku_id": "6"}"#;
        let payload: EntitlementPayload = serde_json::from_str(json).unwrap();

        assert_eq!(payload.id, 5);
        assert_eq!(payload.sku_id, 6);
        assert_eq!(payload.guild_id, None);
        assert_eq!(payload.ends_at, None);
        assert!(!payload.deleted);
    }

    #[test]
    fn test_bad_snowflake_is_rejected() {
        let json = r#"{"id": "not-a-number", "sku_id": "6"}"#;
        assert!(serde_json::from_str::<EntitlementPayload>(json).is_err());
    }
}
