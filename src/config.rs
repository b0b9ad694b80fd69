use anyhow::{Context, Result, anyhow};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Public Discord API root, used unless a proxy host is configured.
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Credentials and endpoint for the Discord entitlements API
#[derive(Clone)]
pub struct DiscordConfig {
    pub application_id: u64,
    pub token: String,
    /// When set, requests go to `http://{proxy_host}` instead of discord.com
    pub proxy_host: Option<String>,
}

impl DiscordConfig {
    /// Root URL that API paths are appended to
    pub fn api_base(&self) -> String {
        match &self.proxy_host {
            Some(host) => format!("http://{}/api/v10", host.trim_end_matches('/')),
            None => DISCORD_API_BASE.to_string(),
        }
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("application_id", &self.application_id)
            .field("token", &"<redacted>")
            .field("proxy_host", &self.proxy_host)
            .finish()
    }
}

/// Process configuration, read once at startup
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Run on a fixed interval rather than once
    pub daemon: bool,

    /// Delay between the end of one run and the start of the next
    pub run_frequency: Duration,

    /// Deadline for a single run, fetch and database work included
    pub execution_timeout: Duration,

    pub json_logs: bool,

    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,

    pub discord: DiscordConfig,

    pub database_uri: String,

    pub database_max_connections: u32,

    /// Absence-deletion batches of this size or larger are refused
    pub max_removals_threshold: usize,

    /// Error events are forwarded to Sentry when set
    pub sentry_dsn: Option<sentry::types::Dsn>,
}

impl SyncConfig {
    /// Create a configuration with default tuning
    pub fn new(application_id: u64, token: &str, database_uri: &str) -> Self {
        Self {
            daemon: true,
            run_frequency: Duration::from_secs(60),
            execution_timeout: Duration::from_secs(300),
            json_logs: false,
            log_level: "info".to_string(),
            discord: DiscordConfig {
                application_id,
                token: token.to_string(),
                proxy_host: None,
            },
            database_uri: database_uri.to_string(),
            database_max_connections: 4,
            max_removals_threshold: 100,
            sentry_dsn: None,
        }
    }

    pub fn daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }

    pub fn run_frequency(mut self, frequency: Duration) -> Self {
        self.run_frequency = frequency;
        self
    }

    pub fn execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    pub fn max_removals_threshold(mut self, threshold: usize) -> Self {
        self.max_removals_threshold = threshold;
        self
    }

    pub fn proxy_host(mut self, host: &str) -> Self {
        self.discord.proxy_host = Some(host.to_string());
        self
    }

    /// Load from the process environment, after merging a `.env` file if present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| anyhow!("{key} must be set"))
        };

        let application_id = parse_value::<u64>("DISCORD_APPLICATION_ID", &required("DISCORD_APPLICATION_ID")?)?;
        let token = required("DISCORD_TOKEN")?;
        let database_uri = required("DATABASE_URI")?;

        let mut config = Self::new(application_id, &token, &database_uri);

        if let Some(value) = lookup("DAEMON") {
            config.daemon = parse_value("DAEMON", &value)?;
        }
        if let Some(value) = lookup("RUN_FREQUENCY") {
            config.run_frequency = parse_duration("RUN_FREQUENCY", &value)?;
        }
        if let Some(value) = lookup("EXECUTION_TIMEOUT") {
            config.execution_timeout = parse_duration("EXECUTION_TIMEOUT", &value)?;
        }
        if let Some(value) = lookup("JSON_LOGS") {
            config.json_logs = parse_value("JSON_LOGS", &value)?;
        }
        if let Some(value) = lookup("LOG_LEVEL").filter(|value| !value.is_empty()) {
            config.log_level = value;
        }
        config.discord.proxy_host = lookup("DISCORD_PROXY_HOST").filter(|value| !value.is_empty());
        if let Some(value) = lookup("DATABASE_MAX_CONNECTIONS") {
            config.database_max_connections = parse_value("DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = lookup("MAX_REMOVALS_THRESHOLD") {
            config.max_removals_threshold = parse_value("MAX_REMOVALS_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("SENTRY_DSN").filter(|value| !value.is_empty()) {
            config.sentry_dsn = Some(parse_value("SENTRY_DSN", &value)?);
        }

        if config.execution_timeout.is_zero() {
            return Err(anyhow!("EXECUTION_TIMEOUT must be greater than zero"));
        }

        Ok(config)
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse::<T>()
        .with_context(|| format!("{key} has an invalid value: {value:?}"))
}

/// Accepts humantime strings ("90s", "1m", "1h 30m") or bare seconds
fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    humantime::parse_duration(value)
        .with_context(|| format!("{key} must be a duration such as 30s or 5m, got {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DISCORD_APPLICATION_ID", "1234"),
        ("DISCORD_TOKEN", "secret"),
        ("DATABASE_URI", "postgres://localhost/tickets"),
    ];

    #[test]
    fn test_defaults() {
        let config = SyncConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();

        assert!(config.daemon);
        assert_eq!(config.run_frequency, Duration::from_secs(60));
        assert_eq!(config.execution_timeout, Duration::from_secs(300));
        assert_eq!(config.max_removals_threshold, 100);
        assert_eq!(config.discord.application_id, 1234);
        assert_eq!(config.discord.api_base(), DISCORD_API_BASE);
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("DAEMON", "false"),
            ("RUN_FREQUENCY", "5m"),
            ("EXECUTION_TIMEOUT", "90"),
            ("MAX_REMOVALS_THRESHOLD", "25"),
            ("DISCORD_PROXY_HOST", "proxy.internal:8080"),
            ("LOG_LEVEL", "debug"),
        ]);

        let config = SyncConfig::from_lookup(lookup_from(&pairs)).unwrap();

        assert!(!config.daemon);
        assert_eq!(config.run_frequency, Duration::from_secs(300));
        assert_eq!(config.execution_timeout, Duration::from_secs(90));
        assert_eq!(config.max_removals_threshold, 25);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.discord.api_base(), "http://proxy.internal:8080/api/v10");
    }

    #[test]
    fn test_missing_token_is_an_error() {
        let pairs = [
            ("DISCORD_APPLICATION_ID", "1234"),
            ("DATABASE_URI", "postgres://localhost/tickets"),
        ];

        let err = SyncConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(err.to_string().contains("DISCORD_TOKEN"));
    }

    #[test]
    fn test_invalid_threshold_is_an_error() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MAX_REMOVALS_THRESHOLD", "lots"));

        assert!(SyncConfig::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn test_sentry_dsn() {
        let config = SyncConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();
        assert!(config.sentry_dsn.is_none());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SENTRY_DSN", ""));
        let config = SyncConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert!(config.sentry_dsn.is_none());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SENTRY_DSN", "https://public@sentry.example.com/42"));
        let config = SyncConfig::from_lookup(lookup_from(&pairs)).unwrap();
        let dsn = config.sentry_dsn.unwrap();
        assert_eq!(dsn.host(), "sentry.example.com");
        assert_eq!(dsn.project_id().to_string(), "42");

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SENTRY_DSN", "not a dsn"));
        let err = SyncConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(err.to_string().contains("SENTRY_DSN"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = SyncConfig::new(1, "super-secret", "postgres://localhost/db");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
    }
}
