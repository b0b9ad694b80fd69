use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::SyncConfig;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `LOG_LEVEL`. JSON output is for log shippers; the
/// default is the human-readable formatter. With a Sentry DSN configured,
/// `error!` events are also sent to Sentry and lower levels become breadcrumbs.
pub fn init(config: &SyncConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .with_context(|| format!("invalid LOG_LEVEL {:?}", config.log_level))?;

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(config.sentry_dsn.as_ref().map(|_| sentry_tracing::layer()));

    let installed = if config.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .flatten_event(true),
            )
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };

    installed.context("failed to install tracing subscriber")
}
