use anyhow::{Context, Result};
use clap::Parser;
use entitlement_sync::{
    Daemon, DiscordEntitlementSource, EntitlementFetcher, PgEntitlementStore, SyncConfig, logging,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "entitlement-sync")]
#[command(about = "Reconcile Discord entitlements into the local database")]
struct Cli {
    /// Run a single pass and exit, regardless of DAEMON
    #[arg(long, conflicts_with = "daemon")]
    once: bool,

    /// Run on RUN_FREQUENCY until interrupted, regardless of DAEMON
    #[arg(long)]
    daemon: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = SyncConfig::from_env().context("failed to read configuration")?;
    if cli.once {
        config.daemon = false;
    } else if cli.daemon {
        config.daemon = true;
    }

    // Must outlive the runtime so queued events are flushed on exit
    let _sentry = config.sentry_dsn.clone().map(|dsn| {
        sentry::init(sentry::ClientOptions {
            dsn: Some(dsn),
            release: sentry::release_name!(),
            ..Default::default()
        })
    });

    logging::init(&config)?;

    info!("Connecting to database...");
    let store = PgEntitlementStore::connect(&config)
        .await
        .context("failed to connect to database")?;
    info!("Database connected.");

    let source = DiscordEntitlementSource::new(&config.discord)
        .context("failed to build Discord client")?;
    let run_as_daemon = config.daemon;
    let daemon = Daemon::new(config, EntitlementFetcher::new(source), store);

    if run_as_daemon {
        daemon.start().await;
    } else {
        let report = daemon.run_once().await.context("synchronisation failed")?;
        info!(
            elapsed = ?report.elapsed,
            fetched = report.reconcile.fetched,
            created = report.reconcile.created,
            removed_deleted = report.reconcile.removed_deleted,
            removed_absent = report.reconcile.removed_absent,
            skipped_unknown_sku = report.reconcile.skipped_unknown_sku,
            unknown_skus = report.reconcile.unknown_skus,
            vetoed = report.reconcile.veto.is_some(),
            "Synchronisation complete"
        );
    }

    Ok(())
}
