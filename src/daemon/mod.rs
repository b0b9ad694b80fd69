// ============================================================================
// Run Orchestrator
// ============================================================================
//
// One run = one store transaction, bounded by the execution deadline:
//
//   begin -> fetch all pages -> reconcile (apply + absence diff) -> commit
//
// Any failure, including the deadline elapsing, rolls the transaction back.
// The scheduler waits for a run to finish before arming the next interval,
// so runs never overlap.
//
// ============================================================================

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::core::{Result, SyncError};
use crate::source::{EntitlementFetcher, EntitlementSource};
use crate::store::EntitlementStore;
use crate::sync::{ReconcileReport, Reconciler, RemovalGuard};

/// Rollback gets its own budget so a hung transaction cannot block shutdown.
pub const ROLLBACK_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome of a committed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub reconcile: ReconcileReport,
    pub elapsed: Duration,
    /// The run used more than half of the execution timeout.
    pub slow: bool,
}

pub struct Daemon<S, St> {
    config: SyncConfig,
    fetcher: EntitlementFetcher<S>,
    store: St,
}

impl<S, St> Daemon<S, St>
where
    S: EntitlementSource,
    St: EntitlementStore,
{
    pub fn new(config: SyncConfig, fetcher: EntitlementFetcher<S>, store: St) -> Self {
        Self {
            config,
            fetcher,
            store,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    /// Run on the configured interval until Ctrl-C.
    pub async fn start(&self) {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run on the configured interval until `shutdown` resolves. A run that is
    /// already in progress is allowed to finish.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(frequency = ?self.config.run_frequency, "Starting daemon");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = sleep(self.config.run_frequency) => {
                    let start = Instant::now();
                    match self.run_once().await {
                        Ok(report) => info!(
                            duration = ?start.elapsed(),
                            fetched = report.reconcile.fetched,
                            created = report.reconcile.created,
                            removed_deleted = report.reconcile.removed_deleted,
                            removed_absent = report.reconcile.removed_absent,
                            skipped_unknown_sku = report.reconcile.skipped_unknown_sku,
                            unknown_skus = report.reconcile.unknown_skus,
                            vetoed = report.reconcile.veto.is_some(),
                            "Run completed"
                        ),
                        Err(err) => error!(
                            duration = ?start.elapsed(),
                            error = %err,
                            "Failed to run"
                        ),
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutting down daemon");
                    return;
                }
            }
        }
    }

    /// Execute a single run under the configured execution deadline.
    pub async fn run_once(&self) -> Result<RunReport> {
        debug!("Running synchronisation");

        let budget = self.config.execution_timeout;
        let start = Instant::now();
        let result = self.run_before(start + budget).await;

        let elapsed = start.elapsed();
        let slow = elapsed > budget / 2;
        if slow {
            warn!(
                duration = ?elapsed,
                timeout = ?budget,
                "Execution took more than 50% of the timeout"
            );
        }

        result.map(|reconcile| RunReport {
            reconcile,
            elapsed,
            slow,
        })
    }

    async fn run_before(&self, deadline: Instant) -> Result<ReconcileReport> {
        let mut tx = timeout_at(deadline, self.store.begin())
            .await
            .map_err(|_| self.deadline_exceeded())??;

        let outcome = timeout_at(deadline, self.reconcile(&mut tx)).await;
        match outcome {
            Ok(Ok(report)) => {
                timeout_at(deadline, self.store.commit(tx))
                    .await
                    .map_err(|_| {
                        error!(
                            timeout = ?self.config.execution_timeout,
                            "Timed out committing transaction; outcome unknown"
                        );
                        self.deadline_exceeded()
                    })??;
                Ok(report)
            }
            Ok(Err(err)) => {
                self.rollback(tx).await;
                Err(err)
            }
            Err(_) => {
                self.rollback(tx).await;
                Err(self.deadline_exceeded())
            }
        }
    }

    async fn reconcile(&self, tx: &mut St::Tx) -> Result<ReconcileReport> {
        let active = self.fetcher.fetch_all().await.inspect_err(|err| {
            error!(error = %err, "Failed to fetch entitlements");
        })?;
        debug!(count = active.len(), "Fetched entitlements");

        let guard = RemovalGuard::new(self.config.max_removals_threshold);
        let report = Reconciler::new(&self.store, guard)
            .reconcile(tx, &active)
            .await?;

        Ok(report)
    }

    async fn rollback(&self, tx: St::Tx) {
        match timeout(ROLLBACK_TIMEOUT, self.store.rollback(tx)).await {
            Ok(Ok(())) => debug!("Transaction rolled back"),
            Ok(Err(err)) => error!(error = %err, "Failed to roll back transaction"),
            Err(_) => error!(timeout = ?ROLLBACK_TIMEOUT, "Timed out rolling back transaction"),
        }
    }

    fn deadline_exceeded(&self) -> SyncError {
        SyncError::DeadlineExceeded(self.config.execution_timeout)
    }
}
