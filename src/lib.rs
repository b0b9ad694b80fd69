// ============================================================================
// entitlement-sync Library
// ============================================================================
//
// Keeps the local entitlements table in step with the Discord application
// entitlements feed. See `daemon::Daemon` for the entry point.
//
// ============================================================================

pub mod config;
pub mod core;
pub mod daemon;
pub mod logging;
pub mod source;
pub mod store;
pub mod sync;
pub mod transaction;

pub use config::SyncConfig;
pub use core::{FetchError, Result, StoreError, SyncError};
pub use daemon::{Daemon, RunReport};
pub use source::{DiscordEntitlementSource, EntitlementFetcher, EntitlementSource};
pub use store::{EntitlementStore, InMemoryEntitlementStore, PgEntitlementStore};
pub use sync::{ReconcileReport, RemovalVeto};
