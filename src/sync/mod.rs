//! Reconciliation of the active entitlement set against the store.

pub mod guard;
pub mod reconciler;
pub mod resolver;

pub use guard::{GuardDecision, RemovalGuard, RemovalVeto};
pub use reconciler::{ReconcileReport, Reconciler};
pub use resolver::{SkuResolution, SkuResolver};
