// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Undo-log transactions for the in-memory entitlement store.
//
// - State Pattern: transaction lifecycle (Active, Committed, Aborted)
// - Command Pattern: reversible changes replayed backwards on rollback
//
// ============================================================================

pub mod change;
pub mod state;

pub use change::Change;
pub use state::{Transaction, TransactionId, TransactionState};
