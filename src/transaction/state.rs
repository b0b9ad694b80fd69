// ============================================================================
// Transaction State Management
// ============================================================================
//
// Each transaction moves through defined states: Active -> Committed/Aborted.
// While active it accumulates an undo log of Changes; rollback hands the log
// back (newest first) so the owner can revert its tables.
//
// ============================================================================

use super::Change;
use crate::core::{StoreError, StoreResult};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction state
///
/// State transitions:
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,

    /// Undo log, oldest first
    changes: Vec<Change>,

    start_time: std::time::Instant,
}

impl Transaction {
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            changes: Vec::new(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Record a change in this transaction
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn record_change(&mut self, change: Change) -> StoreResult<()> {
        if !self.state.is_active() {
            return Err(StoreError::Transaction(format!(
                "Cannot record change: transaction {} is {}",
                self.id, self.state
            )));
        }

        self.changes.push(change);
        Ok(())
    }

    /// Mark transaction as committed and drop the undo log
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn commit(&mut self) -> StoreResult<()> {
        if !self.state.is_active() {
            return Err(StoreError::Transaction(format!(
                "Cannot commit: transaction {} is already {}",
                self.id, self.state
            )));
        }

        self.changes.clear();
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Mark transaction as aborted and return its changes, newest first
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn rollback(&mut self) -> StoreResult<Vec<Change>> {
        if !self.state.is_active() {
            return Err(StoreError::Transaction(format!(
                "Cannot rollback: transaction {} is already {}",
                self.id, self.state
            )));
        }

        let mut changes = std::mem::take(&mut self.changes);
        changes.reverse();
        self.state = TransactionState::Aborted;
        Ok(changes)
    }
}
