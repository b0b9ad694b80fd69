use std::time::Duration;

use thiserror::Error;

/// Failure while paging the external entitlement feed.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Entitlement API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid entitlement payload: {0}")]
    Payload(String),
}

/// Failure of any persisted-store operation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Execution error: {0}")]
    Execution(String),
}

/// Why a reconciliation run failed. A failed run never leaves partial writes.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to fetch entitlements: {0}")]
    Fetch(#[from] FetchError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Run exceeded its execution deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type Result<T> = std::result::Result<T, SyncError>;
