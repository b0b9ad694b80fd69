pub mod error;
pub mod types;

pub use error::{FetchError, FetchResult, Result, StoreError, StoreResult, SyncError};
pub use types::{
    EntitlementOrigin, ExternalEntitlement, NewEntitlement, PersistedEntitlement, Sku, Snowflake,
    Subscriber,
};
