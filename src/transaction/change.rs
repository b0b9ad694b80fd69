// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Every mutation performed inside an in-memory store transaction is recorded
// as a Change carrying enough of the prior state to be undone. ROLLBACK
// replays the log in reverse; COMMIT simply discards it.
//
// ============================================================================

use crate::core::{PersistedEntitlement, Snowflake};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum Change {
    /// A new entitlement row was inserted
    InsertEntitlement { id: Uuid },

    /// A row was deleted together with the links that pointed at it
    DeleteEntitlement {
        entitlement: PersistedEntitlement,
        links: Vec<Snowflake>,
    },

    /// A link was written; `previous` is the target it replaced, if any
    UpsertLink {
        external_id: Snowflake,
        previous: Option<Uuid>,
    },
}
