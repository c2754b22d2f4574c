//! Actor context
//!
//! Identity of the authenticated user performing an operation. Resolved once
//! by the auth middleware and passed explicitly into the ledger, instead of
//! each operation reaching into ambient session state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated actor a ledger operation is attributed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorContext {
    /// User ID the session resolved to
    pub user_id: Uuid,

    /// Display name, denormalized for attribution in responses
    pub name: String,
}

impl ActorContext {
    pub fn new(user_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            user_id,
            name: name.into(),
        }
    }
}
