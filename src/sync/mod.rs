//! The synchronization core: mirrored remote state, listener registries and
//! the engine that ties them to the remote store.

use thiserror::Error;

pub mod engine;
pub mod mirror;
pub mod registry;

pub use engine::SyncEngine;
pub use registry::ListenerId;

use crate::domain::user::{AuthId, IdentifierError, UserId};
use crate::store::StoreError;

/// Failures surfaced by [`SyncEngine`] operations. Read-path lookups fail
/// soft with `Option` returns and never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Removing a listener id that is not registered. Promoted from the
    /// silent no-op this replaces so leaked registrations surface in testing.
    #[error("no listener registered as {0}")]
    UnknownListener(ListenerId),
    /// Update of a user document that does not exist.
    #[error("user {0} does not exist")]
    UserNotFound(UserId),
    /// A user for this auth identity already exists, or a provisioning write
    /// for it is still in flight. Provisioning is serialized per identity.
    #[error("a user is already linked to auth identity {0}")]
    DuplicateUser(AuthId),
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] IdentifierError),
    /// The remote store refused or failed the request; propagated to the
    /// caller unchanged, no internal retry.
    #[error("remote store request failed: {0}")]
    Store(#[from] StoreError),
}
