//! The remote document store seam.
//!
//! The store itself is an external collaborator; this crate consumes it
//! through the [`RemoteStore`] trait and ships [`memory::InMemoryStore`] as a
//! deterministic in-process implementation for tests and examples. A
//! production adapter bridging to a real backend owns its own async plumbing
//! behind this synchronous surface.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

pub mod document;
pub mod memory;

use document::Document;

/// One document of a delivered snapshot: the store-assigned key plus data.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    pub data: Document,
}

/// Handle for an active subscription, used to release it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionToken(u64);

impl SubscriptionToken {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

/// Callback receiving the full current result set of a watched collection or
/// query. Shared so the store can redeliver on every change.
pub type SnapshotHandler = Rc<RefCell<dyn FnMut(&[DocumentSnapshot])>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no document at {path}")]
    NotFound { path: String },
    #[error("remote store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Contract consumed by the sync core.
///
/// Subscription semantics: the handler is invoked synchronously with the full
/// current snapshot before `subscribe_*` returns, then again with a full
/// snapshot after every change to the watched path. Handlers are never
/// reentered; implementations must release internal state before invoking
/// them so a handler may itself call back into the store.
///
/// Paths are slash-joined segments in the usual document-store shape:
/// `users` (collection), `chats/alice-bob` (document),
/// `chats/alice-bob/messages` (subcollection).
pub trait RemoteStore {
    /// Watches every document of a collection, unordered.
    fn subscribe_collection(
        &self,
        path: &str,
        handler: SnapshotHandler,
    ) -> Result<SubscriptionToken, StoreError>;

    /// Watches a collection ordered by one field.
    fn subscribe_query(
        &self,
        path: &str,
        order_field: &str,
        direction: OrderDirection,
        handler: SnapshotHandler,
    ) -> Result<SubscriptionToken, StoreError>;

    /// Releases a subscription. Unknown tokens are ignored; double release is
    /// safe.
    fn unsubscribe(&self, token: SubscriptionToken);

    fn get_document(&self, path: &str) -> Result<Option<Document>, StoreError>;

    /// Whole-document upsert: creates or replaces the document at `path`.
    fn set_document(&self, path: &str, data: Document) -> Result<(), StoreError>;

    /// Appends a document with a store-assigned key; returns the key.
    fn add_document(&self, collection_path: &str, data: Document) -> Result<String, StoreError>;

    /// Top-level merge into an existing document; `NotFound` if absent.
    fn update_document(&self, path: &str, data: Document) -> Result<(), StoreError>;
}
