//! Live-synced chat data layer over a remote document store.
//!
//! `tether` keeps an in-memory mirror of the remote user directory and
//! per-chat message streams, turning push-style change notifications from
//! the store into local callback notifications for independent UI observers.
//! Observers re-read through the accessors after each notification; the
//! notifications themselves carry no payload for the global scope and the
//! materialized message list for chat scopes.
//!
//! The crate is single-threaded and callback-driven: one [`SyncEngine`] per
//! process, constructed with an explicit [`store::RemoteStore`] and passed by
//! reference to consumers. Running several engines against the same remote
//! data is unsupported. All callbacks are expected to be delivered serially
//! by the hosting event loop; nothing here locks.

pub mod domain;
pub mod infra;
pub mod store;
pub mod sync;

pub use domain::chat::{Chat, ChatId, CHAT_ID_SEPARATOR};
pub use domain::message::{Message, MessageDraft, MessageId};
pub use domain::user::{AuthId, AuthUser, IdentifierError, User, UserId};
pub use store::memory::InMemoryStore;
pub use store::{RemoteStore, StoreError};
pub use sync::{ListenerId, SyncEngine, SyncError};
