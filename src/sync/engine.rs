//! The object consumers hold: subscription lifecycle, mirrored-state
//! maintenance, listener fanout and the read/write contract over the remote
//! store.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use crate::domain::chat::{Chat, ChatId};
use crate::domain::message::{Message, MessageDraft, MessageId, TIMESTAMP_FIELD};
use crate::domain::message::{AUTHOR_ID_FIELD, OTHER_USER_ID_FIELD, TEXT_FIELD};
use crate::domain::user::{AuthId, AuthUser, User, UserId, AUTH_ID_FIELD, DISPLAY_NAME_FIELD};
use crate::infra::config::CollectionConfig;
use crate::store::document::{Document, FieldValue, StoreTimestamp};
use crate::store::{
    DocumentSnapshot, OrderDirection, RemoteStore, SnapshotHandler, StoreError,
};
use crate::sync::mirror::UserMirror;
use crate::sync::registry::{ChatCallback, ChatRegistry, ListenerId, UserCallback, UserRegistry};
use crate::sync::SyncError;

const ENGINE_CONNECTED: &str = "SYNC_ENGINE_CONNECTED";
const ENGINE_DISCONNECTED: &str = "SYNC_ENGINE_DISCONNECTED";
const USERS_SNAPSHOT_APPLIED: &str = "SYNC_USERS_SNAPSHOT_APPLIED";
const USER_DOC_INVALID: &str = "SYNC_USER_DOC_INVALID";
const USER_PROVISIONED: &str = "SYNC_USER_PROVISIONED";
const CHAT_QUERY_OPENED: &str = "SYNC_CHAT_QUERY_OPENED";
const CHAT_QUERY_CLOSED: &str = "SYNC_CHAT_QUERY_CLOSED";
const CHAT_SNAPSHOT_APPLIED: &str = "SYNC_CHAT_SNAPSHOT_APPLIED";
const MESSAGE_DOC_INVALID: &str = "SYNC_MESSAGE_DOC_INVALID";
const MESSAGE_APPENDED: &str = "SYNC_MESSAGE_APPENDED";

#[derive(Default)]
struct EngineState {
    mirror: UserMirror,
    users: UserRegistry,
    chats: ChatRegistry,
    /// Auth identities with a provisioning write in flight, cleared once the
    /// mirror observes them. Serializes find-or-create per identity.
    provisioning: BTreeSet<AuthId>,
}

/// One engine instance per process, constructed at application start and
/// passed by reference to consumers. Single-threaded by design: all state
/// lives behind `Rc<RefCell<_>>` and every mutation happens either in a
/// consumer call or in a store-delivered snapshot callback, both serialized
/// by the hosting event loop.
///
/// Notifications carry no payload for the global user scope (consumers
/// re-read through the accessors) and the materialized message list for chat
/// scopes. State borrows are released before callbacks run, so a callback
/// may re-enter any engine method.
pub struct SyncEngine {
    store: Rc<dyn RemoteStore>,
    collections: CollectionConfig,
    state: Rc<RefCell<EngineState>>,
}

impl SyncEngine {
    pub fn new(store: Rc<dyn RemoteStore>, collections: CollectionConfig) -> Self {
        Self {
            store,
            collections,
            state: Rc::new(RefCell::new(EngineState::default())),
        }
    }

    fn user_doc_path(&self, id: &UserId) -> String {
        format!("{}/{}", self.collections.users, id)
    }

    fn chat_doc_path(&self, id: &ChatId) -> String {
        format!("{}/{}", self.collections.chats, id)
    }

    fn messages_path(&self, id: &ChatId) -> String {
        format!(
            "{}/{}/{}",
            self.collections.chats, id, self.collections.messages
        )
    }

    /// Opens the users-collection subscription; the initial snapshot
    /// populates the mirror before this returns. Idempotent while the
    /// subscription is active.
    pub fn init_on_auth(&self) -> Result<(), SyncError> {
        if self.state.borrow().users.subscription().is_some() {
            return Ok(());
        }

        let state_weak = Rc::downgrade(&self.state);
        let handler: SnapshotHandler = Rc::new(RefCell::new(move |docs: &[DocumentSnapshot]| {
            Self::apply_users_snapshot(&state_weak, docs);
        }));

        let token = self
            .store
            .subscribe_collection(&self.collections.users, handler)?;
        self.state.borrow_mut().users.set_subscription(token);

        tracing::info!(code = ENGINE_CONNECTED, "users subscription opened");
        Ok(())
    }

    /// Tears down the users subscription and every chat live query, and
    /// clears all listeners and mirrored state. The explicit teardown point
    /// preventing leaked remote subscriptions across account switches.
    pub fn disconnect_on_logout(&self) {
        let (users_token, chat_tokens) = {
            let mut state = self.state.borrow_mut();
            let users_token = state.users.clear();
            let chat_tokens = state.chats.clear();
            state.mirror.clear();
            state.provisioning.clear();
            (users_token, chat_tokens)
        };

        if let Some(token) = users_token {
            self.store.unsubscribe(token);
        }
        for token in chat_tokens {
            self.store.unsubscribe(token);
        }

        tracing::info!(code = ENGINE_DISCONNECTED, "all subscriptions released");
    }

    /// Registers a global-scope listener and invokes it exactly once before
    /// returning, so consumers need no separate initial-fetch path.
    pub fn add_user_listener(&self, callback: impl FnMut() + 'static) -> ListenerId {
        let callback: UserCallback = Rc::new(RefCell::new(callback));
        let id = self.state.borrow_mut().users.register(callback.clone());
        (callback.borrow_mut())();
        id
    }

    pub fn remove_user_listener(&self, id: ListenerId) -> Result<(), SyncError> {
        if self.state.borrow_mut().users.remove(id) {
            Ok(())
        } else {
            Err(SyncError::UnknownListener(id))
        }
    }

    /// Current directory snapshot, valid until the next notification.
    pub fn get_users(&self) -> Vec<User> {
        self.state.borrow().mirror.users().to_vec()
    }

    pub fn get_user_by_id(&self, id: &UserId) -> Option<User> {
        self.state.borrow().mirror.user_by_id(id).cloned()
    }

    /// `None` is the find-or-create signal: the caller should provision via
    /// [`Self::create_user`] on first login.
    pub fn get_user_for_auth_user(&self, auth_user: &AuthUser) -> Option<User> {
        let auth_id = AuthId::new(auth_user.uid.clone());
        self.state.borrow().mirror.user_for_auth(&auth_id).cloned()
    }

    /// Provisions a directory entry for a freshly authenticated identity.
    /// Serialized per identity: refused while the mirror already holds the
    /// identity or an earlier provisioning write has not yet been observed
    /// back through the mirror. Freshness arrives via the users snapshot,
    /// never by mutating the mirror locally.
    pub fn create_user(&self, auth_user: &AuthUser) -> Result<(), SyncError> {
        let auth_id = AuthId::new(auth_user.uid.clone());
        let user_id = UserId::new(auth_user.uid.clone())?;

        {
            let mut state = self.state.borrow_mut();
            if state.mirror.user_for_auth(&auth_id).is_some()
                || state.provisioning.contains(&auth_id)
            {
                return Err(SyncError::DuplicateUser(auth_id));
            }
            state.provisioning.insert(auth_id.clone());
        }

        let mut doc = Document::new();
        doc.insert(AUTH_ID_FIELD, FieldValue::text(auth_user.uid.clone()));
        if let Some(name) = &auth_user.display_name {
            doc.insert(DISPLAY_NAME_FIELD, FieldValue::text(name.clone()));
        }

        match self.store.set_document(&self.user_doc_path(&user_id), doc) {
            Ok(()) => {
                tracing::info!(code = USER_PROVISIONED, user = %user_id, "user document created");
                Ok(())
            }
            Err(error) => {
                self.state.borrow_mut().provisioning.remove(&auth_id);
                Err(error.into())
            }
        }
    }

    /// Merges partial fields into an existing user document.
    pub fn update_user(&self, id: &UserId, data: Document) -> Result<(), SyncError> {
        self.store
            .update_document(&self.user_doc_path(id), data)
            .map_err(|error| match error {
                StoreError::NotFound { .. } => SyncError::UserNotFound(id.clone()),
                other => SyncError::Store(other),
            })
    }

    /// See [`ChatId::between`]: symmetric in its arguments.
    pub fn derive_chat_id(&self, a: &UserId, b: &UserId) -> ChatId {
        ChatId::between(a, b)
    }

    /// Registers a chat-scope listener and invokes it exactly once before
    /// returning: with the cached list when the chat is already watched,
    /// otherwise via the initial snapshot of the freshly opened live query.
    /// One live query per chat, shared by its listeners.
    pub fn add_chat_listener(
        &self,
        chat_id: &ChatId,
        callback: impl FnMut(&[Message]) + 'static,
    ) -> Result<ListenerId, SyncError> {
        let callback: ChatCallback = Rc::new(RefCell::new(callback));

        let already_watched = self.state.borrow().chats.is_watched(chat_id);
        let id = self
            .state
            .borrow_mut()
            .chats
            .register(chat_id.clone(), callback.clone());

        if already_watched {
            let cached = self
                .state
                .borrow()
                .chats
                .cached_messages(chat_id)
                .map(<[Message]>::to_vec)
                .unwrap_or_default();
            (callback.borrow_mut())(&cached);
            return Ok(id);
        }

        // First listener: the query entry must exist before subscribing, the
        // initial snapshot arrives inside the subscribe call.
        self.state.borrow_mut().chats.open_query(chat_id.clone());

        let state_weak = Rc::downgrade(&self.state);
        let scope = chat_id.clone();
        let handler: SnapshotHandler = Rc::new(RefCell::new(move |docs: &[DocumentSnapshot]| {
            Self::apply_chat_snapshot(&state_weak, &scope, docs);
        }));

        match self.store.subscribe_query(
            &self.messages_path(chat_id),
            TIMESTAMP_FIELD,
            OrderDirection::Descending,
            handler,
        ) {
            Ok(token) => {
                if let Some(query) = self.state.borrow_mut().chats.query_mut(chat_id) {
                    query.token = Some(token);
                }
                tracing::info!(code = CHAT_QUERY_OPENED, chat = %chat_id, "live query opened");
                Ok(id)
            }
            Err(error) => {
                let mut state = self.state.borrow_mut();
                state.chats.remove(id);
                state.chats.close_query(chat_id);
                Err(error.into())
            }
        }
    }

    /// Removes a chat-scope listener; tearing down the chat's live query
    /// when the last listener goes.
    pub fn remove_chat_listener(&self, id: ListenerId) -> Result<(), SyncError> {
        let closed = {
            let mut state = self.state.borrow_mut();
            let Some(chat_id) = state.chats.remove(id) else {
                return Err(SyncError::UnknownListener(id));
            };
            if state.chats.listener_count(&chat_id) == 0 {
                Some((chat_id.clone(), state.chats.close_query(&chat_id)))
            } else {
                None
            }
        };

        if let Some((chat_id, token)) = closed {
            if let Some(token) = token {
                self.store.unsubscribe(token);
            }
            tracing::info!(code = CHAT_QUERY_CLOSED, chat = %chat_id, "live query released");
        }
        Ok(())
    }

    /// Upserts the chat document with its two participants, then appends the
    /// stamped message. Fire-and-forget from the consumer's point of view:
    /// the listener round trip through the live query is the only freshness
    /// path, a sender never reads its own write directly.
    pub fn send_message(&self, chat_id: &ChatId, draft: MessageDraft) -> Result<(), SyncError> {
        let chat = Chat {
            id: chat_id.clone(),
            participants: [draft.author_id.clone(), draft.other_user_id.clone()],
        };
        self.store
            .set_document(&self.chat_doc_path(chat_id), chat.to_document())?;

        let mut doc = Document::new();
        doc.insert(AUTHOR_ID_FIELD, FieldValue::text(draft.author_id.as_str()));
        doc.insert(
            OTHER_USER_ID_FIELD,
            FieldValue::text(draft.other_user_id.as_str()),
        );
        doc.insert(TEXT_FIELD, FieldValue::text(draft.text));
        doc.insert(
            TIMESTAMP_FIELD,
            FieldValue::Timestamp(StoreTimestamp::now()),
        );
        self.store.add_document(&self.messages_path(chat_id), doc)?;

        tracing::debug!(code = MESSAGE_APPENDED, chat = %chat_id, "message appended");
        Ok(())
    }

    /// Users-collection snapshot handler: rebuilds the mirror wholesale,
    /// settles provisioning state, then notifies global listeners with the
    /// borrow released.
    fn apply_users_snapshot(state: &Weak<RefCell<EngineState>>, docs: &[DocumentSnapshot]) {
        let Some(state) = state.upgrade() else {
            return;
        };

        let callbacks = {
            let mut state = state.borrow_mut();
            let mut users = Vec::with_capacity(docs.len());
            for doc in docs {
                match UserId::new(doc.id.clone()) {
                    Ok(id) => users.push(User::from_document(id, &doc.data)),
                    Err(error) => tracing::warn!(
                        code = USER_DOC_INVALID,
                        id = %doc.id,
                        error = %error,
                        "skipping user document with invalid key"
                    ),
                }
            }
            state.mirror.replace(users);

            let EngineState {
                mirror,
                provisioning,
                ..
            } = &mut *state;
            provisioning.retain(|auth_id| mirror.user_for_auth(auth_id).is_none());

            tracing::debug!(
                code = USERS_SNAPSHOT_APPLIED,
                users = state.mirror.users().len(),
                "mirror replaced"
            );
            state.users.callbacks()
        };

        for callback in callbacks {
            (callback.borrow_mut())();
        }
    }

    /// Chat live-query snapshot handler: materializes the ordered message
    /// list (authors resolved against the mirror, timestamps converted),
    /// caches it for late listeners, then notifies the chat's listeners.
    fn apply_chat_snapshot(
        state: &Weak<RefCell<EngineState>>,
        chat_id: &ChatId,
        docs: &[DocumentSnapshot],
    ) {
        let Some(state) = state.upgrade() else {
            return;
        };

        let (callbacks, messages) = {
            let mut state = state.borrow_mut();
            let mut messages = Vec::with_capacity(docs.len());
            for doc in docs {
                match Message::from_document(MessageId::new(doc.id.clone()), &doc.data) {
                    Ok(mut message) => {
                        message.author = state.mirror.user_by_id(&message.author_id).cloned();
                        messages.push(message);
                    }
                    Err(error) => tracing::warn!(
                        code = MESSAGE_DOC_INVALID,
                        chat = %chat_id,
                        id = %doc.id,
                        error = %error,
                        "skipping malformed message document"
                    ),
                }
            }

            let Some(query) = state.chats.query_mut(chat_id) else {
                // Query torn down while this delivery was in flight.
                return;
            };
            query.last_messages = messages.clone();

            tracing::debug!(
                code = CHAT_SNAPSHOT_APPLIED,
                chat = %chat_id,
                messages = messages.len(),
                "chat snapshot materialized"
            );
            (state.chats.callbacks_for(chat_id), messages)
        };

        for callback in callbacks {
            (callback.borrow_mut())(&messages);
        }
    }
}
