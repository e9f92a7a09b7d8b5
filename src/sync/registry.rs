use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::domain::chat::ChatId;
use crate::domain::message::Message;
use crate::store::SubscriptionToken;

/// Token identifying one registered listener. Allocated from a per-registry
/// monotonic counter, never from wall-clock time, so rapid successive
/// registrations can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Global-scope callback: carries no payload, consumers re-read through the
/// accessors (push-to-pull handoff).
pub type UserCallback = Rc<RefCell<dyn FnMut()>>;

/// Chat-scope callback: receives the fully materialized ordered message list.
pub type ChatCallback = Rc<RefCell<dyn FnMut(&[Message])>>;

/// Listeners for the global user-directory scope, plus the handle of the one
/// users-collection subscription backing them.
#[derive(Default)]
pub struct UserRegistry {
    next_id: u64,
    listeners: Vec<(ListenerId, UserCallback)>,
    subscription: Option<SubscriptionToken>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, callback: UserCallback) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push((id, callback));
        id
    }

    /// Returns false when no listener with `id` exists; the caller turns
    /// that into an explicit error rather than a silent no-op.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn callbacks(&self) -> Vec<UserCallback> {
        self.listeners
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect()
    }

    pub fn subscription(&self) -> Option<SubscriptionToken> {
        self.subscription
    }

    pub fn set_subscription(&mut self, token: SubscriptionToken) {
        self.subscription = Some(token);
    }

    /// Drops every listener and yields the backing subscription for release.
    pub fn clear(&mut self) -> Option<SubscriptionToken> {
        self.listeners.clear();
        self.subscription.take()
    }
}

/// Per-chat live-query bookkeeping: the remote handle plus the last
/// materialized list, cached so a listener added to an already-watched chat
/// still gets its synchronous initial callback.
#[derive(Default)]
pub struct ChatQuery {
    pub token: Option<SubscriptionToken>,
    pub last_messages: Vec<Message>,
}

struct ChatListener {
    id: ListenerId,
    chat_id: ChatId,
    callback: ChatCallback,
}

/// Listeners for chat scopes. One live query per watched chat, reference
/// counted by listener count: the query is opened with the first listener and
/// torn down with the last.
#[derive(Default)]
pub struct ChatRegistry {
    next_id: u64,
    listeners: Vec<ChatListener>,
    queries: BTreeMap<ChatId, ChatQuery>,
}

impl ChatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, chat_id: ChatId, callback: ChatCallback) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push(ChatListener {
            id,
            chat_id,
            callback,
        });
        id
    }

    /// Removes the listener and reports which chat it was watching, or `None`
    /// for an unknown id.
    pub fn remove(&mut self, id: ListenerId) -> Option<ChatId> {
        let index = self
            .listeners
            .iter()
            .position(|listener| listener.id == id)?;
        Some(self.listeners.remove(index).chat_id)
    }

    pub fn listener_count(&self, chat_id: &ChatId) -> usize {
        self.listeners
            .iter()
            .filter(|listener| &listener.chat_id == chat_id)
            .count()
    }

    pub fn callbacks_for(&self, chat_id: &ChatId) -> Vec<ChatCallback> {
        self.listeners
            .iter()
            .filter(|listener| &listener.chat_id == chat_id)
            .map(|listener| listener.callback.clone())
            .collect()
    }

    pub fn is_watched(&self, chat_id: &ChatId) -> bool {
        self.queries.contains_key(chat_id)
    }

    pub fn open_query(&mut self, chat_id: ChatId) -> &mut ChatQuery {
        self.queries.entry(chat_id).or_default()
    }

    pub fn query_mut(&mut self, chat_id: &ChatId) -> Option<&mut ChatQuery> {
        self.queries.get_mut(chat_id)
    }

    pub fn cached_messages(&self, chat_id: &ChatId) -> Option<&[Message]> {
        self.queries
            .get(chat_id)
            .map(|query| query.last_messages.as_slice())
    }

    pub fn close_query(&mut self, chat_id: &ChatId) -> Option<SubscriptionToken> {
        self.queries.remove(chat_id).and_then(|query| query.token)
    }

    /// Drops every listener and query, yielding all live-query handles for
    /// release. Used at logout so no remote subscription leaks across
    /// account switches.
    pub fn clear(&mut self) -> Vec<SubscriptionToken> {
        self.listeners.clear();
        let queries = std::mem::take(&mut self.queries);
        queries
            .into_values()
            .filter_map(|query| query.token)
            .collect()
    }
}
