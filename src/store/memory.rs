//! Deterministic in-process [`RemoteStore`] used by tests and examples.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::store::document::Document;
use crate::store::{
    DocumentSnapshot, OrderDirection, RemoteStore, SnapshotHandler, StoreError, SubscriptionToken,
};

const REDELIVERY_QUEUED_HANDLER_BUSY: &str = "MEMORY_STORE_REDELIVERY_QUEUED";

struct Subscription {
    token: SubscriptionToken,
    collection: String,
    order: Option<(String, OrderDirection)>,
    handler: SnapshotHandler,
}

#[derive(Default)]
struct StoreState {
    collections: BTreeMap<String, BTreeMap<String, Document>>,
    subscriptions: Vec<Subscription>,
    next_token: u64,
    next_doc_id: u64,
    offline: bool,
    /// Collections whose delivery hit a busy handler (a write issued from
    /// inside that handler's own notification); drained by the outermost
    /// delivery once the stack unwinds.
    pending_redelivery: BTreeSet<String>,
    delivery_depth: u32,
}

/// In-memory document store with live-query semantics: every subscription
/// receives the full current snapshot at subscribe time and after each change
/// to its collection. Ids are deterministic (`doc000001`, ...). Single
/// threaded, like the core it backs.
#[derive(Default)]
pub struct InMemoryStore {
    state: RefCell<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent store call fail with
    /// [`StoreError::Unavailable`] until switched back, so callers can
    /// exercise their remote-failure paths.
    pub fn set_offline(&self, offline: bool) {
        self.state.borrow_mut().offline = offline;
    }

    /// Number of documents currently held at a collection path.
    pub fn collection_size(&self, path: &str) -> usize {
        self.state
            .borrow()
            .collections
            .get(path)
            .map_or(0, BTreeMap::len)
    }

    fn check_online(state: &StoreState) -> Result<(), StoreError> {
        if state.offline {
            return Err(StoreError::Unavailable {
                reason: "offline switch enabled".to_owned(),
            });
        }
        Ok(())
    }

    fn split_document_path(path: &str) -> Result<(&str, &str), StoreError> {
        path.rsplit_once('/').ok_or_else(|| StoreError::NotFound {
            path: path.to_owned(),
        })
    }

    fn snapshot_of(
        state: &StoreState,
        collection: &str,
        order: Option<&(String, OrderDirection)>,
    ) -> Vec<DocumentSnapshot> {
        let mut docs: Vec<DocumentSnapshot> = state
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| DocumentSnapshot {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, direction)) = order {
            docs.sort_by(|a, b| {
                let ordering = match (a.data.get(field), b.data.get(field)) {
                    (Some(left), Some(right)) => left.compare(right),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                };
                match direction {
                    OrderDirection::Ascending => ordering,
                    OrderDirection::Descending => ordering.reverse(),
                }
            });
        }
        docs
    }

    /// Redelivers to every subscription watching `collection`. The state
    /// borrow is released before handlers run, so a handler may call back
    /// into the store. A write issued from inside a handler's own
    /// notification finds that handler busy; such collections are queued and
    /// redelivered (with the latest snapshot) by the outermost delivery
    /// after the stack unwinds, so no scope ever misses a change.
    fn deliver(&self, collection: &str) {
        self.state.borrow_mut().delivery_depth += 1;
        self.deliver_once(collection);

        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                if state.delivery_depth > 1 {
                    None
                } else {
                    state.pending_redelivery.pop_first()
                }
            };
            let Some(collection) = next else {
                break;
            };
            self.deliver_once(&collection);
        }

        self.state.borrow_mut().delivery_depth -= 1;
    }

    fn deliver_once(&self, collection: &str) {
        let pending: Vec<(SnapshotHandler, Vec<DocumentSnapshot>)> = {
            let state = self.state.borrow();
            state
                .subscriptions
                .iter()
                .filter(|sub| sub.collection == collection)
                .map(|sub| {
                    (
                        sub.handler.clone(),
                        Self::snapshot_of(&state, collection, sub.order.as_ref()),
                    )
                })
                .collect()
        };

        for (handler, snapshot) in pending {
            match handler.try_borrow_mut() {
                Ok(mut handler) => (handler)(&snapshot),
                Err(_) => {
                    self.state
                        .borrow_mut()
                        .pending_redelivery
                        .insert(collection.to_owned());
                    tracing::debug!(
                        code = REDELIVERY_QUEUED_HANDLER_BUSY,
                        collection,
                        "snapshot handler busy during delivery; redelivery queued"
                    );
                }
            }
        }
    }

    fn register(
        &self,
        collection: &str,
        order: Option<(String, OrderDirection)>,
        handler: SnapshotHandler,
    ) -> Result<SubscriptionToken, StoreError> {
        let (token, initial) = {
            let mut state = self.state.borrow_mut();
            Self::check_online(&state)?;
            state.next_token += 1;
            let token = SubscriptionToken::new(state.next_token);
            let initial = Self::snapshot_of(&state, collection, order.as_ref());
            state.subscriptions.push(Subscription {
                token,
                collection: collection.to_owned(),
                order,
                handler: handler.clone(),
            });
            (token, initial)
        };

        // Initial synchronous delivery, part of the subscription contract.
        (handler.borrow_mut())(&initial);
        Ok(token)
    }
}

impl RemoteStore for InMemoryStore {
    fn subscribe_collection(
        &self,
        path: &str,
        handler: SnapshotHandler,
    ) -> Result<SubscriptionToken, StoreError> {
        self.register(path, None, handler)
    }

    fn subscribe_query(
        &self,
        path: &str,
        order_field: &str,
        direction: OrderDirection,
        handler: SnapshotHandler,
    ) -> Result<SubscriptionToken, StoreError> {
        self.register(path, Some((order_field.to_owned(), direction)), handler)
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        self.state
            .borrow_mut()
            .subscriptions
            .retain(|sub| sub.token != token);
    }

    fn get_document(&self, path: &str) -> Result<Option<Document>, StoreError> {
        let state = self.state.borrow();
        Self::check_online(&state)?;
        let (collection, id) = Self::split_document_path(path)?;
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    fn set_document(&self, path: &str, data: Document) -> Result<(), StoreError> {
        let collection = {
            let mut state = self.state.borrow_mut();
            Self::check_online(&state)?;
            let (collection, id) = Self::split_document_path(path)?;
            let collection = collection.to_owned();
            state
                .collections
                .entry(collection.clone())
                .or_default()
                .insert(id.to_owned(), data);
            collection
        };
        self.deliver(&collection);
        Ok(())
    }

    fn add_document(&self, collection_path: &str, data: Document) -> Result<String, StoreError> {
        let id = {
            let mut state = self.state.borrow_mut();
            Self::check_online(&state)?;
            state.next_doc_id += 1;
            let id = format!("doc{:06}", state.next_doc_id);
            state
                .collections
                .entry(collection_path.to_owned())
                .or_default()
                .insert(id.clone(), data);
            id
        };
        self.deliver(collection_path);
        Ok(id)
    }

    fn update_document(&self, path: &str, data: Document) -> Result<(), StoreError> {
        let collection = {
            let mut state = self.state.borrow_mut();
            Self::check_online(&state)?;
            let (collection, id) = Self::split_document_path(path)?;
            let existing = state
                .collections
                .get_mut(collection)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| StoreError::NotFound {
                    path: path.to_owned(),
                })?;
            existing.merge(data);
            collection.to_owned()
        };
        self.deliver(&collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::store::document::{FieldValue, StoreTimestamp};

    fn capture_handler() -> (SnapshotHandler, Rc<RefCell<Vec<Vec<String>>>>) {
        let deliveries: Rc<RefCell<Vec<Vec<String>>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = deliveries.clone();
        let handler: SnapshotHandler = Rc::new(RefCell::new(move |docs: &[DocumentSnapshot]| {
            sink.borrow_mut()
                .push(docs.iter().map(|doc| doc.id.clone()).collect());
        }));
        (handler, deliveries)
    }

    #[test]
    fn subscribe_delivers_initial_snapshot_synchronously() {
        let store = InMemoryStore::new();
        store
            .set_document("users/u1", Document::new())
            .expect("seed write must succeed");

        let (handler, deliveries) = capture_handler();
        store
            .subscribe_collection("users", handler)
            .expect("subscribe must succeed");

        assert_eq!(deliveries.borrow().as_slice(), &[vec!["u1".to_owned()]]);
    }

    #[test]
    fn writes_redeliver_to_matching_subscriptions_only() {
        let store = InMemoryStore::new();
        let (users_handler, users_deliveries) = capture_handler();
        let (chats_handler, chats_deliveries) = capture_handler();
        store
            .subscribe_collection("users", users_handler)
            .expect("subscribe must succeed");
        store
            .subscribe_collection("chats", chats_handler)
            .expect("subscribe must succeed");

        store
            .set_document("users/u1", Document::new())
            .expect("write must succeed");

        assert_eq!(users_deliveries.borrow().len(), 2); // initial + change
        assert_eq!(chats_deliveries.borrow().len(), 1); // initial only
    }

    #[test]
    fn unsubscribe_stops_redelivery() {
        let store = InMemoryStore::new();
        let (handler, deliveries) = capture_handler();
        let token = store
            .subscribe_collection("users", handler)
            .expect("subscribe must succeed");

        store.unsubscribe(token);
        store
            .set_document("users/u1", Document::new())
            .expect("write must succeed");

        assert_eq!(deliveries.borrow().len(), 1);
    }

    #[test]
    fn query_orders_by_field_descending() {
        let store = InMemoryStore::new();
        for (id, seconds) in [("a", 100), ("b", 300), ("c", 200)] {
            let mut doc = Document::new();
            doc.insert(
                "timestamp",
                FieldValue::Timestamp(StoreTimestamp::new(seconds, 0)),
            );
            store
                .set_document(&format!("chats/c1/messages/{id}"), doc)
                .expect("write must succeed");
        }

        let (handler, deliveries) = capture_handler();
        store
            .subscribe_query(
                "chats/c1/messages",
                "timestamp",
                OrderDirection::Descending,
                handler,
            )
            .expect("subscribe must succeed");

        assert_eq!(
            deliveries.borrow().as_slice(),
            &[vec!["b".to_owned(), "c".to_owned(), "a".to_owned()]]
        );
    }

    #[test]
    fn add_document_assigns_sequential_ids() {
        let store = InMemoryStore::new();

        let first = store
            .add_document("chats/c1/messages", Document::new())
            .expect("append must succeed");
        let second = store
            .add_document("chats/c1/messages", Document::new())
            .expect("append must succeed");

        assert_eq!(first, "doc000001");
        assert_eq!(second, "doc000002");
    }

    #[test]
    fn update_missing_document_reports_not_found() {
        let store = InMemoryStore::new();

        let err = store
            .update_document("users/ghost", Document::new())
            .expect_err("update of missing doc must fail");

        assert_eq!(
            err,
            StoreError::NotFound {
                path: "users/ghost".to_owned()
            }
        );
    }

    #[test]
    fn update_merges_into_existing_document() {
        let store = InMemoryStore::new();
        let mut doc = Document::new();
        doc.insert("displayName", FieldValue::text("Alice"));
        doc.insert("status", FieldValue::text("online"));
        store
            .set_document("users/u1", doc)
            .expect("seed write must succeed");

        let mut patch = Document::new();
        patch.insert("displayName", FieldValue::text("Alice L."));
        store
            .update_document("users/u1", patch)
            .expect("update must succeed");

        let stored = store
            .get_document("users/u1")
            .expect("read must succeed")
            .expect("document must exist");
        assert_eq!(stored.get_str("displayName"), Some("Alice L."));
        assert_eq!(stored.get_str("status"), Some("online"));
    }

    #[test]
    fn offline_switch_fails_reads_and_writes() {
        let store = InMemoryStore::new();
        store.set_offline(true);

        let err = store
            .set_document("users/u1", Document::new())
            .expect_err("offline write must fail");

        assert!(matches!(err, StoreError::Unavailable { .. }));
        assert!(store.get_document("users/u1").is_err());
    }

    #[test]
    fn write_from_inside_own_notification_is_redelivered() {
        let store = Rc::new(InMemoryStore::new());
        let echo_store = store.clone();
        let sizes: Rc<RefCell<Vec<usize>>> = Rc::new(RefCell::new(Vec::new()));
        let sizes_seen = sizes.clone();
        let handler: SnapshotHandler = Rc::new(RefCell::new(move |docs: &[DocumentSnapshot]| {
            sizes_seen.borrow_mut().push(docs.len());
            if docs.len() == 1 {
                // Writing to the watched collection while its own handler runs.
                echo_store
                    .add_document("room/messages", Document::new())
                    .expect("nested append must succeed");
            }
        }));
        store
            .subscribe_collection("room/messages", handler)
            .expect("subscribe must succeed");

        store
            .add_document("room/messages", Document::new())
            .expect("append must succeed");

        // Initial empty snapshot, the first append, then the queued
        // redelivery carrying the nested append.
        assert_eq!(*sizes.borrow(), vec![0, 1, 2]);
        assert_eq!(store.collection_size("room/messages"), 2);
    }

    #[test]
    fn handler_may_write_back_into_the_store() {
        let store = Rc::new(InMemoryStore::new());
        let echo_store = store.clone();
        let writes = Rc::new(RefCell::new(0u32));
        let writes_seen = writes.clone();
        let handler: SnapshotHandler = Rc::new(RefCell::new(move |docs: &[DocumentSnapshot]| {
            if docs.len() == 1 {
                *writes_seen.borrow_mut() += 1;
                echo_store
                    .set_document("audit/a1", Document::new())
                    .expect("nested write must succeed");
            }
        }));
        store
            .subscribe_collection("users", handler)
            .expect("subscribe must succeed");

        store
            .set_document("users/u1", Document::new())
            .expect("write must succeed");

        assert_eq!(*writes.borrow(), 1);
        assert_eq!(store.collection_size("audit"), 1);
    }
}
