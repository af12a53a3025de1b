use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::Value;

use crate::log::{NoopLogSink, log_sink::LogSink};
use crate::signaling::{
    document::{ChangeKind, DocChange, Document, Fields, Snapshot, StoreNotification},
    paths::{CollectionPath, DocPath},
    query::{Query, Watch},
    store::{SignalingStore, SubscriptionId, is_server_timestamp},
    store_error::StoreError,
};
use crate::utils::now_millis;
use crate::{sink_debug, sink_trace};

const AUTO_ID_LEN: usize = 20;

struct Subscriber {
    watch: Watch,
    tx: Sender<StoreNotification>,
    last: Vec<Document>,
}

struct Inner {
    docs: BTreeMap<DocPath, Document>,
    subs: HashMap<SubscriptionId, Subscriber>,
    next_sub: SubscriptionId,
    last_ts: u64,
    available: bool,
}

/// In-process signaling store. Share it between peers with an `Arc`.
///
/// Every committed write re-evaluates each watch and sends a snapshot to the
/// subscribers whose result changed. Subscribers whose receiver is gone are
/// dropped on the next delivery.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    log: Arc<dyn LogSink>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_log(Arc::new(NoopLogSink))
    }

    pub fn with_log(log: Arc<dyn LogSink>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                docs: BTreeMap::new(),
                subs: HashMap::new(),
                next_sub: 1,
                last_ts: 0,
                available: true,
            }),
            log,
        }
    }

    /// While unavailable, every read and write fails with
    /// [`StoreError::Unavailable`]. Subscriptions stay registered.
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// Number of documents currently stored, across all collections.
    pub fn len(&self) -> usize {
        self.lock().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of documents directly inside `collection`.
    pub fn count(&self, collection: &CollectionPath) -> usize {
        self.lock()
            .docs
            .keys()
            .filter(|p| &p.parent() == collection)
            .count()
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().subs.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Inner {
    fn ensure_available(&self, op: &str) -> Result<(), StoreError> {
        if self.available {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!("{op} rejected while offline")))
        }
    }

    /// Commit timestamps are strictly increasing within one store.
    fn next_timestamp(&mut self) -> u64 {
        let now = u64::try_from(now_millis()).unwrap_or(u64::MAX);
        self.last_ts = now.max(self.last_ts + 1);
        self.last_ts
    }

    fn resolve_sentinels(&mut self, fields: &mut Fields) {
        let needs_ts: Vec<String> = fields
            .iter()
            .filter(|(_, v)| is_server_timestamp(v))
            .map(|(k, _)| k.clone())
            .collect();
        for key in needs_ts {
            let ts = self.next_timestamp();
            fields.insert(key, Value::from(ts));
        }
    }

    fn notify(&mut self, log: &Arc<dyn LogSink>) {
        let mut dead = Vec::new();
        for (id, sub) in self.subs.iter_mut() {
            let current = sub.watch.evaluate(self.docs.values());
            let changes = diff(&sub.last, &current);
            if changes.is_empty() {
                continue;
            }
            sub.last = current.clone();
            let note = StoreNotification {
                subscription: *id,
                snapshot: Snapshot {
                    docs: current,
                    changes,
                },
            };
            if sub.tx.send(note).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            sink_debug!(log, "dropping subscription {} with closed receiver", id);
            self.subs.remove(&id);
        }
    }
}

fn diff(before: &[Document], after: &[Document]) -> Vec<DocChange> {
    let mut changes = Vec::new();
    for doc in after {
        match before.iter().find(|d| d.path == doc.path) {
            None => changes.push(DocChange {
                kind: ChangeKind::Added,
                doc: doc.clone(),
            }),
            Some(old) if old.fields != doc.fields => changes.push(DocChange {
                kind: ChangeKind::Modified,
                doc: doc.clone(),
            }),
            Some(_) => {}
        }
    }
    for old in before {
        if !after.iter().any(|d| d.path == old.path) {
            changes.push(DocChange {
                kind: ChangeKind::Removed,
                doc: old.clone(),
            });
        }
    }
    changes
}

fn auto_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(AUTO_ID_LEN)
        .map(char::from)
        .collect()
}

impl SignalingStore for MemoryStore {
    fn create(&self, collection: &CollectionPath, mut fields: Fields) -> Result<DocPath, StoreError> {
        let mut inner = self.lock();
        inner.ensure_available("create")?;

        let mut path = collection.doc(&auto_id());
        while inner.docs.contains_key(&path) {
            path = collection.doc(&auto_id());
        }
        inner.resolve_sentinels(&mut fields);
        inner
            .docs
            .insert(path.clone(), Document::new(path.clone(), fields));
        sink_trace!(self.log, "created {}", path);

        inner.notify(&self.log);
        Ok(path)
    }

    fn update(&self, path: &DocPath, mut fields: Fields) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.ensure_available("update")?;
        if !inner.docs.contains_key(path) {
            return Err(StoreError::NotFound(path.to_string()));
        }
        inner.resolve_sentinels(&mut fields);
        if let Some(doc) = inner.docs.get_mut(path) {
            for (k, v) in fields {
                doc.fields.insert(k, v);
            }
        }
        sink_trace!(self.log, "updated {}", path);

        inner.notify(&self.log);
        Ok(())
    }

    fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.ensure_available("delete")?;
        if inner.docs.remove(path).is_some() {
            sink_trace!(self.log, "deleted {}", path);
            inner.notify(&self.log);
        }
        Ok(())
    }

    fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let inner = self.lock();
        inner.ensure_available("get")?;
        Ok(inner.docs.get(path).cloned())
    }

    fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let inner = self.lock();
        inner.ensure_available("query")?;
        Ok(query.apply(inner.docs.values()))
    }

    fn subscribe(
        &self,
        watch: Watch,
        tx: Sender<StoreNotification>,
    ) -> Result<SubscriptionId, StoreError> {
        let mut inner = self.lock();
        inner.ensure_available("subscribe")?;

        let id = inner.next_sub;
        inner.next_sub += 1;

        let current = watch.evaluate(inner.docs.values());
        let initial = StoreNotification {
            subscription: id,
            snapshot: Snapshot {
                docs: current.clone(),
                changes: diff(&[], &current),
            },
        };
        // The receiver may already be gone; the next notify() drops it.
        let _ = tx.send(initial);

        inner.subs.insert(
            id,
            Subscriber {
                watch,
                tx,
                last: current,
            },
        );
        sink_debug!(self.log, "subscription {} registered", id);
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if self.lock().subs.remove(&id).is_some() {
            sink_debug!(self.log, "subscription {} removed", id);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::signaling::{paths::calls_collection, query::Direction, store::server_timestamp};
    use serde_json::json;
    use std::sync::mpsc::{self, Receiver};

    fn fields(pairs: &[(&str, Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    fn drain(rx: &Receiver<StoreNotification>) -> Vec<StoreNotification> {
        rx.try_iter().collect()
    }

    #[test]
    fn create_assigns_id_and_server_timestamp() {
        let store = MemoryStore::new();
        let calls = calls_collection("s1");
        let path = store
            .create(
                &calls,
                fields(&[("status", json!("ringing")), ("createdAt", server_timestamp())]),
            )
            .unwrap();

        assert_eq!(path.id().len(), AUTO_ID_LEN);
        assert_eq!(path.parent(), calls);
        let doc = store.get(&path).unwrap().unwrap();
        assert!(doc.get("createdAt").unwrap().is_u64());
    }

    #[test]
    fn timestamps_are_strictly_increasing() {
        let store = MemoryStore::new();
        let calls = calls_collection("s1");
        let a = store
            .create(&calls, fields(&[("createdAt", server_timestamp())]))
            .unwrap();
        let b = store
            .create(&calls, fields(&[("createdAt", server_timestamp())]))
            .unwrap();
        let ts = |p: &DocPath| store.get(p).unwrap().unwrap().get("createdAt").unwrap().as_u64();
        assert!(ts(&a) < ts(&b));
    }

    #[test]
    fn update_merges_and_missing_doc_is_not_found() {
        let store = MemoryStore::new();
        let calls = calls_collection("s1");
        let path = store
            .create(&calls, fields(&[("status", json!("ringing"))]))
            .unwrap();
        store
            .update(&path, fields(&[("responderId", json!("u-counsellor"))]))
            .unwrap();

        let doc = store.get(&path).unwrap().unwrap();
        assert_eq!(doc.get("status"), Some(&json!("ringing")));
        assert_eq!(doc.get("responderId"), Some(&json!("u-counsellor")));

        let missing = calls.doc("nope");
        assert_eq!(
            store.update(&missing, Fields::new()),
            Err(StoreError::NotFound(missing.to_string()))
        );
    }

    #[test]
    fn delete_is_idempotent_and_leaves_subcollections() {
        let store = MemoryStore::new();
        let calls = calls_collection("s1");
        let call = store.create(&calls, Fields::new()).unwrap();
        let cand = store
            .create(&call.collection("offerCandidates"), Fields::new())
            .unwrap();

        store.delete(&call).unwrap();
        store.delete(&call).unwrap();
        assert!(store.get(&call).unwrap().is_none());
        assert!(store.get(&cand).unwrap().is_some());
    }

    #[test]
    fn query_subscription_reports_added_modified_removed() {
        let store = MemoryStore::new();
        let calls = calls_collection("s1");
        let (tx, rx) = mpsc::channel();
        let query = Query::new(calls.clone())
            .where_in("status", vec![json!("ringing"), json!("connected")])
            .order_by("createdAt", Direction::Asc)
            .limit(1);
        let sub = store.subscribe(Watch::Query(query), tx).unwrap();

        let initial = drain(&rx);
        assert_eq!(initial.len(), 1);
        assert!(initial[0].snapshot.is_empty());
        assert_eq!(initial[0].subscription, sub);

        let path = store
            .create(
                &calls,
                fields(&[("status", json!("ringing")), ("createdAt", server_timestamp())]),
            )
            .unwrap();
        let notes = drain(&rx);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].snapshot.changes[0].kind, ChangeKind::Added);

        store
            .update(&path, fields(&[("status", json!("connected"))]))
            .unwrap();
        let notes = drain(&rx);
        assert_eq!(notes[0].snapshot.changes[0].kind, ChangeKind::Modified);

        store
            .update(&path, fields(&[("status", json!("ended"))]))
            .unwrap();
        let notes = drain(&rx);
        assert!(notes[0].snapshot.is_empty());
        assert_eq!(notes[0].snapshot.changes[0].kind, ChangeKind::Removed);
    }

    #[test]
    fn unrelated_writes_do_not_notify() {
        let store = MemoryStore::new();
        let (tx, rx) = mpsc::channel();
        store
            .subscribe(Watch::Query(Query::new(calls_collection("s1"))), tx)
            .unwrap();
        drain(&rx);

        store.create(&calls_collection("s2"), Fields::new()).unwrap();
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn unsubscribe_and_dropped_receivers_stop_delivery() {
        let store = MemoryStore::new();
        let calls = calls_collection("s1");
        let (tx, rx) = mpsc::channel();
        let sub = store
            .subscribe(Watch::Query(Query::new(calls.clone())), tx)
            .unwrap();
        store.unsubscribe(sub);
        drain(&rx);
        store.create(&calls, Fields::new()).unwrap();
        assert!(drain(&rx).is_empty());

        let (tx2, rx2) = mpsc::channel();
        store
            .subscribe(Watch::Query(Query::new(calls.clone())), tx2)
            .unwrap();
        drop(rx2);
        store.create(&calls, Fields::new()).unwrap();
        assert_eq!(store.subscription_count(), 0);
    }

    #[test]
    fn offline_store_rejects_writes() {
        let store = MemoryStore::new();
        store.set_available(false);
        let err = store
            .create(&calls_collection("s1"), Fields::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        store.set_available(true);
        assert!(store.create(&calls_collection("s1"), Fields::new()).is_ok());
    }
}
