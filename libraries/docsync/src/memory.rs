//! An in-process [`DocumentStore`]. Several sessions can share one `MemoryStore` (it is a cheap
//! handle) to play the part of several browser tabs writing the same document.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use chrono::{DateTime, Utc};
use slotmap::SlotMap;

use crate::{
    ListenerKey,
    store::{DocumentStore, Snapshot, StoreError, Subscription},
    value::{BackendTimestamp, Fields, Value},
};

type SnapshotCallback = Rc<dyn Fn(Option<&Snapshot>)>;

struct Listener {
    key: String,
    callback: SnapshotCallback,
}

/// How many requests of each kind the store has served.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestCounts {
    pub gets: usize,
    pub creates: usize,
    pub merge_writes: usize,
    pub subscribes: usize,
}

impl RequestCounts {
    pub fn total(&self) -> usize {
        self.gets + self.creates + self.merge_writes + self.subscribes
    }
}

#[derive(Default)]
struct Inner {
    documents: HashMap<String, Fields>,
    listeners: SlotMap<ListenerKey, Listener>,
    requests: RequestCounts,
    fail_reads: bool,
    fail_writes: bool,
    clock: Option<DateTime<Utc>>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored fields, without normalization.
    pub fn document(&self, key: &str) -> Option<Fields> {
        self.inner.borrow().documents.get(key).cloned()
    }

    /// Writes fields as another writer would (no request is counted) and notifies subscribers.
    pub fn put_document(&self, key: &str, fields: Fields) {
        {
            let mut inner = self.inner.borrow_mut();
            let fields = inner.resolve_server_timestamps(fields);
            let document = inner.documents.entry(key.to_string()).or_default();
            document.extend(fields);
        }
        self.notify(key);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.borrow_mut().fail_reads = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_writes = fail;
    }

    /// Pins the clock used to resolve [`Value::ServerTimestamp`].
    pub fn set_clock(&self, now: DateTime<Utc>) {
        self.inner.borrow_mut().clock = Some(now);
    }

    pub fn requests(&self) -> RequestCounts {
        self.inner.borrow().requests
    }

    pub fn active_subscriptions(&self, key: &str) -> usize {
        self.inner
            .borrow()
            .listeners
            .values()
            .filter(|listener| listener.key == key)
            .count()
    }

    fn notify(&self, key: &str) {
        // collect first so that no borrow is held while the callbacks run
        let (snapshot, callbacks) = {
            let inner = self.inner.borrow();
            let snapshot = inner.snapshot(key);
            let callbacks: Vec<SnapshotCallback> = inner
                .listeners
                .values()
                .filter(|listener| listener.key == key)
                .map(|listener| Rc::clone(&listener.callback))
                .collect();
            (snapshot, callbacks)
        };
        for callback in callbacks {
            callback(snapshot.as_ref());
        }
    }
}

impl Inner {
    fn snapshot(&self, key: &str) -> Option<Snapshot> {
        self.documents.get(key).map(|fields| Snapshot {
            key: key.to_string(),
            fields: fields.clone(),
        })
    }

    fn resolve_server_timestamps(&self, fields: Fields) -> Fields {
        let now = BackendTimestamp::from_datetime(self.clock.unwrap_or_else(Utc::now));
        fields
            .into_iter()
            .map(|(key, value)| (key, resolve(value, now)))
            .collect()
    }
}

fn resolve(value: Value, now: BackendTimestamp) -> Value {
    match value {
        Value::ServerTimestamp => Value::Timestamp(now),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| resolve(v, now)).collect()),
        Value::Map(fields) => Value::Map(
            fields
                .into_iter()
                .map(|(key, value)| (key, resolve(value, now)))
                .collect(),
        ),
        other => other,
    }
}

impl DocumentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Snapshot>, StoreError> {
        let mut inner = self.inner.borrow_mut();
        inner.requests.gets += 1;
        if inner.fail_reads {
            return Err(StoreError::Unavailable("reads are failing".to_string()));
        }
        Ok(inner.snapshot(key))
    }

    async fn create(&self, key: &str, fields: Fields) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.borrow_mut();
            inner.requests.creates += 1;
            if inner.fail_writes {
                return Err(StoreError::Unavailable("writes are failing".to_string()));
            }
            if inner.documents.contains_key(key) {
                log::info!("Document {key} already exists, leaving it untouched");
                return Ok(());
            }
            let fields = inner.resolve_server_timestamps(fields);
            inner.documents.insert(key.to_string(), fields);
        }
        self.notify(key);
        Ok(())
    }

    async fn merge_write(&self, key: &str, fields: Fields) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.borrow_mut();
            inner.requests.merge_writes += 1;
            if inner.fail_writes {
                return Err(StoreError::Unavailable("writes are failing".to_string()));
            }
            let fields = inner.resolve_server_timestamps(fields);
            inner
                .documents
                .entry(key.to_string())
                .or_default()
                .extend(fields);
        }
        self.notify(key);
        Ok(())
    }

    fn subscribe(
        &self,
        key: &str,
        on_change: impl Fn(Option<&Snapshot>) + 'static,
    ) -> Subscription {
        let callback: SnapshotCallback = Rc::new(on_change);
        let (listener_key, initial) = {
            let mut inner = self.inner.borrow_mut();
            inner.requests.subscribes += 1;
            let listener_key = inner.listeners.insert(Listener {
                key: key.to_string(),
                callback: Rc::clone(&callback),
            });
            (listener_key, inner.snapshot(key))
        };

        callback(initial.as_ref());

        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().listeners.remove(listener_key);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::cell::Cell;

    fn fields(entries: &[(&str, Value)]) -> Fields {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn merge_write_keeps_untouched_fields() {
        let store = MemoryStore::new();
        block_on(store.create(
            "u",
            fields(&[("a", Value::Integer(1)), ("b", Value::Integer(2))]),
        ))
        .unwrap();
        block_on(store.merge_write("u", fields(&[("b", Value::Integer(3))]))).unwrap();

        let document = store.document("u").unwrap();
        assert_eq!(document["a"], Value::Integer(1));
        assert_eq!(document["b"], Value::Integer(3));
    }

    #[test]
    fn create_does_not_overwrite() {
        let store = MemoryStore::new();
        block_on(store.create("u", fields(&[("a", Value::Integer(1))]))).unwrap();
        block_on(store.create("u", fields(&[("a", Value::Integer(9))]))).unwrap();
        assert_eq!(store.document("u").unwrap()["a"], Value::Integer(1));
        assert_eq!(store.requests().creates, 2);
    }

    #[test]
    fn server_timestamps_resolve_to_the_store_clock() {
        let store = MemoryStore::new();
        let now = DateTime::from_timestamp(1_000, 0).unwrap();
        store.set_clock(now);
        block_on(store.create("u", fields(&[("at", Value::ServerTimestamp)]))).unwrap();
        assert_eq!(
            store.document("u").unwrap()["at"],
            Value::Timestamp(BackendTimestamp::from_datetime(now))
        );
    }

    #[test]
    fn subscribers_get_initial_state_then_changes() {
        let store = MemoryStore::new();
        let seen = Rc::new(Cell::new(0));
        let existed = Rc::new(Cell::new(false));

        let subscription = {
            let seen = Rc::clone(&seen);
            let existed = Rc::clone(&existed);
            store.subscribe("u", move |snapshot| {
                seen.set(seen.get() + 1);
                existed.set(snapshot.is_some());
            })
        };
        assert_eq!(seen.get(), 1);
        assert!(!existed.get());

        store.put_document("u", fields(&[("a", Value::Bool(true))]));
        assert_eq!(seen.get(), 2);
        assert!(existed.get());
        assert_eq!(store.active_subscriptions("u"), 1);

        drop(subscription);
        assert_eq!(store.active_subscriptions("u"), 0);
        store.put_document("u", fields(&[("a", Value::Bool(false))]));
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn injected_failures() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(block_on(store.merge_write("u", Fields::new())).is_err());
        store.set_fail_reads(true);
        assert!(block_on(store.get("u")).is_err());
        assert_eq!(store.requests().total(), 2);
    }
}
