//! # SyncSession
//! Owns the in-memory copy of one user's document and keeps it in line with the remote store.
//!
//! Lifecycle:
//! 1. [`SyncSession::set_identity`] is called whenever the signed-in user changes. The previous
//!    subscription is dropped and local state goes back to defaults.
//! 2. With a user present, the remote document is read and created if missing, then a
//!    subscription is opened. Every snapshot replaces local state wholesale. `loading` turns
//!    false on the first snapshot, not before.
//! 3. All mutations go through [`SyncSession::save`], which merge-writes the full merged document
//!    and optimistically adopts it. If the write fails, the session re-reads the remote document
//!    instead of retrying.
//!
//! Until the remote document has been decoded for the current identity (or after a read that
//! could not be decoded), local state is only defaults. Saves in that window write just the
//! patched fields, so the remote collections that were never loaded stay intact.
//!
//! There is no coordination between concurrent writers: the last write to land wins, for the
//! whole document. Remote failures are logged and never returned.

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use slotmap::SlotMap;

use crate::{
    ListenerKey,
    identity::Identity,
    ser::{self, EncodeError},
    store::{DocumentStore, Snapshot, StoreError, Subscription},
    value::{Fields, fields_to_json, normalize_fields},
};

/// A typed document the session can mirror.
pub trait SyncedDocument: Clone + Default + Serialize + DeserializeOwned + 'static {
    /// A partial update; fields that are present replace the current ones. Absent fields must
    /// not serialize.
    type Patch: Serialize;

    /// Fields of a freshly created remote document.
    fn initial_fields() -> Result<Fields, EncodeError>;

    /// Decodes normalized remote fields, filling defaults for anything absent.
    fn from_fields(fields: Fields) -> Result<Self, serde_json::Error> {
        serde_json::from_value(fields_to_json(fields))
    }

    fn to_fields(&self) -> Result<Fields, EncodeError> {
        ser::to_fields(self)
    }

    fn merge(self, patch: Self::Patch) -> Self;

    /// Records when the document was last written by this session.
    fn touch(&mut self, saved_at: DateTime<Utc>);
}

pub struct SyncSession<D: SyncedDocument, S: DocumentStore + 'static> {
    inner: Rc<Inner<D, S>>,
}

struct Inner<D, S> {
    store: S,
    identity: RefCell<Option<Identity>>,
    data: RefCell<D>,
    loading: Cell<bool>,
    // bumped on every identity change, so that late callbacks for an old identity are dropped
    generation: Cell<u64>,
    subscription: RefCell<Option<Subscription>>,
    listeners: RefCell<SlotMap<ListenerKey, Rc<dyn Fn()>>>,
    dirty: Cell<bool>,
    // local data was decoded from the remote document for the current identity
    in_sync: Cell<bool>,
}

impl<D: SyncedDocument, S: DocumentStore + 'static> SyncSession<D, S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Rc::new(Inner {
                store,
                identity: RefCell::new(None),
                data: RefCell::new(D::default()),
                loading: Cell::new(true),
                generation: Cell::new(0),
                subscription: RefCell::new(None),
                listeners: RefCell::new(SlotMap::with_key()),
                dirty: Cell::new(false),
                in_sync: Cell::new(false),
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn data(&self) -> D {
        self.inner.data.borrow().clone()
    }

    pub fn with_data<R>(&self, f: impl FnOnce(&D) -> R) -> R {
        f(&self.inner.data.borrow())
    }

    pub fn loading(&self) -> bool {
        self.inner.loading.get()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner.identity.borrow().clone()
    }

    pub fn has_subscription(&self) -> bool {
        self.inner.subscription.borrow().is_some()
    }

    /// Called after every change to local state. Callbacks may call back into the session.
    pub fn register_listener(&self, callback: impl Fn() + 'static) -> ListenerKey {
        self.inner.listeners.borrow_mut().insert(Rc::new(callback))
    }

    pub fn unregister_listener(&self, key: ListenerKey) {
        self.inner.listeners.borrow_mut().remove(key);
    }

    /// Switches the session to `identity` (or to nobody) and runs the initialization protocol.
    pub async fn set_identity(&self, identity: Option<Identity>) {
        let _flusher = FlushLater::new(&self.inner);
        let inner = &self.inner;

        let generation = inner.generation.get() + 1;
        inner.generation.set(generation);

        let previous = inner.subscription.borrow_mut().take();
        if previous.is_some() {
            log::info!("Closing subscription for previous identity");
        }
        drop(previous);

        inner.identity.replace(identity.clone());
        inner.set_data(D::default());
        inner.in_sync.set(false);

        let Some(identity) = identity else {
            inner.loading.set(false);
            return;
        };
        inner.loading.set(true);
        let key = identity.uid;
        log::info!("Initializing document for {key}");

        if let Err(e) = self.ensure_document(&key).await {
            log::error!("Error initializing data: {e}");
            if inner.generation.get() == generation {
                inner.loading.set(false);
            }
            return;
        }

        if inner.generation.get() != generation {
            log::info!("Identity changed during initialization of {key}, not subscribing");
            return;
        }

        let weak: Weak<Inner<D, S>> = Rc::downgrade(inner);
        let subscription = inner.store.subscribe(&key, move |snapshot| {
            if let Some(inner) = weak.upgrade() {
                inner.on_snapshot(generation, snapshot);
            }
        });
        // the snapshot callback above may already have fired; it only touches data and loading
        if inner.generation.get() == generation {
            inner.subscription.replace(Some(subscription));
        }
    }

    /// Merges `patch` into the current state, writes the result and adopts it locally.
    ///
    /// Does nothing without an identity. On a failed write the session re-reads the remote
    /// document, discarding the optimistic update.
    pub async fn save(&self, patch: D::Patch) {
        let Some(key) = self.key() else {
            log::debug!("Ignoring save without a signed-in user");
            return;
        };
        let _flusher = FlushLater::new(&self.inner);
        let generation = self.inner.generation.get();

        let in_sync = self.inner.in_sync.get();
        let (merged, fields) = match self.prepare_write(patch, in_sync) {
            Ok(prepared) => prepared,
            Err(e) => {
                log::error!("Error encoding data: {e}");
                return;
            }
        };

        match self.inner.store.merge_write(&key, fields).await {
            Ok(()) if !in_sync => self.refresh().await,
            Ok(()) => {
                if self.inner.generation.get() == generation {
                    self.inner.set_data(merged);
                }
            }
            Err(e) => {
                log::error!("Error saving data: {e}");
                self.refresh().await;
            }
        }
    }

    /// Reads the remote document once and replaces local state with it.
    pub async fn refresh(&self) {
        let Some(key) = self.key() else {
            return;
        };
        let _flusher = FlushLater::new(&self.inner);
        let generation = self.inner.generation.get();

        match self.inner.store.get(&key).await {
            Ok(Some(snapshot)) => {
                if self.inner.generation.get() == generation {
                    self.inner.apply_fields(snapshot.fields);
                }
            }
            Ok(None) => {
                log::info!("Document {key} missing on refresh, creating it");
                let created = match D::initial_fields() {
                    Ok(fields) => self.inner.store.create(&key, fields).await,
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = created {
                    log::error!("Error creating document: {e}");
                }
            }
            Err(e) => log::error!("Error refreshing data: {e}"),
        }
    }

    async fn ensure_document(&self, key: &str) -> Result<(), StoreError> {
        if self.inner.store.get(key).await?.is_none() {
            log::info!("Creating document {key}");
            self.inner.store.create(key, D::initial_fields()?).await?;
        }
        Ok(())
    }

    /// The merged document and the fields to write for it. Without a decoded remote document
    /// that is only what the patch and `touch` changed.
    fn prepare_write(&self, patch: D::Patch, in_sync: bool) -> Result<(D, Fields), EncodeError> {
        let patched = ser::to_fields(&patch)?;
        let mut merged = self.inner.data.borrow().clone().merge(patch);
        let untouched = merged.to_fields()?;
        merged.touch(Utc::now());
        let mut fields = merged.to_fields()?;

        if !in_sync {
            log::warn!("Remote document not loaded, writing only the changed fields");
            fields.retain(|name, value| {
                patched.contains_key(name) || untouched.get(name) != Some(&*value)
            });
        }
        Ok((merged, fields))
    }

    fn key(&self) -> Option<String> {
        self.inner
            .identity
            .borrow()
            .as_ref()
            .map(|identity| identity.uid.clone())
    }
}

impl<D: SyncedDocument, S> Inner<D, S> {
    fn set_data(&self, data: D) {
        self.data.replace(data);
        self.dirty.set(true);
    }

    fn apply_fields(&self, fields: Fields) {
        match D::from_fields(normalize_fields(fields)) {
            Ok(data) => {
                self.set_data(data);
                self.in_sync.set(true);
            }
            Err(e) => {
                log::error!("Error decoding remote document: {e}");
                self.in_sync.set(false);
            }
        }
    }

    fn on_snapshot(&self, generation: u64, snapshot: Option<&Snapshot>) {
        if self.generation.get() != generation {
            log::warn!("Ignoring snapshot for a previous identity");
            return;
        }
        if let Some(snapshot) = snapshot {
            self.apply_fields(snapshot.fields.clone());
        }
        self.loading.set(false);
        self.dirty.set(true);
        self.flush_notifications();
    }

    fn flush_notifications(&self) {
        if !self.dirty.replace(false) {
            return;
        }
        // do it like this to avoid holding the borrow while we call the callbacks
        let listeners: Vec<Rc<dyn Fn()>> = self.listeners.borrow().values().cloned().collect();
        for listener in listeners {
            listener();
        }
    }
}

/// Flushes pending listener notifications when dropped, whichever path a function takes.
struct FlushLater<'a, D: SyncedDocument, S> {
    inner: &'a Inner<D, S>,
}

impl<'a, D: SyncedDocument, S> FlushLater<'a, D, S> {
    fn new(inner: &'a Inner<D, S>) -> Self {
        Self { inner }
    }
}

impl<D: SyncedDocument, S> Drop for FlushLater<'_, D, S> {
    fn drop(&mut self) {
        self.inner.flush_notifications();
    }
}

impl<D: SyncedDocument, S: DocumentStore + 'static> Drop for SyncSession<D, S> {
    fn drop(&mut self) {
        let subscription = self.inner.subscription.borrow_mut().take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
    }
}
