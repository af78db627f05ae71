//! The interface to a remote keyed document database.

use std::rc::Rc;

use crate::{ser::EncodeError, value::Fields};

/// One read of a document: its raw (not yet normalized) top-level fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub key: String,
    pub fields: Fields,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("store returned status {status}: {body}")]
    Status { status: String, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("could not encode document: {0}")]
    Encode(#[from] EncodeError),
}

/// A keyed document database.
///
/// `merge_write` replaces the given top-level fields and leaves every other field as it was;
/// array fields are replaced whole. `create` is an upsert guard: creating a document that already
/// exists leaves it untouched and succeeds.
///
/// `subscribe` delivers the current state of the document as its first event, then one event per
/// change made by any writer. `None` means the document does not exist.
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    async fn get(&self, key: &str) -> Result<Option<Snapshot>, StoreError>;

    async fn create(&self, key: &str, fields: Fields) -> Result<(), StoreError>;

    async fn merge_write(&self, key: &str, fields: Fields) -> Result<(), StoreError>;

    fn subscribe(
        &self,
        key: &str,
        on_change: impl Fn(Option<&Snapshot>) + 'static,
    ) -> Subscription;
}

/// Lets a store be shared between a session and whatever drives it, e.g. a poller.
impl<S: DocumentStore> DocumentStore for Rc<S> {
    async fn get(&self, key: &str) -> Result<Option<Snapshot>, StoreError> {
        S::get(self, key).await
    }

    async fn create(&self, key: &str, fields: Fields) -> Result<(), StoreError> {
        S::create(self, key, fields).await
    }

    async fn merge_write(&self, key: &str, fields: Fields) -> Result<(), StoreError> {
        S::merge_write(self, key, fields).await
    }

    fn subscribe(
        &self,
        key: &str,
        on_change: impl Fn(Option<&Snapshot>) + 'static,
    ) -> Subscription {
        S::subscribe(self, key, on_change)
    }
}

/// Handle to a live subscription. Dropping it (or calling [`Subscription::unsubscribe`]) stops
/// delivery.
#[must_use = "dropping a Subscription immediately cancels it"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(dispose: impl FnOnce() + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.dispose_now();
    }

    fn dispose_now(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}
