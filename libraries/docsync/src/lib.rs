//! This is a library for keeping one user's app state in sync with a document in a cloud
//! document store. It was written for the Grounding app, so it doesn't include much that was not
//! needed for that project.
//!
//! Syncing strategy:
//! 1. Each signed-in user owns exactly one remote document, keyed by their user ID.
//! 2. The app's state is a typed document (see [`session::SyncedDocument`]). The session holds the
//!    only in-memory copy, and every change goes through [`session::SyncSession::save`].
//! 3. Saving merges a partial update into the local copy and writes the whole result with
//!    merge semantics. Local state is updated optimistically.
//! 4. A live subscription to the remote document replaces local state whenever any session
//!    writes to it. This is how several open tabs converge.
//!
//! Conflicts are last-write-wins at document granularity. There is no offline queue.

pub mod identity;
pub mod memory;
pub mod ser;
pub mod session;
pub mod store;
pub mod timestamp;
pub mod value;

#[cfg(feature = "firebase")]
pub mod firebase;

slotmap::new_key_type! {
    /// Identifies a registered listener, so it can be removed later.
    pub struct ListenerKey;
}

pub use identity::{Auth, AuthError, Identity, IdentityProvider};
pub use session::{SyncSession, SyncedDocument};
pub use store::{DocumentStore, Snapshot, StoreError, Subscription};
pub use ser::{EncodeError, to_fields, to_value};
pub use value::{BackendTimestamp, Fields, Value};
