//! This is a library for talking to a hosted document database from a single-threaded browser app.
//! It was created for the student portal, so it doesn't include much that was not needed for that project.
//!
//! Model:
//! 1. The hosted services (auth, documents, objects) are reached only through the narrow traits in [`collaborators`].
//!    The host page supplies the real implementations; the `memory` feature supplies an in-process one.
//! 2. Realtime queries push whole [`data_model::Snapshot`]s into callbacks. A snapshot always replaces what came before.
//! 3. App state lives in [`data_model::DirtyTracker`]s. Mutating a tracker marks it dirty, and dirty trackers produce
//!    notifications for the listeners in a [`data_model::ListenerRegistry`].
//! 4. Every subscription is opened under a [`data_model::Generation`] token. Callbacks that arrive after the token has
//!    moved on are dropped, which is what makes `stop()` safe to call at any time.

pub mod collaborators;
pub mod data_model;

#[cfg(feature = "memory")]
pub mod memory;

pub use collaborators::{
    AccountProvider, AuthError, AuthProvider, AuthSession, DocumentStore, ObjectRef, ObjectStore,
    ObjectStoreError, StoreError, Unsubscribe,
};
