//! # Collaborators
//! The hosted services the app depends on, each reduced to the handful of calls the app actually makes.
//! All async methods return boxed local futures so the traits stay usable as `Rc<dyn …>`.

use futures::future::LocalBoxFuture;

use crate::data_model::{Document, Query, Snapshot};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredential,
    #[error("An account already exists for this email")]
    EmailInUse,
    #[error("Sign in cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("object {0} not found")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

/// What the auth provider knows about a signed-in user, before any profile lookup.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Releases an upstream listener. Runs at most once: either through [`Unsubscribe::release`] or on drop.
#[must_use = "dropping an Unsubscribe releases the listener immediately"]
pub struct Unsubscribe {
    release: Option<Box<dyn FnOnce()>>,
}

impl Unsubscribe {
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A handle with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    pub fn release(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("armed", &self.release.is_some())
            .finish()
    }
}

pub type SessionCallback = Box<dyn Fn(Option<AuthSession>)>;
pub type SnapshotCallback = Box<dyn Fn(Snapshot)>;
pub type ErrorCallback = Box<dyn Fn(StoreError)>;

pub trait AuthProvider {
    /// The callback fires once soon after registration with the current session, then on every change.
    fn on_session_change(&self, callback: SessionCallback) -> Unsubscribe;

    fn sign_out(&self) -> LocalBoxFuture<'_, Result<(), AuthError>>;
}

/// Interactive sign in and account creation. Kept apart from [`AuthProvider`] since the session bootstrap never
/// needs them.
pub trait AccountProvider {
    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> LocalBoxFuture<'a, Result<AuthSession, AuthError>>;

    fn create_account<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
        display_name: &'a str,
    ) -> LocalBoxFuture<'a, Result<AuthSession, AuthError>>;

    /// Signs in through the identity provider's account chooser. Closing the chooser gives [`AuthError::Cancelled`].
    fn sign_in_with_popup(&self) -> LocalBoxFuture<'_, Result<AuthSession, AuthError>>;
}

pub trait DocumentStore {
    /// Opens a realtime query. `on_next` receives the full result set each time it changes.
    fn subscribe(
        &self,
        query: Query,
        on_next: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> Unsubscribe;

    /// One-shot version of [`DocumentStore::subscribe`].
    fn query(&self, query: Query) -> LocalBoxFuture<'_, Result<Snapshot, StoreError>>;

    fn get<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> LocalBoxFuture<'a, Result<Option<Document>, StoreError>>;

    /// Creates a document. With `id` set this writes exactly that document, replacing any existing one.
    /// Returns the id of the written document.
    fn add<'a>(
        &'a self,
        collection: &'a str,
        id: Option<&'a str>,
        data: serde_json::Value,
    ) -> LocalBoxFuture<'a, Result<String, StoreError>>;

    /// Merges the top-level fields of `data` into an existing document.
    fn update<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        data: serde_json::Value,
    ) -> LocalBoxFuture<'a, Result<(), StoreError>>;

    fn delete<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> LocalBoxFuture<'a, Result<(), StoreError>>;
}

/// Opaque reference to a stored object. For the hosted store this is the object path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ObjectRef(pub String);

pub trait ObjectStore {
    fn upload<'a>(
        &'a self,
        path: &'a str,
        bytes: Vec<u8>,
    ) -> LocalBoxFuture<'a, Result<ObjectRef, ObjectStoreError>>;

    fn public_url<'a>(
        &'a self,
        object: &'a ObjectRef,
    ) -> LocalBoxFuture<'a, Result<String, ObjectStoreError>>;

    fn delete<'a>(&'a self, object: &'a ObjectRef)
    -> LocalBoxFuture<'a, Result<(), ObjectStoreError>>;
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn test_unsubscribe_runs_once() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let handle = Unsubscribe::new(move || counter.set(counter.get() + 1));
        handle.release();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_unsubscribe_on_drop() {
        let calls = Rc::new(Cell::new(0));
        {
            let counter = calls.clone();
            let _handle = Unsubscribe::new(move || counter.set(counter.get() + 1));
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_noop_unsubscribe() {
        Unsubscribe::noop().release();
    }
}
