//! In-process implementations of the collaborator traits.
//! Used by tests and by the `local-backend` build of the frontend, where no hosted project is configured.
//!
//! Realtime listeners fire synchronously: once on registration, then after every write that touches their collection.
//! Callbacks always run after the internal borrow is released, so they may call back into the store.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};

use crate::collaborators::{
    AccountProvider, AuthError, AuthProvider, AuthSession, DocumentStore, ErrorCallback, ObjectRef,
    ObjectStore, ObjectStoreError, SessionCallback, SnapshotCallback, StoreError, Unsubscribe,
};
use crate::data_model::{Document, Query, Snapshot};

struct Watcher {
    query: Query,
    on_next: Rc<dyn Fn(Snapshot)>,
    on_error: Rc<dyn Fn(StoreError)>,
}

#[derive(Default)]
struct DocumentsInner {
    collections: HashMap<String, BTreeMap<String, serde_json::Value>>,
    watchers: slotmap::SlotMap<slotmap::DefaultKey, Watcher>,
    /// Reads and writes against these collections fail with the stored error.
    failing: HashMap<String, StoreError>,
    reads: usize,
}

impl DocumentsInner {
    fn snapshot(&self, query: &Query) -> Snapshot {
        let documents = self
            .collections
            .get(&query.collection)
            .into_iter()
            .flatten()
            .map(|(id, data)| Document::new(id.clone(), data.clone()));
        query.apply(documents)
    }

    fn check(&self, collection: &str) -> Result<(), StoreError> {
        match self.failing.get(collection) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Cloning shares the underlying collections.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    inner: Rc<RefCell<DocumentsInner>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a document without going through the async API. Listeners are notified.
    pub fn insert(&self, collection: &str, id: &str, data: serde_json::Value) {
        self.inner
            .borrow_mut()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        self.notify(collection);
    }

    pub fn document(&self, collection: &str, id: &str) -> Option<serde_json::Value> {
        self.inner
            .borrow()
            .collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.inner
            .borrow()
            .collections
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Number of open realtime listeners.
    pub fn watcher_count(&self) -> usize {
        self.inner.borrow().watchers.len()
    }

    /// Number of one-shot reads (`get` and `query`) served so far.
    pub fn read_count(&self) -> usize {
        self.inner.borrow().reads
    }

    /// Makes every operation on `collection` fail until [`MemoryDocumentStore::recover`] is called.
    pub fn fail(&self, collection: &str, error: StoreError) {
        self.inner
            .borrow_mut()
            .failing
            .insert(collection.to_string(), error);
    }

    pub fn recover(&self, collection: &str) {
        self.inner.borrow_mut().failing.remove(collection);
    }

    /// Delivers `error` to every listener on `collection` and drops those listeners, as a hosted database does.
    pub fn break_listeners(&self, collection: &str, error: StoreError) {
        let broken: Vec<Rc<dyn Fn(StoreError)>> = {
            let mut inner = self.inner.borrow_mut();
            let keys: Vec<_> = inner
                .watchers
                .iter()
                .filter(|(_, watcher)| watcher.query.collection == collection)
                .map(|(key, _)| key)
                .collect();
            keys.into_iter()
                .filter_map(|key| inner.watchers.remove(key))
                .map(|watcher| watcher.on_error)
                .collect()
        };
        for on_error in broken {
            on_error(error.clone());
        }
    }

    fn notify(&self, collection: &str) {
        let due: Vec<(Rc<dyn Fn(Snapshot)>, Snapshot)> = {
            let inner = self.inner.borrow();
            inner
                .watchers
                .values()
                .filter(|watcher| watcher.query.collection == collection)
                .map(|watcher| (watcher.on_next.clone(), inner.snapshot(&watcher.query)))
                .collect()
        };
        for (on_next, snapshot) in due {
            on_next(snapshot);
        }
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn subscribe(
        &self,
        query: Query,
        on_next: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> Unsubscribe {
        let on_next: Rc<dyn Fn(Snapshot)> = Rc::from(on_next);
        let on_error: Rc<dyn Fn(StoreError)> = Rc::from(on_error);

        let (key, initial) = {
            let mut inner = self.inner.borrow_mut();
            let initial = match inner.check(&query.collection) {
                Ok(()) => Ok(inner.snapshot(&query)),
                Err(e) => Err(e),
            };
            let key = inner.watchers.insert(Watcher {
                query,
                on_next: on_next.clone(),
                on_error: on_error.clone(),
            });
            (key, initial)
        };

        match initial {
            Ok(snapshot) => on_next(snapshot),
            Err(error) => {
                self.inner.borrow_mut().watchers.remove(key);
                on_error(error);
                return Unsubscribe::noop();
            }
        }

        let inner = Rc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.borrow_mut().watchers.remove(key);
            }
        })
    }

    fn query(&self, query: Query) -> LocalBoxFuture<'_, Result<Snapshot, StoreError>> {
        let result = {
            let mut inner = self.inner.borrow_mut();
            inner.reads += 1;
            inner.check(&query.collection).map(|()| inner.snapshot(&query))
        };
        futures::future::ready(result).boxed_local()
    }

    fn get<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> LocalBoxFuture<'a, Result<Option<Document>, StoreError>> {
        let result = {
            let mut inner = self.inner.borrow_mut();
            inner.reads += 1;
            inner.check(collection).map(|()| {
                inner
                    .collections
                    .get(collection)
                    .and_then(|documents| documents.get(id))
                    .map(|data| Document::new(id, data.clone()))
            })
        };
        futures::future::ready(result).boxed_local()
    }

    fn add<'a>(
        &'a self,
        collection: &'a str,
        id: Option<&'a str>,
        data: serde_json::Value,
    ) -> LocalBoxFuture<'a, Result<String, StoreError>> {
        async move {
            self.inner.borrow().check(collection)?;
            let id = id.map(str::to_string).unwrap_or_else(eyedee::get_document_id);
            self.insert(collection, &id, data);
            Ok(id)
        }
        .boxed_local()
    }

    fn update<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        data: serde_json::Value,
    ) -> LocalBoxFuture<'a, Result<(), StoreError>> {
        async move {
            {
                let mut inner = self.inner.borrow_mut();
                inner.check(collection)?;
                let existing = inner
                    .collections
                    .get_mut(collection)
                    .and_then(|documents| documents.get_mut(id))
                    .ok_or_else(|| StoreError::NotFound {
                        collection: collection.to_string(),
                        id: id.to_string(),
                    })?;
                match (existing, data) {
                    (serde_json::Value::Object(existing), serde_json::Value::Object(fields)) => {
                        existing.extend(fields);
                    }
                    (existing, data) => *existing = data,
                }
            }
            self.notify(collection);
            Ok(())
        }
        .boxed_local()
    }

    fn delete<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> LocalBoxFuture<'a, Result<(), StoreError>> {
        async move {
            {
                let mut inner = self.inner.borrow_mut();
                inner.check(collection)?;
                if let Some(documents) = inner.collections.get_mut(collection) {
                    documents.remove(id);
                }
            }
            self.notify(collection);
            Ok(())
        }
        .boxed_local()
    }
}

struct Account {
    password: String,
    session: AuthSession,
}

#[derive(Default)]
struct AuthInner {
    current: Option<AuthSession>,
    listeners: slotmap::SlotMap<slotmap::DefaultKey, Rc<dyn Fn(Option<AuthSession>)>>,
    accounts: BTreeMap<String, Account>,
    /// Who gets picked in the account chooser. `None` closes it.
    popup_choice: Option<AuthSession>,
    sign_outs: usize,
}

/// An auth provider holding accounts in memory. Cloning shares the session.
#[derive(Clone, Default)]
pub struct MemoryAuth {
    inner: Rc<RefCell<AuthInner>>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `session` already signed in, as after a page reload with a persisted session.
    pub fn signed_in(session: AuthSession) -> Self {
        let auth = Self::default();
        auth.inner.borrow_mut().current = Some(session);
        auth
    }

    pub fn add_account(&self, email: &str, password: &str, session: AuthSession) {
        self.inner.borrow_mut().accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                session,
            },
        );
    }

    /// Sets the account the next popup sign in picks, or `None` to have the user close the popup.
    pub fn choose_in_popup(&self, session: Option<AuthSession>) {
        self.inner.borrow_mut().popup_choice = session;
    }

    /// Replaces the current session and tells every listener.
    pub fn set_session(&self, session: Option<AuthSession>) {
        self.inner.borrow_mut().current = session.clone();
        let listeners: Vec<_> = self.inner.borrow().listeners.values().cloned().collect();
        for listener in listeners {
            listener(session.clone());
        }
    }

    pub fn current(&self) -> Option<AuthSession> {
        self.inner.borrow().current.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    pub fn sign_out_count(&self) -> usize {
        self.inner.borrow().sign_outs
    }
}

impl AuthProvider for MemoryAuth {
    fn on_session_change(&self, callback: SessionCallback) -> Unsubscribe {
        let callback: Rc<dyn Fn(Option<AuthSession>)> = Rc::from(callback);
        let (key, current) = {
            let mut inner = self.inner.borrow_mut();
            let key = inner.listeners.insert(callback.clone());
            (key, inner.current.clone())
        };
        callback(current);

        let inner = Rc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.borrow_mut().listeners.remove(key);
            }
        })
    }

    fn sign_out(&self) -> LocalBoxFuture<'_, Result<(), AuthError>> {
        async move {
            self.inner.borrow_mut().sign_outs += 1;
            self.set_session(None);
            Ok(())
        }
        .boxed_local()
    }
}

impl AccountProvider for MemoryAuth {
    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> LocalBoxFuture<'a, Result<AuthSession, AuthError>> {
        async move {
            let session = {
                let inner = self.inner.borrow();
                match inner.accounts.get(email) {
                    Some(account) if account.password == password => account.session.clone(),
                    _ => return Err(AuthError::InvalidCredential),
                }
            };
            self.set_session(Some(session.clone()));
            Ok(session)
        }
        .boxed_local()
    }

    fn create_account<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
        display_name: &'a str,
    ) -> LocalBoxFuture<'a, Result<AuthSession, AuthError>> {
        async move {
            if self.inner.borrow().accounts.contains_key(email) {
                return Err(AuthError::EmailInUse);
            }
            let session = AuthSession {
                uid: eyedee::get_document_id(),
                email: Some(email.to_string()),
                display_name: Some(display_name.to_string()),
            };
            self.add_account(email, password, session.clone());
            self.set_session(Some(session.clone()));
            Ok(session)
        }
        .boxed_local()
    }

    fn sign_in_with_popup(&self) -> LocalBoxFuture<'_, Result<AuthSession, AuthError>> {
        async move {
            let chosen = self.inner.borrow().popup_choice.clone();
            let session = chosen.ok_or(AuthError::Cancelled)?;
            self.set_session(Some(session.clone()));
            Ok(session)
        }
        .boxed_local()
    }
}

/// Objects kept in memory, served from `memory://` URLs.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Rc<RefCell<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.borrow().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.objects.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.borrow().is_empty()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn upload<'a>(
        &'a self,
        path: &'a str,
        bytes: Vec<u8>,
    ) -> LocalBoxFuture<'a, Result<ObjectRef, ObjectStoreError>> {
        self.objects.borrow_mut().insert(path.to_string(), bytes);
        futures::future::ready(Ok(ObjectRef(path.to_string()))).boxed_local()
    }

    fn public_url<'a>(
        &'a self,
        object: &'a ObjectRef,
    ) -> LocalBoxFuture<'a, Result<String, ObjectStoreError>> {
        let result = if self.contains(&object.0) {
            Ok(format!("memory://{}", object.0))
        } else {
            Err(ObjectStoreError::NotFound(object.0.clone()))
        };
        futures::future::ready(result).boxed_local()
    }

    fn delete<'a>(
        &'a self,
        object: &'a ObjectRef,
    ) -> LocalBoxFuture<'a, Result<(), ObjectStoreError>> {
        let path = object.0.strip_prefix("memory://").unwrap_or(&object.0);
        let result = match self.objects.borrow_mut().remove(path) {
            Some(_) => Ok(()),
            None => Err(ObjectStoreError::NotFound(path.to_string())),
        };
        futures::future::ready(result).boxed_local()
    }
}
