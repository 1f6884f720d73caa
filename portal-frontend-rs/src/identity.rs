use std::cell::{Cell, RefCell};
use std::rc::Rc;

use beacon::{AuthProvider, AuthSession, DocumentStore, Unsubscribe};
use futures::StreamExt;
use futures::channel::{mpsc, oneshot};

use crate::config::USERS;
use crate::state::PortalContext;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, tsify::Tsify, serde::Serialize, serde::Deserialize,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Admin,
}

/// The signed-in user as the rest of the app sees it. Stored in `users/{uid}`.
#[derive(Clone, Debug, PartialEq, Eq, tsify::Tsify, serde::Serialize, serde::Deserialize)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Role,
}

impl SessionIdentity {
    /// What we can say about a user from the auth provider alone.
    pub fn fallback(session: &AuthSession) -> Self {
        Self {
            uid: session.uid.clone(),
            email: session.email.clone(),
            display_name: session.display_name.clone(),
            role: Role::Student,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Looks up the stored profile for `session`. Never fails: a missing, malformed or unreachable profile gives
/// [`SessionIdentity::fallback`].
pub(crate) async fn load_profile(store: &dyn DocumentStore, session: &AuthSession) -> SessionIdentity {
    match store.get(USERS, &session.uid).await {
        Ok(Some(document)) => match document.decode::<SessionIdentity>() {
            Ok(mut profile) => {
                if profile.uid.is_empty() {
                    profile.uid = session.uid.clone();
                }
                profile
            }
            Err(e) => {
                log::warn!("Profile {} is malformed, using auth fields: {e}", session.uid);
                SessionIdentity::fallback(session)
            }
        },
        Ok(None) => SessionIdentity::fallback(session),
        Err(e) => {
            log::error!("Error fetching profile for {}: {e}", session.uid);
            SessionIdentity::fallback(session)
        }
    }
}

type SessionSender = Rc<RefCell<Option<mpsc::UnboundedSender<Option<AuthSession>>>>>;
type SessionReceiver = mpsc::UnboundedReceiver<Option<AuthSession>>;

/// Turns auth provider callbacks into identity updates on the [`PortalContext`].
///
/// Callbacks are queued and applied in order, so a slow profile lookup can't be overtaken by a later sign-out.
/// Only one task reads the queue at a time: `resolve` borrows it for the first callback, `watch` keeps it after that.
/// Whoever is not holding it parks on a waiter until the holder makes progress.
pub struct IdentityResolver {
    auth: Rc<dyn AuthProvider>,
    store: Rc<dyn DocumentStore>,
    context: PortalContext,
    registered: Cell<bool>,
    watching: Cell<bool>,
    registration: RefCell<Option<Unsubscribe>>,
    sender: SessionSender,
    sessions: RefCell<Option<SessionReceiver>>,
    waiters: RefCell<Vec<oneshot::Sender<()>>>,
}

impl IdentityResolver {
    pub fn new(
        auth: Rc<dyn AuthProvider>,
        store: Rc<dyn DocumentStore>,
        context: PortalContext,
    ) -> Self {
        Self {
            auth,
            store,
            context,
            registered: Cell::new(false),
            watching: Cell::new(false),
            registration: RefCell::new(None),
            sender: Rc::new(RefCell::new(None)),
            sessions: RefCell::new(None),
            waiters: RefCell::new(Vec::new()),
        }
    }

    fn register(&self) {
        if self.registered.replace(true) {
            return;
        }

        let (tx, rx) = mpsc::unbounded();
        *self.sender.borrow_mut() = Some(tx);
        *self.sessions.borrow_mut() = Some(rx);
        let sender = self.sender.clone();
        let registration = self.auth.on_session_change(Box::new(move |session| {
            if let Some(tx) = sender.borrow().as_ref() {
                // the receiver only goes away with the resolver
                let _ = tx.unbounded_send(session);
            }
        }));
        *self.registration.borrow_mut() = Some(registration);
    }

    fn is_resolved(&self) -> bool {
        self.context.read(|state| state.identity_resolved())
    }

    async fn wait_for_progress(&self) {
        let (tx, rx) = oneshot::channel();
        self.waiters.borrow_mut().push(tx);
        // a dropped sender means the resolver is going away; either way there is something to re-check
        let _ = rx.await;
    }

    fn wake_waiters(&self) {
        let waiters = std::mem::take(&mut *self.waiters.borrow_mut());
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    /// Waits for the auth provider's first answer and publishes it. Registers with the provider at most once;
    /// calls made after (or during) the first resolution wait for it and return the current identity.
    pub async fn resolve(&self) -> Option<SessionIdentity> {
        self.register();
        if self.is_resolved() {
            return self.context.identity();
        }

        let taken = self.sessions.borrow_mut().take();
        match taken {
            Some(mut sessions) => {
                let first = sessions.next().await;
                match first {
                    Some(session) => {
                        self.apply(session).await;
                    }
                    None => self.close_unresolved(),
                }
                *self.sessions.borrow_mut() = Some(sessions);
                self.wake_waiters();
            }
            None => {
                while !self.is_resolved() {
                    self.wait_for_progress().await;
                }
            }
        }
        self.context.identity()
    }

    /// Applies every auth callback until [`IdentityResolver::shutdown`] is called. Registers with the provider
    /// if [`IdentityResolver::resolve`] has not yet.
    pub async fn watch(&self) {
        if self.watching.replace(true) {
            log::warn!("Identity is already being watched");
            return;
        }
        self.register();

        let mut sessions = loop {
            let taken = self.sessions.borrow_mut().take();
            match taken {
                Some(sessions) => break sessions,
                // resolve() is reading the first callback and hands the queue back when it is done
                None => self.wait_for_progress().await,
            }
        };
        while let Some(session) = sessions.next().await {
            self.apply(session).await;
            self.wake_waiters();
        }
        if !self.is_resolved() {
            self.close_unresolved();
        }
        self.wake_waiters();
        log::debug!("Identity watch finished");
    }

    /// Releases the auth registration. Callbacks already queued are still applied by [`IdentityResolver::watch`].
    pub fn shutdown(&self) {
        self.sender.borrow_mut().take();
        if let Some(registration) = self.registration.borrow_mut().take() {
            registration.release();
        }
    }

    fn close_unresolved(&self) {
        log::warn!("Auth provider closed before reporting a session");
        self.context.update(|state| state.set_identity(None, None));
    }

    async fn apply(&self, session: Option<AuthSession>) -> Option<SessionIdentity> {
        let identity = match session {
            Some(session) => Some(load_profile(self.store.as_ref(), &session).await),
            None => None,
        };
        self.context
            .update(|state| state.set_identity(identity.clone(), None));
        identity
    }
}

impl Drop for IdentityResolver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use beacon::StoreError;
    use beacon::memory::{MemoryAuth, MemoryDocumentStore};
    use futures::executor::block_on;
    use serde_json::json;

    use super::*;
    use crate::state::{PortalState, Topic};

    fn session(uid: &str) -> AuthSession {
        AuthSession {
            uid: uid.to_string(),
            email: Some(format!("{uid}@example.com")),
            display_name: Some("Ada".to_string()),
        }
    }

    fn resolver(auth: &MemoryAuth, store: &MemoryDocumentStore) -> (IdentityResolver, PortalContext) {
        let context = PortalContext::new();
        let resolver = IdentityResolver::new(
            Rc::new(auth.clone()),
            Rc::new(store.clone()),
            context.clone(),
        );
        (resolver, context)
    }

    #[test]
    fn test_signed_out_resolves_to_none_without_lookup() {
        let auth = MemoryAuth::new();
        let store = MemoryDocumentStore::new();
        let (resolver, context) = resolver(&auth, &store);

        assert_eq!(block_on(resolver.resolve()), None);
        assert!(context.read(PortalState::identity_resolved));
        assert_eq!(store.read_count(), 0);
        assert_eq!(auth.listener_count(), 1);
    }

    #[test]
    fn test_stored_profile_wins() {
        let auth = MemoryAuth::signed_in(session("u1"));
        let store = MemoryDocumentStore::new();
        store.insert(
            USERS,
            "u1",
            json!({"uid": "u1", "email": "u1@example.com", "displayName": "Ada L", "role": "admin"}),
        );
        let (resolver, context) = resolver(&auth, &store);

        let identity = block_on(resolver.resolve()).unwrap();
        assert!(identity.is_admin());
        assert_eq!(identity.display_name.as_deref(), Some("Ada L"));
        assert_eq!(context.identity(), Some(identity));
    }

    #[test]
    fn test_missing_profile_falls_back_to_student() {
        let auth = MemoryAuth::signed_in(session("u1"));
        let store = MemoryDocumentStore::new();
        let (resolver, _) = resolver(&auth, &store);

        let identity = block_on(resolver.resolve()).unwrap();
        assert_eq!(identity, SessionIdentity::fallback(&session("u1")));
        assert_eq!(identity.role, Role::Student);
    }

    #[test]
    fn test_lookup_failure_falls_back() {
        let auth = MemoryAuth::signed_in(session("u1"));
        let store = MemoryDocumentStore::new();
        store.fail(USERS, StoreError::Unavailable("offline".into()));
        let (resolver, _) = resolver(&auth, &store);

        let identity = block_on(resolver.resolve()).unwrap();
        assert_eq!(identity.uid, "u1");
        assert_eq!(identity.role, Role::Student);
    }

    #[test]
    fn test_malformed_profile_falls_back() {
        let auth = MemoryAuth::signed_in(session("u1"));
        let store = MemoryDocumentStore::new();
        store.insert(USERS, "u1", json!({"role": "superuser"}));
        let (resolver, _) = resolver(&auth, &store);

        let identity = block_on(resolver.resolve()).unwrap();
        assert_eq!(identity, SessionIdentity::fallback(&session("u1")));
    }

    #[test]
    fn test_second_resolve_does_not_register_again() {
        let auth = MemoryAuth::signed_in(session("u1"));
        let store = MemoryDocumentStore::new();
        let (resolver, _) = resolver(&auth, &store);

        let first = block_on(resolver.resolve());
        let second = block_on(resolver.resolve());
        assert_eq!(first, second);
        assert_eq!(auth.listener_count(), 1);
        assert_eq!(store.read_count(), 1);
    }

    #[test]
    fn test_watch_applies_changes_in_order_until_shutdown() {
        let auth = MemoryAuth::signed_in(session("u1"));
        let store = MemoryDocumentStore::new();
        let (resolver, context) = resolver(&auth, &store);
        block_on(resolver.resolve());

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let reader = context.clone();
        context.subscribe(move |_, topic| {
            if topic == Topic::Identity {
                log.borrow_mut()
                    .push(reader.identity().map(|identity| identity.uid));
            }
        });

        auth.set_session(Some(session("u2")));
        auth.set_session(None);
        resolver.shutdown();
        assert_eq!(auth.listener_count(), 0);

        block_on(resolver.watch());
        assert_eq!(*seen.borrow(), vec![Some("u2".to_string()), None]);
        assert_eq!(context.identity(), None);

        // nothing is listening any more
        auth.set_session(Some(session("u3")));
        assert_eq!(context.identity(), None);
    }

    /// Holds on to the callback and only answers when told to, like a provider still restoring its session.
    #[derive(Clone, Default)]
    struct SlowAuth {
        callbacks: Rc<RefCell<Vec<Rc<dyn Fn(Option<AuthSession>)>>>>,
    }

    impl SlowAuth {
        fn answer(&self, session: Option<AuthSession>) {
            let callbacks = self.callbacks.borrow().clone();
            for callback in callbacks {
                callback(session.clone());
            }
        }
    }

    impl AuthProvider for SlowAuth {
        fn on_session_change(&self, callback: beacon::collaborators::SessionCallback) -> Unsubscribe {
            self.callbacks.borrow_mut().push(Rc::from(callback));
            Unsubscribe::noop()
        }

        fn sign_out(&self) -> futures::future::LocalBoxFuture<'_, Result<(), beacon::AuthError>> {
            Box::pin(futures::future::ready(Ok(())))
        }
    }

    #[test]
    fn test_watch_started_before_resolve_keeps_applying() {
        let auth = MemoryAuth::signed_in(session("u1"));
        let store = MemoryDocumentStore::new();
        let (resolver, context) = resolver(&auth, &store);

        let (_, resolved) = block_on(async {
            futures::join!(resolver.watch(), async {
                let resolved = resolver.resolve().await;
                auth.set_session(None);
                resolver.shutdown();
                resolved
            })
        });
        assert_eq!(resolved.map(|identity| identity.uid), Some("u1".to_string()));
        assert_eq!(context.identity(), None);
        assert_eq!(auth.listener_count(), 0);
    }

    #[test]
    fn test_concurrent_resolves_share_the_first_answer() {
        let auth = SlowAuth::default();
        let store = MemoryDocumentStore::new();
        let context = PortalContext::new();
        let resolver = IdentityResolver::new(Rc::new(auth.clone()), Rc::new(store.clone()), context.clone());

        let (first, second, _) = block_on(async {
            futures::join!(resolver.resolve(), resolver.resolve(), async {
                auth.answer(Some(session("u1")));
            })
        });
        assert_eq!(first.map(|identity| identity.uid), Some("u1".to_string()));
        assert_eq!(second.map(|identity| identity.uid), Some("u1".to_string()));
        assert_eq!(auth.callbacks.borrow().len(), 1);
        assert_eq!(store.read_count(), 1);
    }

    #[test]
    fn test_later_lookup_failure_falls_back_instead_of_clearing() {
        let auth = MemoryAuth::signed_in(session("u1"));
        let store = MemoryDocumentStore::new();
        store.insert(
            USERS,
            "u1",
            json!({"uid": "u1", "email": "u1@example.com", "displayName": "Ada L", "role": "admin"}),
        );
        let (resolver, context) = resolver(&auth, &store);
        assert!(block_on(resolver.resolve()).is_some_and(|identity| identity.is_admin()));

        store.fail(USERS, StoreError::Unavailable("offline".into()));
        auth.set_session(Some(session("u2")));
        resolver.shutdown();
        block_on(resolver.watch());

        let identity = context.identity().unwrap();
        assert_eq!(identity.uid, "u2");
        assert_eq!(identity.role, Role::Student);
        assert_eq!(identity, SessionIdentity::fallback(&session("u2")));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let auth = MemoryAuth::new();
        let store = MemoryDocumentStore::new();
        let (resolver, _) = resolver(&auth, &store);
        resolver.shutdown();
        block_on(resolver.resolve());
        resolver.shutdown();
        resolver.shutdown();
        assert_eq!(auth.listener_count(), 0);
    }
}
