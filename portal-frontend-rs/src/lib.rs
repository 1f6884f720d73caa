pub mod access;
pub mod accounts;
pub mod admin;
#[cfg(target_arch = "wasm32")]
pub mod browser;
pub mod config;
pub mod feed;
pub mod identity;
pub mod placement;
pub mod projector;
pub mod schedule;
pub mod share;
pub mod state;
mod utils;

use std::cell::RefCell;
use std::rc::Rc;
#[cfg(target_arch = "wasm32")]
use std::sync::LazyLock;

use beacon::data_model::ListenerKey;
use beacon::{AccountProvider, AuthProvider, DocumentStore, ObjectStore};
use wasm_bindgen::prelude::*;

use crate::access::{Requirement, RouteDecision};
use crate::accounts::{AccountService, Credentials, Registration};
use crate::admin::{AdminDesk, SessionDraft, SessionPage, WebinarDraft};
use crate::feed::{FeedMultiplexer, SubscriptionHandle};
use crate::identity::{IdentityResolver, SessionIdentity};
use crate::placement::{Faq, FaqDraft, PlacementDesk, Resource, ResourceDraft, Tip, TipDraft};
use crate::projector::ScheduleView;
use crate::share::{CopyAcknowledgement, ShareChain, ShareOutcome};
use crate::state::{PortalContext, Topic};

/// The hosted services the portal talks to.
pub struct Backend {
    pub auth: Rc<dyn AuthProvider>,
    pub accounts: Rc<dyn AccountProvider>,
    pub documents: Rc<dyn DocumentStore>,
    pub objects: Rc<dyn ObjectStore>,
}

#[wasm_bindgen]
pub struct Portal {
    // we never hold a borrow of any of these across an .await
    context: PortalContext,
    resolver: IdentityResolver,
    feed: FeedMultiplexer,
    feed_handle: RefCell<Option<SubscriptionHandle>>,
    accounts: AccountService,
    admin: AdminDesk,
    placement: PlacementDesk,
    share_chain: ShareChain,
    copied: RefCell<CopyAcknowledgement>,
    #[cfg(target_arch = "wasm32")]
    clock: RefCell<Option<browser::ClockTicker>>,
}

// putting this inside LOGGER prevents us from accidentally initializing the logger more than once
#[cfg(target_arch = "wasm32")]
#[allow(clippy::declare_interior_mutable_const)]
const LOGGER: LazyLock<()> = LazyLock::new(|| {
    utils::set_panic_hook();

    wasm_logger::init(wasm_logger::Config::default());
    log::info!("Logging initialized");
});

fn js_error(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&error.to_string())
}

impl Portal {
    pub fn with_backend(backend: Backend, share_chain: ShareChain) -> Self {
        let context = PortalContext::new();
        Self {
            resolver: IdentityResolver::new(
                backend.auth.clone(),
                backend.documents.clone(),
                context.clone(),
            ),
            feed: FeedMultiplexer::new(backend.documents.clone(), context.clone()),
            feed_handle: RefCell::new(None),
            accounts: AccountService::new(
                backend.auth,
                backend.accounts,
                backend.documents.clone(),
                context.clone(),
            ),
            admin: AdminDesk::new(backend.documents.clone(), context.clone()),
            placement: PlacementDesk::new(backend.documents, backend.objects, context.clone()),
            share_chain,
            copied: RefCell::new(CopyAcknowledgement::default()),
            #[cfg(target_arch = "wasm32")]
            clock: RefCell::new(None),
            context,
        }
    }

    pub fn context(&self) -> &PortalContext {
        &self.context
    }

    /// Rust-side listener, for callers that aren't JavaScript.
    pub fn listen(&self, listener: impl Fn(ListenerKey, Topic) + 'static) -> ListenerKey {
        self.context.subscribe(listener)
    }

    fn identity_uid(&self) -> Option<String> {
        self.context.identity().map(|identity| identity.uid)
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl Portal {
    #[wasm_bindgen(constructor)]
    pub fn new(
        auth: browser::JsAuth,
        documents: browser::JsDocuments,
        objects: browser::JsObjects,
    ) -> Portal {
        // used to only initialize the logger once
        #[allow(clippy::borrow_interior_mutable_const)]
        *LOGGER;

        let auth = Rc::new(browser::BrowserAuth::new(auth));
        let backend = Backend {
            auth: auth.clone(),
            accounts: auth,
            documents: Rc::new(browser::BrowserDocuments::new(documents)),
            objects: Rc::new(browser::BrowserObjects::new(objects)),
        };
        Portal::with_backend(backend, browser::platform_share_chain())
    }

    /// Starts re-projecting the schedule against the wall clock.
    pub fn start_clock(&self) -> Result<(), JsValue> {
        let ticker = browser::ClockTicker::start(self.context.clone(), config::CLOCK_TICK)?;
        *self.clock.borrow_mut() = Some(ticker);
        Ok(())
    }

    pub fn stop_clock(&self) {
        self.clock.borrow_mut().take();
    }
}

#[cfg(feature = "local-backend")]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
impl Portal {
    /// A portal backed entirely by in-memory stores, for running the UI without a hosted project.
    pub fn local() -> Portal {
        #[cfg(target_arch = "wasm32")]
        #[allow(clippy::borrow_interior_mutable_const)]
        *LOGGER;

        let auth = Rc::new(beacon::memory::MemoryAuth::new());
        let backend = Backend {
            auth: auth.clone(),
            accounts: auth,
            documents: Rc::new(beacon::memory::MemoryDocumentStore::new()),
            objects: Rc::new(beacon::memory::MemoryObjectStore::new()),
        };
        #[cfg(target_arch = "wasm32")]
        let share_chain = browser::platform_share_chain();
        #[cfg(not(target_arch = "wasm32"))]
        let share_chain = ShareChain::new(Vec::new());
        Portal::with_backend(backend, share_chain)
    }
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
impl Portal {
    /// Resolves once the auth provider has said whether anyone is signed in.
    pub async fn resolve_identity(&self) -> Option<SessionIdentity> {
        self.resolver.resolve().await
    }

    /// Follows sign-ins and sign-outs made elsewhere. Returns after [`Portal::shutdown`].
    pub async fn watch_identity(&self) {
        self.resolver.watch().await
    }

    pub fn identity(&self) -> Option<SessionIdentity> {
        self.context.identity()
    }

    pub fn identity_resolved(&self) -> bool {
        self.context.read(|state| state.identity_resolved())
    }

    /// The callback is called with `(listenerKey, topic)` whenever that part of the state changes.
    pub fn subscribe(&self, callback: js_sys::Function) -> ListenerKey {
        self.context.subscribe(move |listener_key, topic| {
            #[cfg(target_arch = "wasm32")]
            {
                let this = JsValue::null();
                let listener_js: JsValue = listener_key.into();
                let topic_js = serde_wasm_bindgen::to_value(&topic).unwrap_or(JsValue::NULL);
                let _ = callback.call2(&this, &listener_js, &topic_js);
            }
            #[cfg(not(target_arch = "wasm32"))]
            {
                let _ = (listener_key, &callback, topic);
            }
        })
    }

    pub fn unsubscribe(&self, key: ListenerKey) {
        self.context.unsubscribe(key)
    }

    pub fn start_feed(&self) {
        let handle = self.feed.start();
        *self.feed_handle.borrow_mut() = Some(handle);
    }

    pub fn stop_feed(&self) {
        if let Some(handle) = self.feed_handle.borrow_mut().take() {
            handle.stop();
        }
        self.feed.stop();
    }

    pub fn clear_feed(&self) {
        self.feed_handle.borrow_mut().take();
        self.feed.clear();
    }

    pub fn feed_loading(&self) -> bool {
        self.context.read(|state| state.feed().loading)
    }

    pub fn feed_error(&self) -> Option<String> {
        self.context.read(|state| state.feed().error.clone())
    }

    /// What the schedule page shows for the current viewer, right now.
    pub fn schedule(&self) -> ScheduleView {
        let items = self.context.read(|state| state.feed().items.clone());
        projector::project(&items, self.identity_uid().as_deref(), utils::local_now())
    }

    /// Notifies listeners as if the clock had ticked.
    pub fn tick(&self) {
        self.context.tick()
    }

    pub async fn share(&self, item_id: String) -> ShareOutcome {
        let item = self.context.read(|state| {
            state
                .feed()
                .items
                .iter()
                .find(|item| item.id() == item_id)
                .cloned()
        });
        let Some(item) = item else {
            log::warn!("Share requested for {item_id}, which is not in the feed");
            return ShareOutcome::Failed {
                message: share::NO_LINK_MESSAGE.to_string(),
            };
        };

        let outcome = self.share_chain.share(&item).await;
        if outcome == ShareOutcome::Copied {
            self.copied
                .borrow_mut()
                .acknowledge(&item_id, utils::local_now());
        }
        outcome
    }

    /// Whether the item's share button should still say it was copied.
    pub fn is_copied(&self, item_id: String) -> bool {
        self.copied.borrow().is_showing(&item_id, utils::local_now())
    }

    pub async fn sign_in(
        &self,
        credentials: Credentials,
        as_admin: bool,
    ) -> Result<SessionIdentity, JsValue> {
        self.accounts
            .sign_in(&credentials, as_admin)
            .await
            .map_err(js_error)
    }

    pub async fn sign_in_with_google(&self) -> Result<SessionIdentity, JsValue> {
        self.accounts.sign_in_with_google().await.map_err(js_error)
    }

    pub async fn register(&self, registration: Registration) -> Result<SessionIdentity, JsValue> {
        self.accounts.register(&registration).await.map_err(js_error)
    }

    pub async fn sign_out(&self) -> Result<(), JsValue> {
        // the listeners would start failing on permissions as soon as the session is gone
        self.stop_feed();
        self.accounts.sign_out().await.map_err(js_error)
    }

    /// Releases the auth listener, the feed listeners and the clock.
    pub fn shutdown(&self) {
        self.stop_feed();
        self.resolver.shutdown();
        #[cfg(target_arch = "wasm32")]
        self.clock.borrow_mut().take();
    }

    pub fn guard(&self, requirement: Requirement, from: String) -> RouteDecision {
        let identity = self.context.identity();
        access::guard(identity.as_ref(), requirement, &from)
    }

    pub async fn add_webinar(&self, draft: WebinarDraft) -> Result<String, JsValue> {
        self.admin.add_webinar(&draft).await.map_err(js_error)
    }

    pub async fn update_webinar(&self, id: String, draft: WebinarDraft) -> Result<(), JsValue> {
        self.admin.update_webinar(&id, &draft).await.map_err(js_error)
    }

    pub async fn delete_webinar(&self, id: String) -> Result<(), JsValue> {
        self.admin.delete_webinar(&id).await.map_err(js_error)
    }

    pub async fn add_session(&self, draft: SessionDraft) -> Result<String, JsValue> {
        self.admin.add_session(&draft).await.map_err(js_error)
    }

    pub async fn update_session(&self, id: String, draft: SessionDraft) -> Result<(), JsValue> {
        self.admin.update_session(&id, &draft).await.map_err(js_error)
    }

    pub async fn delete_session(&self, id: String) -> Result<(), JsValue> {
        self.admin.delete_session(&id).await.map_err(js_error)
    }

    pub async fn fetch_sessions_page(&self, after: Option<String>) -> Result<SessionPage, JsValue> {
        self.admin
            .fetch_sessions_page(after.as_deref())
            .await
            .map_err(js_error)
    }

    pub async fn resources(&self) -> Result<Vec<Resource>, JsValue> {
        self.placement.resources().await.map_err(js_error)
    }

    pub async fn add_resource(&self, draft: ResourceDraft, bytes: Vec<u8>) -> Result<Resource, JsValue> {
        self.placement
            .add_resource(&draft, bytes)
            .await
            .map_err(js_error)
    }

    pub async fn delete_resource(&self, id: String, link: String) -> Result<(), JsValue> {
        self.placement
            .delete_resource(&id, &link)
            .await
            .map_err(js_error)
    }

    pub async fn tips(&self) -> Result<Vec<Tip>, JsValue> {
        self.placement.tips().await.map_err(js_error)
    }

    pub async fn add_tip(&self, draft: TipDraft) -> Result<Tip, JsValue> {
        self.placement.add_tip(&draft).await.map_err(js_error)
    }

    pub async fn update_tip(&self, id: String, draft: TipDraft) -> Result<Tip, JsValue> {
        self.placement.update_tip(&id, &draft).await.map_err(js_error)
    }

    pub async fn delete_tip(&self, id: String) -> Result<(), JsValue> {
        self.placement.delete_tip(&id).await.map_err(js_error)
    }

    pub async fn faqs(&self) -> Result<Vec<Faq>, JsValue> {
        self.placement.faqs().await.map_err(js_error)
    }

    pub async fn add_faq(&self, draft: FaqDraft) -> Result<Faq, JsValue> {
        self.placement.add_faq(&draft).await.map_err(js_error)
    }

    pub async fn update_faq(&self, id: String, draft: FaqDraft) -> Result<Faq, JsValue> {
        self.placement.update_faq(&id, &draft).await.map_err(js_error)
    }

    pub async fn delete_faq(&self, id: String) -> Result<(), JsValue> {
        self.placement.delete_faq(&id).await.map_err(js_error)
    }
}

impl Drop for Portal {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub fn get_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
