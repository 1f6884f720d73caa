//! Bridges to the hosted SDK objects the page hands us, plus the browser share and clipboard APIs.
//!
//! The page wraps the vendor SDK in three small objects (auth, documents, objects) so this module only depends on
//! their shape. Documents cross the boundary as `{ id, data }`; errors keep the SDK's `code` and `message`.

use std::rc::Rc;

use beacon::collaborators::{ErrorCallback, SessionCallback, SnapshotCallback};
use beacon::data_model::{Document, Query, Snapshot};
use beacon::{
    AuthError, AuthProvider, AuthSession, DocumentStore, ObjectRef, ObjectStore, ObjectStoreError,
    AccountProvider, StoreError, Unsubscribe,
};
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde::Serialize;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::share::{Delivery, ShareChain, ShareError, SharePayload, ShareStrategy};
use crate::state::PortalContext;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(typescript_type = "PortalAuth")]
    pub type JsAuth;

    /// Returns a function that removes the listener.
    #[wasm_bindgen(method, js_name = onSessionChange)]
    fn on_session_change(this: &JsAuth, callback: &Closure<dyn FnMut(JsValue)>) -> js_sys::Function;

    #[wasm_bindgen(method, catch, js_name = signOut)]
    async fn sign_out(this: &JsAuth) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch, js_name = signIn)]
    async fn sign_in(this: &JsAuth, email: &str, password: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch, js_name = createAccount)]
    async fn create_account(
        this: &JsAuth,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch, js_name = signInWithPopup)]
    async fn sign_in_with_popup(this: &JsAuth) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(typescript_type = "PortalDocuments")]
    pub type JsDocuments;

    #[wasm_bindgen(method)]
    fn subscribe(
        this: &JsDocuments,
        query: JsValue,
        on_next: &Closure<dyn FnMut(JsValue)>,
        on_error: &Closure<dyn FnMut(JsValue)>,
    ) -> js_sys::Function;

    #[wasm_bindgen(method, catch)]
    async fn query(this: &JsDocuments, query: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch)]
    async fn get(this: &JsDocuments, collection: &str, id: &str) -> Result<JsValue, JsValue>;

    /// Resolves to the id of the written document.
    #[wasm_bindgen(method, catch)]
    async fn add(
        this: &JsDocuments,
        collection: &str,
        id: Option<String>,
        data: JsValue,
    ) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch)]
    async fn update(
        this: &JsDocuments,
        collection: &str,
        id: &str,
        data: JsValue,
    ) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch)]
    async fn delete(this: &JsDocuments, collection: &str, id: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(typescript_type = "PortalObjects")]
    pub type JsObjects;

    #[wasm_bindgen(method, catch)]
    async fn upload(this: &JsObjects, path: &str, bytes: js_sys::Uint8Array) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch, js_name = publicUrl)]
    async fn public_url(this: &JsObjects, object: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch, js_name = delete)]
    async fn delete_object(this: &JsObjects, object: &str) -> Result<JsValue, JsValue>;
}

#[wasm_bindgen(typescript_custom_section)]
const PORTAL_BACKEND_TYPES: &'static str = r#"
export interface PortalAuth {
    onSessionChange(callback: (session: { uid: string, email?: string, displayName?: string } | null) => void): () => void;
    signOut(): Promise<void>;
    signIn(email: string, password: string): Promise<{ uid: string, email?: string, displayName?: string }>;
    createAccount(email: string, password: string, displayName: string): Promise<{ uid: string, email?: string, displayName?: string }>;
    signInWithPopup(): Promise<{ uid: string, email?: string, displayName?: string }>;
}
export interface PortalDocuments {
    subscribe(query: unknown, onNext: (docs: { id: string, data: unknown }[]) => void, onError: (error: unknown) => void): () => void;
    query(query: unknown): Promise<{ id: string, data: unknown }[]>;
    get(collection: string, id: string): Promise<{ id: string, data: unknown } | null>;
    add(collection: string, id: string | undefined, data: unknown): Promise<string>;
    update(collection: string, id: string, data: unknown): Promise<void>;
    delete(collection: string, id: string): Promise<void>;
}
export interface PortalObjects {
    upload(path: string, bytes: Uint8Array): Promise<string>;
    publicUrl(object: string): Promise<string>;
    delete(object: string): Promise<void>;
}
"#;

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, serde_wasm_bindgen::Error> {
    value.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
}

fn error_field(error: &JsValue, field: &str) -> Option<String> {
    js_sys::Reflect::get(error, &JsValue::from_str(field))
        .ok()
        .and_then(|value| value.as_string())
}

fn error_message(error: &JsValue) -> String {
    error_field(error, "message")
        .or_else(|| error.as_string())
        .unwrap_or_else(|| format!("{error:?}"))
}

fn auth_error(error: JsValue) -> AuthError {
    match error_field(&error, "code").as_deref() {
        Some("auth/invalid-credential" | "auth/wrong-password" | "auth/user-not-found") => {
            AuthError::InvalidCredential
        }
        Some("auth/email-already-in-use") => AuthError::EmailInUse,
        Some("auth/popup-closed-by-user") => AuthError::Cancelled,
        _ => AuthError::Other(error_message(&error)),
    }
}

fn store_error(error: JsValue, collection: &str, id: &str) -> StoreError {
    let message = error_message(&error);
    match error_field(&error, "code").as_deref() {
        Some("permission-denied") => StoreError::PermissionDenied(message),
        Some("unavailable") => StoreError::Unavailable(message),
        Some("not-found") => StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        },
        _ => StoreError::Other(message),
    }
}

fn object_error(error: JsValue, object: &str) -> ObjectStoreError {
    match error_field(&error, "code").as_deref() {
        Some("storage/object-not-found") => ObjectStoreError::NotFound(object.to_string()),
        _ => ObjectStoreError::Other(error_message(&error)),
    }
}

fn decode_session(value: JsValue) -> Result<AuthSession, AuthError> {
    serde_wasm_bindgen::from_value(value).map_err(|e| AuthError::Other(e.to_string()))
}

fn decode_snapshot(value: JsValue) -> Result<Snapshot, StoreError> {
    serde_wasm_bindgen::from_value::<Vec<Document>>(value)
        .map(Snapshot::new)
        .map_err(|e| StoreError::Other(format!("Unreadable snapshot: {e}")))
}

/// Calls the page's remover, then lets the closures go.
fn release_with(remover: js_sys::Function, closures: Vec<Closure<dyn FnMut(JsValue)>>) -> Unsubscribe {
    Unsubscribe::new(move || {
        if let Err(e) = remover.call0(&JsValue::NULL) {
            log::warn!("Error removing listener: {}", error_message(&e));
        }
        drop(closures);
    })
}

pub struct BrowserAuth {
    inner: JsAuth,
}

impl BrowserAuth {
    pub fn new(inner: JsAuth) -> Self {
        Self { inner }
    }
}

impl AuthProvider for BrowserAuth {
    fn on_session_change(&self, callback: SessionCallback) -> Unsubscribe {
        let closure = Closure::<dyn FnMut(JsValue)>::new(move |value: JsValue| {
            if value.is_null() || value.is_undefined() {
                callback(None);
                return;
            }
            match decode_session(value) {
                Ok(session) => callback(Some(session)),
                Err(e) => {
                    // better to look signed out than to never finish resolving
                    log::error!("Unreadable auth session: {e}");
                    callback(None);
                }
            }
        });
        let remover = self.inner.on_session_change(&closure);
        release_with(remover, vec![closure])
    }

    fn sign_out(&self) -> LocalBoxFuture<'_, Result<(), AuthError>> {
        async move { self.inner.sign_out().await.map(|_| ()).map_err(auth_error) }.boxed_local()
    }
}

impl AccountProvider for BrowserAuth {
    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> LocalBoxFuture<'a, Result<AuthSession, AuthError>> {
        async move {
            let value = self.inner.sign_in(email, password).await.map_err(auth_error)?;
            decode_session(value)
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
            let value = self
                .inner
                .create_account(email, password, display_name)
                .await
                .map_err(auth_error)?;
            decode_session(value)
        }
        .boxed_local()
    }

    fn sign_in_with_popup(&self) -> LocalBoxFuture<'_, Result<AuthSession, AuthError>> {
        async move {
            let value = self.inner.sign_in_with_popup().await.map_err(auth_error)?;
            decode_session(value)
        }
        .boxed_local()
    }
}

pub struct BrowserDocuments {
    inner: JsDocuments,
}

impl BrowserDocuments {
    pub fn new(inner: JsDocuments) -> Self {
        Self { inner }
    }
}

impl DocumentStore for BrowserDocuments {
    fn subscribe(
        &self,
        query: Query,
        on_next: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> Unsubscribe {
        let query_js = match to_js(&query) {
            Ok(query_js) => query_js,
            Err(e) => {
                on_error(StoreError::Other(format!("Unsendable query: {e}")));
                return Unsubscribe::noop();
            }
        };

        let on_error: Rc<dyn Fn(StoreError)> = Rc::from(on_error);
        let next_closure = {
            let on_error = on_error.clone();
            Closure::<dyn FnMut(JsValue)>::new(move |value: JsValue| match decode_snapshot(value) {
                Ok(snapshot) => on_next(snapshot),
                Err(e) => on_error(e),
            })
        };
        let collection = query.collection.clone();
        let error_closure = Closure::<dyn FnMut(JsValue)>::new(move |error: JsValue| {
            on_error(store_error(error, &collection, ""));
        });

        let remover = self.inner.subscribe(query_js, &next_closure, &error_closure);
        release_with(remover, vec![next_closure, error_closure])
    }

    fn query(&self, query: Query) -> LocalBoxFuture<'_, Result<Snapshot, StoreError>> {
        async move {
            let query_js = to_js(&query).map_err(|e| StoreError::Other(e.to_string()))?;
            let value = self
                .inner
                .query(query_js)
                .await
                .map_err(|e| store_error(e, &query.collection, ""))?;
            decode_snapshot(value)
        }
        .boxed_local()
    }

    fn get<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> LocalBoxFuture<'a, Result<Option<Document>, StoreError>> {
        async move {
            let value = self
                .inner
                .get(collection, id)
                .await
                .map_err(|e| store_error(e, collection, id))?;
            if value.is_null() || value.is_undefined() {
                return Ok(None);
            }
            serde_wasm_bindgen::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::Other(format!("Unreadable {collection}/{id}: {e}")))
        }
        .boxed_local()
    }

    fn add<'a>(
        &'a self,
        collection: &'a str,
        id: Option<&'a str>,
        data: serde_json::Value,
    ) -> LocalBoxFuture<'a, Result<String, StoreError>> {
        async move {
            let data = to_js(&data).map_err(|e| StoreError::Other(e.to_string()))?;
            let written = self
                .inner
                .add(collection, id.map(str::to_string), data)
                .await
                .map_err(|e| store_error(e, collection, id.unwrap_or_default()))?;
            written
                .as_string()
                .or_else(|| id.map(str::to_string))
                .ok_or_else(|| StoreError::Other(format!("No id returned for new {collection} document")))
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
            let data = to_js(&data).map_err(|e| StoreError::Other(e.to_string()))?;
            self.inner
                .update(collection, id, data)
                .await
                .map(|_| ())
                .map_err(|e| store_error(e, collection, id))
        }
        .boxed_local()
    }

    fn delete<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> LocalBoxFuture<'a, Result<(), StoreError>> {
        async move {
            self.inner
                .delete(collection, id)
                .await
                .map(|_| ())
                .map_err(|e| store_error(e, collection, id))
        }
        .boxed_local()
    }
}

pub struct BrowserObjects {
    inner: JsObjects,
}

impl BrowserObjects {
    pub fn new(inner: JsObjects) -> Self {
        Self { inner }
    }
}

impl ObjectStore for BrowserObjects {
    fn upload<'a>(
        &'a self,
        path: &'a str,
        bytes: Vec<u8>,
    ) -> LocalBoxFuture<'a, Result<ObjectRef, ObjectStoreError>> {
        async move {
            let bytes = js_sys::Uint8Array::from(bytes.as_slice());
            let stored = self
                .inner
                .upload(path, bytes)
                .await
                .map_err(|e| object_error(e, path))?;
            Ok(ObjectRef(stored.as_string().unwrap_or_else(|| path.to_string())))
        }
        .boxed_local()
    }

    fn public_url<'a>(
        &'a self,
        object: &'a ObjectRef,
    ) -> LocalBoxFuture<'a, Result<String, ObjectStoreError>> {
        async move {
            let url = self
                .inner
                .public_url(&object.0)
                .await
                .map_err(|e| object_error(e, &object.0))?;
            url.as_string()
                .ok_or_else(|| ObjectStoreError::Other(format!("No URL for {}", object.0)))
        }
        .boxed_local()
    }

    fn delete<'a>(
        &'a self,
        object: &'a ObjectRef,
    ) -> LocalBoxFuture<'a, Result<(), ObjectStoreError>> {
        async move {
            self.inner
                .delete_object(&object.0)
                .await
                .map(|_| ())
                .map_err(|e| object_error(e, &object.0))
        }
        .boxed_local()
    }
}

fn navigator() -> Result<web_sys::Navigator, ShareError> {
    web_sys::window()
        .map(|window| window.navigator())
        .ok_or(ShareError::Unsupported)
}

/// Looks up `object[name]` and returns it if it is callable.
fn method(object: &JsValue, name: &str) -> Option<js_sys::Function> {
    js_sys::Reflect::get(object, &JsValue::from_str(name))
        .ok()
        .and_then(|value| value.dyn_into::<js_sys::Function>().ok())
}

async fn settle(promise: JsValue) -> Result<(), ShareError> {
    JsFuture::from(js_sys::Promise::resolve(&promise))
        .await
        .map(|_| ())
        .map_err(|e| ShareError::Rejected(error_message(&e)))
}

/// `navigator.share`, where the platform has a share sheet.
pub struct NativeShare;

impl ShareStrategy for NativeShare {
    fn name(&self) -> &'static str {
        "native share"
    }

    fn attempt<'a>(
        &'a self,
        payload: &'a SharePayload,
    ) -> LocalBoxFuture<'a, Result<Delivery, ShareError>> {
        async move {
            let navigator: JsValue = navigator()?.into();
            let share = method(&navigator, "share").ok_or(ShareError::Unsupported)?;
            let data = to_js(payload).map_err(|e| ShareError::Rejected(e.to_string()))?;
            let promise = share
                .call1(&navigator, &data)
                .map_err(|e| ShareError::Rejected(error_message(&e)))?;
            settle(promise).await?;
            Ok(Delivery::Shared)
        }
        .boxed_local()
    }
}

/// `navigator.clipboard.writeText`.
pub struct ClipboardWrite;

impl ShareStrategy for ClipboardWrite {
    fn name(&self) -> &'static str {
        "clipboard"
    }

    fn attempt<'a>(
        &'a self,
        payload: &'a SharePayload,
    ) -> LocalBoxFuture<'a, Result<Delivery, ShareError>> {
        async move {
            let navigator: JsValue = navigator()?.into();
            let clipboard = js_sys::Reflect::get(&navigator, &JsValue::from_str("clipboard"))
                .ok()
                .filter(|clipboard| !clipboard.is_undefined() && !clipboard.is_null())
                .ok_or(ShareError::Unsupported)?;
            let write_text = method(&clipboard, "writeText").ok_or(ShareError::Unsupported)?;
            let promise = write_text
                .call1(&clipboard, &JsValue::from_str(&payload.url))
                .map_err(|e| ShareError::Rejected(error_message(&e)))?;
            settle(promise).await?;
            Ok(Delivery::Copied)
        }
        .boxed_local()
    }
}

/// Puts the link in a hidden input, selects it and runs the legacy copy command.
pub struct SelectionCopy;

impl SelectionCopy {
    fn copy(url: &str) -> Result<(), JsValue> {
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| JsValue::from_str("no document"))?;
        let body = document.body().ok_or_else(|| JsValue::from_str("no body"))?;

        let input = document
            .create_element("input")?
            .dyn_into::<web_sys::HtmlInputElement>()?;
        input.set_value(url);
        input.set_attribute("readonly", "")?;
        input.set_attribute("style", "position:fixed;opacity:0;left:-9999px")?;
        body.append_child(&input)?;
        input.select();

        let copied = document
            .dyn_into::<web_sys::HtmlDocument>()
            .map_err(JsValue::from)
            .and_then(|document| document.exec_command("copy"));
        input.remove();
        match copied? {
            true => Ok(()),
            false => Err(JsValue::from_str("copy command was refused")),
        }
    }
}

impl ShareStrategy for SelectionCopy {
    fn name(&self) -> &'static str {
        "selection copy"
    }

    fn attempt<'a>(
        &'a self,
        payload: &'a SharePayload,
    ) -> LocalBoxFuture<'a, Result<Delivery, ShareError>> {
        let result = Self::copy(&payload.url)
            .map(|_| Delivery::Copied)
            .map_err(|e| ShareError::Rejected(error_message(&e)));
        futures::future::ready(result).boxed_local()
    }
}

pub fn platform_share_chain() -> ShareChain {
    ShareChain::new(vec![
        Box::new(NativeShare),
        Box::new(ClipboardWrite),
        Box::new(SelectionCopy),
    ])
}

/// Broadcasts [`crate::state::Topic::Clock`] on an interval until dropped.
pub struct ClockTicker {
    handle: i32,
    _callback: Closure<dyn FnMut()>,
}

impl ClockTicker {
    pub fn start(context: PortalContext, every: std::time::Duration) -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let callback = Closure::<dyn FnMut()>::new(move || context.tick());
        let millis = i32::try_from(every.as_millis()).unwrap_or(i32::MAX);
        let handle = window.set_interval_with_callback_and_timeout_and_arguments_0(
            callback.as_ref().unchecked_ref(),
            millis,
        )?;
        Ok(Self {
            handle,
            _callback: callback,
        })
    }
}

impl Drop for ClockTicker {
    fn drop(&mut self) {
        if let Some(window) = web_sys::window() {
            window.clear_interval_with_handle(self.handle);
        }
    }
}
