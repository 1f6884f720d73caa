#[path = "1-document.rs"]
mod document;

#[path = "2-snapshot.rs"]
mod snapshot;

#[path = "3-dirty-tracker.rs"]
mod dirty_tracker;

#[path = "4-listener-registry.rs"]
mod listener_registry;

#[path = "5-generation.rs"]
mod generation;

pub use dirty_tracker::*;
pub use document::*;
pub use generation::*;
pub use listener_registry::*;
pub use snapshot::*;

#[cfg_attr(target_arch = "wasm32", wasm_bindgen::prelude::wasm_bindgen)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ListenerKey(pub(crate) slotmap::DefaultKey);
