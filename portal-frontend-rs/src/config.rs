use std::time::Duration;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub const WEBINARS: &str = "webinars";
pub const SESSIONS: &str = "sessions";
pub const USERS: &str = "users";
pub const RESOURCES: &str = "resources";
pub const TIPS: &str = "tips";
pub const FAQS: &str = "faqs";

/// Folder in the object store that placement uploads go to.
pub const RESOURCE_FOLDER: &str = "pdfs";

/// How often the schedule is re-projected against the wall clock.
pub const CLOCK_TICK: Duration = Duration::from_secs(60);

/// How long the "copied" badge stays on an item after a clipboard share.
pub const COPY_ACKNOWLEDGEMENT: Duration = Duration::from_secs(2);

pub const SESSIONS_PAGE_SIZE: usize = 10;

/// Settings the host page passes to the hosted SDK before handing its auth/documents/objects wrappers to `Portal`.
#[derive(Clone, Debug, tsify::Tsify, serde::Serialize, serde::Deserialize)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub fn backend_config() -> BackendConfig {
    let project_id = option_env!("PORTAL_PROJECT_ID").unwrap_or("student-portal-dev");
    BackendConfig {
        api_key: option_env!("PORTAL_API_KEY").unwrap_or_default().to_string(),
        auth_domain: format!("{project_id}.firebaseapp.com"),
        project_id: project_id.to_string(),
        storage_bucket: format!("{project_id}.appspot.com"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_hosts_follow_project() {
        let config = backend_config();
        assert!(config.auth_domain.starts_with(&config.project_id));
        assert!(config.storage_bucket.starts_with(&config.project_id));
    }
}
