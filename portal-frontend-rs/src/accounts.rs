use std::rc::Rc;

use beacon::{AuthError, AuthProvider, AuthSession, DocumentStore, AccountProvider, StoreError};
use serde_json::json;

use crate::access::{AccessError, ValidationError, require_text, validate_email, validate_new_password};
use crate::config::USERS;
use crate::identity::{Role, SessionIdentity};
use crate::state::PortalContext;
use crate::utils::timestamp;

#[derive(Clone, Debug, tsify::Tsify, serde::Deserialize)]
#[tsify(from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, tsify::Tsify, serde::Deserialize)]
#[tsify(from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub display_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Could not load your profile: {0}")]
    Profile(#[from] StoreError),
}

/// Sign in, registration and sign out, each ending with the identity written into [`PortalContext`].
pub struct AccountService {
    auth: Rc<dyn AuthProvider>,
    accounts: Rc<dyn AccountProvider>,
    store: Rc<dyn DocumentStore>,
    context: PortalContext,
}

impl AccountService {
    pub fn new(
        auth: Rc<dyn AuthProvider>,
        accounts: Rc<dyn AccountProvider>,
        store: Rc<dyn DocumentStore>,
        context: PortalContext,
    ) -> Self {
        Self {
            auth,
            accounts,
            store,
            context,
        }
    }

    /// With `as_admin`, a non-admin account is signed straight back out.
    pub async fn sign_in(
        &self,
        credentials: &Credentials,
        as_admin: bool,
    ) -> Result<SessionIdentity, AccountError> {
        let email = validate_email(&credentials.email)?;
        if credentials.password.is_empty() {
            return Err(ValidationError::Required("Password").into());
        }

        let session = self.accounts.sign_in(email, &credentials.password).await?;
        let identity = self.ensure_profile(&session, None).await?;

        if as_admin && !identity.is_admin() {
            log::info!("{} tried the admin sign in without the admin role", identity.uid);
            if let Err(e) = self.auth.sign_out().await {
                log::warn!("Error signing out rejected admin session: {e}");
            }
            self.context.update(|state| state.set_identity(None, None));
            return Err(AccessError::AdminRequired.into());
        }

        self.context
            .update(|state| state.set_identity(Some(identity.clone()), None));
        Ok(identity)
    }

    /// Popup sign in through the identity provider. A first visit creates a student profile, as registration does.
    pub async fn sign_in_with_google(&self) -> Result<SessionIdentity, AccountError> {
        let session = self.accounts.sign_in_with_popup().await?;
        let identity = self.ensure_profile(&session, None).await?;

        self.context
            .update(|state| state.set_identity(Some(identity.clone()), None));
        Ok(identity)
    }

    pub async fn register(&self, registration: &Registration) -> Result<SessionIdentity, AccountError> {
        let display_name = require_text("Display name", &registration.display_name)?;
        let email = validate_email(&registration.email)?;
        let password = validate_new_password(&registration.password)?;

        let session = self
            .accounts
            .create_account(email, password, display_name)
            .await?;
        let identity = self.ensure_profile(&session, Some(display_name)).await?;

        self.context
            .update(|state| state.set_identity(Some(identity.clone()), None));
        Ok(identity)
    }

    /// Ends the provider session and forgets the identity and everything the feed delivered.
    pub async fn sign_out(&self) -> Result<(), AccountError> {
        self.auth.sign_out().await?;
        self.context.update(|state| {
            state.set_identity(None, None);
            state.clear_feed(None);
        });
        Ok(())
    }

    /// Returns the stored profile for `session`, creating a student profile on first sign in.
    pub async fn ensure_profile(
        &self,
        session: &AuthSession,
        display_name_hint: Option<&str>,
    ) -> Result<SessionIdentity, StoreError> {
        if let Some(document) = self.store.get(USERS, &session.uid).await? {
            return Ok(match document.decode::<SessionIdentity>() {
                Ok(mut profile) => {
                    if profile.uid.is_empty() {
                        profile.uid = session.uid.clone();
                    }
                    profile
                }
                Err(e) => {
                    log::warn!("Profile {} is malformed, leaving it alone: {e}", session.uid);
                    SessionIdentity::fallback(session)
                }
            });
        }

        let display_name = [display_name_hint, session.display_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| {
                session
                    .email
                    .as_deref()
                    .and_then(|email| email.split('@').next())
                    .map(str::to_string)
            });

        let profile = SessionIdentity {
            uid: session.uid.clone(),
            email: session.email.clone(),
            display_name,
            role: Role::Student,
        };
        let mut data = serde_json::to_value(&profile).map_err(|e| StoreError::Other(e.to_string()))?;
        if let Some(fields) = data.as_object_mut() {
            fields.insert("createdAt".to_string(), json!(timestamp()));
        }
        self.store.add(USERS, Some(&session.uid), data).await?;
        log::info!("Created profile for {}", session.uid);
        Ok(profile)
    }
}
