//! Local checks that run before anything is sent upstream: form validation and who may do what.

use crate::identity::SessionIdentity;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("Invalid email address")]
    MalformedEmail,
    #[error("Password must be at least {0} characters")]
    PasswordTooShort(usize),
    #[error("{field} {message}")]
    Invalid {
        field: &'static str,
        message: &'static str,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("You need to sign in first")]
    SignedOut,
    #[error("Unauthorized: Admin access required")]
    AdminRequired,
}

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn require_text<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        Err(ValidationError::Required(field))
    } else {
        Ok(value)
    }
}

/// Checks shape only: something before a single `@`, and a dotted domain after it.
pub fn validate_email(email: &str) -> Result<&str, ValidationError> {
    let email = require_text("Email", email)?;
    let (local, domain) = email
        .split_once('@')
        .ok_or(ValidationError::MalformedEmail)?;
    let domain_ok = !domain.contains('@')
        && domain
            .split('.')
            .filter(|part| !part.is_empty())
            .count()
            >= 2
        && !domain.starts_with('.')
        && !domain.ends_with('.');
    if local.is_empty() || !domain_ok || email.chars().any(char::is_whitespace) {
        return Err(ValidationError::MalformedEmail);
    }
    Ok(email)
}

pub fn validate_new_password(password: &str) -> Result<&str, ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::Required("Password"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort(MIN_PASSWORD_LEN));
    }
    Ok(password)
}

pub fn require_signed_in(identity: Option<&SessionIdentity>) -> Result<&SessionIdentity, AccessError> {
    identity.ok_or(AccessError::SignedOut)
}

pub fn require_admin(identity: Option<&SessionIdentity>) -> Result<&SessionIdentity, AccessError> {
    let identity = require_signed_in(identity)?;
    if identity.is_admin() {
        Ok(identity)
    } else {
        Err(AccessError::AdminRequired)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, tsify::Tsify, serde::Serialize, serde::Deserialize)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub enum Requirement {
    SignedIn,
    Admin,
}

#[derive(Clone, Debug, PartialEq, Eq, tsify::Tsify, serde::Serialize)]
#[tsify(into_wasm_abi)]
#[serde(tag = "decision", rename_all = "camelCase")]
pub enum RouteDecision {
    Allow,
    /// The login page should send the user back to `from` afterwards.
    RedirectToLogin { from: String },
    RedirectHome,
}

/// What to do when someone navigates to a protected page.
pub fn guard(identity: Option<&SessionIdentity>, requirement: Requirement, from: &str) -> RouteDecision {
    match (require_signed_in(identity), requirement) {
        (Err(_), _) => RouteDecision::RedirectToLogin {
            from: from.to_string(),
        },
        (Ok(_), Requirement::SignedIn) => RouteDecision::Allow,
        (Ok(identity), Requirement::Admin) if identity.is_admin() => RouteDecision::Allow,
        (Ok(_), Requirement::Admin) => RouteDecision::RedirectHome,
    }
}
