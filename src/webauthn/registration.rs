//! # Passkey Registration
//!
//! Registration is a two-step ceremony.
//!
//! 1. **Options**: resolve or create the user, build creation options that
//!    exclude the user's existing credentials, park them in the registration
//!    cache and hand them to the browser.
//! 2. **Credential**: take the pending options back out of the cache, verify
//!    the attestation, make sure the credential id is still free and store
//!    the credential.
//!
//! The cache entry is removed on every submission, valid or not, by the key
//! it was stored under. A failed registration has to start over.

use super::types::CredentialOptionsForm;
use crate::db::models::{NewUser, StoredCredential};
use crate::error::{AppError, AppResult};
use crate::fido2::encode;
use crate::state::AppState;
use chrono::Utc;
use serde_json::Value;

/// Options issued for a registration, and the key the client must submit
/// the credential under.
#[derive(Debug, Clone)]
pub struct RegistrationOptions {
    pub key: String,
    pub public_key: Value,
}

/// Start a registration
///
/// With a username, the correlation key is the username itself. Without one
/// a unique name is synthesized from the current time (and the display name,
/// if given) and the key is its base64url encoding, so it is safe in a path.
///
/// ## Errors
/// - Database: user lookup or creation failed
/// - Internal: options could not be built; nothing was cached
pub async fn request_options(
    state: &AppState,
    form: CredentialOptionsForm,
) -> AppResult<RegistrationOptions> {
    let (name, key) = match form.username.clone() {
        Some(username) => (username.clone(), username),
        None => {
            let name = usernameless_name(form.display_name.as_deref());
            let key = encode(name.as_bytes());
            (name, key)
        }
    };

    let display_name = form.display_name.clone();
    let user = state
        .store
        .get_or_create_user(&name, || NewUser::random(display_name))
        .await?;
    let existing = state.store.list_credentials(&user).await?;

    let issued = state
        .fido2
        .build_registration_options(&user, &existing, &form.preferences())?;
    let public_key = issued.public_key.clone();
    state.registrations.put(key.clone(), issued);

    tracing::debug!(user = %user.name, excluded = existing.len(), "Issued credential options");
    Ok(RegistrationOptions { key, public_key })
}

/// Finish a registration
///
/// `response` is the raw `navigator.credentials.create()` result.
///
/// ## Errors
/// - ChallengeNotFound: nothing pending under `key` (never issued, used, or expired)
/// - BadRequest / VerificationFailed: the attestation did not check out
/// - DuplicateCredential: the credential id is already registered
pub async fn finish(state: &AppState, key: &str, response: &Value) -> AppResult<()> {
    let issued = state
        .registrations
        .take(key)
        .ok_or(AppError::ChallengeNotFound)?;

    let verified = state.fido2.verify_registration(&issued, response)?;

    if !state
        .store
        .find_users_by_credential_id(&verified.credential_id)
        .await?
        .is_empty()
    {
        tracing::warn!(key = %key, "Attempt to register an existing credential id");
        return Err(AppError::DuplicateCredential);
    }

    let user_handle = issued
        .user_handle()
        .ok_or_else(|| AppError::Internal("Issued options carry no user id".to_string()))?;
    let user = state.store.get_user_by_handle(&user_handle).await?;

    let credential = StoredCredential {
        id: verified.credential_id,
        user_handle,
        public_key: verified.public_key,
        sign_count: verified.sign_count,
        transports: verified.transports,
        backup_eligible: verified.backup_eligible,
        backed_up: verified.backed_up,
        attestation_format: verified.attestation_format,
        attestation_object: verified.attestation_object,
        attestation_client_data: verified.client_data_json,
        aaguid: verified.aaguid,
        registered_at: Utc::now().to_rfc3339(),
        last_used_at: None,
    };
    let format = credential.attestation_format.clone();
    state.store.add_credential(credential).await?;

    tracing::info!(user = %user.name, attestation = %format, "Registered credential");
    Ok(())
}

fn usernameless_name(display_name: Option<&str>) -> String {
    let created = Utc::now();
    match display_name {
        Some(display_name) => format!(
            "{} (Usernameless user created {})",
            display_name,
            created.format("%Y-%m-%d")
        ),
        None => format!(
            "(Usernameless user created {})",
            created.format("%Y-%m-%d %H:%M:%S%.6f")
        ),
    }
}
