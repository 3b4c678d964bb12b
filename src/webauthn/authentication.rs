//! # Passkey Authentication
//!
//! 1. **Options**: if the username is known its credentials form the
//!    allow-list, otherwise the list stays empty and the authenticator picks
//!    a discoverable credential. The options are cached under the base64url
//!    encoding of their challenge.
//! 2. **Assertion**: the challenge is read back out of `clientDataJSON` to
//!    find the pending options, which are removed right away. The credential
//!    is resolved, ownership and signature are checked, and the signature
//!    counter must move forward before the owning account is returned.

use super::types::AssertionOptionsForm;
use crate::db::models::StoredCredential;
use crate::directory::Account;
use crate::error::{AppError, AppResult};
use crate::fido2::client_data::ClientData;
use crate::fido2::response::AssertionResponse;
use crate::fido2::{encode, Fido2Error, UserVerification};
use crate::state::AppState;
use serde_json::Value;

pub async fn request_options(state: &AppState, form: AssertionOptionsForm) -> AppResult<Value> {
    let allowed = match form.username.as_deref() {
        Some(name) => match state.store.get_user(name).await {
            Ok(user) => state.store.list_credentials(&user).await?,
            Err(AppError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        },
        None => Vec::new(),
    };

    let issued = state.fido2.build_assertion_options(
        &allowed,
        form.user_verification.unwrap_or(UserVerification::Discouraged),
    )?;
    let public_key = issued.public_key.clone();
    state.assertions.put(encode(&issued.challenge), issued);

    tracing::debug!(allowed = allowed.len(), "Issued assertion options");
    Ok(public_key)
}

/// Finish an assertion, returning the account to sign in.
///
/// ## Errors
/// - BadRequest: the response or its client data could not be decoded, or
///   the client data is not from `navigator.credentials.get()`
/// - ChallengeNotFound: the challenge was never issued, already used or expired
/// - UnknownCredential: the credential id is not registered
/// - VerificationFailed: wrong owner, or the library rejected the assertion
/// - CounterRegression: the signature counter did not increase, including
///   when a concurrent assertion with the same counter was stored first
/// - UserNotFound: the credential's owner has no directory account
pub async fn finish(state: &AppState, response: &Value) -> AppResult<Account> {
    let assertion: AssertionResponse = serde_json::from_value(response.clone())
        .map_err(|e| AppError::BadRequest(format!("Invalid assertion response: {}", e)))?;
    let client_data = ClientData::from_base64url(&assertion.response.client_data_json)?;
    if client_data.type_ != "webauthn.get" {
        return Err(AppError::BadRequest(format!(
            "Unexpected client data type {}",
            client_data.type_
        )));
    }
    let key = encode(&client_data.challenge_bytes()?);

    let issued = state
        .assertions
        .take(&key)
        .ok_or(AppError::ChallengeNotFound)?;

    let credential_id = assertion.credential_id()?;
    let stored = state
        .store
        .get_credential_by_id(&credential_id)
        .await
        .map_err(|e| match e {
            AppError::NotFound(_) => AppError::UnknownCredential,
            e => e,
        })?;

    if let Some(user_handle) = assertion.user_handle()? {
        let owned = state
            .store
            .get_credentials_by_user_handle(&user_handle)
            .await?;
        if !owned.iter().any(|c| c.id == credential_id) {
            return Err(Fido2Error::Verification(
                "User handle is not the owner of the credential".to_string(),
            )
            .into());
        }
    }

    let verified = match state.fido2.verify_assertion(&issued, response, &stored) {
        Err(Fido2Error::CounterRegression { stored: count, presented }) => {
            return Err(counter_regression(&stored, count, presented));
        }
        result => result?,
    };

    check_counter(&stored, verified.sign_count)?;
    state
        .store
        .update_signature_counter(
            &stored.id,
            stored.sign_count,
            verified.sign_count,
            &verified.public_key,
        )
        .await
        .map_err(|e| match e {
            // Another assertion with this credential got in first
            AppError::CounterRegression { stored: count, presented } => {
                counter_regression(&stored, count, presented)
            }
            e => e,
        })?;
    if verified.backed_up != stored.backed_up {
        state
            .store
            .update_backup_state(&stored.id, verified.backed_up)
            .await?;
    }

    let user = state
        .store
        .get_user_by_handle(&stored.user_handle)
        .await
        .map_err(|e| match e {
            AppError::NotFound(msg) => AppError::UserNotFound(msg),
            e => e,
        })?;
    let account = state
        .directory
        .find_by_subject_identifier(&user.name)
        .ok_or_else(|| AppError::UserNotFound(user.name.clone()))?;

    tracing::info!(
        user = %user.name,
        sign_count = verified.sign_count,
        user_verified = verified.user_verified,
        "Assertion verified"
    );
    Ok(account)
}

/// A counter must strictly increase, unless the authenticator has none
/// (both values 0). Anything else may be a cloned authenticator.
fn check_counter(stored: &StoredCredential, presented: u32) -> AppResult<()> {
    if presented > stored.sign_count || (presented == 0 && stored.sign_count == 0) {
        return Ok(());
    }
    Err(counter_regression(stored, stored.sign_count, presented))
}

fn counter_regression(credential: &StoredCredential, stored: u32, presented: u32) -> AppError {
    tracing::warn!(
        target: "security",
        credential = %encode(&credential.id),
        stored,
        presented,
        "Signature counter regression, possible cloned authenticator"
    );
    AppError::CounterRegression { stored, presented }
}
