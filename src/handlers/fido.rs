//! # FIDO2 Ceremony Handlers
//!
//! The `/api/fido` endpoints used by the registration and login pages.
//! Options requests are form posts; credential submissions are the JSON the
//! browser got from `navigator.credentials`. Success bodies are bare JSON
//! values, errors are `"Error: ..."` strings (see [`AppError`](crate::error::AppError)).

use crate::error::AppResult;
use crate::state::AppState;
use crate::webauthn::types::{AssertionOptionsForm, CredentialOptionsForm};
use crate::webauthn::{authentication, registration};
use axum::{
    extract::{Path, State},
    Form, Json,
};
use serde_json::Value;
use tower_sessions::Session;

/// Begin a registration
///
/// ## Route
/// POST /api/fido/credential-options
///
/// ## Response
/// `PublicKeyCredentialCreationOptions`, ready for `navigator.credentials.create()`.
/// The credential must be submitted to `/api/fido/{key}/credential`, where the
/// key is the username, or for usernameless registration the base64url
/// encoding of `user.name`.
pub async fn credential_options(
    State(state): State<AppState>,
    Form(form): Form<CredentialOptionsForm>,
) -> AppResult<Json<Value>> {
    let options = registration::request_options(&state, form).await?;
    Ok(Json(options.public_key))
}

/// Finish a registration
///
/// ## Route
/// PUT /api/fido/:key/credential
pub async fn create_credential(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(response): Json<Value>,
) -> AppResult<Json<&'static str>> {
    registration::finish(&state, &key, &response).await?;
    Ok(Json("OK"))
}

/// Begin an assertion
///
/// ## Route
/// POST /api/fido/assertion-options
pub async fn assertion_options(
    State(state): State<AppState>,
    Form(form): Form<AssertionOptionsForm>,
) -> AppResult<Json<Value>> {
    Ok(Json(authentication::request_options(&state, form).await?))
}

/// Finish an assertion and sign the session in
///
/// ## Route
/// POST /api/fido/assertion
///
/// ## Response
/// The URL the browser should continue to, as a JSON string.
pub async fn make_assertion(
    State(state): State<AppState>,
    session: Session,
    Json(response): Json<Value>,
) -> AppResult<Json<String>> {
    let account = authentication::finish(&state, &response).await?;
    state.sessions.bind(&session, &account).await?;

    Ok(Json(state.login_redirect.clone()))
}
