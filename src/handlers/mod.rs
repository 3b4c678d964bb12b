//! # HTTP Request Handlers
//!
//! ## Submodules
//! - `fido`: the registration and assertion ceremony endpoints
//! - `health`: liveness ping
//! - `session`: who is signed in, and logout
//!
//! [`router`] assembles the API. The session layer is added by the caller,
//! so the binary can back it with SQLite and tests with memory.

pub mod fido;
pub mod health;
pub mod session;

use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};

/// All API routes, with state attached.
pub fn router(state: AppState) -> Router {
    let fido = Router::new()
        .route("/credential-options", post(fido::credential_options))
        .route("/:key/credential", put(fido::create_credential))
        .route("/assertion-options", post(fido::assertion_options))
        .route("/assertion", post(fido::make_assertion))
        .route("/ping", get(health::ping));

    Router::new()
        .nest("/api/fido", fido)
        .route("/api/session", get(session::session_info))
        .route("/api/logout", post(session::logout))
        .with_state(state)
}
