//! # Session Handlers
//!
//! Lets the pages ask who is signed in, and sign out.

use crate::error::AppResult;
use crate::state::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use tower_sessions::Session;

/// ## Route
/// GET /api/session
///
/// ## Response
/// ```json
/// { "authenticated": true, "subject_id": "alice", "display_name": "Alice", "expires_at": "..." }
/// ```
/// or `{ "authenticated": false }`.
pub async fn session_info(State(state): State<AppState>, session: Session) -> AppResult<Json<Value>> {
    match state.sessions.principal(&session).await? {
        Some(principal) => Ok(Json(json!({
            "authenticated": true,
            "subject_id": principal.subject_id,
            "display_name": principal.display_name,
            "expires_at": principal.expires_at,
        }))),
        None => Ok(Json(json!({ "authenticated": false }))),
    }
}

/// ## Route
/// POST /api/logout
pub async fn logout(State(state): State<AppState>, session: Session) -> AppResult<Json<Value>> {
    state.sessions.clear(&session).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Logged out successfully"
    })))
}
