//! # Liveness Check

/// ## Route
/// GET /api/fido/ping
pub async fn ping() -> &'static str {
    "Pong!"
}
