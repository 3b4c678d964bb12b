//! # Passkey Identity Provider
//!
//! WebAuthn/FIDO2 relying party backend for an OpenID Connect identity
//! provider. Browsers register passkeys and sign in with them; a successful
//! assertion becomes a signed-in session that the identity provider's
//! authorization flow picks up.
//!
//! ## Key Concepts
//! - **Ceremony**: one registration or assertion, from options to response
//! - **Challenge cache**: issued options waiting for the browser's answer
//! - **Credential store**: users and their public keys, in SQLite

mod challenges;
mod config;
mod db;
mod directory;
mod error;
mod fido2;
mod handlers;
mod session;
mod state;
mod webauthn;

use crate::challenges::ChallengeCache;
use crate::config::Config;
use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use time::Duration as SessionDuration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: info for dependencies, debug for this crate. RUST_LOG overrides.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,passkey_idp=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded: {:?}", config);

    let app_state = AppState::new(&config).await?;
    tracing::info!("Application state initialized");

    // Pending ceremonies are also checked for expiry on take; the sweep only
    // bounds memory held by abandoned ones.
    spawn_challenge_sweep(
        vec![app_state.registrations.clone(), app_state.assertions.clone()],
        config.challenge_sweep_interval,
    );

    // Sessions live in the credential database
    let session_store = SqliteStore::new(app_state.store.pool().clone());
    session_store.migrate().await?;

    // Anonymous sessions time out after a day of inactivity; signing in
    // replaces this with the remember-me expiry.
    let session_layer = SessionManagerLayer::new(session_store)
        .with_expiry(Expiry::OnInactivity(SessionDuration::hours(24)));

    // TODO: restrict to the configured RP origin once the login pages are served from it.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = handlers::router(app_state)
        // Login and registration pages
        .fallback_service(ServeDir::new("static"))
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let bind_addr = config.bind_address();
    tracing::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_challenge_sweep(caches: Vec<Arc<ChallengeCache>>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            for cache in &caches {
                let removed = cache.purge_expired();
                if removed > 0 {
                    tracing::debug!(
                        kind = cache.kind(),
                        removed,
                        pending = cache.len(),
                        "Purged expired challenges"
                    );
                }
            }
        }
    });
}
