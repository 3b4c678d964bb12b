//! # Application State
//!
//! Everything the handlers share: the credential store, the two challenge
//! caches, the FIDO2 implementation, the user directory and the session
//! binder. Axum clones the state for every request, which only copies a pool
//! handle and a few `Arc`s.
//!
//! Nothing here is global. Tests build their own state with
//! [`AppState::from_parts`] around a scripted FIDO2 implementation.

use crate::challenges::ChallengeCache;
use crate::config::Config;
use crate::db::CredentialStore;
use crate::directory::{StaticDirectory, UserDirectory};
use crate::fido2::webauthn::WebauthnFido2;
use crate::fido2::Fido2;
use crate::session::SessionBinder;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: CredentialStore,

    /// Pending registrations, keyed by username (or encoded usernameless name)
    pub registrations: Arc<ChallengeCache>,

    /// Pending assertions, keyed by base64url challenge
    pub assertions: Arc<ChallengeCache>,

    pub fido2: Arc<dyn Fido2>,
    pub directory: Arc<dyn UserDirectory>,
    pub sessions: SessionBinder,

    /// Returned to the browser after a successful assertion
    pub login_redirect: String,
}

impl AppState {
    /// Initialize application state
    ///
    /// Connects to the database and runs migrations, configures the relying
    /// party and loads the user directory.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Database connection or migrations fail
    /// - The RP configuration is invalid (e.g., malformed origin URL)
    /// - The directory file exists but cannot be parsed
    pub async fn new(config: &Config) -> Result<Self> {
        let store = CredentialStore::connect(&config.database_url).await?;
        let fido2 = WebauthnFido2::new(&config.rp_id, &config.rp_origin, &config.rp_name)?;
        let directory = StaticDirectory::load(&config.directory_path).await?;
        if directory.is_empty() {
            tracing::warn!("User directory is empty; sign-in will fail for every account");
        }

        Ok(Self::from_parts(
            store,
            Arc::new(fido2),
            Arc::new(directory),
            config.challenge_ttl,
            SessionBinder::new(config.remember_me),
            config.login_redirect_url.clone(),
        ))
    }

    pub fn from_parts(
        store: CredentialStore,
        fido2: Arc<dyn Fido2>,
        directory: Arc<dyn UserDirectory>,
        challenge_ttl: Duration,
        sessions: SessionBinder,
        login_redirect: String,
    ) -> Self {
        Self {
            store,
            registrations: Arc::new(ChallengeCache::new("registration", challenge_ttl)),
            assertions: Arc::new(ChallengeCache::new("assertion", challenge_ttl)),
            fido2,
            directory,
            sessions,
            login_redirect,
        }
    }
}

/// In-memory state with the scripted FIDO2 implementation and a directory
/// holding `alice` and `bob`.
#[cfg(test)]
pub async fn test_state() -> AppState {
    use crate::challenges::DEFAULT_TTL;
    use crate::directory::Account;
    use crate::fido2::fake::FakeFido2;

    let directory = StaticDirectory::new(["alice", "bob"].map(|name| Account {
        subject_id: name.to_string(),
        username: name.to_string(),
        display_name: None,
    }));

    AppState::from_parts(
        CredentialStore::in_memory().await.unwrap(),
        Arc::new(FakeFido2),
        Arc::new(directory),
        DEFAULT_TTL,
        SessionBinder::default(),
        "https://localhost:8080/login".to_string(),
    )
}
