//! # Session Binder
//!
//! Turns a verified assertion into a signed-in browser session.
//!
//! The session id is rotated on sign-in so an id planted before login cannot
//! be reused afterwards. The session then gets a fixed "remember me" expiry
//! instead of the layer's inactivity timeout.

use crate::directory::Account;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tower_sessions::{Expiry, Session};

/// Session key holding the [`SessionPrincipal`]
pub const PRINCIPAL_KEY: &str = "principal";

/// Default lifetime of a signed-in session
pub const DEFAULT_REMEMBER_ME: time::Duration = time::Duration::days(30);

/// Who a session belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPrincipal {
    pub subject_id: String,
    pub display_name: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SessionBinder {
    remember_me: time::Duration,
}

impl Default for SessionBinder {
    fn default() -> Self {
        Self::new(DEFAULT_REMEMBER_ME)
    }
}

impl SessionBinder {
    pub fn new(remember_me: time::Duration) -> Self {
        Self { remember_me }
    }

    /// Signs `account` into `session`.
    pub async fn bind(&self, session: &Session, account: &Account) -> AppResult<SessionPrincipal> {
        let expires = OffsetDateTime::now_utc()
            .checked_add(self.remember_me)
            .ok_or_else(|| AppError::Internal("Session expiry out of range".to_string()))?;
        let expires_at = DateTime::<Utc>::from_timestamp(expires.unix_timestamp(), 0)
            .ok_or_else(|| AppError::Internal("Session expiry out of range".to_string()))?;

        session.cycle_id().await?;
        session.set_expiry(Some(Expiry::AtDateTime(expires)));

        let principal = SessionPrincipal {
            subject_id: account.subject_id.clone(),
            display_name: account
                .display_name
                .clone()
                .unwrap_or_else(|| account.username.clone()),
            expires_at,
        };
        session.insert(PRINCIPAL_KEY, &principal).await?;

        tracing::info!(subject = %principal.subject_id, %expires_at, "Session bound");
        Ok(principal)
    }

    /// The principal of `session`, if it is signed in.
    pub async fn principal(&self, session: &Session) -> AppResult<Option<SessionPrincipal>> {
        Ok(session.get(PRINCIPAL_KEY).await?)
    }

    /// Signs the session out and removes it from the store.
    pub async fn clear(&self, session: &Session) -> AppResult<()> {
        session.flush().await?;
        Ok(())
    }
}
