//! # Error Handling
//!
//! Application-wide error type and its conversion into HTTP responses.
//!
//! Every ceremony failure ends up here. Handlers return `AppResult<T>` and the
//! `IntoResponse` impl below turns the error into a status code plus a JSON
//! string body of the form `"Error: <message>"`. Infrastructure errors are
//! logged in full and replaced by a generic message so nothing internal leaks
//! to the browser.

use crate::fido2::Fido2Error;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Application-wide error type
///
/// The ceremony variants (`ChallengeNotFound` through `UserNotFound`) map one
/// to one onto the failure modes of registration and assertion. The rest are
/// plumbing.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database errors (SQLx library errors)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed at startup
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A user or credential that was asked for by key does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// No pending ceremony under the correlation key: never issued, already
    /// consumed, or past its TTL. The client has to request new options.
    #[error("Challenge not found or expired, please request new options")]
    ChallengeNotFound,

    /// The credential id presented in an assertion is not registered
    #[error("Unknown credential")]
    UnknownCredential,

    /// The credential id is already registered (to this or another user)
    #[error("Credential is already registered")]
    DuplicateCredential,

    /// The authenticator reported a signature counter that did not advance.
    /// Treated as a possibly cloned authenticator.
    #[error("Signature counter did not increase (stored {stored}, presented {presented})")]
    CounterRegression { stored: u32, presented: u32 },

    /// The FIDO2 library rejected the client response
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// The credential verified but no application account matches its owner.
    /// Happens when the directory and the credential store diverge.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Malformed request data
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unexpected errors that shouldn't normally occur
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<Fido2Error> for AppError {
    fn from(err: Fido2Error) -> Self {
        match err {
            Fido2Error::Malformed(msg) => AppError::BadRequest(msg),
            Fido2Error::Verification(msg) => AppError::VerificationFailed(msg),
            Fido2Error::CounterRegression { stored, presented } => {
                AppError::CounterRegression { stored, presented }
            }
            Fido2Error::Options(msg) => AppError::Internal(msg),
            Fido2Error::State(e) => AppError::Internal(format!("Ceremony state: {}", e)),
        }
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(err: tower_sessions::session::Error) -> Self {
        AppError::Internal(format!("Session error: {}", err))
    }
}

impl AppError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_)
            | AppError::Migration(_)
            | AppError::Serialization(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) | AppError::UnknownCredential | AppError::UserNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::ChallengeNotFound => StatusCode::GONE,
            AppError::DuplicateCredential => StatusCode::CONFLICT,
            AppError::CounterRegression { .. } | AppError::VerificationFailed(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Convert AppError into an HTTP response
///
/// The body is a bare JSON string, which is what the browser scripts expect
/// from the ceremony endpoints (`"OK"` on success, `"Error: ..."` otherwise).
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            AppError::Database(e) => {
                // Log detailed error for debugging (not shown to user)
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Migration(e) => {
                tracing::error!("Migration error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {:?}", e);
                "Serialization error".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                "Internal server error".to_string()
            }
            // Ceremony errors are safe to show to users
            _ => self.to_string(),
        };

        (status, Json(format!("Error: {}", error_message))).into_response()
    }
}

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;
