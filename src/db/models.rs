//! # Database Models
//!
//! Rows of the `users` and `credentials` tables and the types the rest of the
//! crate works with.
//!
//! SQLite has no unsigned or UUID columns, so credentials are read into a
//! `CredentialRow` first and converted into a [`StoredCredential`]. Timestamps
//! are RFC3339 strings, the way SQLite stores them as text.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A registrant
///
/// `name` is what the ceremonies look users up by. `handle` is the opaque
/// WebAuthn `user.id`: 16 random bytes, so it also parses as a UUID, which is
/// what `webauthn-rs` wants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub handle: Vec<u8>,
    pub name: String,
    pub display_name: Option<String>,
    /// RFC3339 timestamp
    pub created_at: String,
}

impl User {
    /// The name shown by authenticators: the display name when there is one.
    pub fn display_or_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// What `get_or_create_user` needs to create a user that doesn't exist yet
#[derive(Debug, Clone)]
pub struct NewUser {
    pub handle: Vec<u8>,
    pub display_name: Option<String>,
}

impl NewUser {
    /// A user with a fresh random handle.
    pub fn random(display_name: Option<String>) -> Self {
        Self {
            handle: Uuid::new_v4().into_bytes().to_vec(),
            display_name,
        }
    }
}

/// How the client can reach an authenticator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    Usb,
    Nfc,
    Ble,
    Internal,
    Hybrid,
    SmartCard,
}

impl Transport {
    /// Parses the `transports` hints of a client response into a set, in
    /// declaration order. Unknown values are dropped; browsers add new ones
    /// from time to time.
    pub fn parse_list(values: &[String]) -> Vec<Transport> {
        let transports: BTreeSet<Transport> = values
            .iter()
            .filter_map(|v| serde_json::from_value(serde_json::Value::String(v.clone())).ok())
            .collect();
        transports.into_iter().collect()
    }
}

/// A registered credential
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCredential {
    pub id: Vec<u8>,
    pub user_handle: Vec<u8>,

    /// Serialized library credential (public key and its parameters)
    pub public_key: Vec<u8>,

    /// 0 when the authenticator does not implement a counter
    pub sign_count: u32,

    pub transports: Vec<Transport>,
    pub backup_eligible: bool,
    pub backed_up: bool,

    // Attestation, kept for auditing
    pub attestation_format: String,
    pub attestation_object: Vec<u8>,
    pub attestation_client_data: Vec<u8>,
    pub aaguid: Uuid,

    pub registered_at: String,
    pub last_used_at: Option<String>,
}

impl StoredCredential {
    /// A credential as it is about to be inserted.
    pub fn new(id: Vec<u8>, user_handle: Vec<u8>, public_key: Vec<u8>, sign_count: u32) -> Self {
        Self {
            id,
            user_handle,
            public_key,
            sign_count,
            transports: Vec::new(),
            backup_eligible: false,
            backed_up: false,
            attestation_format: "none".to_string(),
            attestation_object: Vec::new(),
            attestation_client_data: Vec::new(),
            aaguid: Uuid::nil(),
            registered_at: Utc::now().to_rfc3339(),
            last_used_at: None,
        }
    }
}

/// A `credentials` row as SQLite returns it
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CredentialRow {
    pub id: Vec<u8>,
    pub user_handle: Vec<u8>,
    pub public_key: Vec<u8>,
    pub sign_count: i64,
    pub transports: String,
    pub backup_eligible: bool,
    pub backed_up: bool,
    pub attestation_format: String,
    pub attestation_object: Vec<u8>,
    pub attestation_client_data: Vec<u8>,
    pub aaguid: String,
    pub registered_at: String,
    pub last_used_at: Option<String>,
}

impl TryFrom<CredentialRow> for StoredCredential {
    type Error = crate::error::AppError;

    fn try_from(row: CredentialRow) -> Result<Self, Self::Error> {
        use crate::error::AppError;

        let sign_count = u32::try_from(row.sign_count).map_err(|_| {
            AppError::Internal(format!("Stored sign count {} out of range", row.sign_count))
        })?;
        let aaguid = Uuid::parse_str(&row.aaguid)
            .map_err(|e| AppError::Internal(format!("Stored AAGUID is invalid: {}", e)))?;

        Ok(Self {
            id: row.id,
            user_handle: row.user_handle,
            public_key: row.public_key,
            sign_count,
            transports: serde_json::from_str(&row.transports)?,
            backup_eligible: row.backup_eligible,
            backed_up: row.backed_up,
            attestation_format: row.attestation_format,
            attestation_object: row.attestation_object,
            attestation_client_data: row.attestation_client_data,
            aaguid,
            registered_at: row.registered_at,
            last_used_at: row.last_used_at,
        })
    }
}
