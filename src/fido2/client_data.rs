//! Decoding of `clientDataJSON`.
//!
//! The assertion flow needs the challenge before it knows which pending
//! ceremony the response belongs to, so this is read ahead of verification.
//! Nothing here is trusted until the library has checked the signature.

use super::{decode, Fido2Error, Fido2Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ClientData {
    /// `webauthn.create` or `webauthn.get`
    #[serde(rename = "type")]
    pub type_: String,

    /// base64url challenge as echoed by the browser
    pub challenge: String,
}

impl ClientData {
    pub fn from_bytes(bytes: &[u8]) -> Fido2Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Fido2Error::Malformed(format!("Invalid client data JSON: {}", e)))
    }

    /// Parses the base64url `clientDataJSON` field of a client response.
    pub fn from_base64url(encoded: &str) -> Fido2Result<Self> {
        Self::from_bytes(&decode(encoded)?)
    }

    pub fn challenge_bytes(&self) -> Fido2Result<Vec<u8>> {
        decode(&self.challenge)
    }
}
