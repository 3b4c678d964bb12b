//! JSON shapes of the credentials the browser posts back.
//!
//! Byte fields stay base64url strings here; callers decode what they need.
//! The library gets the untouched JSON, these views are only for the fields
//! the server reads itself.

use super::{decode, Fido2Error, Fido2Result};
use serde::{Deserialize, Serialize};

/// Result of `navigator.credentials.create()`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationResponse {
    pub id: String,

    #[serde(rename = "rawId")]
    pub raw_id: String,

    #[serde(rename = "type")]
    pub type_: String,

    pub response: AttestationPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationPayload {
    #[serde(rename = "attestationObject")]
    pub attestation_object: String,

    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,

    #[serde(default)]
    pub transports: Vec<String>,
}

/// Result of `navigator.credentials.get()`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionResponse {
    pub id: String,

    #[serde(rename = "rawId")]
    pub raw_id: String,

    #[serde(rename = "type")]
    pub type_: String,

    pub response: AssertionPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionPayload {
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: String,

    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,

    pub signature: String,

    /// Present for discoverable credentials
    #[serde(rename = "userHandle", default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

impl AssertionResponse {
    pub fn credential_id(&self) -> Fido2Result<Vec<u8>> {
        decode(&self.raw_id)
    }

    /// Signature counter from the authenticator data (bytes 33..37, big endian).
    pub fn sign_count(&self) -> Fido2Result<u32> {
        let auth_data = decode(&self.response.authenticator_data)?;
        auth_data
            .get(33..37)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_be_bytes)
            .ok_or_else(|| Fido2Error::Malformed("Authenticator data too short".to_string()))
    }

    /// Decoded user handle; an empty handle counts as absent.
    pub fn user_handle(&self) -> Fido2Result<Option<Vec<u8>>> {
        match self.response.user_handle.as_deref() {
            None | Some("") => Ok(None),
            Some(encoded) => decode(encoded).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_login_script_payload() {
        let response: AssertionResponse = serde_json::from_value(json!({
            "id": "AQID",
            "rawId": "AQID",
            "type": "public-key",
            "extensions": {},
            "response": {
                "authenticatorData": "AA",
                "clientDataJSON": "e30",
                "signature": "AA",
                "userHandle": ""
            }
        }))
        .unwrap();

        assert_eq!(response.credential_id().unwrap(), vec![1, 2, 3]);
        assert_eq!(response.user_handle().unwrap(), None);
        assert!(matches!(response.sign_count(), Err(Fido2Error::Malformed(_))));
    }

    #[test]
    fn reads_counter_from_authenticator_data() {
        let mut auth_data = vec![0u8; 32];
        auth_data.push(0x05);
        auth_data.extend_from_slice(&258u32.to_be_bytes());

        let response: AssertionResponse = serde_json::from_value(json!({
            "id": "AQID",
            "rawId": "AQID",
            "type": "public-key",
            "response": {
                "authenticatorData": crate::fido2::encode(&auth_data),
                "clientDataJSON": "e30",
                "signature": "AA"
            }
        }))
        .unwrap();

        assert_eq!(response.sign_count().unwrap(), 258);
    }

    #[test]
    fn transports_default_to_empty() {
        let response: AttestationResponse = serde_json::from_value(json!({
            "id": "AQID",
            "rawId": "AQID",
            "type": "public-key",
            "response": { "attestationObject": "oA", "clientDataJSON": "e30" }
        }))
        .unwrap();

        assert!(response.response.transports.is_empty());
    }
}
