//! Audit metadata from an attestation object.
//!
//! `webauthn-rs` verifies the attestation but only hands back an opaque
//! passkey. The stored credential also records the attestation format, the
//! AAGUID, the initial counter and the backup flags, so those are read here
//! from the CBOR object after verification succeeded.

use super::{Fido2Error, Fido2Result};
use ciborium::Value;
use uuid::Uuid;

// authenticatorData layout: rpIdHash(32) flags(1) signCount(4) [aaguid(16) credIdLen(2) credId ...]
const FLAGS_OFFSET: usize = 32;
const COUNTER_OFFSET: usize = 33;
const AAGUID_OFFSET: usize = 37;
const CRED_ID_LEN_OFFSET: usize = 53;
const CRED_ID_OFFSET: usize = 55;

const FLAG_BACKUP_ELIGIBLE: u8 = 0x08;
const FLAG_BACKED_UP: u8 = 0x10;
const FLAG_ATTESTED_DATA: u8 = 0x40;

#[derive(Debug, Clone, PartialEq)]
pub struct AttestationMetadata {
    /// `fmt` of the attestation statement (`none`, `packed`, `tpm`, ...)
    pub format: String,
    pub credential_id: Vec<u8>,
    pub sign_count: u32,
    pub backup_eligible: bool,
    pub backed_up: bool,
    /// Authenticator model; all zeroes for `none` attestation on most platforms
    pub aaguid: Uuid,
}

impl AttestationMetadata {
    pub fn parse(attestation_object: &[u8]) -> Fido2Result<Self> {
        let value: Value = ciborium::from_reader(attestation_object)
            .map_err(|e| malformed(format!("Failed to parse attestation object: {}", e)))?;

        let map = value
            .as_map()
            .ok_or_else(|| malformed("Attestation object is not a map"))?;
        let field = |name: &str| {
            map.iter()
                .find(|(k, _)| k.as_text() == Some(name))
                .map(|(_, v)| v)
        };

        let format = field("fmt")
            .and_then(Value::as_text)
            .ok_or_else(|| malformed("Missing fmt in attestation"))?
            .to_string();

        let auth_data = field("authData")
            .and_then(Value::as_bytes)
            .ok_or_else(|| malformed("Missing authData in attestation"))?;

        if auth_data.len() < CRED_ID_OFFSET {
            return Err(malformed("Authenticator data too short"));
        }

        let flags = auth_data[FLAGS_OFFSET];
        if flags & FLAG_ATTESTED_DATA == 0 {
            return Err(malformed("No attested credential data present"));
        }

        let sign_count = u32::from_be_bytes([
            auth_data[COUNTER_OFFSET],
            auth_data[COUNTER_OFFSET + 1],
            auth_data[COUNTER_OFFSET + 2],
            auth_data[COUNTER_OFFSET + 3],
        ]);

        let aaguid = Uuid::from_slice(&auth_data[AAGUID_OFFSET..CRED_ID_LEN_OFFSET])
            .map_err(|e| malformed(format!("Invalid AAGUID: {}", e)))?;

        let cred_id_len = u16::from_be_bytes([
            auth_data[CRED_ID_LEN_OFFSET],
            auth_data[CRED_ID_LEN_OFFSET + 1],
        ]) as usize;
        let cred_id_end = CRED_ID_OFFSET + cred_id_len;
        if auth_data.len() < cred_id_end {
            return Err(malformed("Authenticator data too short for credential id"));
        }

        Ok(Self {
            format,
            credential_id: auth_data[CRED_ID_OFFSET..cred_id_end].to_vec(),
            sign_count,
            backup_eligible: flags & FLAG_BACKUP_ELIGIBLE != 0,
            backed_up: flags & FLAG_BACKED_UP != 0,
            aaguid,
        })
    }
}

fn malformed(msg: impl Into<String>) -> Fido2Error {
    Fido2Error::Malformed(msg.into())
}
