//! Scripted [`Fido2`] for ceremony tests.
//!
//! Options look like the real thing and the challenge is checked through
//! `clientDataJSON`, but there is no cryptography: a credential's "public key"
//! is a byte string derived from its id and the assertion "signature" has to
//! equal it. Counter and flags come from the authenticator data bytes, so
//! tests control them directly.

use super::attestation::AttestationMetadata;
use super::client_data::ClientData;
use super::response::{AssertionResponse, AttestationResponse};
use super::{
    decode, encode, merge_extensions, raise_user_verification, Fido2, Fido2Error, Fido2Result,
    IssuedOptions, RegistrationPreferences, UserVerification, VerifiedAssertion,
    VerifiedRegistration,
};
use crate::db::models::{StoredCredential, Transport, User};
use ciborium::Value as Cbor;
use serde_json::{json, Value};
use uuid::Uuid;

pub const ORIGIN: &str = "http://localhost:8080";

const FLAG_UP: u8 = 0x01;
const FLAG_UV: u8 = 0x04;
const FLAG_AT: u8 = 0x40;

#[derive(Debug, Default)]
pub struct FakeFido2;

impl Fido2 for FakeFido2 {
    fn build_registration_options(
        &self,
        user: &User,
        existing: &[StoredCredential],
        preferences: &RegistrationPreferences,
    ) -> Fido2Result<IssuedOptions> {
        let exclude: Vec<Value> = existing
            .iter()
            .map(|c| json!({ "type": "public-key", "id": encode(&c.id) }))
            .collect();

        let mut public_key = json!({
            "rp": { "id": "localhost", "name": "FIDO2 Server" },
            "user": {
                "id": encode(&user.handle),
                "name": user.name,
                "displayName": user.display_or_name(),
            },
            "challenge": encode(&fresh_challenge()),
            "pubKeyCredParams": [{ "type": "public-key", "alg": -7 }],
            "timeout": 60000,
            "excludeCredentials": exclude,
            "authenticatorSelection": {},
        });
        preferences.apply(&mut public_key);

        IssuedOptions::new(public_key, b"registration".to_vec())
    }

    fn verify_registration(
        &self,
        issued: &IssuedOptions,
        response: &Value,
    ) -> Fido2Result<VerifiedRegistration> {
        let response: AttestationResponse = serde_json::from_value(response.clone())
            .map_err(|e| Fido2Error::Malformed(e.to_string()))?;
        let client_data_json = decode(&response.response.client_data_json)?;
        check_client_data(&client_data_json, "webauthn.create", issued)?;

        let attestation_object = decode(&response.response.attestation_object)?;
        let metadata = AttestationMetadata::parse(&attestation_object)?;

        Ok(VerifiedRegistration {
            public_key: public_key_for(&metadata.credential_id),
            credential_id: metadata.credential_id,
            sign_count: metadata.sign_count,
            transports: Transport::parse_list(&response.response.transports),
            backup_eligible: metadata.backup_eligible,
            backed_up: metadata.backed_up,
            attestation_format: metadata.format,
            attestation_object,
            client_data_json,
            aaguid: metadata.aaguid,
        })
    }

    fn build_assertion_options(
        &self,
        allowed: &[StoredCredential],
        user_verification: UserVerification,
    ) -> Fido2Result<IssuedOptions> {
        let allow: Vec<Value> = allowed
            .iter()
            .map(|c| json!({ "type": "public-key", "id": encode(&c.id) }))
            .collect();

        let mut public_key = json!({
            "challenge": encode(&fresh_challenge()),
            "timeout": 60000,
            "rpId": "localhost",
            "allowCredentials": allow,
        });
        raise_user_verification(&mut public_key, user_verification);
        merge_extensions(&mut public_key, json!({ "exts": true, "uvm": true }));

        IssuedOptions::new(public_key, b"assertion".to_vec())
    }

    fn verify_assertion(
        &self,
        issued: &IssuedOptions,
        response: &Value,
        stored: &StoredCredential,
    ) -> Fido2Result<VerifiedAssertion> {
        let response: AssertionResponse = serde_json::from_value(response.clone())
            .map_err(|e| Fido2Error::Malformed(e.to_string()))?;
        check_client_data(
            &decode(&response.response.client_data_json)?,
            "webauthn.get",
            issued,
        )?;

        if decode(&response.response.signature)? != stored.public_key {
            return Err(Fido2Error::Verification("Signature mismatch".to_string()));
        }

        let sign_count = response.sign_count()?;
        let flags = decode(&response.response.authenticator_data)?[32];

        // Same rule the library applies against its own copy of the counter
        if sign_count <= stored.sign_count && !(sign_count == 0 && stored.sign_count == 0) {
            return Err(Fido2Error::CounterRegression {
                stored: stored.sign_count,
                presented: sign_count,
            });
        }

        Ok(VerifiedAssertion {
            public_key: stored.public_key.clone(),
            sign_count,
            backed_up: flags & 0x10 != 0,
            user_verified: flags & FLAG_UV != 0,
        })
    }
}

fn fresh_challenge() -> Vec<u8> {
    let mut challenge = Uuid::new_v4().into_bytes().to_vec();
    challenge.extend_from_slice(Uuid::new_v4().as_bytes());
    challenge
}

fn check_client_data(bytes: &[u8], expected_type: &str, issued: &IssuedOptions) -> Fido2Result<()> {
    let client_data = ClientData::from_bytes(bytes)?;
    if client_data.type_ != expected_type {
        return Err(Fido2Error::Verification(format!(
            "Unexpected client data type {}",
            client_data.type_
        )));
    }
    if client_data.challenge_bytes()? != issued.challenge {
        return Err(Fido2Error::Verification("Challenge mismatch".to_string()));
    }

    let origin = serde_json::from_slice::<Value>(bytes)
        .ok()
        .and_then(|v| v.get("origin").and_then(Value::as_str).map(str::to_string));
    if origin.as_deref() != Some(ORIGIN) {
        return Err(Fido2Error::Verification("Origin mismatch".to_string()));
    }
    Ok(())
}

/// The "public key" the fake assigns to a credential id.
pub fn public_key_for(credential_id: &[u8]) -> Vec<u8> {
    [b"key:".as_slice(), credential_id].concat()
}

fn client_data_json(kind: &str, challenge: &[u8]) -> String {
    encode(
        json!({ "type": kind, "challenge": encode(challenge), "origin": ORIGIN })
            .to_string()
            .as_bytes(),
    )
}

fn auth_data(flags: u8, counter: u32) -> Vec<u8> {
    let mut data = vec![0u8; 32];
    data.push(flags);
    data.extend_from_slice(&counter.to_be_bytes());
    data
}

/// A `navigator.credentials.create()` result answering `challenge`.
pub fn attestation_for_challenge(challenge: &[u8], credential_id: &[u8]) -> Value {
    let mut data = auth_data(FLAG_UP | FLAG_UV | FLAG_AT | 0x08, 0);
    data.extend_from_slice(&[0u8; 16]);
    data.extend_from_slice(&(credential_id.len() as u16).to_be_bytes());
    data.extend_from_slice(credential_id);

    let object = Cbor::Map(vec![
        (Cbor::Text("fmt".to_string()), Cbor::Text("none".to_string())),
        (Cbor::Text("attStmt".to_string()), Cbor::Map(Vec::new())),
        (Cbor::Text("authData".to_string()), Cbor::Bytes(data)),
    ]);
    let mut attestation_object = Vec::new();
    ciborium::into_writer(&object, &mut attestation_object).unwrap();

    json!({
        "id": encode(credential_id),
        "rawId": encode(credential_id),
        "type": "public-key",
        "response": {
            "attestationObject": encode(&attestation_object),
            "clientDataJSON": client_data_json("webauthn.create", challenge),
            "transports": ["internal", "hybrid"],
        },
        "extensions": {},
    })
}

/// A `navigator.credentials.get()` result answering `challenge`.
pub fn assertion(
    challenge: &[u8],
    credential_id: &[u8],
    user_handle: Option<&[u8]>,
    counter: u32,
) -> Value {
    json!({
        "id": encode(credential_id),
        "rawId": encode(credential_id),
        "type": "public-key",
        "response": {
            "authenticatorData": encode(&auth_data(FLAG_UP | FLAG_UV, counter)),
            "clientDataJSON": client_data_json("webauthn.get", challenge),
            "signature": encode(&public_key_for(credential_id)),
            "userHandle": user_handle.map(encode),
        },
        "extensions": {},
    })
}
