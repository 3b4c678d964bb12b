//! # FIDO2 Verification Abstraction
//!
//! The ceremony orchestrator never touches CBOR, COSE keys or signatures
//! itself. It talks to a [`Fido2`] implementation through four calls:
//!
//! 1. `build_registration_options` / `build_assertion_options` produce the
//!    options object sent to the browser together with an opaque, serialized
//!    library state.
//! 2. `verify_registration` / `verify_assertion` check the browser's response
//!    against that state.
//!
//! The production implementation is [`webauthn::WebauthnFido2`], a thin
//! adapter over `webauthn-rs`.
//!
//! ## Submodules
//! - `attestation`: reads audit metadata out of a verified attestation object
//! - `client_data`: decodes `clientDataJSON`
//! - `response`: the JSON shapes the browser scripts submit
//! - `webauthn`: the `webauthn-rs` backed implementation

pub mod attestation;
pub mod client_data;
pub mod response;
pub mod webauthn;

#[cfg(test)]
pub mod fake;

use crate::db::models::{StoredCredential, Transport, User};
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a FIDO2 implementation
#[derive(Error, Debug)]
pub enum Fido2Error {
    /// Options could not be generated (bad RP configuration, unusable user handle)
    #[error("Options error: {0}")]
    Options(String),

    /// The client response failed a protocol or cryptographic check
    #[error("{0}")]
    Verification(String),

    /// The client response could not be decoded at all
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Signature checked out but the authenticator's counter did not advance
    /// past the library's record of it
    #[error("Signature counter did not increase (stored {stored}, presented {presented})")]
    CounterRegression { stored: u32, presented: u32 },

    /// Stored ceremony state could not be (de)serialized
    #[error("Ceremony state error: {0}")]
    State(#[from] serde_json::Error),
}

pub type Fido2Result<T> = Result<T, Fido2Error>;

/// Options handed to the client, plus what the server needs to finish the
/// ceremony later.
#[derive(Debug, Clone)]
pub struct IssuedOptions {
    /// Raw challenge bytes embedded in `public_key`
    pub challenge: Vec<u8>,

    /// The `PublicKeyCredentialCreationOptions` / `PublicKeyCredentialRequestOptions`
    /// object exactly as it goes over the wire
    pub public_key: Value,

    /// Library-specific ceremony state, serialized
    pub state: Vec<u8>,
}

impl IssuedOptions {
    /// Wraps a wire options object, pulling the challenge bytes out of it.
    pub fn new(public_key: Value, state: Vec<u8>) -> Fido2Result<Self> {
        let challenge = public_key
            .get("challenge")
            .and_then(Value::as_str)
            .ok_or_else(|| Fido2Error::Options("Options carry no challenge".to_string()))
            .and_then(decode)?;

        Ok(Self {
            challenge,
            public_key,
            state,
        })
    }

    /// The `user.id` of creation options, decoded.
    pub fn user_handle(&self) -> Option<Vec<u8>> {
        self.public_key
            .pointer("/user/id")
            .and_then(Value::as_str)
            .and_then(|id| decode(id).ok())
    }
}

/// What a successful registration yields, ready to be stored.
#[derive(Debug, Clone)]
pub struct VerifiedRegistration {
    pub credential_id: Vec<u8>,
    pub public_key: Vec<u8>,
    pub sign_count: u32,
    pub transports: Vec<Transport>,
    pub backup_eligible: bool,
    pub backed_up: bool,
    pub attestation_format: String,
    pub attestation_object: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub aaguid: Uuid,
}

/// What a successful assertion yields.
#[derive(Debug, Clone)]
pub struct VerifiedAssertion {
    /// Stored public key material brought up to date with this assertion
    /// (counter, backup state); written back with the counter
    pub public_key: Vec<u8>,
    pub sign_count: u32,
    pub backed_up: bool,
    pub user_verified: bool,
}

/// The FIDO2 library seam.
///
/// Implementations are synchronous: verification is bounded CPU work and runs
/// inside the request future. Dropping that future (client gone) is harmless
/// because the orchestrator takes the pending challenge before calling in and
/// only writes to the store afterwards.
pub trait Fido2: Send + Sync {
    fn build_registration_options(
        &self,
        user: &User,
        existing: &[StoredCredential],
        preferences: &RegistrationPreferences,
    ) -> Fido2Result<IssuedOptions>;

    fn verify_registration(
        &self,
        issued: &IssuedOptions,
        response: &Value,
    ) -> Fido2Result<VerifiedRegistration>;

    fn build_assertion_options(
        &self,
        allowed: &[StoredCredential],
        user_verification: UserVerification,
    ) -> Fido2Result<IssuedOptions>;

    fn verify_assertion(
        &self,
        issued: &IssuedOptions,
        response: &Value,
        stored: &StoredCredential,
    ) -> Fido2Result<VerifiedAssertion>;
}

// Ceremony preferences, spelled the way WebAuthn JSON spells them.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyance {
    #[default]
    None,
    Indirect,
    Direct,
    Enterprise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorAttachment {
    Platform,
    CrossPlatform,
}

/// Ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerification {
    Discouraged,
    Preferred,
    Required,
}

impl UserVerification {
    fn from_wire(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidentKey {
    Discouraged,
    Preferred,
    Required,
}

/// Optional knobs a client may send with a registration options request.
#[derive(Debug, Clone, Default)]
pub struct RegistrationPreferences {
    pub attestation: Option<AttestationConveyance>,
    pub attachment: Option<AuthenticatorAttachment>,
    pub user_verification: Option<UserVerification>,
    pub resident_key: Option<ResidentKey>,
}

impl RegistrationPreferences {
    /// Writes these preferences into a creation options object.
    ///
    /// Absent values fall back to WebAuthn defaults: attestation `none`, user
    /// verification `preferred`, resident key `discouraged`, no attachment.
    /// User verification is never lowered below what `public_key` already asks
    /// for, since that is the level the library will verify against.
    pub fn apply(&self, public_key: &mut Value) {
        public_key["attestation"] = json!(self.attestation.unwrap_or_default());

        let selection = &mut public_key["authenticatorSelection"];
        match self.attachment {
            Some(attachment) => selection["authenticatorAttachment"] = json!(attachment),
            None => {
                if let Some(map) = selection.as_object_mut() {
                    map.remove("authenticatorAttachment");
                }
            }
        }

        let resident_key = self.resident_key.unwrap_or(ResidentKey::Discouraged);
        selection["residentKey"] = json!(resident_key);
        selection["requireResidentKey"] = json!(resident_key == ResidentKey::Required);

        raise_user_verification(
            selection,
            self.user_verification.unwrap_or(UserVerification::Preferred),
        );

        merge_extensions(
            public_key,
            json!({ "exts": true, "uvm": true, "credProps": true }),
        );
    }
}

/// Sets `userVerification` on `target` to `requested`, or leaves the existing
/// value if that one is stricter.
pub fn raise_user_verification(target: &mut Value, requested: UserVerification) {
    let floor = target
        .get("userVerification")
        .and_then(UserVerification::from_wire)
        .unwrap_or(UserVerification::Discouraged);
    target["userVerification"] = json!(requested.max(floor));
}

/// Adds `extra` to the `extensions` object of an options structure.
pub fn merge_extensions(public_key: &mut Value, extra: Value) {
    let extensions = &mut public_key["extensions"];
    if !extensions.is_object() {
        *extensions = json!({});
    }
    if let (Some(target), Value::Object(extra)) = (extensions.as_object_mut(), extra) {
        target.extend(extra);
    }
}

/// base64url without padding, the WebAuthn wire encoding for byte fields
pub fn encode(bytes: &[u8]) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Decodes base64url, tolerating trailing padding.
pub fn decode(text: &str) -> Fido2Result<Vec<u8>> {
    BASE64_URL_SAFE_NO_PAD
        .decode(text.trim_end_matches('='))
        .map_err(|e| Fido2Error::Malformed(format!("Invalid base64url: {}", e)))
}
