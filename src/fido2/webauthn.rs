//! `webauthn-rs` behind the [`Fido2`] trait.
//!
//! The library produces the options and keeps its own ceremony state; both
//! are serialized here and carried through the challenge cache as an
//! [`IssuedOptions`]. Preferences the library has no knob for (attestation
//! conveyance, attachment, resident key, extensions) are written into the
//! options JSON afterwards. User verification is only ever raised, since the
//! library verifies against the level it chose itself.
//!
//! An empty allow-list starts a discoverable ceremony: the authenticator
//! picks the credential and reports its user handle.

use super::attestation::AttestationMetadata;
use super::response::{AssertionResponse, AttestationResponse};
use super::{
    decode, merge_extensions, raise_user_verification, Fido2, Fido2Error, Fido2Result,
    IssuedOptions, RegistrationPreferences, UserVerification, VerifiedAssertion,
    VerifiedRegistration,
};
use crate::db::models::{StoredCredential, Transport, User};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use webauthn_rs::prelude::{
    CredentialID, DiscoverableAuthentication, DiscoverableKey, Passkey, PasskeyAuthentication,
    PasskeyRegistration, PublicKeyCredential, RegisterPublicKeyCredential, Url, Webauthn,
    WebauthnBuilder, WebauthnError,
};

/// Library state of a pending assertion
#[derive(Serialize, Deserialize)]
enum AssertionState {
    Allowed(PasskeyAuthentication),
    Discoverable(DiscoverableAuthentication),
}

pub struct WebauthnFido2 {
    webauthn: Webauthn,
}

impl WebauthnFido2 {
    /// Configures the relying party. `rp_origin` must be the full origin the
    /// browser sees, `rp_id` its effective domain.
    pub fn new(rp_id: &str, rp_origin: &str, rp_name: &str) -> Fido2Result<Self> {
        let origin = Url::parse(rp_origin)
            .map_err(|e| Fido2Error::Options(format!("Invalid RP origin '{}': {}", rp_origin, e)))?;

        let webauthn = WebauthnBuilder::new(rp_id, &origin)
            .map_err(options_error)?
            .rp_name(rp_name)
            .build()
            .map_err(options_error)?;

        Ok(Self { webauthn })
    }
}

impl Fido2 for WebauthnFido2 {
    fn build_registration_options(
        &self,
        user: &User,
        existing: &[StoredCredential],
        preferences: &RegistrationPreferences,
    ) -> Fido2Result<IssuedOptions> {
        let user_id = uuid::Uuid::from_slice(&user.handle)
            .map_err(|_| Fido2Error::Options("User handle is not 16 bytes".to_string()))?;

        let exclude: Vec<CredentialID> = existing
            .iter()
            .map(|c| CredentialID::from(c.id.clone()))
            .collect();
        let exclude = (!exclude.is_empty()).then_some(exclude);

        let (ccr, registration) = self
            .webauthn
            .start_passkey_registration(user_id, &user.name, user.display_or_name(), exclude)
            .map_err(options_error)?;

        let mut public_key = public_key_of(serde_json::to_value(&ccr)?)?;
        preferences.apply(&mut public_key);

        IssuedOptions::new(public_key, serde_json::to_vec(&registration)?)
    }

    fn verify_registration(
        &self,
        issued: &IssuedOptions,
        response: &Value,
    ) -> Fido2Result<VerifiedRegistration> {
        let registration: PasskeyRegistration = serde_json::from_slice(&issued.state)?;
        let credential: RegisterPublicKeyCredential = serde_json::from_value(response.clone())
            .map_err(|e| Fido2Error::Malformed(format!("Invalid attestation response: {}", e)))?;
        let raw: AttestationResponse = serde_json::from_value(response.clone())
            .map_err(|e| Fido2Error::Malformed(format!("Invalid attestation response: {}", e)))?;

        let passkey = self
            .webauthn
            .finish_passkey_registration(&credential, &registration)
            .map_err(verification_error)?;

        let attestation_object = decode(&raw.response.attestation_object)?;
        let metadata = AttestationMetadata::parse(&attestation_object)?;

        Ok(VerifiedRegistration {
            credential_id: metadata.credential_id,
            public_key: serde_json::to_vec(&passkey)?,
            sign_count: metadata.sign_count,
            transports: Transport::parse_list(&raw.response.transports),
            backup_eligible: metadata.backup_eligible,
            backed_up: metadata.backed_up,
            attestation_format: metadata.format,
            attestation_object,
            client_data_json: decode(&raw.response.client_data_json)?,
            aaguid: metadata.aaguid,
        })
    }

    fn build_assertion_options(
        &self,
        allowed: &[StoredCredential],
        user_verification: UserVerification,
    ) -> Fido2Result<IssuedOptions> {
        let (rcr, state) = if allowed.is_empty() {
            let (rcr, state) = self
                .webauthn
                .start_discoverable_authentication()
                .map_err(options_error)?;
            (rcr, AssertionState::Discoverable(state))
        } else {
            let passkeys = allowed
                .iter()
                .map(|c| serde_json::from_slice::<Passkey>(&c.public_key))
                .collect::<Result<Vec<_>, _>>()?;
            let (rcr, state) = self
                .webauthn
                .start_passkey_authentication(&passkeys)
                .map_err(options_error)?;
            (rcr, AssertionState::Allowed(state))
        };

        let mut public_key = public_key_of(serde_json::to_value(&rcr)?)?;
        raise_user_verification(&mut public_key, user_verification);
        merge_extensions(&mut public_key, json!({ "exts": true, "uvm": true }));

        IssuedOptions::new(public_key, serde_json::to_vec(&state)?)
    }

    fn verify_assertion(
        &self,
        issued: &IssuedOptions,
        response: &Value,
        stored: &StoredCredential,
    ) -> Fido2Result<VerifiedAssertion> {
        let state: AssertionState = serde_json::from_slice(&issued.state)?;
        let credential: PublicKeyCredential = serde_json::from_value(response.clone())
            .map_err(|e| Fido2Error::Malformed(format!("Invalid assertion response: {}", e)))?;
        let mut passkey: Passkey = serde_json::from_slice(&stored.public_key)?;

        let result = match state {
            AssertionState::Allowed(state) => self
                .webauthn
                .finish_passkey_authentication(&credential, &state),
            AssertionState::Discoverable(state) => self.webauthn.finish_discoverable_authentication(
                &credential,
                state,
                &[DiscoverableKey::from(&passkey)],
            ),
        }
        .map_err(|e| assertion_error(e, response, stored))?;

        // The passkey carries its own counter and backup state, which the
        // library checks against on the next assertion.
        if passkey.update_credential(&result).is_none() {
            return Err(Fido2Error::Verification(
                "Assertion was made with a different credential".to_string(),
            ));
        }

        Ok(VerifiedAssertion {
            public_key: serde_json::to_vec(&passkey)?,
            sign_count: result.counter(),
            backed_up: result.backup_state(),
            user_verified: result.user_verified(),
        })
    }
}

/// The inner `publicKey` member of a challenge response.
fn public_key_of(mut challenge: Value) -> Fido2Result<Value> {
    challenge
        .get_mut("publicKey")
        .map(Value::take)
        .ok_or_else(|| Fido2Error::Options("Challenge has no publicKey member".to_string()))
}

fn options_error(e: WebauthnError) -> Fido2Error {
    Fido2Error::Options(e.to_string())
}

fn verification_error(e: WebauthnError) -> Fido2Error {
    Fido2Error::Verification(e.to_string())
}

/// The library rejects a counter that does not advance past the one in the
/// passkey as a possible compromise. The counter it saw is read back out of
/// the (by then signature-checked) authenticator data.
fn assertion_error(e: WebauthnError, response: &Value, stored: &StoredCredential) -> Fido2Error {
    match e {
        WebauthnError::CredentialPossibleCompromise => {
            let presented = serde_json::from_value::<AssertionResponse>(response.clone())
                .map_err(|e| Fido2Error::Malformed(format!("Invalid assertion response: {}", e)))
                .and_then(|r| r.sign_count());
            match presented {
                Ok(presented) => Fido2Error::CounterRegression {
                    stored: stored.sign_count,
                    presented,
                },
                Err(e) => e,
            }
        }
        e => verification_error(e),
    }
}
