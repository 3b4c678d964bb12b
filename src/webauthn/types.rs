//! # Ceremony Request Types
//!
//! Options requests arrive as form posts from the login and registration
//! pages. Every field is optional and an empty value counts as absent,
//! because the pages always send every field.
//!
//! The final ceremony responses are not modelled here: they are passed on as
//! raw JSON (see `fido2::response` for the fields the server reads itself).

use crate::fido2::{
    AttestationConveyance, AuthenticatorAttachment, RegistrationPreferences, ResidentKey,
    UserVerification,
};
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::{Deserialize, Deserializer};

/// Form body of `POST /api/fido/credential-options`
///
/// ## Example
/// ```text
/// username=alice&displayName=Alice+Smith&attType=none&authType=platform&userVerification=preferred&residentKey=
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct CredentialOptionsForm {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub username: Option<String>,

    #[serde(default, rename = "displayName", deserialize_with = "empty_as_none")]
    pub display_name: Option<String>,

    #[serde(
        default,
        rename = "attestationType",
        alias = "attType",
        deserialize_with = "empty_as_none"
    )]
    pub attestation: Option<AttestationConveyance>,

    #[serde(
        default,
        rename = "authenticator",
        alias = "authType",
        deserialize_with = "empty_as_none"
    )]
    pub attachment: Option<AuthenticatorAttachment>,

    #[serde(default, rename = "userVerification", deserialize_with = "empty_as_none")]
    pub user_verification: Option<UserVerification>,

    #[serde(default, rename = "residentKey", deserialize_with = "empty_as_none")]
    pub resident_key: Option<ResidentKey>,
}

impl CredentialOptionsForm {
    pub fn preferences(&self) -> RegistrationPreferences {
        RegistrationPreferences {
            attestation: self.attestation,
            attachment: self.attachment,
            user_verification: self.user_verification,
            resident_key: self.resident_key,
        }
    }
}

/// Form body of `POST /api/fido/assertion-options`
#[derive(Debug, Default, Deserialize)]
pub struct AssertionOptionsForm {
    /// Absent for discoverable (usernameless) sign-in
    #[serde(default, deserialize_with = "empty_as_none")]
    pub username: Option<String>,

    #[serde(default, rename = "userVerification", deserialize_with = "empty_as_none")]
    pub user_verification: Option<UserVerification>,
}

/// Deserializes an optional form value, treating `""` as missing.
fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => {
            let value: serde::de::value::StringDeserializer<D::Error> =
                value.trim().to_string().into_deserializer();
            T::deserialize(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse<T: DeserializeOwned>(body: &str) -> T {
        serde_urlencoded::from_str(body).unwrap()
    }

    #[test]
    fn registration_form_with_short_aliases() {
        let form: CredentialOptionsForm = parse(
            "username=alice&displayName=Alice+Smith&attType=direct&authType=cross-platform\
             &userVerification=required&residentKey=preferred",
        );

        assert_eq!(form.username.as_deref(), Some("alice"));
        assert_eq!(form.display_name.as_deref(), Some("Alice Smith"));
        assert_eq!(form.attestation, Some(AttestationConveyance::Direct));
        assert_eq!(form.attachment, Some(AuthenticatorAttachment::CrossPlatform));
        assert_eq!(form.user_verification, Some(UserVerification::Required));
        assert_eq!(form.resident_key, Some(ResidentKey::Preferred));
    }

    #[test]
    fn long_field_names_are_accepted() {
        let form: CredentialOptionsForm = parse("attestationType=indirect&authenticator=platform");
        assert_eq!(form.attestation, Some(AttestationConveyance::Indirect));
        assert_eq!(form.attachment, Some(AuthenticatorAttachment::Platform));
    }

    #[test]
    fn empty_values_are_absent() {
        let form: CredentialOptionsForm =
            parse("username=&displayName=&attType=&authType=&userVerification=&residentKey=");
        assert!(form.username.is_none());
        assert!(form.display_name.is_none());
        assert!(form.attestation.is_none());
        assert!(form.attachment.is_none());

        let form: AssertionOptionsForm = parse("");
        assert!(form.username.is_none());
        assert!(form.user_verification.is_none());
    }

    #[test]
    fn unknown_enum_value_is_rejected() {
        let result: Result<CredentialOptionsForm, _> =
            serde_urlencoded::from_str("userVerification=sometimes");
        assert!(result.is_err());
    }
}
