//! Mock WebAuthn primitives.
//!
//! Defines a tiny JSON wire format standing in for real attestation and
//! assertion payloads, with builders so tests can mint well-formed (or
//! deliberately broken) responses. Signatures follow a fixed convention:
//! a signature is valid iff it equals `SHA256(public_key || message)`.

use crate::error::{AuthError, Result};
use crate::providers::passkey::{ParsedAssertion, ParsedAttestation, PasskeyCrypto};
use crate::store::records::CoseAlgorithm;
use crate::utils::{base64url, base64url_decode, sha256};
use crate::BoxFuture;
use serde::Deserialize;

/// Deterministic [`PasskeyCrypto`] implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockPasskeyCrypto;

impl MockPasskeyCrypto {
    /// Create the mock.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Build clientDataJSON bytes for a ceremony.
    #[must_use]
    pub fn client_data(ceremony_type: &str, challenge: &str, origin: &str) -> Vec<u8> {
        serde_json::json!({
            "type": ceremony_type,
            "challenge": challenge,
            "origin": origin,
            "crossOrigin": false,
        })
        .to_string()
        .into_bytes()
    }

    /// Authenticator data bytes: `rpIdHash || flags || signCount`.
    #[must_use]
    pub fn authenticator_data(rp_id: &str, user_present: bool, sign_count: u32) -> Vec<u8> {
        let mut data = sha256(rp_id.as_bytes()).to_vec();
        data.push(if user_present { 0x05 } else { 0x04 });
        data.extend_from_slice(&sign_count.to_be_bytes());
        data
    }

    /// The valid signature for a message under the mock convention.
    #[must_use]
    pub fn sign(public_key: &[u8], message: &[u8]) -> Vec<u8> {
        let mut input = public_key.to_vec();
        input.extend_from_slice(message);
        sha256(&input).to_vec()
    }

    /// Build a registration response.
    #[must_use]
    pub fn attestation_response(
        credential_id: &str,
        public_key: &[u8],
        alg: i64,
        challenge: &str,
        origin: &str,
        rp_id: &str,
    ) -> String {
        serde_json::json!({
            "credentialId": credential_id,
            "publicKey": base64url(public_key),
            "alg": alg,
            "clientDataJSON": base64url(&Self::client_data("webauthn.create", challenge, origin)),
            "rpId": rp_id,
            "signCount": 0,
            "userPresent": true,
            "userVerified": true,
            "backedUp": false,
            "multiDevice": false,
            "transports": ["internal"],
        })
        .to_string()
    }

    /// Build a correctly signed authentication response.
    #[must_use]
    pub fn assertion_response(
        credential_id: &str,
        public_key: &[u8],
        challenge: &str,
        origin: &str,
        rp_id: &str,
        sign_count: u32,
    ) -> String {
        let client_data = Self::client_data("webauthn.get", challenge, origin);
        let authenticator_data = Self::authenticator_data(rp_id, true, sign_count);
        let mut message = authenticator_data.clone();
        message.extend_from_slice(&sha256(&client_data));
        let signature = Self::sign(public_key, &message);
        serde_json::json!({
            "credentialId": credential_id,
            "clientDataJSON": base64url(&client_data),
            "authenticatorData": base64url(&authenticator_data),
            "signature": base64url(&signature),
            "userVerified": true,
        })
        .to_string()
    }
}

#[derive(Deserialize)]
struct RawAttestation {
    #[serde(rename = "credentialId")]
    credential_id: String,
    #[serde(rename = "publicKey")]
    public_key: String,
    alg: i64,
    #[serde(rename = "clientDataJSON")]
    client_data_json: String,
    #[serde(rename = "rpId")]
    rp_id: String,
    #[serde(rename = "signCount")]
    sign_count: u32,
    #[serde(rename = "userPresent")]
    user_present: bool,
    #[serde(rename = "userVerified")]
    user_verified: bool,
    #[serde(rename = "backedUp", default)]
    backed_up: bool,
    #[serde(rename = "multiDevice", default)]
    multi_device: bool,
    transports: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RawAssertion {
    #[serde(rename = "credentialId")]
    credential_id: String,
    #[serde(rename = "clientDataJSON")]
    client_data_json: String,
    #[serde(rename = "authenticatorData")]
    authenticator_data: String,
    signature: String,
    #[serde(rename = "userVerified", default)]
    user_verified: bool,
}

impl PasskeyCrypto for MockPasskeyCrypto {
    fn parse_attestation<'a>(
        &'a self,
        response_json: &'a str,
    ) -> BoxFuture<'a, Result<ParsedAttestation>> {
        Box::pin(async move {
            let raw: RawAttestation =
                serde_json::from_str(response_json).map_err(|_| AuthError::PasskeyNoCredential)?;
            let client_data_json =
                base64url_decode(&raw.client_data_json).ok_or(AuthError::PasskeyInvalidClientData)?;
            let public_key =
                base64url_decode(&raw.public_key).ok_or(AuthError::PasskeyNoCredential)?;
            Ok(ParsedAttestation {
                credential_id: raw.credential_id,
                public_key,
                cose_algorithm: raw.alg,
                client_data_json,
                rp_id_hash: sha256(raw.rp_id.as_bytes()),
                sign_count: raw.sign_count,
                user_present: raw.user_present,
                user_verified: raw.user_verified,
                backed_up: raw.backed_up,
                multi_device: raw.multi_device,
                transports: raw.transports,
            })
        })
    }

    fn parse_assertion<'a>(
        &'a self,
        response_json: &'a str,
    ) -> BoxFuture<'a, Result<ParsedAssertion>> {
        Box::pin(async move {
            let raw: RawAssertion =
                serde_json::from_str(response_json).map_err(|_| AuthError::PasskeyNoCredential)?;
            let client_data_json =
                base64url_decode(&raw.client_data_json).ok_or(AuthError::PasskeyInvalidClientData)?;
            let authenticator_data = base64url_decode(&raw.authenticator_data)
                .ok_or(AuthError::PasskeyNoCredential)?;
            let signature =
                base64url_decode(&raw.signature).ok_or(AuthError::PasskeyNoCredential)?;
            if authenticator_data.len() < 37 {
                return Err(AuthError::PasskeyNoCredential);
            }
            let mut rp_id_hash = [0u8; 32];
            rp_id_hash.copy_from_slice(&authenticator_data[..32]);
            let flags = authenticator_data[32];
            let mut counter = [0u8; 4];
            counter.copy_from_slice(&authenticator_data[33..37]);
            Ok(ParsedAssertion {
                credential_id: raw.credential_id,
                client_data_json,
                authenticator_data: authenticator_data.clone(),
                rp_id_hash,
                sign_count: u32::from_be_bytes(counter),
                user_present: flags & 0x01 != 0,
                user_verified: raw.user_verified,
                signature,
            })
        })
    }

    fn verify_signature<'a>(
        &'a self,
        _algorithm: CoseAlgorithm,
        public_key: &'a [u8],
        message: &'a [u8],
        signature: &'a [u8],
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(signature == Self::sign(public_key, message).as_slice()) })
    }
}
