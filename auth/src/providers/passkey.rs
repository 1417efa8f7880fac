//! WebAuthn cryptographic seam.
//!
//! The core owns the ceremony bookkeeping: challenge hashes in the verifier
//! store, origin and RP-ID checks, algorithm allow-list, counter rules.
//! CBOR attestation parsing and signature verification are opaque behind
//! [`PasskeyCrypto`]; hosts plug in their platform's WebAuthn primitives.
//!
//! # Dyn Compatibility
//!
//! The trait uses explicit `Pin<Box<dyn Future>>` returns so it can ride
//! inside the `Provider` enum as a trait object.

use crate::error::{AuthError, Result};
use crate::BoxFuture;
use serde::Deserialize;

/// Fields the core needs from a parsed attestation (registration) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAttestation {
    /// Credential id, base64url.
    pub credential_id: String,

    /// COSE-encoded public key.
    pub public_key: Vec<u8>,

    /// COSE algorithm identifier (e.g. -7 for ES256, -257 for RS256).
    pub cose_algorithm: i64,

    /// Raw clientDataJSON bytes, for challenge and origin validation.
    pub client_data_json: Vec<u8>,

    /// RP-ID hash from the authenticator data.
    pub rp_id_hash: [u8; 32],

    /// Initial signature counter.
    pub sign_count: u32,

    /// User-presence flag.
    pub user_present: bool,

    /// User-verification flag.
    pub user_verified: bool,

    /// Backup-state flag.
    pub backed_up: bool,

    /// Backup-eligibility flag (multi-device credential).
    pub multi_device: bool,

    /// Reported transports, if any.
    pub transports: Option<Vec<String>>,
}

/// Fields the core needs from a parsed assertion (authentication) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAssertion {
    /// Credential id, base64url.
    pub credential_id: String,

    /// Raw clientDataJSON bytes.
    pub client_data_json: Vec<u8>,

    /// Raw authenticator data; the signed message is this followed by
    /// `SHA256(client_data_json)`.
    pub authenticator_data: Vec<u8>,

    /// RP-ID hash from the authenticator data.
    pub rp_id_hash: [u8; 32],

    /// Signature counter.
    pub sign_count: u32,

    /// User-presence flag.
    pub user_present: bool,

    /// User-verification flag.
    pub user_verified: bool,

    /// Assertion signature.
    pub signature: Vec<u8>,
}

/// Opaque WebAuthn parse/verify primitives.
pub trait PasskeyCrypto: Send + Sync {
    /// Parse a registration (attestation) response.
    ///
    /// # Errors
    ///
    /// Returns `PASSKEY_NO_CREDENTIAL` or `PASSKEY_INVALID_CLIENT_DATA` if
    /// the payload cannot be decoded.
    fn parse_attestation<'a>(
        &'a self,
        response_json: &'a str,
    ) -> BoxFuture<'a, Result<ParsedAttestation>>;

    /// Parse an authentication (assertion) response.
    ///
    /// # Errors
    ///
    /// Returns `PASSKEY_NO_CREDENTIAL` or `PASSKEY_INVALID_CLIENT_DATA` if
    /// the payload cannot be decoded.
    fn parse_assertion<'a>(
        &'a self,
        response_json: &'a str,
    ) -> BoxFuture<'a, Result<ParsedAssertion>>;

    /// Verify `signature` over `message` with the COSE `public_key`.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed keys; a plain mismatch is `Ok(false)`.
    fn verify_signature<'a>(
        &'a self,
        algorithm: crate::store::CoseAlgorithm,
        public_key: &'a [u8],
        message: &'a [u8],
        signature: &'a [u8],
    ) -> BoxFuture<'a, Result<bool>>;
}

/// The collected client data fields the ceremonies check.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectedClientData {
    /// `webauthn.create` or `webauthn.get`.
    #[serde(rename = "type")]
    pub ceremony_type: String,

    /// Challenge echoed by the client, base64url.
    pub challenge: String,

    /// Origin the ceremony ran on.
    pub origin: String,
}

/// Parse clientDataJSON bytes.
///
/// # Errors
///
/// Returns `PASSKEY_INVALID_CLIENT_DATA` on malformed JSON.
pub fn parse_client_data(client_data_json: &[u8]) -> Result<CollectedClientData> {
    serde_json::from_slice(client_data_json).map_err(|_| AuthError::PasskeyInvalidClientData)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_data_parses_type_challenge_origin() {
        let raw = br#"{"type":"webauthn.get","challenge":"Y2hhbGxlbmdl","origin":"https://app.example.com","crossOrigin":false}"#;
        let parsed = parse_client_data(raw).unwrap();
        assert_eq!(parsed.ceremony_type, "webauthn.get");
        assert_eq!(parsed.challenge, "Y2hhbGxlbmdl");
        assert_eq!(parsed.origin, "https://app.example.com");
    }

    #[test]
    fn malformed_client_data_is_rejected() {
        assert_eq!(
            parse_client_data(b"not json").unwrap_err(),
            AuthError::PasskeyInvalidClientData
        );
    }
}
