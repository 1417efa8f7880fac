//! Shared fixtures for the integration suite.
#![allow(dead_code)]

use gatehouse_auth::config::{ApiKeyConfig, JwtConfig};
use gatehouse_auth::providers::Provider;
use gatehouse_auth::{Auth, AuthConfig, MemoryStore, SessionIdentity, SignInOutcome};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use std::sync::OnceLock;

pub const SITE_URL: &str = "https://app.example.com";

/// One RSA signing key per test binary; generation is the slow part.
fn test_key_pem() -> &'static str {
    static KEY: OnceLock<String> = OnceLock::new();
    KEY.get_or_init(|| {
        let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048)
            .expect("test key generation");
        key.to_pkcs8_pem(LineEnding::LF)
            .expect("test key encoding")
            .to_string()
    })
}

pub fn jwt_config() -> JwtConfig {
    JwtConfig::new(
        test_key_pem(),
        serde_json::json!({
            "keys": [{ "kty": "RSA", "use": "sig", "alg": "RS256", "kid": "primary" }]
        }),
    )
    .with_key_id("primary")
}

pub fn base_config() -> AuthConfig {
    AuthConfig::new(SITE_URL, jwt_config())
}

pub fn auth_with(providers: Vec<Provider>) -> Auth<MemoryStore> {
    auth_over(MemoryStore::new(), providers, ApiKeyConfig::default())
}

pub fn auth_over(
    store: MemoryStore,
    providers: Vec<Provider>,
    api_keys: ApiKeyConfig,
) -> Auth<MemoryStore> {
    let mut config = base_config().with_api_keys(api_keys);
    for provider in providers {
        config = config.with_provider(provider);
    }
    Auth::new(config, store).expect("auth construction")
}

/// Pull the identity out of a signed-in outcome.
pub fn signed_in(outcome: &SignInOutcome) -> SessionIdentity {
    match outcome {
        SignInOutcome::SignedIn {
            user_id,
            session_id,
            ..
        } => SessionIdentity {
            user_id: *user_id,
            session_id: *session_id,
        },
        other => panic!("expected SignedIn, got {other:?}"),
    }
}

/// Pull the token pair out of a signed-in outcome.
pub fn tokens_of(outcome: &SignInOutcome) -> gatehouse_auth::TokenPair {
    match outcome {
        SignInOutcome::SignedIn {
            tokens: Some(tokens),
            ..
        } => tokens.clone(),
        other => panic!("expected SignedIn with tokens, got {other:?}"),
    }
}

/// Decode a JWT payload without verifying the signature.
pub fn jwt_payload(token: &str) -> serde_json::Value {
    let payload = token.split('.').nth(1).expect("three jwt segments");
    let bytes = gatehouse_auth::utils::base64url_decode(payload).expect("base64url payload");
    serde_json::from_slice(&bytes).expect("json payload")
}
