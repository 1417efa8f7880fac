//! WebAuthn passkey ceremonies over the mock crypto seam.

mod common;

use common::{auth_with, signed_in, tokens_of};
use gatehouse_auth::mocks::{MockPasskeyCrypto, MockSecretHasher};
use gatehouse_auth::providers::{
    CredentialsProviderConfig, PasskeyProviderConfig, Provider,
};
use gatehouse_auth::store::AuthStore;
use gatehouse_auth::{Auth, AuthError, MemoryStore, SessionIdentity, SignInArgs, SignInOutcome};
use std::sync::Arc;

const ORIGIN: &str = "https://app.example.com";
const RP_ID: &str = "app.example.com";
const PUBLIC_KEY: &[u8] = b"cose-public-key-bytes";

fn providers() -> Vec<Provider> {
    vec![
        Provider::Credentials(
            CredentialsProviderConfig::new("password")
                .with_hasher(Arc::new(MockSecretHasher::new())),
        ),
        Provider::Passkey(PasskeyProviderConfig::new(
            "passkey",
            "Example App",
            Arc::new(MockPasskeyCrypto::new()),
        )),
    ]
}

async fn signed_in_user(auth: &Auth<MemoryStore>) -> SessionIdentity {
    signed_in(
        &auth
            .sign_in(SignInArgs::provider("password").with_params(serde_json::json!({
                "flow": "create", "id": "a@x.com", "secret": "p1"
            })))
            .await
            .unwrap(),
    )
}

/// Run `register-options` and pull out the challenge + verifier.
async fn registration_challenge(
    auth: &Auth<MemoryStore>,
    identity: SessionIdentity,
) -> (String, gatehouse_auth::state::VerifierId) {
    let outcome = auth
        .sign_in(
            SignInArgs::provider("passkey")
                .with_params(serde_json::json!({ "flow": "register-options" }))
                .with_identity(identity),
        )
        .await
        .unwrap();
    let SignInOutcome::PasskeyOptions { options, verifier } = outcome else {
        panic!("expected PasskeyOptions, got {outcome:?}");
    };
    assert_eq!(options["rp"]["id"].as_str().unwrap(), RP_ID);
    assert_eq!(options["rp"]["name"].as_str().unwrap(), "Example App");
    assert!(options["user"]["id"].is_string());
    let challenge = options["challenge"].as_str().unwrap().to_string();
    (challenge, verifier)
}

/// Register a passkey end to end; returns the credential id.
async fn register(auth: &Auth<MemoryStore>, identity: SessionIdentity) -> String {
    let (challenge, verifier) = registration_challenge(auth, identity).await;
    let response = MockPasskeyCrypto::attestation_response(
        "cred-1", PUBLIC_KEY, -7, &challenge, ORIGIN, RP_ID,
    );
    let outcome = auth
        .sign_in(
            SignInArgs::provider("passkey")
                .with_params(serde_json::json!({ "flow": "register-verify", "response": response }))
                .with_identity(identity)
                .with_verifier(verifier),
        )
        .await
        .unwrap();
    signed_in(&outcome);
    "cred-1".to_string()
}

/// Run `auth-options` and pull out the challenge + verifier.
async fn auth_challenge(
    auth: &Auth<MemoryStore>,
) -> (String, gatehouse_auth::state::VerifierId) {
    let outcome = auth
        .sign_in(SignInArgs::provider("passkey").with_params(serde_json::json!({
            "flow": "auth-options", "email": "a@x.com"
        })))
        .await
        .unwrap();
    let SignInOutcome::PasskeyOptions { options, verifier } = outcome else {
        panic!("expected PasskeyOptions, got {outcome:?}");
    };
    (options["challenge"].as_str().unwrap().to_string(), verifier)
}

#[tokio::test]
async fn register_then_authenticate() {
    let auth = auth_with(providers());
    let identity = signed_in_user(&auth).await;
    let credential_id = register(&auth, identity).await;

    let stored = auth
        .store()
        .passkey_by_credential(&credential_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.user_id, identity.user_id);
    assert_eq!(stored.counter, 0);

    let (challenge, verifier) = auth_challenge(&auth).await;
    let response = MockPasskeyCrypto::assertion_response(
        &credential_id, PUBLIC_KEY, &challenge, ORIGIN, RP_ID, 1,
    );
    let outcome = auth
        .sign_in(
            SignInArgs::provider("passkey")
                .with_params(serde_json::json!({ "flow": "auth-verify", "response": response }))
                .with_verifier(verifier),
        )
        .await
        .unwrap();
    let authed = signed_in(&outcome);
    assert_eq!(authed.user_id, identity.user_id);
    tokens_of(&outcome);

    let updated = auth
        .store()
        .passkey_by_credential(&credential_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.counter, 1);
    assert!(updated.last_used_at.is_some());
}

#[tokio::test]
async fn register_options_exclude_existing_credentials() {
    let auth = auth_with(providers());
    let identity = signed_in_user(&auth).await;
    register(&auth, identity).await;

    let outcome = auth
        .sign_in(
            SignInArgs::provider("passkey")
                .with_params(serde_json::json!({ "flow": "register-options" }))
                .with_identity(identity),
        )
        .await
        .unwrap();
    let SignInOutcome::PasskeyOptions { options, .. } = outcome else {
        panic!("expected PasskeyOptions");
    };
    let excluded = options["excludeCredentials"].as_array().unwrap();
    assert_eq!(excluded.len(), 1);
    assert_eq!(excluded[0]["id"].as_str().unwrap(), "cred-1");
}

#[tokio::test]
async fn counter_rollback_is_rejected() {
    let auth = auth_with(providers());
    let identity = signed_in_user(&auth).await;
    let credential_id = register(&auth, identity).await;

    // Advance the counter to 5.
    let (challenge, verifier) = auth_challenge(&auth).await;
    let response = MockPasskeyCrypto::assertion_response(
        &credential_id, PUBLIC_KEY, &challenge, ORIGIN, RP_ID, 5,
    );
    auth.sign_in(
        SignInArgs::provider("passkey")
            .with_params(serde_json::json!({ "flow": "auth-verify", "response": response }))
            .with_verifier(verifier),
    )
    .await
    .unwrap();

    // A replayed assertion with counter 5 must fail.
    let (challenge, verifier) = auth_challenge(&auth).await;
    let response = MockPasskeyCrypto::assertion_response(
        &credential_id, PUBLIC_KEY, &challenge, ORIGIN, RP_ID, 5,
    );
    assert_eq!(
        auth.sign_in(
            SignInArgs::provider("passkey")
                .with_params(serde_json::json!({ "flow": "auth-verify", "response": response }))
                .with_verifier(verifier),
        )
        .await
        .unwrap_err(),
        AuthError::PasskeyCounterError
    );
}

#[tokio::test]
async fn wrong_origin_is_rejected() {
    let auth = auth_with(providers());
    let identity = signed_in_user(&auth).await;
    let credential_id = register(&auth, identity).await;

    let (challenge, verifier) = auth_challenge(&auth).await;
    let response = MockPasskeyCrypto::assertion_response(
        &credential_id, PUBLIC_KEY, &challenge, "https://evil.example.com", RP_ID, 1,
    );
    assert_eq!(
        auth.sign_in(
            SignInArgs::provider("passkey")
                .with_params(serde_json::json!({ "flow": "auth-verify", "response": response }))
                .with_verifier(verifier),
        )
        .await
        .unwrap_err(),
        AuthError::PasskeyInvalidOrigin
    );
}

#[tokio::test]
async fn wrong_challenge_is_rejected() {
    let auth = auth_with(providers());
    let identity = signed_in_user(&auth).await;
    let credential_id = register(&auth, identity).await;

    let (_, verifier) = auth_challenge(&auth).await;
    let response = MockPasskeyCrypto::assertion_response(
        &credential_id, PUBLIC_KEY, "attacker-chosen-challenge", ORIGIN, RP_ID, 1,
    );
    assert_eq!(
        auth.sign_in(
            SignInArgs::provider("passkey")
                .with_params(serde_json::json!({ "flow": "auth-verify", "response": response }))
                .with_verifier(verifier),
        )
        .await
        .unwrap_err(),
        AuthError::PasskeyInvalidChallenge
    );
}

#[tokio::test]
async fn wrong_rp_is_rejected() {
    let auth = auth_with(providers());
    let identity = signed_in_user(&auth).await;
    let credential_id = register(&auth, identity).await;

    let (challenge, verifier) = auth_challenge(&auth).await;
    let response = MockPasskeyCrypto::assertion_response(
        &credential_id, PUBLIC_KEY, &challenge, ORIGIN, "evil.example.com", 1,
    );
    assert_eq!(
        auth.sign_in(
            SignInArgs::provider("passkey")
                .with_params(serde_json::json!({ "flow": "auth-verify", "response": response }))
                .with_verifier(verifier),
        )
        .await
        .unwrap_err(),
        AuthError::PasskeyRpMismatch
    );
}

#[tokio::test]
async fn forged_signature_is_rejected() {
    let auth = auth_with(providers());
    let identity = signed_in_user(&auth).await;
    let credential_id = register(&auth, identity).await;

    let (challenge, verifier) = auth_challenge(&auth).await;
    // Signed with a key that does not match the stored credential.
    let response = MockPasskeyCrypto::assertion_response(
        &credential_id, b"some-other-key", &challenge, ORIGIN, RP_ID, 1,
    );
    assert_eq!(
        auth.sign_in(
            SignInArgs::provider("passkey")
                .with_params(serde_json::json!({ "flow": "auth-verify", "response": response }))
                .with_verifier(verifier),
        )
        .await
        .unwrap_err(),
        AuthError::PasskeyInvalidSignature
    );
}

#[tokio::test]
async fn unknown_credential_is_rejected() {
    let auth = auth_with(providers());
    let identity = signed_in_user(&auth).await;
    register(&auth, identity).await;

    let (challenge, verifier) = auth_challenge(&auth).await;
    let response = MockPasskeyCrypto::assertion_response(
        "ghost-cred", PUBLIC_KEY, &challenge, ORIGIN, RP_ID, 1,
    );
    assert_eq!(
        auth.sign_in(
            SignInArgs::provider("passkey")
                .with_params(serde_json::json!({ "flow": "auth-verify", "response": response }))
                .with_verifier(verifier),
        )
        .await
        .unwrap_err(),
        AuthError::PasskeyUnknownCredential
    );
}

#[tokio::test]
async fn unsupported_algorithm_is_rejected_at_registration() {
    let auth = auth_with(providers());
    let identity = signed_in_user(&auth).await;
    let (challenge, verifier) = registration_challenge(&auth, identity).await;

    // EdDSA (-8) is outside the default allow-list.
    let response = MockPasskeyCrypto::attestation_response(
        "cred-ed", PUBLIC_KEY, -8, &challenge, ORIGIN, RP_ID,
    );
    assert_eq!(
        auth.sign_in(
            SignInArgs::provider("passkey")
                .with_params(serde_json::json!({ "flow": "register-verify", "response": response }))
                .with_identity(identity)
                .with_verifier(verifier),
        )
        .await
        .unwrap_err(),
        AuthError::PasskeyUnsupportedAlgorithm
    );
}

#[tokio::test]
async fn passkeys_can_be_listed_and_removed_by_their_owner() {
    let auth = auth_with(providers());
    let identity = signed_in_user(&auth).await;
    register(&auth, identity).await;

    let listed = auth.list_passkeys(identity.user_id).await.unwrap();
    assert_eq!(listed.len(), 1);
    let passkey_id = listed[0].id;

    // A stranger cannot remove it.
    let stranger = signed_in(
        &auth
            .sign_in(SignInArgs::provider("password").with_params(serde_json::json!({
                "flow": "create", "id": "b@x.com", "secret": "p2"
            })))
            .await
            .unwrap(),
    );
    assert_eq!(
        auth.remove_passkey(stranger, passkey_id).await.unwrap_err(),
        AuthError::PasskeyUnknownCredential
    );

    auth.remove_passkey(identity, passkey_id).await.unwrap();
    assert!(auth.list_passkeys(identity.user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn registration_requires_a_signed_in_user() {
    let auth = auth_with(providers());
    assert_eq!(
        auth.sign_in(
            SignInArgs::provider("passkey")
                .with_params(serde_json::json!({ "flow": "register-options" }))
        )
        .await
        .unwrap_err(),
        AuthError::NotSignedIn
    );
}
