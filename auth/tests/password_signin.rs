//! Password sign-up/sign-in, brute-force protection, and the TOTP gate.

mod common;

use common::{auth_with, signed_in, tokens_of};
use gatehouse_auth::mocks::MockSecretHasher;
use gatehouse_auth::providers::{CredentialsProviderConfig, Provider, TotpProviderConfig};
use gatehouse_auth::store::AuthStore;
use gatehouse_auth::{Auth, AuthError, MemoryStore, SignInArgs, SignInOutcome};
use data_encoding::BASE32_NOPAD;
use std::sync::Arc;
use totp_lite::{totp_custom, Sha1};

fn providers() -> Vec<Provider> {
    vec![
        Provider::Credentials(
            CredentialsProviderConfig::new("password")
                .with_hasher(Arc::new(MockSecretHasher::new())),
        ),
        Provider::Totp(TotpProviderConfig::new("totp")),
    ]
}

fn create(id: &str, secret: &str) -> SignInArgs {
    SignInArgs::provider("password").with_params(serde_json::json!({
        "flow": "create", "id": id, "secret": secret
    }))
}

fn verify(id: &str, secret: &str) -> SignInArgs {
    SignInArgs::provider("password").with_params(serde_json::json!({
        "id": id, "secret": secret
    }))
}

#[tokio::test]
async fn sign_up_then_sign_in() {
    let auth = auth_with(providers());

    let created = auth.sign_in(create("a@x.com", "p1")).await.unwrap();
    let identity = signed_in(&created);

    let user = auth.store().user(identity.user_id).await.unwrap().unwrap();
    assert_eq!(user.email.as_deref(), Some("a@x.com"));
    assert!(user.email_verification_time.is_none());

    let account = auth
        .store()
        .account_by_provider("password", "a@x.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.user_id, identity.user_id);
    let stored = account.secret.as_deref().unwrap();
    assert_ne!(stored, "p1", "secrets are stored hashed");

    let verified = auth.sign_in(verify("a@x.com", "p1")).await.unwrap();
    assert_eq!(signed_in(&verified).user_id, identity.user_id);
    tokens_of(&verified);
}

#[tokio::test]
async fn duplicate_create_fails() {
    let auth = auth_with(providers());
    auth.sign_in(create("a@x.com", "p1")).await.unwrap();
    assert_eq!(
        auth.sign_in(create("a@x.com", "p2")).await.unwrap_err(),
        AuthError::AccountAlreadyExists
    );
}

#[tokio::test]
async fn wrong_secret_and_unknown_account_are_indistinguishable() {
    let auth = auth_with(providers());
    auth.sign_in(create("a@x.com", "p1")).await.unwrap();

    let wrong = auth.sign_in(verify("a@x.com", "bad")).await.unwrap();
    let unknown = auth.sign_in(verify("ghost@x.com", "bad")).await.unwrap();
    assert_eq!(wrong, SignInOutcome::Failed);
    assert_eq!(unknown, SignInOutcome::Failed);
}

#[tokio::test]
async fn eleventh_attempt_is_blocked_even_with_the_right_secret() {
    let auth = auth_with(providers());
    auth.sign_in(create("a@x.com", "p1")).await.unwrap();

    for _ in 0..10 {
        assert_eq!(
            auth.sign_in(verify("a@x.com", "bad")).await.unwrap(),
            SignInOutcome::Failed
        );
    }
    // The budget is spent: the right secret no longer helps.
    assert_eq!(
        auth.sign_in(verify("a@x.com", "p1")).await.unwrap(),
        SignInOutcome::Failed
    );
}

#[tokio::test]
async fn success_resets_the_failure_budget() {
    let auth = auth_with(providers());
    auth.sign_in(create("a@x.com", "p1")).await.unwrap();

    for _ in 0..5 {
        auth.sign_in(verify("a@x.com", "bad")).await.unwrap();
    }
    signed_in(&auth.sign_in(verify("a@x.com", "p1")).await.unwrap());

    // The bucket row is gone; ten fresh failures are allowed again.
    for _ in 0..10 {
        assert_eq!(
            auth.sign_in(verify("a@x.com", "bad")).await.unwrap(),
            SignInOutcome::Failed
        );
    }
}

#[tokio::test]
async fn missing_crypto_function_is_a_configuration_error() {
    let auth = auth_with(vec![Provider::Credentials(
        CredentialsProviderConfig::new("password").without_hasher(),
    )]);
    assert_eq!(
        auth.sign_in(create("a@x.com", "p1")).await.unwrap_err(),
        AuthError::MissingCryptoFunction
    );
}

/// Compute the current code for a base32 TOTP secret.
fn current_code(secret_base32: &str) -> String {
    let secret = BASE32_NOPAD.decode(secret_base32.as_bytes()).unwrap();
    #[allow(clippy::cast_sign_loss)]
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    totp_custom::<Sha1>(30, 6, &secret, now)
}

async fn enroll_totp(auth: &Auth<MemoryStore>, identity: gatehouse_auth::SessionIdentity) {
    let setup = auth
        .sign_in(
            SignInArgs::provider("totp")
                .with_params(serde_json::json!({ "flow": "setup" }))
                .with_identity(identity),
        )
        .await
        .unwrap();
    let SignInOutcome::TotpSetup {
        uri,
        secret,
        verifier,
        ..
    } = setup
    else {
        panic!("expected TotpSetup, got {setup:?}");
    };
    assert!(uri.starts_with("otpauth://totp/"));
    assert!(uri.contains(&secret));

    let confirmed = auth
        .sign_in(
            SignInArgs::provider("totp")
                .with_params(serde_json::json!({ "flow": "confirm", "code": current_code(&secret) }))
                .with_identity(identity)
                .with_verifier(verifier),
        )
        .await
        .unwrap();
    assert!(matches!(confirmed, SignInOutcome::SignedIn { tokens: None, .. }));
}

#[tokio::test]
async fn verified_totp_gates_password_sign_in() {
    let auth = auth_with(providers());
    let identity = signed_in(&auth.sign_in(create("a@x.com", "p1")).await.unwrap());
    enroll_totp(&auth, identity).await;

    // Password alone no longer signs in.
    let outcome = auth.sign_in(verify("a@x.com", "p1")).await.unwrap();
    let SignInOutcome::TotpRequired { verifier } = outcome else {
        panic!("expected TotpRequired, got {outcome:?}");
    };

    // The stored secret completes the ceremony.
    let totp = auth
        .store()
        .totps_by_user(identity.user_id)
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.verified)
        .unwrap();
    let finished = auth
        .sign_in(
            SignInArgs::provider("totp")
                .with_params(serde_json::json!({ "flow": "verify", "code": current_code(&totp.secret) }))
                .with_verifier(verifier),
        )
        .await
        .unwrap();
    let final_identity = signed_in(&finished);
    assert_eq!(final_identity.user_id, identity.user_id);
    tokens_of(&finished);

    // The ceremony verifier is single-use.
    let reused = auth
        .sign_in(
            SignInArgs::provider("totp")
                .with_params(serde_json::json!({ "flow": "verify", "code": current_code(&totp.secret) }))
                .with_verifier(verifier),
        )
        .await
        .unwrap_err();
    assert_eq!(reused, AuthError::TotpInvalidVerifier);
}

#[tokio::test]
async fn wrong_totp_code_is_rejected() {
    let auth = auth_with(providers());
    let identity = signed_in(&auth.sign_in(create("a@x.com", "p1")).await.unwrap());
    enroll_totp(&auth, identity).await;

    let outcome = auth.sign_in(verify("a@x.com", "p1")).await.unwrap();
    let SignInOutcome::TotpRequired { verifier } = outcome else {
        panic!("expected TotpRequired");
    };
    assert_eq!(
        auth.sign_in(
            SignInArgs::provider("totp")
                .with_params(serde_json::json!({ "flow": "verify", "code": "000000" }))
                .with_verifier(verifier),
        )
        .await
        .unwrap_err(),
        AuthError::TotpInvalidCode
    );
}

#[tokio::test]
async fn totp_setup_requires_a_signed_in_user() {
    let auth = auth_with(providers());
    assert_eq!(
        auth.sign_in(
            SignInArgs::provider("totp").with_params(serde_json::json!({ "flow": "setup" }))
        )
        .await
        .unwrap_err(),
        AuthError::NotSignedIn
    );
}

#[tokio::test]
async fn confirm_rejects_a_second_enrollment_confirmation() {
    let auth = auth_with(providers());
    let identity = signed_in(&auth.sign_in(create("a@x.com", "p1")).await.unwrap());

    let setup = auth
        .sign_in(
            SignInArgs::provider("totp")
                .with_params(serde_json::json!({ "flow": "setup" }))
                .with_identity(identity),
        )
        .await
        .unwrap();
    let SignInOutcome::TotpSetup { secret, verifier, .. } = setup else {
        panic!("expected TotpSetup");
    };
    let code = current_code(&secret);
    auth.sign_in(
        SignInArgs::provider("totp")
            .with_params(serde_json::json!({ "flow": "confirm", "code": code }))
            .with_identity(identity)
            .with_verifier(verifier),
    )
    .await
    .unwrap();

    // The verifier went away with the confirmation.
    let again = auth
        .sign_in(
            SignInArgs::provider("totp")
                .with_params(serde_json::json!({ "flow": "confirm", "code": current_code(&secret) }))
                .with_identity(identity)
                .with_verifier(verifier),
        )
        .await
        .unwrap_err();
    assert_eq!(again, AuthError::TotpInvalidVerifier);
}

#[tokio::test]
async fn removing_the_totp_credential_lifts_the_gate() {
    let auth = auth_with(providers());
    let identity = signed_in(&auth.sign_in(create("a@x.com", "p1")).await.unwrap());
    enroll_totp(&auth, identity).await;

    let totp_id = auth.list_totps(identity.user_id).await.unwrap()[0].id;
    auth.remove_totp(identity, totp_id).await.unwrap();

    // Password alone signs in again.
    signed_in(&auth.sign_in(verify("a@x.com", "p1")).await.unwrap());
}

#[tokio::test]
async fn unlinking_an_account_disables_its_sign_in() {
    let auth = auth_with(providers());
    let identity = signed_in(&auth.sign_in(create("a@x.com", "p1")).await.unwrap());

    let accounts = auth.list_accounts(identity.user_id, "password").await.unwrap();
    assert_eq!(accounts.len(), 1);
    auth.unlink_account(identity, accounts[0].id).await.unwrap();

    assert_eq!(
        auth.sign_in(verify("a@x.com", "p1")).await.unwrap(),
        SignInOutcome::Failed
    );
}

#[tokio::test]
async fn unknown_provider_is_a_configuration_error() {
    let auth = auth_with(providers());
    assert!(matches!(
        auth.sign_in(SignInArgs::provider("github")).await.unwrap_err(),
        AuthError::ProviderNotConfigured(_)
    ));
}

#[tokio::test]
async fn empty_sign_in_request_is_rejected() {
    let auth = auth_with(providers());
    assert_eq!(
        auth.sign_in(SignInArgs::default()).await.unwrap_err(),
        AuthError::SignInMissingParams
    );
}
