//! OAuth ceremony: authorize, callback, handoff-code sign-in, state binding.

mod common;

use common::{auth_over, auth_with, signed_in, tokens_of};
use gatehouse_auth::config::ApiKeyConfig;
use gatehouse_auth::flows::oauth::{begin_authorization, handle_callback};
use gatehouse_auth::mocks::{MockEmailSender, MockOAuthClient};
use gatehouse_auth::providers::{
    EmailProviderConfig, OAuthProfile, OAuthProviderConfig, Provider,
};
use gatehouse_auth::state::VerifierId;
use gatehouse_auth::store::AuthStore;
use gatehouse_auth::{Auth, AuthError, MemoryStore, SignInArgs, SignInOutcome};
use std::sync::Arc;

const REDIRECT_URI: &str = "https://app.example.com/api/auth/callback/google";

fn profile() -> OAuthProfile {
    OAuthProfile {
        id: "google-subject-1".into(),
        email: Some("a@x.com".into()),
        email_verified: true,
        name: Some("Ada".into()),
        image: Some("https://img.example.com/a.png".into()),
        ..OAuthProfile::default()
    }
}

fn oauth_provider(client: MockOAuthClient) -> Provider {
    Provider::OAuth(OAuthProviderConfig::new("google", Arc::new(client)))
}

/// Drive phase 1 + the HTTP half-trips, returning the one-time code and the
/// client-held verifier.
async fn roundtrip(auth: &Auth<MemoryStore>) -> (String, VerifierId) {
    let outcome = auth.sign_in(SignInArgs::provider("google")).await.unwrap();
    let SignInOutcome::Redirect { url, verifier } = outcome else {
        panic!("expected Redirect, got {outcome:?}");
    };
    assert!(url.starts_with("https://app.example.com/api/auth/signin/google?code="));

    let start = begin_authorization(auth, "google", verifier, REDIRECT_URI)
        .await
        .unwrap();
    assert!(start.authorization_url.starts_with("https://provider.test/authorize?"));
    assert!(start.authorization_url.contains(&urlencoding::encode(&start.state).into_owned()));

    let code = handle_callback(
        auth,
        "google",
        &start.state,
        MockOAuthClient::VALID_CODE,
        start.pkce_verifier.as_deref(),
        REDIRECT_URI,
    )
    .await
    .unwrap();
    (code, verifier)
}

#[tokio::test]
async fn happy_path_issues_a_session_once() {
    let auth = auth_with(vec![oauth_provider(MockOAuthClient::new(profile()))]);
    let (code, verifier) = roundtrip(&auth).await;

    let outcome = auth
        .sign_in(SignInArgs::code(code.clone()).with_verifier(verifier))
        .await
        .unwrap();
    let identity = signed_in(&outcome);
    tokens_of(&outcome);

    let user = auth.store().user(identity.user_id).await.unwrap().unwrap();
    assert_eq!(user.email.as_deref(), Some("a@x.com"));
    assert!(user.email_verification_time.is_some());
    assert_eq!(user.name.as_deref(), Some("Ada"));

    let account = auth
        .store()
        .account_by_provider("google", "google-subject-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.user_id, identity.user_id);

    // The one-time code is gone.
    assert_eq!(
        auth.sign_in(SignInArgs::code(code).with_verifier(verifier))
            .await
            .unwrap_err(),
        AuthError::InvalidVerificationCode
    );
}

#[tokio::test]
async fn handoff_code_is_bound_to_the_initiating_client() {
    let auth = auth_with(vec![oauth_provider(MockOAuthClient::new(profile()))]);
    let (code, _verifier) = roundtrip(&auth).await;

    // Without the client-held verifier the code does not verify.
    assert_eq!(
        auth.sign_in(SignInArgs::code(code.clone())).await.unwrap_err(),
        AuthError::InvalidVerificationCode
    );
    assert_eq!(
        auth.sign_in(SignInArgs::code(code).with_verifier(VerifierId::new()))
            .await
            .unwrap_err(),
        AuthError::InvalidVerificationCode
    );
}

#[tokio::test]
async fn mismatched_state_yields_no_code_and_no_exchange() {
    let client = MockOAuthClient::new(profile());
    let auth = auth_with(vec![oauth_provider(client.clone())]);

    let outcome = auth.sign_in(SignInArgs::provider("google")).await.unwrap();
    let SignInOutcome::Redirect { verifier, .. } = outcome else {
        panic!("expected Redirect");
    };
    begin_authorization(&auth, "google", verifier, REDIRECT_URI)
        .await
        .unwrap();

    let err = handle_callback(
        &auth,
        "google",
        "forged-state",
        MockOAuthClient::VALID_CODE,
        None,
        REDIRECT_URI,
    )
    .await
    .unwrap_err();
    assert_eq!(err, AuthError::OAuthInvalidState);

    // The provider was never contacted and no account materialized.
    assert!(client.exchanged_codes().unwrap().is_empty());
    assert!(auth
        .store()
        .account_by_provider("google", "google-subject-1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn pkce_clients_carry_the_verifier_through_the_half_trip() {
    let auth = auth_with(vec![oauth_provider(MockOAuthClient::new(profile()).with_pkce())]);

    let outcome = auth.sign_in(SignInArgs::provider("google")).await.unwrap();
    let SignInOutcome::Redirect { verifier, .. } = outcome else {
        panic!("expected Redirect");
    };
    let start = begin_authorization(&auth, "google", verifier, REDIRECT_URI)
        .await
        .unwrap();
    let pkce = start.pkce_verifier.clone().expect("public client mints a PKCE verifier");
    assert!(start.authorization_url.contains("code_challenge_method=S256"));

    // The exchange fails without the PKCE verifier and succeeds with it.
    assert!(handle_callback(&auth, "google", &start.state, MockOAuthClient::VALID_CODE, None, REDIRECT_URI)
        .await
        .is_err());
    let code = handle_callback(
        &auth,
        "google",
        &start.state,
        MockOAuthClient::VALID_CODE,
        Some(&pkce),
        REDIRECT_URI,
    )
    .await
    .unwrap();
    signed_in(
        &auth
            .sign_in(SignInArgs::code(code).with_verifier(verifier))
            .await
            .unwrap(),
    );
}

#[tokio::test]
async fn verified_provider_email_links_to_the_magic_link_user() {
    let store = MemoryStore::new();
    let sender = Arc::new(MockEmailSender::new());
    let auth = auth_over(
        store,
        vec![
            oauth_provider(MockOAuthClient::new(profile())),
            Provider::Email(
                EmailProviderConfig::new("email")
                    .with_from("auth@app.example.com")
                    .with_sender(sender.clone()),
            ),
        ],
        ApiKeyConfig::default(),
    );

    // Establish a verified-email user via magic link.
    auth.sign_in(SignInArgs::provider("email").with_params(serde_json::json!({ "email": "a@x.com" })))
        .await
        .unwrap();
    let code = sender.last_code().unwrap().unwrap();
    let email_identity = signed_in(&auth.sign_in(SignInArgs::code(code)).await.unwrap());

    // The OAuth profile attests the same email: the account must link, not
    // mint a second user.
    let (code, verifier) = roundtrip(&auth).await;
    let oauth_identity = signed_in(
        &auth
            .sign_in(SignInArgs::code(code).with_verifier(verifier))
            .await
            .unwrap(),
    );
    assert_eq!(oauth_identity.user_id, email_identity.user_id);
}

#[tokio::test]
async fn unverified_provider_email_does_not_link_by_default() {
    let store = MemoryStore::new();
    let sender = Arc::new(MockEmailSender::new());
    let unverified = OAuthProfile {
        email_verified: false,
        ..profile()
    };
    let auth = auth_over(
        store,
        vec![
            oauth_provider(MockOAuthClient::new(unverified)),
            Provider::Email(
                EmailProviderConfig::new("email")
                    .with_from("auth@app.example.com")
                    .with_sender(sender.clone()),
            ),
        ],
        ApiKeyConfig::default(),
    );

    auth.sign_in(SignInArgs::provider("email").with_params(serde_json::json!({ "email": "a@x.com" })))
        .await
        .unwrap();
    let code = sender.last_code().unwrap().unwrap();
    let email_identity = signed_in(&auth.sign_in(SignInArgs::code(code)).await.unwrap());

    let (code, verifier) = roundtrip(&auth).await;
    let oauth_identity = signed_in(
        &auth
            .sign_in(SignInArgs::code(code).with_verifier(verifier))
            .await
            .unwrap(),
    );
    assert_ne!(oauth_identity.user_id, email_identity.user_id);
}

#[tokio::test]
async fn dangerous_linking_opt_in_links_unverified_emails() {
    let store = MemoryStore::new();
    let sender = Arc::new(MockEmailSender::new());
    let unverified = OAuthProfile {
        email_verified: false,
        ..profile()
    };
    let auth = auth_over(
        store,
        vec![
            Provider::OAuth(
                OAuthProviderConfig::new("google", Arc::new(MockOAuthClient::new(unverified)))
                    .with_dangerous_email_account_linking(true),
            ),
            Provider::Email(
                EmailProviderConfig::new("email")
                    .with_from("auth@app.example.com")
                    .with_sender(sender.clone()),
            ),
        ],
        ApiKeyConfig::default(),
    );

    auth.sign_in(SignInArgs::provider("email").with_params(serde_json::json!({ "email": "a@x.com" })))
        .await
        .unwrap();
    let code = sender.last_code().unwrap().unwrap();
    let email_identity = signed_in(&auth.sign_in(SignInArgs::code(code)).await.unwrap());

    let (code, verifier) = roundtrip(&auth).await;
    let oauth_identity = signed_in(
        &auth
            .sign_in(SignInArgs::code(code).with_verifier(verifier))
            .await
            .unwrap(),
    );
    assert_eq!(oauth_identity.user_id, email_identity.user_id);
}
