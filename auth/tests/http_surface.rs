//! Discovery documents and the OAuth HTTP half-trips.

mod common;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use common::auth_with;
use gatehouse_auth::http::cookies::{get_cookie, open, seal, STATE_COOKIE};
use gatehouse_auth::http::{discovery, oauth};
use gatehouse_auth::mocks::MockOAuthClient;
use gatehouse_auth::providers::{OAuthProfile, OAuthProviderConfig, Provider};
use gatehouse_auth::{Auth, MemoryStore, SignInArgs, SignInOutcome};
use std::sync::Arc;

fn oauth_auth() -> Arc<Auth<MemoryStore>> {
    let profile = OAuthProfile {
        id: "subject-1".into(),
        email: Some("a@x.com".into()),
        email_verified: true,
        ..OAuthProfile::default()
    };
    Arc::new(auth_with(vec![Provider::OAuth(OAuthProviderConfig::new(
        "google",
        Arc::new(MockOAuthClient::new(profile)),
    ))]))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn openid_configuration_document() {
    let auth = oauth_auth();
    let response = discovery::openid_configuration(State(auth)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "public, max-age=15, stale-while-revalidate=15, stale-if-error=86400"
    );

    let body = body_json(response).await;
    assert_eq!(body["issuer"], common::SITE_URL);
    assert_eq!(
        body["jwks_uri"],
        format!("{}/.well-known/jwks.json", common::SITE_URL)
    );
    assert_eq!(
        body["authorization_endpoint"],
        format!("{}/api/auth/signin", common::SITE_URL)
    );
}

#[tokio::test]
async fn jwks_document_is_served_verbatim() {
    let auth = oauth_auth();
    let response = discovery::jwks(State(auth)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(header::CACHE_CONTROL));
    let body = body_json(response).await;
    assert_eq!(body["keys"][0]["kid"], "primary");
}

/// Drive the authorize route, returning the redirect target and cookies.
async fn drive_authorize(
    auth: &Arc<Auth<MemoryStore>>,
    verifier: gatehouse_auth::state::VerifierId,
    redirect_to: Option<&str>,
) -> axum::response::Response {
    let mut query = format!("code={verifier}");
    if let Some(target) = redirect_to {
        query.push_str(&format!("&redirectTo={}", urlencoding::encode(target)));
    }
    let query: oauth::AuthorizeQuery =
        serde_urlencoded::from_str(&query).unwrap();
    oauth::authorize(
        State(auth.clone()),
        Path("google".to_string()),
        Query(query),
    )
    .await
}

#[tokio::test]
async fn authorize_route_redirects_with_cookies() {
    let auth = oauth_auth();
    let outcome = auth.sign_in(SignInArgs::provider("google")).await.unwrap();
    let SignInOutcome::Redirect { verifier, .. } = outcome else {
        panic!("expected Redirect");
    };

    let response = drive_authorize(&auth, verifier, Some("/dashboard")).await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    assert!(location.starts_with("https://provider.test/authorize?"));

    let cookies: Vec<&str> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("auth_state=")));
    assert!(cookies.iter().any(|c| c.starts_with("auth_redirect_to=")));
    assert!(cookies.iter().all(|c| c.contains("HttpOnly")));
}

#[tokio::test]
async fn callback_route_appends_a_one_time_code() {
    let auth = oauth_auth();
    let outcome = auth.sign_in(SignInArgs::provider("google")).await.unwrap();
    let SignInOutcome::Redirect { verifier, .. } = outcome else {
        panic!("expected Redirect");
    };

    let authorize_response = drive_authorize(&auth, verifier, None).await;
    let state_cookie = authorize_response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap())
        .find(|c| c.starts_with("auth_state="))
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    // Recover the state from the provider redirect URL.
    let location = authorize_response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let state = url_param(&location, "state").unwrap();

    let mut request_headers = HeaderMap::new();
    request_headers.insert(header::COOKIE, state_cookie.parse().unwrap());
    let params: oauth::CallbackParams = serde_urlencoded::from_str(&format!(
        "state={}&code={}",
        urlencoding::encode(&state),
        MockOAuthClient::VALID_CODE
    ))
    .unwrap();

    let response = oauth::callback(
        State(auth.clone()),
        Path("google".to_string()),
        request_headers,
        Query(params),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    assert!(location.starts_with(common::SITE_URL));
    let handoff = url_param(location, "code").expect("one-time code appended");

    // The handoff code completes the sign-in.
    let outcome = auth
        .sign_in(SignInArgs::code(handoff).with_verifier(verifier))
        .await
        .unwrap();
    assert!(matches!(outcome, SignInOutcome::SignedIn { .. }));
}

#[tokio::test]
async fn callback_without_matching_state_redirects_without_a_code() {
    let auth = oauth_auth();
    let outcome = auth.sign_in(SignInArgs::provider("google")).await.unwrap();
    let SignInOutcome::Redirect { verifier, .. } = outcome else {
        panic!("expected Redirect");
    };
    drive_authorize(&auth, verifier, None).await;

    // No cookies at all: the double-submit check fails.
    let params: oauth::CallbackParams = serde_urlencoded::from_str(&format!(
        "state=forged&code={}",
        MockOAuthClient::VALID_CODE
    ))
    .unwrap();
    let response = oauth::callback(
        State(auth.clone()),
        Path("google".to_string()),
        HeaderMap::new(),
        Query(params),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    assert_eq!(location, common::SITE_URL);
    assert!(url_param(location, "code").is_none());
}

#[tokio::test]
async fn authorize_rejects_foreign_redirects() {
    let auth = oauth_auth();
    let outcome = auth.sign_in(SignInArgs::provider("google")).await.unwrap();
    let SignInOutcome::Redirect { verifier, .. } = outcome else {
        panic!("expected Redirect");
    };

    let response = drive_authorize(&auth, verifier, Some("https://evil.example.com/")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sealed_cookie_roundtrip_through_header_form() {
    let key = b"test-key";
    let sealed = seal(key, "abc");
    let header = format!("{STATE_COOKIE}={sealed}; other=1");
    let value = get_cookie(&header, STATE_COOKIE).unwrap();
    assert_eq!(open(key, value).as_deref(), Some("abc"));
}

fn url_param(url: &str, name: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name).then(|| urlencoding::decode(v).ok().map(|s| s.into_owned()))?
    })
}
