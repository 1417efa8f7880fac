//! API keys: issuance, verification, scopes, per-key rate limits, and the
//! Bearer wrapper.

mod common;

use axum::http::{header, HeaderMap, Method};
use common::{auth_over, signed_in};
use gatehouse_auth::apikey::{ApiKeyUpdate, CreateApiKey};
use gatehouse_auth::config::ApiKeyConfig;
use gatehouse_auth::http::BearerAction;
use gatehouse_auth::mocks::MockSecretHasher;
use gatehouse_auth::providers::{CredentialsProviderConfig, Provider};
use gatehouse_auth::store::records::{ApiKeyRateLimit, ApiKeyScope};
use gatehouse_auth::{Auth, AuthError, MemoryStore, SignInArgs, UserId};
use std::collections::HashMap;
use std::sync::Arc;

fn scope(resource: &str, actions: &[&str]) -> ApiKeyScope {
    ApiKeyScope {
        resource: resource.into(),
        actions: actions.iter().map(|&a| a.into()).collect(),
    }
}

fn restricted_config() -> ApiKeyConfig {
    ApiKeyConfig::default().with_scopes(HashMap::from([(
        "users".to_string(),
        vec!["read".to_string(), "list".to_string()],
    )]))
}

async fn auth_and_user(api_keys: ApiKeyConfig) -> (Auth<MemoryStore>, UserId) {
    let auth = auth_over(
        MemoryStore::new(),
        vec![Provider::Credentials(
            CredentialsProviderConfig::new("password")
                .with_hasher(Arc::new(MockSecretHasher::new())),
        )],
        api_keys,
    );
    let identity = signed_in(
        &auth
            .sign_in(SignInArgs::provider("password").with_params(serde_json::json!({
                "flow": "create", "id": "a@x.com", "secret": "p1"
            })))
            .await
            .unwrap(),
    );
    (auth, identity.user_id)
}

fn bearer_headers(raw: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        format!("Bearer {raw}").parse().unwrap(),
    );
    headers
}

#[tokio::test]
async fn create_and_verify() {
    let (auth, user_id) = auth_and_user(ApiKeyConfig::default()).await;
    let created = auth
        .create_api_key(CreateApiKey {
            user_id,
            name: "ci".into(),
            scopes: vec![scope("users", &["read"])],
            rate_limit: None,
            expires_at: None,
        })
        .await
        .unwrap();

    assert!(created.raw.starts_with("ak_"));
    assert_eq!(created.raw.len(), 3 + 32);

    let context = auth.verify_api_key(&created.raw).await.unwrap();
    assert_eq!(context.user_id, user_id);
    assert_eq!(context.key_id, created.key_id);
    assert!(context.can("users", "read"));
    assert!(!context.can("users", "write"));

    // Raw material is never persisted; the stored row carries hash and a
    // display prefix only.
    let row = auth.get_api_key(created.key_id).await.unwrap().unwrap();
    assert_ne!(row.hashed_key, created.raw);
    assert!(row.prefix.starts_with("ak_"));
    assert!(row.prefix.ends_with("..."));
    assert_eq!(row.prefix.len(), 3 + 4 + 3);
    assert!(row.last_used_at.is_some());
}

#[tokio::test]
async fn unknown_revoked_and_expired_keys_fail() {
    let (auth, user_id) = auth_and_user(ApiKeyConfig::default()).await;

    assert_eq!(
        auth.verify_api_key("ak_doesnotexist").await.unwrap_err(),
        AuthError::InvalidApiKey
    );

    let created = auth
        .create_api_key(CreateApiKey {
            user_id,
            name: "ci".into(),
            scopes: vec![scope("users", &["read"])],
            rate_limit: None,
            expires_at: None,
        })
        .await
        .unwrap();
    auth.revoke_api_key(created.key_id).await.unwrap();
    assert_eq!(
        auth.verify_api_key(&created.raw).await.unwrap_err(),
        AuthError::ApiKeyRevoked
    );
    // Revoked keys stay listed; removed keys do not.
    assert_eq!(auth.list_api_keys(user_id).await.unwrap().len(), 1);
    auth.remove_api_key(created.key_id).await.unwrap();
    assert!(auth.list_api_keys(user_id).await.unwrap().is_empty());
    assert_eq!(
        auth.verify_api_key(&created.raw).await.unwrap_err(),
        AuthError::InvalidApiKey
    );

    let expired = auth
        .create_api_key(CreateApiKey {
            user_id,
            name: "old".into(),
            scopes: vec![scope("users", &["read"])],
            rate_limit: None,
            expires_at: Some(chrono::Utc::now() - chrono::Duration::minutes(1)),
        })
        .await
        .unwrap();
    assert_eq!(
        auth.verify_api_key(&expired.raw).await.unwrap_err(),
        AuthError::ApiKeyExpired
    );
}

#[tokio::test]
async fn scope_allow_list_gates_creation() {
    let (auth, user_id) = auth_and_user(restricted_config()).await;

    // users:[write] is outside {users: [read, list]}.
    assert_eq!(
        auth.create_api_key(CreateApiKey {
            user_id,
            name: "bad".into(),
            scopes: vec![scope("users", &["write"])],
            rate_limit: None,
            expires_at: None,
        })
        .await
        .unwrap_err(),
        AuthError::ApiKeyInvalidScope
    );
    // Unknown resources are rejected outright.
    assert_eq!(
        auth.create_api_key(CreateApiKey {
            user_id,
            name: "bad".into(),
            scopes: vec![scope("posts", &["read"])],
            rate_limit: None,
            expires_at: None,
        })
        .await
        .unwrap_err(),
        AuthError::ApiKeyInvalidScope
    );
    // The wildcard action is always permitted.
    auth.create_api_key(CreateApiKey {
        user_id,
        name: "ok".into(),
        scopes: vec![scope("users", &["*"])],
        rate_limit: None,
        expires_at: None,
    })
    .await
    .unwrap();

    // Updates run through the same gate.
    let created = auth
        .create_api_key(CreateApiKey {
            user_id,
            name: "ci".into(),
            scopes: vec![scope("users", &["read"])],
            rate_limit: None,
            expires_at: None,
        })
        .await
        .unwrap();
    assert_eq!(
        auth.update_api_key(
            created.key_id,
            ApiKeyUpdate {
                scopes: Some(vec![scope("users", &["write"])]),
                ..ApiKeyUpdate::default()
            },
        )
        .await
        .unwrap_err(),
        AuthError::ApiKeyInvalidScope
    );
}

#[tokio::test]
async fn per_key_bucket_blocks_the_1001st_request() {
    let (auth, user_id) = auth_and_user(ApiKeyConfig::default()).await;
    let created = auth
        .create_api_key(CreateApiKey {
            user_id,
            name: "busy".into(),
            scopes: vec![scope("users", &["read"])],
            rate_limit: Some(ApiKeyRateLimit {
                max_requests: 1000,
                window_ms: 3_600_000,
            }),
            expires_at: None,
        })
        .await
        .unwrap();

    for _ in 0..1000 {
        auth.verify_api_key(&created.raw).await.unwrap();
    }
    assert_eq!(
        auth.verify_api_key(&created.raw).await.unwrap_err(),
        AuthError::ApiKeyRateLimited
    );
}

#[tokio::test]
async fn bearer_wrapper_enforces_token_scope_and_cors() {
    let (auth, user_id) = auth_and_user(restricted_config()).await;
    let auth = Arc::new(auth);
    let created = auth
        .create_api_key(CreateApiKey {
            user_id,
            name: "ci".into(),
            scopes: vec![scope("users", &["read"])],
            rate_limit: None,
            expires_at: None,
        })
        .await
        .unwrap();

    let read_action = BearerAction::new(auth.clone()).with_scope("users", "read");
    let write_action = BearerAction::new(auth.clone()).with_scope("users", "write");

    // Missing token: 401.
    let err = read_action.authenticate(&HeaderMap::new()).await.unwrap_err();
    assert_eq!(err.status, axum::http::StatusCode::UNAUTHORIZED);

    // Garbage token: 403.
    let err = read_action
        .authenticate(&bearer_headers("ak_bogus"))
        .await
        .unwrap_err();
    assert_eq!(err.status, axum::http::StatusCode::FORBIDDEN);
    assert_eq!(err.code, "INVALID_API_KEY");

    // In-scope request reaches the handler and wraps its JSON.
    let response = read_action
        .handle(&Method::GET, &bearer_headers(&created.raw), |ctx| async move {
            Ok(serde_json::json!({ "user": ctx.user_id.to_string() }))
        })
        .await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );

    // Out-of-scope request: 403 SCOPE_CHECK_FAILED.
    let err = write_action
        .authenticate(&bearer_headers(&created.raw))
        .await
        .unwrap_err();
    assert_eq!(err.status, axum::http::StatusCode::FORBIDDEN);
    assert_eq!(err.code, "SCOPE_CHECK_FAILED");

    // Preflight short-circuits without a token.
    let response = write_action
        .handle(&Method::OPTIONS, &HeaderMap::new(), |_| async move {
            Ok(serde_json::json!({}))
        })
        .await;
    assert_eq!(response.status(), axum::http::StatusCode::NO_CONTENT);
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
}

#[tokio::test]
async fn default_rate_limit_applies_to_new_keys() {
    let config = ApiKeyConfig::default().with_default_rate_limit(ApiKeyRateLimit {
        max_requests: 2,
        window_ms: 3_600_000,
    });
    let (auth, user_id) = auth_and_user(config).await;
    let created = auth
        .create_api_key(CreateApiKey {
            user_id,
            name: "slow".into(),
            scopes: vec![scope("users", &["read"])],
            rate_limit: None,
            expires_at: None,
        })
        .await
        .unwrap();

    auth.verify_api_key(&created.raw).await.unwrap();
    auth.verify_api_key(&created.raw).await.unwrap();
    assert_eq!(
        auth.verify_api_key(&created.raw).await.unwrap_err(),
        AuthError::ApiKeyRateLimited
    );

    let row = auth.get_api_key(created.key_id).await.unwrap().unwrap();
    assert!(row.rate_limit_state.is_some());
}

#[tokio::test]
async fn update_changes_name_and_expiry() {
    let (auth, user_id) = auth_and_user(ApiKeyConfig::default()).await;
    let created = auth
        .create_api_key(CreateApiKey {
            user_id,
            name: "ci".into(),
            scopes: vec![scope("users", &["read"])],
            rate_limit: None,
            expires_at: None,
        })
        .await
        .unwrap();

    let new_expiry = chrono::Utc::now() + chrono::Duration::days(7);
    auth.update_api_key(
        created.key_id,
        ApiKeyUpdate {
            name: Some("deploy".into()),
            expires_at: Some(new_expiry),
            ..ApiKeyUpdate::default()
        },
    )
    .await
    .unwrap();

    let row = auth.get_api_key(created.key_id).await.unwrap().unwrap();
    assert_eq!(row.name, "deploy");
    assert_eq!(row.expires_at, Some(new_expiry));
}
