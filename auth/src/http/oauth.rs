//! OAuth authorize and callback routes.
//!
//! `GET /api/auth/signin/:provider?code=<verifierId>[&redirectTo=…]` builds
//! the provider authorization URL, stamps the state signature onto the
//! verifier, sets the half-trip cookies, and 302s to the provider.
//!
//! `GET|POST /api/auth/callback/:provider` validates state against the
//! cookie and the verifier, exchanges the code, and 302s back to the
//! resolved redirect with a one-time `?code=<verificationCode>` appended —
//! or without one on failure.

use crate::error::{AuthError, Result};
use crate::flows::oauth::{begin_authorization, handle_callback};
use crate::http::cookies::{
    clear_cookie, get_cookie, open, seal, set_cookie, PKCE_COOKIE, REDIRECT_COOKIE, STATE_COOKIE,
};
use crate::http::ApiError;
use crate::state::VerifierId;
use crate::store::AuthStore;
use crate::Auth;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;
use std::sync::Arc;

/// Query parameters of the authorize route.
#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    /// The client-held verifier id from sign-in phase 1.
    code: String,

    /// Optional post-auth destination.
    #[serde(rename = "redirectTo")]
    redirect_to: Option<String>,
}

/// Parameters of the callback route (query or form-encoded).
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// `GET /api/auth/signin/:provider`
pub async fn authorize<S: AuthStore>(
    State(auth): State<Arc<Auth<S>>>,
    Path(provider): Path<String>,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    match run_authorize(&auth, &provider, &query).await {
        Ok(response) => response,
        Err(err) => ApiError::from(err).into_response(),
    }
}

async fn run_authorize<S: AuthStore>(
    auth: &Auth<S>,
    provider_id: &str,
    query: &AuthorizeQuery,
) -> Result<Response> {
    if auth.config.provider(provider_id).is_none() {
        return Err(AuthError::ProviderNotConfigured(provider_id.to_string()));
    }
    let verifier_id = VerifierId::parse(&query.code).ok_or(AuthError::OAuthMissingVerifier)?;

    let redirect_to = match &query.redirect_to {
        Some(target) => Some(validate_redirect(auth, target).await?),
        None => None,
    };

    let redirect_uri = callback_uri(auth, provider_id);
    let start = begin_authorization(auth, provider_id, verifier_id, &redirect_uri).await?;

    let key = auth.cookie_key();
    let secure = auth.secure_cookies();
    let mut headers = HeaderMap::new();
    headers.insert(header::LOCATION, header_value(&start.authorization_url)?);
    headers.append(
        header::SET_COOKIE,
        header_value(&set_cookie(STATE_COOKIE, &seal(&key, &start.state), secure, 600))?,
    );
    if let Some(pkce) = &start.pkce_verifier {
        headers.append(
            header::SET_COOKIE,
            header_value(&set_cookie(PKCE_COOKIE, &seal(&key, pkce), secure, 600))?,
        );
    }
    if let Some(target) = &redirect_to {
        headers.append(
            header::SET_COOKIE,
            header_value(&set_cookie(REDIRECT_COOKIE, &seal(&key, target), secure, 600))?,
        );
    }

    Ok((StatusCode::FOUND, headers).into_response())
}

/// `GET /api/auth/callback/:provider`
pub async fn callback<S: AuthStore>(
    State(auth): State<Arc<Auth<S>>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    run_callback(&auth, &provider, &headers, params).await
}

/// `POST /api/auth/callback/:provider` (form-encoded response mode)
pub async fn callback_form<S: AuthStore>(
    State(auth): State<Arc<Auth<S>>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Form(params): Form<CallbackParams>,
) -> Response {
    run_callback(&auth, &provider, &headers, params).await
}

async fn run_callback<S: AuthStore>(
    auth: &Auth<S>,
    provider_id: &str,
    headers: &HeaderMap,
    params: CallbackParams,
) -> Response {
    let key = auth.cookie_key();
    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let redirect_target = get_cookie(cookie_header, REDIRECT_COOKIE)
        .and_then(|sealed| open(&key, sealed))
        .unwrap_or_else(|| auth.config.site_url.clone());

    let handoff = try_callback(auth, provider_id, cookie_header, &key, &params).await;

    let location = match &handoff {
        Ok(code) => {
            let separator = if redirect_target.contains('?') { '&' } else { '?' };
            format!("{redirect_target}{separator}code={}", urlencoding::encode(code))
        }
        Err(err) => {
            tracing::warn!(provider = %provider_id, code = err.code(), "OAuth callback failed");
            redirect_target
        }
    };

    let secure = auth.secure_cookies();
    let mut response_headers = HeaderMap::new();
    let Ok(location) = HeaderValue::from_str(&location) else {
        return ApiError::from(AuthError::InvalidRedirect).into_response();
    };
    response_headers.insert(header::LOCATION, location);
    for name in [STATE_COOKIE, PKCE_COOKIE, REDIRECT_COOKIE] {
        if let Ok(value) = HeaderValue::from_str(&clear_cookie(name, secure)) {
            response_headers.append(header::SET_COOKIE, value);
        }
    }
    (StatusCode::FOUND, response_headers).into_response()
}

async fn try_callback<S: AuthStore>(
    auth: &Auth<S>,
    provider_id: &str,
    cookie_header: &str,
    key: &[u8],
    params: &CallbackParams,
) -> Result<String> {
    if let Some(error) = &params.error {
        return Err(AuthError::OAuthProviderError(error.clone()));
    }
    let state = params.state.as_deref().ok_or(AuthError::OAuthInvalidState)?;
    let code = params
        .code
        .as_deref()
        .ok_or_else(|| AuthError::OAuthProviderError("callback carried no code".into()))?;

    // Double-submit: the state must match the sealed cookie set at
    // authorize time, and the verifier's stored signature.
    let cookie_state = get_cookie(cookie_header, STATE_COOKIE)
        .and_then(|sealed| open(key, sealed))
        .ok_or(AuthError::OAuthInvalidState)?;
    if cookie_state != state {
        return Err(AuthError::OAuthInvalidState);
    }
    let pkce_verifier = get_cookie(cookie_header, PKCE_COOKIE).and_then(|sealed| open(key, sealed));

    handle_callback(
        auth,
        provider_id,
        state,
        code,
        pkce_verifier.as_deref(),
        &callback_uri(auth, provider_id),
    )
    .await
}

fn callback_uri<S>(auth: &Auth<S>, provider_id: &str) -> String {
    format!("{}/api/auth/callback/{provider_id}", auth.config.site_url)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| AuthError::InvalidRedirect)
}

/// Resolve a requested redirect target against the policy: host callback
/// when configured, same-origin with `SITE_URL` otherwise.
pub(crate) async fn validate_redirect<S: AuthStore>(
    auth: &Auth<S>,
    target: &str,
) -> Result<String> {
    if let Some(policy) = &auth.config.callbacks.redirect {
        if policy.validate(target).await? {
            return Ok(target.to_string());
        }
        return Err(AuthError::InvalidRedirect);
    }
    let site = auth.config.site_url.trim_end_matches('/');
    if target.starts_with('/') && !target.starts_with("//") {
        return Ok(format!("{site}{target}"));
    }
    if target == site || target.starts_with(&format!("{site}/")) {
        return Ok(target.to_string());
    }
    Err(AuthError::InvalidRedirect)
}
