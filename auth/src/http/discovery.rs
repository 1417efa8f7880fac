//! OIDC discovery and JWKS endpoints.
//!
//! Static JSON derived from configuration, served with short cache headers
//! so key rotation propagates inside the cache window.

use crate::http::DISCOVERY_CACHE_CONTROL;
use crate::store::AuthStore;
use crate::Auth;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

fn cached_json(body: serde_json::Value) -> Response {
    (
        [(header::CACHE_CONTROL, DISCOVERY_CACHE_CONTROL)],
        axum::Json(body),
    )
        .into_response()
}

/// `GET /.well-known/openid-configuration`
pub async fn openid_configuration<S: AuthStore>(State(auth): State<Arc<Auth<S>>>) -> Response {
    let issuer = auth.codec().issuer();
    cached_json(serde_json::json!({
        "issuer": issuer,
        "jwks_uri": format!("{issuer}/.well-known/jwks.json"),
        "authorization_endpoint": format!("{issuer}/api/auth/signin"),
    }))
}

/// `GET /.well-known/jwks.json`
pub async fn jwks<S: AuthStore>(State(auth): State<Arc<Auth<S>>>) -> Response {
    cached_json(auth.codec().jwks().clone())
}
