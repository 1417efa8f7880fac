//! HTTP surface.
//!
//! OIDC discovery and JWKS, the OAuth authorize/callback half-trips, and
//! the Bearer-authenticated action wrapper. Everything rides on axum; the
//! host mounts [`router`] wherever it serves the auth origin.

use crate::error::AuthError;
use crate::store::AuthStore;
use crate::utils::sha256;
use crate::Auth;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

pub mod bearer;
pub mod cookies;
pub mod discovery;
pub mod oauth;

pub use bearer::{BearerAction, BearerKey, CorsConfig};

/// Cache policy for the discovery documents.
pub(crate) const DISCOVERY_CACHE_CONTROL: &str =
    "public, max-age=15, stale-while-revalidate=15, stale-if-error=86400";

/// Build the auth router: discovery, JWKS, and the OAuth half-trips.
pub fn router<S>(auth: Arc<Auth<S>>) -> Router
where
    S: AuthStore + 'static,
{
    Router::new()
        .route(
            "/.well-known/openid-configuration",
            get(discovery::openid_configuration::<S>),
        )
        .route("/.well-known/jwks.json", get(discovery::jwks::<S>))
        .route("/api/auth/signin/:provider", get(oauth::authorize::<S>))
        .route(
            "/api/auth/callback/:provider",
            get(oauth::callback::<S>).post(oauth::callback_form::<S>),
        )
        .with_state(auth)
}

impl<S> Auth<S> {
    /// Key for OAuth half-trip cookie MACs.
    pub(crate) fn cookie_key(&self) -> Vec<u8> {
        self.config.cookie_secret.as_ref().map_or_else(
            || sha256(self.config.jwt.private_key_pem.as_bytes()).to_vec(),
            |secret| secret.as_bytes().to_vec(),
        )
    }

    /// Whether ceremony cookies should carry the `Secure` attribute.
    pub(crate) fn secure_cookies(&self) -> bool {
        self.config.site_url.starts_with("https://")
    }
}

/// Structured `{code, message}` error response.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status.
    pub status: StatusCode,

    /// Machine-readable code.
    pub code: &'static str,

    /// Human message.
    pub message: String,
}

impl ApiError {
    /// Missing `Authorization` header.
    #[must_use]
    pub fn missing_token() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "INVALID_API_KEY",
            message: "Missing bearer token".into(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = match &err {
            AuthError::NotSignedIn => StatusCode::UNAUTHORIZED,
            AuthError::InvalidApiKey
            | AuthError::ApiKeyRevoked
            | AuthError::ApiKeyExpired
            | AuthError::ApiKeyRateLimited
            | AuthError::ScopeCheckFailed => StatusCode::FORBIDDEN,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %err, "internal error surfaced to http");
            "Internal error".to_string()
        } else {
            err.to_string()
        };
        Self {
            status,
            code: err.code(),
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "code": self.code, "message": self.message });
        (self.status, axum::Json(body)).into_response()
    }
}

/// Apply CORS headers to a response.
pub(crate) fn apply_cors(cors: &CorsConfig, headers: &mut HeaderMap) {
    if let Ok(origin) = HeaderValue::from_str(&cors.allow_origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    let methods = cors
        .allow_methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if let Ok(methods) = HeaderValue::from_str(&methods) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods);
    }
    if let Ok(allow_headers) = HeaderValue::from_str(&cors.allow_headers.join(", ")) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, allow_headers);
    }
}
