//! Bearer-authenticated action wrapper.
//!
//! Wraps a handler with API-key verification, optional scope enforcement,
//! and CORS. Handlers receive the verified [`KeyContext`] and return a
//! plain JSON value, auto-wrapped as `200 application/json`. Failures map
//! to structured `{code, message}` responses: `401` for a missing token,
//! `403` for invalid/revoked/expired/rate-limited keys and scope misses,
//! `500` for everything unexpected.

use crate::apikey::KeyContext;
use crate::error::{AuthError, Result};
use crate::http::{apply_cors, ApiError};
use crate::store::AuthStore;
use crate::Auth;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use std::future::Future;
use std::sync::Arc;

/// CORS policy applied to every wrapped response. Permissive by default.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// `Access-Control-Allow-Origin` value.
    pub allow_origin: String,

    /// Allowed methods.
    pub allow_methods: Vec<Method>,

    /// Allowed request headers.
    pub allow_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: "*".into(),
            allow_methods: vec![Method::GET, Method::POST, Method::OPTIONS],
            allow_headers: vec!["Authorization".into(), "Content-Type".into()],
        }
    }
}

/// Extract the raw bearer token from an `Authorization` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// A Bearer-authenticated endpoint description.
pub struct BearerAction<S> {
    auth: Arc<Auth<S>>,
    scope: Option<(String, String)>,
    cors: CorsConfig,
}

impl<S: AuthStore> BearerAction<S> {
    /// Wrap endpoints served by `auth`.
    #[must_use]
    pub fn new(auth: Arc<Auth<S>>) -> Self {
        Self {
            auth,
            scope: None,
            cors: CorsConfig::default(),
        }
    }

    /// Require the key to cover `(resource, action)`.
    #[must_use]
    pub fn with_scope(mut self, resource: impl Into<String>, action: impl Into<String>) -> Self {
        self.scope = Some((resource.into(), action.into()));
        self
    }

    /// Override the CORS policy.
    #[must_use]
    pub fn with_cors(mut self, cors: CorsConfig) -> Self {
        self.cors = cors;
        self
    }

    /// Authenticate a request and enforce the declared scope.
    ///
    /// # Errors
    ///
    /// Returns the structured error the wrapper would serve.
    pub async fn authenticate(&self, headers: &HeaderMap) -> std::result::Result<KeyContext, ApiError> {
        let token = bearer_token(headers).ok_or_else(ApiError::missing_token)?;
        let context = self.auth.verify_api_key(token).await.map_err(ApiError::from)?;
        if let Some((resource, action)) = &self.scope {
            if !context.can(resource, action) {
                return Err(ApiError::from(AuthError::ScopeCheckFailed));
            }
        }
        Ok(context)
    }

    /// Run a handler behind Bearer authentication.
    ///
    /// `OPTIONS` requests short-circuit to a `204` preflight response. The
    /// handler's JSON value is wrapped as `200 application/json`; CORS
    /// headers land on every response.
    pub async fn handle<F, Fut>(&self, method: &Method, headers: &HeaderMap, handler: F) -> Response
    where
        F: FnOnce(KeyContext) -> Fut,
        Fut: Future<Output = Result<serde_json::Value>>,
    {
        let mut response = if *method == Method::OPTIONS {
            StatusCode::NO_CONTENT.into_response()
        } else {
            match self.authenticate(headers).await {
                Ok(context) => match handler(context).await {
                    Ok(body) => (StatusCode::OK, axum::Json(body)).into_response(),
                    Err(err) => ApiError::from(err).into_response(),
                },
                Err(err) => err.into_response(),
            }
        };
        apply_cors(&self.cors, response.headers_mut());
        response
    }
}

/// Axum extractor for Bearer-authenticated routes mounted with
/// `State<Arc<Auth<S>>>`.
///
/// Scope enforcement stays with [`BearerAction`]; the extractor only
/// authenticates.
pub struct BearerKey(pub KeyContext);

#[async_trait]
impl<S: AuthStore + 'static> FromRequestParts<Arc<Auth<S>>> for BearerKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        auth: &Arc<Auth<S>>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(ApiError::missing_token)?;
        let context = auth.verify_api_key(token).await.map_err(ApiError::from)?;
        Ok(Self(context))
    }
}
