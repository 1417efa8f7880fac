//! OAuth 2.0 / OIDC provider seam.
//!
//! The core treats the provider SDK as opaque: it asks for an authorization
//! URL and later hands back the callback code for a profile. The default
//! [`HttpOAuthClient`] speaks plain OAuth 2.0 over reqwest, with either a
//! confidential client (client-secret Basic) or a public PKCE client.

use crate::error::{AuthError, Result};
use crate::utils::{base64url, random_url_token, sha256};
use crate::BoxFuture;
use serde::Deserialize;

/// Normalized profile extracted from a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuthProfile {
    /// Stable subject identifier within the provider.
    pub id: String,

    /// Email address, when the provider shares one.
    pub email: Option<String>,

    /// Whether the provider attests the email as verified.
    pub email_verified: bool,

    /// Phone number, when the provider shares one.
    pub phone: Option<String>,

    /// Whether the provider attests the phone as verified.
    pub phone_verified: bool,

    /// Display name.
    pub name: Option<String>,

    /// Avatar URL.
    pub image: Option<String>,
}

/// Opaque OAuth provider client.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so it can ride inside the
/// `Provider` enum as a trait object.
pub trait OAuthClient: Send + Sync {
    /// Build the provider authorization URL for a ceremony.
    ///
    /// `pkce_challenge` is the S256 challenge when this client is a public
    /// PKCE client, `None` for confidential clients.
    ///
    /// # Errors
    ///
    /// Returns an error if URL construction fails.
    fn authorization_url<'a>(
        &'a self,
        state: &'a str,
        redirect_uri: &'a str,
        pkce_challenge: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String>>;

    /// Exchange the callback code for tokens and extract the profile.
    ///
    /// # Errors
    ///
    /// Returns `OAUTH_PROVIDER_ERROR` if the exchange fails and
    /// `OAUTH_INVALID_PROFILE` if the provider response lacks a subject.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a str,
        pkce_verifier: Option<&'a str>,
    ) -> BoxFuture<'a, Result<OAuthProfile>>;

    /// Whether the authorize leg must carry a PKCE challenge.
    fn uses_pkce(&self) -> bool;
}

/// Generate a fresh PKCE code verifier (43 base64url chars).
#[must_use]
pub fn generate_pkce_verifier() -> String {
    random_url_token(32)
}

/// Derive the S256 challenge for a PKCE code verifier.
#[must_use]
pub fn pkce_challenge(verifier: &str) -> String {
    base64url(&sha256(verifier.as_bytes()))
}

/// Provider endpoint set for [`HttpOAuthClient`].
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    /// Authorization endpoint the user is redirected to.
    pub authorization: String,

    /// Token endpoint for the code exchange.
    pub token: String,

    /// Userinfo endpoint queried with the access token.
    pub userinfo: String,
}

/// Generic OAuth 2.0 client over HTTP.
///
/// Confidential clients authenticate the token exchange with client-secret
/// Basic; public clients omit the secret and use PKCE instead.
#[derive(Debug, Clone)]
pub struct HttpOAuthClient {
    endpoints: OAuthEndpoints,
    client_id: String,
    client_secret: Option<String>,
    scopes: Vec<String>,
    http: reqwest::Client,
}

impl HttpOAuthClient {
    /// Create a client for the given endpoints.
    #[must_use]
    pub fn new(endpoints: OAuthEndpoints, client_id: String, client_secret: Option<String>) -> Self {
        Self {
            endpoints,
            client_id,
            client_secret,
            scopes: vec!["openid".into(), "email".into(), "profile".into()],
            http: reqwest::Client::new(),
        }
    }

    /// Preset for Google Identity Platform.
    #[must_use]
    pub fn google(client_id: String, client_secret: String) -> Self {
        Self::new(
            OAuthEndpoints {
                authorization: "https://accounts.google.com/o/oauth2/v2/auth".into(),
                token: "https://oauth2.googleapis.com/token".into(),
                userinfo: "https://openidconnect.googleapis.com/v1/userinfo".into(),
            },
            client_id,
            Some(client_secret),
        )
    }

    /// Preset for GitHub.
    #[must_use]
    pub fn github(client_id: String, client_secret: String) -> Self {
        let mut client = Self::new(
            OAuthEndpoints {
                authorization: "https://github.com/login/oauth/authorize".into(),
                token: "https://github.com/login/oauth/access_token".into(),
                userinfo: "https://api.github.com/user".into(),
            },
            client_id,
            Some(client_secret),
        );
        client.scopes = vec!["read:user".into(), "user:email".into()];
        client
    }

    /// Override the requested scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }
}

/// Token endpoint response, the subset the core consumes.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Userinfo claims the core understands; unknown claims are ignored.
#[derive(Debug, Deserialize)]
struct UserinfoClaims {
    #[serde(alias = "id")]
    sub: Option<serde_json::Value>,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    phone_number: Option<String>,
    #[serde(default)]
    phone_number_verified: bool,
    name: Option<String>,
    #[serde(alias = "avatar_url")]
    picture: Option<String>,
}

impl OAuthClient for HttpOAuthClient {
    fn authorization_url<'a>(
        &'a self,
        state: &'a str,
        redirect_uri: &'a str,
        pkce_challenge: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let scope = self.scopes.join(" ");
            let mut params = vec![
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("state", state),
            ];
            if let Some(challenge) = pkce_challenge {
                params.push(("code_challenge", challenge));
                params.push(("code_challenge_method", "S256"));
            }
            let query = serde_urlencoded::to_string(&params)
                .map_err(|e| AuthError::Internal(format!("failed to build URL: {e}")))?;
            Ok(format!("{}?{}", self.endpoints.authorization, query))
        })
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a str,
        pkce_verifier: Option<&'a str>,
    ) -> BoxFuture<'a, Result<OAuthProfile>> {
        Box::pin(async move {
            let mut params = vec![
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", self.client_id.as_str()),
            ];
            if let Some(verifier) = pkce_verifier {
                params.push(("code_verifier", verifier));
            }

            let mut request = self
                .http
                .post(&self.endpoints.token)
                .header(reqwest::header::ACCEPT, "application/json")
                .form(&params);
            if let Some(secret) = &self.client_secret {
                request = request.basic_auth(&self.client_id, Some(secret));
            }

            let response = request
                .send()
                .await
                .map_err(|e| AuthError::OAuthProviderError(e.to_string()))?;
            if !response.status().is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(provider_response = %body, "OAuth token exchange failed");
                return Err(AuthError::OAuthProviderError("token exchange failed".into()));
            }
            let tokens: TokenResponse = response
                .json()
                .await
                .map_err(|e| AuthError::OAuthProviderError(e.to_string()))?;

            let response = self
                .http
                .get(&self.endpoints.userinfo)
                .bearer_auth(&tokens.access_token)
                .header(reqwest::header::USER_AGENT, "gatehouse-auth")
                .send()
                .await
                .map_err(|e| AuthError::OAuthProviderError(e.to_string()))?;
            if !response.status().is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(provider_response = %body, "OAuth userinfo fetch failed");
                return Err(AuthError::OAuthProviderError("userinfo fetch failed".into()));
            }
            let claims: UserinfoClaims = response
                .json()
                .await
                .map_err(|e| AuthError::OAuthProviderError(e.to_string()))?;

            let id = match claims.sub {
                Some(serde_json::Value::String(s)) => s,
                Some(serde_json::Value::Number(n)) => n.to_string(),
                _ => return Err(AuthError::OAuthInvalidProfile),
            };
            Ok(OAuthProfile {
                id,
                email: claims.email,
                email_verified: claims.email_verified,
                phone: claims.phone_number,
                phone_verified: claims.phone_number_verified,
                name: claims.name,
                image: claims.picture,
            })
        })
    }

    fn uses_pkce(&self) -> bool {
        self.client_secret.is_none()
    }
}
