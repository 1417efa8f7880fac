//! Token codec: access JWTs and opaque refresh tokens.
//!
//! Access tokens are RS256 JWTs over `{sub: "<userId>|<sessionId>", iat,
//! exp, iss}`. Verification happens out-of-core against the published JWKS;
//! the codec only signs. Refresh tokens are opaque
//! `"<refreshTokenId>|<sessionId>"` strings; both halves are needed to load
//! the row and to bind the token to its session even if the id leaks alone.

use crate::config::JwtConfig;
use crate::error::{AuthError, Result};
use crate::state::{RefreshTokenId, SessionId, UserId};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

/// Claims of an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// `"<userId>|<sessionId>"`.
    pub sub: String,

    /// Issued-at, seconds since epoch.
    pub iat: i64,

    /// Expiry, seconds since epoch.
    pub exp: i64,

    /// Issuer (`SITE_URL`).
    pub iss: String,
}

/// Signs access tokens and formats refresh tokens.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    header: Header,
    issuer: String,
    duration: chrono::Duration,
    jwks: serde_json::Value,
}

impl TokenCodec {
    /// Build a codec from the signing configuration.
    ///
    /// # Errors
    ///
    /// Returns `INTERNAL_ERROR` if the private key PEM cannot be parsed.
    pub fn new(config: &JwtConfig, issuer: String) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(config.private_key_pem.as_bytes())
            .map_err(|e| AuthError::Internal(format!("invalid signing key: {e}")))?;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = config.key_id.clone();
        Ok(Self {
            encoding_key,
            header,
            issuer,
            duration: config.duration,
            jwks: config.jwks.clone(),
        })
    }

    /// Sign an access token for a user/session pair.
    ///
    /// # Errors
    ///
    /// Returns `INTERNAL_ERROR` if signing fails.
    pub fn sign_access_token(
        &self,
        user_id: UserId,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let claims = AccessClaims {
            sub: format!("{user_id}|{session_id}"),
            iat: now.timestamp(),
            exp: (now + self.duration).timestamp(),
            iss: self.issuer.clone(),
        };
        jsonwebtoken::encode(&self.header, &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("jwt signing failed: {e}")))
    }

    /// The published JWK set.
    #[must_use]
    pub fn jwks(&self) -> &serde_json::Value {
        &self.jwks
    }

    /// The issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Format an opaque refresh token.
    #[must_use]
    pub fn format_refresh_token(id: RefreshTokenId, session_id: SessionId) -> String {
        format!("{id}|{session_id}")
    }

    /// Parse an opaque refresh token.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_REFRESH_TOKEN` on any format deviation.
    pub fn parse_refresh_token(token: &str) -> Result<(RefreshTokenId, SessionId)> {
        let mut parts = token.split('|');
        let (Some(id), Some(session), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(AuthError::InvalidRefreshToken);
        };
        let id = RefreshTokenId::parse(id).ok_or(AuthError::InvalidRefreshToken)?;
        let session = SessionId::parse(session).ok_or(AuthError::InvalidRefreshToken)?;
        Ok((id, session))
    }
}
