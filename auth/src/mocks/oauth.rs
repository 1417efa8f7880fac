//! Mock OAuth provider client with a scripted profile.

use crate::error::{AuthError, Result};
use crate::providers::oauth::{OAuthClient, OAuthProfile};
use crate::BoxFuture;
use std::sync::{Arc, Mutex};

/// OAuth client that returns a scripted profile for the fixed code
/// `"provider-code"` and records every exchange it performs.
#[derive(Debug, Clone)]
pub struct MockOAuthClient {
    profile: OAuthProfile,
    pkce: bool,
    exchanges: Arc<Mutex<Vec<String>>>,
}

impl MockOAuthClient {
    /// The authorization code this mock accepts.
    pub const VALID_CODE: &'static str = "provider-code";

    /// Script the profile the provider "returns".
    #[must_use]
    pub fn new(profile: OAuthProfile) -> Self {
        Self {
            profile,
            pkce: false,
            exchanges: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Act as a public PKCE client.
    #[must_use]
    pub fn with_pkce(mut self) -> Self {
        self.pkce = true;
        self
    }

    /// Codes this mock was asked to exchange.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn exchanged_codes(&self) -> Result<Vec<String>> {
        Ok(self
            .exchanges
            .lock()
            .map_err(|_| AuthError::Internal("mock mutex poisoned".into()))?
            .clone())
    }
}

impl OAuthClient for MockOAuthClient {
    fn authorization_url<'a>(
        &'a self,
        state: &'a str,
        redirect_uri: &'a str,
        pkce_challenge: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let mut url = format!(
                "https://provider.test/authorize?client_id=mock&state={}&redirect_uri={}",
                urlencoding::encode(state),
                urlencoding::encode(redirect_uri),
            );
            if let Some(challenge) = pkce_challenge {
                url.push_str("&code_challenge=");
                url.push_str(challenge);
                url.push_str("&code_challenge_method=S256");
            }
            Ok(url)
        })
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        _redirect_uri: &'a str,
        pkce_verifier: Option<&'a str>,
    ) -> BoxFuture<'a, Result<OAuthProfile>> {
        Box::pin(async move {
            if self.pkce && pkce_verifier.is_none() {
                return Err(AuthError::OAuthProviderError("missing pkce verifier".into()));
            }
            if code != Self::VALID_CODE {
                return Err(AuthError::OAuthProviderError("bad authorization code".into()));
            }
            self.exchanges
                .lock()
                .map_err(|_| AuthError::Internal("mock mutex poisoned".into()))?
                .push(code.to_string());
            Ok(self.profile.clone())
        })
    }

    fn uses_pkce(&self) -> bool {
        self.pkce
    }
}
