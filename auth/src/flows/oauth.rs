//! OAuth 2.0 / OIDC ceremony.
//!
//! Phase 1 (`sign_in` with an OAuth provider) mints a verifier and sends the
//! client to the HTTP authorize route. That route binds a `state` to the
//! verifier and redirects to the provider. The callback validates `state`
//! against the verifier's signature, exchanges the code, runs the linker,
//! and mints a one-time handoff code. Phase 2 (`sign_in` with
//! `params.code`) consumes the handoff code and issues a session.

use crate::constants;
use crate::error::{AuthError, Result};
use crate::flows::{SignInArgs, SignInOutcome};
use crate::linker::{AccountRef, LinkAttrs, Profile};
use crate::providers::{OAuthProfile, OAuthProviderConfig, Provider};
use crate::state::{VerificationCodeId, VerifierId};
use crate::store::records::VerificationCode;
use crate::store::AuthStore;
use crate::utils::{random_url_token, sha256_hex};
use crate::Auth;
use chrono::Utc;

/// Server-side material produced when the authorize route begins a ceremony.
#[derive(Debug, Clone)]
pub struct OAuthStart {
    /// Provider authorization URL to 302 to.
    pub authorization_url: String,

    /// The `state` parameter, for the double-submit cookie.
    pub state: String,

    /// PKCE code verifier, present for public clients; travels in a cookie.
    pub pkce_verifier: Option<String>,
}

/// Phase 1: hand the client to the authorize route with a fresh verifier.
pub(crate) async fn start<S: AuthStore>(
    auth: &Auth<S>,
    config: &OAuthProviderConfig,
    args: &SignInArgs,
) -> Result<SignInOutcome> {
    let verifier = auth
        .create_verifier(args.identity.map(|i| i.session_id))
        .await?;
    let mut url = format!(
        "{}/api/auth/signin/{}?code={}",
        auth.config.site_url, config.id, verifier
    );
    if let Some(redirect_to) = args.param("redirectTo") {
        url.push_str("&redirectTo=");
        url.push_str(&urlencoding::encode(redirect_to));
    }
    Ok(SignInOutcome::Redirect { url, verifier })
}

/// Resolve an OAuth provider entry by id.
fn oauth_provider<'a, S>(
    auth: &'a Auth<S>,
    provider_id: &str,
) -> Result<(&'a Provider, &'a OAuthProviderConfig)> {
    let provider = auth
        .config
        .provider(provider_id)
        .ok_or(AuthError::OAuthMissingProvider)?;
    let Provider::OAuth(config) = provider else {
        return Err(AuthError::OAuthMissingProvider);
    };
    Ok((provider, config))
}

/// Authorize route support: stamp a `state` signature onto the verifier and
/// build the provider authorization URL.
///
/// # Errors
///
/// Returns `OAUTH_MISSING_PROVIDER` for non-OAuth providers and
/// `OAUTH_MISSING_VERIFIER` when the ceremony verifier is gone.
pub async fn begin_authorization<S: AuthStore>(
    auth: &Auth<S>,
    provider_id: &str,
    verifier_id: VerifierId,
    redirect_uri: &str,
) -> Result<OAuthStart> {
    let (_, config) = oauth_provider(auth, provider_id)?;
    let Some(mut verifier) = auth.live_verifier(verifier_id).await? else {
        return Err(AuthError::OAuthMissingVerifier);
    };

    let state = random_url_token(32);
    verifier.signature = Some(sha256_hex(state.as_bytes()));
    auth.store.update_verifier(verifier).await?;

    let pkce_verifier = config
        .client
        .uses_pkce()
        .then(crate::providers::generate_pkce_verifier);
    let challenge = pkce_verifier
        .as_deref()
        .map(crate::providers::pkce_challenge);

    let authorization_url = config
        .client
        .authorization_url(&state, redirect_uri, challenge.as_deref())
        .await?;

    Ok(OAuthStart {
        authorization_url,
        state,
        pkce_verifier,
    })
}

/// Callback support: validate `state`, exchange the code, run the linker,
/// and mint the one-time handoff code the client signs in with.
///
/// # Errors
///
/// Returns `OAUTH_INVALID_STATE` when `state` does not match a live
/// verifier and provider-exchange errors verbatim.
pub async fn handle_callback<S: AuthStore>(
    auth: &Auth<S>,
    provider_id: &str,
    state: &str,
    code: &str,
    pkce_verifier: Option<&str>,
    redirect_uri: &str,
) -> Result<String> {
    let (provider, config) = oauth_provider(auth, provider_id)?;
    let signature = sha256_hex(state.as_bytes());
    let Some(verifier) = auth.store.verifier_by_signature(&signature).await? else {
        tracing::warn!(provider = %config.id, "OAuth callback state does not match any verifier");
        return Err(AuthError::OAuthInvalidState);
    };
    if Utc::now() - verifier.created_at > constants::verifier_ttl() {
        auth.store.delete_verifier(verifier.id).await?;
        return Err(AuthError::OAuthInvalidState);
    }

    let profile = config
        .client
        .exchange_code(code, redirect_uri, pkce_verifier)
        .await?;
    if profile.id.is_empty() {
        return Err(AuthError::OAuthInvalidProfile);
    }

    let (_, account) = auth
        .upsert_user_and_account(
            AccountRef::Key {
                provider_account_id: profile.id.clone(),
            },
            LinkAttrs {
                provider,
                profile: to_link_profile(&profile),
                should_link_via_email: false,
                should_link_via_phone: false,
            },
        )
        .await?;

    let now = Utc::now();
    let handoff = random_url_token(constants::LINK_CODE_BYTES);
    auth.store
        .insert_verification_code(VerificationCode {
            id: VerificationCodeId::new(),
            account_id: account.id,
            provider: config.id.clone(),
            code: handoff.clone(),
            expiration_time: now + constants::oauth_handoff_ttl(),
            verifier: Some(verifier.id),
            email_verified: profile.email_verified.then_some(true),
            phone_verified: profile.phone_verified.then_some(true),
            created_at: now,
        })
        .await?;

    auth.store.delete_verifier(verifier.id).await?;
    Ok(handoff)
}

fn to_link_profile(profile: &OAuthProfile) -> Profile {
    Profile {
        email: profile.email.clone(),
        email_verified: profile.email_verified,
        phone: profile.phone.clone(),
        phone_verified: profile.phone_verified,
        name: profile.name.clone(),
        image: profile.image.clone(),
    }
}
