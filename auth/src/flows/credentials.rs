//! Password credentials ceremony.
//!
//! `create` verifies-or-creates the account with the provider's injected
//! hasher. `verify` rate-limits by account, compares the secret, and
//! consults the second-factor gate before issuing tokens. Expected
//! verification failures collapse into a generic failure so callers cannot
//! tell a wrong password from a missing account.

use crate::error::{AuthError, Result};
use crate::flows::{totp::PendingTwoFactor, SignInArgs, SignInOutcome};
use crate::linker::{AccountRef, LinkAttrs, Profile};
use crate::providers::{CredentialsProviderConfig, Provider};
use crate::rate_limit;
use crate::store::AuthStore;
use crate::utils::normalize_email;
use crate::Auth;
use chrono::{Duration, Utc};

pub(crate) async fn run<S: AuthStore>(
    auth: &Auth<S>,
    provider: &Provider,
    config: &CredentialsProviderConfig,
    args: &SignInArgs,
) -> Result<SignInOutcome> {
    let result = match args.param("flow") {
        Some("create") => create(auth, provider, config, args).await,
        Some("verify") | None => verify(auth, config, args).await,
        Some(_) => Err(AuthError::SignInMissingParams),
    };
    match result {
        Err(err) if err.is_expected_credential_failure() => {
            tracing::debug!(code = err.code(), "credential verification failed");
            Ok(SignInOutcome::Failed)
        }
        other => other,
    }
}

/// Create the account, hashing the secret through the provider's crypto.
async fn create<S: AuthStore>(
    auth: &Auth<S>,
    provider: &Provider,
    config: &CredentialsProviderConfig,
    args: &SignInArgs,
) -> Result<SignInOutcome> {
    let identifier = args
        .param("id")
        .map(normalize_email)
        .ok_or(AuthError::SignInMissingParams)?;
    let secret = args.param("secret").ok_or(AuthError::SignInMissingParams)?;
    let hasher = config
        .hasher
        .as_ref()
        .ok_or(AuthError::MissingCryptoFunction)?;

    if auth
        .store
        .account_by_provider(&config.id, &identifier)
        .await?
        .is_some()
    {
        return Err(AuthError::AccountAlreadyExists);
    }

    let hashed = hasher.hash_secret(secret).await?;
    let (user, mut account) = auth
        .upsert_user_and_account(
            AccountRef::Key {
                provider_account_id: identifier.clone(),
            },
            LinkAttrs {
                provider,
                profile: Profile {
                    email: Some(identifier),
                    ..Profile::default()
                },
                should_link_via_email: false,
                should_link_via_phone: false,
            },
        )
        .await?;
    account.secret = Some(hashed);
    auth.store.update_account(account).await?;

    auth.finish_sign_in(user.id, args.identity.map(|i| i.session_id))
        .await
}

/// Verify the secret under the account's failure budget, then consult the
/// second-factor gate.
async fn verify<S: AuthStore>(
    auth: &Auth<S>,
    config: &CredentialsProviderConfig,
    args: &SignInArgs,
) -> Result<SignInOutcome> {
    let identifier = args
        .param("id")
        .map(normalize_email)
        .ok_or(AuthError::SignInMissingParams)?;
    let secret = args.param("secret").ok_or(AuthError::SignInMissingParams)?;
    let hasher = config
        .hasher
        .as_ref()
        .ok_or(AuthError::MissingCryptoFunction)?;

    let Some(account) = auth
        .store
        .account_by_provider(&config.id, &identifier)
        .await?
    else {
        return Err(AuthError::AccountNotFound);
    };

    let now = Utc::now();
    let bucket_id = account.id.to_string();
    let existing = auth.store.rate_limit(&bucket_id).await?;
    let decision = rate_limit::check(
        &bucket_id,
        existing.as_ref(),
        auth.config.sign_in.max_failed_attempts_per_hour,
        Duration::hours(1),
        now,
    );
    if !decision.allowed {
        tracing::warn!(account_id = %account.id, "credential verification blocked by rate limit");
        auth.store.put_rate_limit(decision.new_state).await?;
        return Err(AuthError::TooManyFailedAttempts);
    }

    let stored = account.secret.as_deref().ok_or(AuthError::InvalidSecret)?;
    if !hasher.verify_secret(secret, stored).await? {
        auth.store
            .put_rate_limit(rate_limit::consume(&decision))
            .await?;
        return Err(AuthError::InvalidSecret);
    }
    // Success clears the failure budget.
    auth.store.delete_rate_limit(&bucket_id).await?;

    // Second-factor gate: a verified TOTP defers token issuance.
    let totps = auth.store.totps_by_user(account.user_id).await?;
    if totps.iter().any(|t| t.verified) {
        let verifier_id = auth
            .create_verifier(args.identity.map(|i| i.session_id))
            .await?;
        let Some(mut verifier) = auth.store.verifier(verifier_id).await? else {
            return Err(AuthError::Internal("verifier vanished mid-flow".into()));
        };
        verifier.signature = Some(PendingTwoFactor::new(account.user_id).encode()?);
        auth.store.update_verifier(verifier).await?;
        return Ok(SignInOutcome::TotpRequired {
            verifier: verifier_id,
        });
    }

    auth.finish_sign_in(account.user_id, args.identity.map(|i| i.session_id))
        .await
}
