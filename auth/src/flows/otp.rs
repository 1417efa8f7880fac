//! Email and phone one-time-code ceremonies.
//!
//! Starting a flow normalizes the identifier, resolves the account through
//! the linker, mints a single-use code, and hands it to the transport. The
//! return trip consumes the code: by value for magic links, or by
//! identifier + constant-time comparison for short OTPs.

use crate::constants;
use crate::error::{AuthError, Result};
use crate::flows::{SignInArgs, SignInOutcome};
use crate::linker::{AccountRef, LinkAttrs, Profile};
use crate::providers::{
    EmailCodeStyle, EmailProviderConfig, PhoneProviderConfig, Provider, VerificationEmail,
};
use crate::state::VerificationCodeId;
use crate::store::records::VerificationCode;
use crate::store::AuthStore;
use crate::utils::{normalize_email, normalize_phone, random_digits, random_url_token};
use crate::Auth;
use chrono::Utc;
use constant_time_eq::constant_time_eq;

/// Email provider entry point: start or verify, depending on `params.code`.
pub(crate) async fn email_flow<S: AuthStore>(
    auth: &Auth<S>,
    provider: &Provider,
    config: &EmailProviderConfig,
    args: &SignInArgs,
) -> Result<SignInOutcome> {
    let identifier = args.param("email").map(normalize_email);
    if let Some(code) = args.param("code") {
        // OTP-style codes are bound to the identifier; magic links verify by
        // value through the dispatcher's no-provider path as well.
        let identifier = identifier.ok_or(AuthError::SignInMissingParams)?;
        let code = code.to_string();
        return verify_bound_code(auth, &config.id, &identifier, &code, args).await;
    }

    let identifier = identifier.ok_or(AuthError::SignInMissingParams)?;
    let (from, sender) = match (
        config.from.as_ref().or(auth.config.email.as_ref().map(|e| &e.from)),
        config
            .sender
            .clone()
            .or_else(|| auth.config.email.as_ref().map(|e| e.sender.clone())),
    ) {
        (Some(from), Some(sender)) => (from.clone(), sender),
        _ => return Err(AuthError::EmailConfigRequired),
    };

    let account = begin(auth, provider, &identifier, Identity::Email).await?;

    let now = Utc::now();
    let code = match config.code_style {
        EmailCodeStyle::MagicLink => random_url_token(constants::LINK_CODE_BYTES),
        EmailCodeStyle::Otp => random_digits(constants::OTP_DIGITS),
    };
    let expiration_time = now + config.code_ttl;
    auth.store
        .insert_verification_code(VerificationCode {
            id: VerificationCodeId::new(),
            account_id: account,
            provider: config.id.clone(),
            code: code.clone(),
            expiration_time,
            verifier: None,
            email_verified: Some(true),
            phone_verified: None,
            created_at: now,
        })
        .await?;

    let url = format!("{}?code={}", auth.config.site_url, urlencoding::encode(&code));
    sender
        .send_verification(VerificationEmail {
            to: &identifier,
            from: &from,
            code: &code,
            url: &url,
            expires_at: expiration_time,
        })
        .await?;

    tracing::debug!(provider = %config.id, "verification code sent");
    Ok(SignInOutcome::Started)
}

/// Phone provider entry point: start or verify, depending on `params.code`.
pub(crate) async fn phone_flow<S: AuthStore>(
    auth: &Auth<S>,
    provider: &Provider,
    config: &PhoneProviderConfig,
    args: &SignInArgs,
) -> Result<SignInOutcome> {
    let identifier = args
        .param("phone")
        .map(normalize_phone)
        .ok_or(AuthError::SignInMissingParams)?;
    if let Some(code) = args.param("code") {
        let code = code.to_string();
        return verify_bound_code(auth, &config.id, &identifier, &code, args).await;
    }

    let account = begin(auth, provider, &identifier, Identity::Phone).await?;

    let now = Utc::now();
    let code = random_digits(constants::OTP_DIGITS);
    let expiration_time = now + config.code_ttl;
    auth.store
        .insert_verification_code(VerificationCode {
            id: VerificationCodeId::new(),
            account_id: account,
            provider: config.id.clone(),
            code: code.clone(),
            expiration_time,
            verifier: None,
            email_verified: None,
            phone_verified: Some(true),
            created_at: now,
        })
        .await?;

    config.sender.send_code(&identifier, &code, expiration_time).await?;

    tracing::debug!(provider = %config.id, "verification code sent");
    Ok(SignInOutcome::Started)
}

enum Identity {
    Email,
    Phone,
}

/// Resolve (or create) the account a code will be minted against.
async fn begin<S: AuthStore>(
    auth: &Auth<S>,
    provider: &Provider,
    identifier: &str,
    kind: Identity,
) -> Result<crate::state::AccountId> {
    let profile = match kind {
        Identity::Email => Profile {
            email: Some(identifier.to_string()),
            ..Profile::default()
        },
        Identity::Phone => Profile {
            phone: Some(identifier.to_string()),
            ..Profile::default()
        },
    };
    let (_, account) = auth
        .upsert_user_and_account(
            AccountRef::Key {
                provider_account_id: identifier.to_string(),
            },
            LinkAttrs {
                provider,
                profile,
                should_link_via_email: false,
                should_link_via_phone: false,
            },
        )
        .await?;
    Ok(account.id)
}

/// Verify an identifier-bound OTP with a constant-time comparison, then run
/// the shared consumption path.
async fn verify_bound_code<S: AuthStore>(
    auth: &Auth<S>,
    provider_id: &str,
    identifier: &str,
    code: &str,
    args: &SignInArgs,
) -> Result<SignInOutcome> {
    let Some(account) = auth
        .store
        .account_by_provider(provider_id, identifier)
        .await?
    else {
        return Err(AuthError::InvalidVerificationCode);
    };
    let Some(row) = auth.store.verification_code_by_account(account.id).await? else {
        return Err(AuthError::InvalidVerificationCode);
    };
    if !constant_time_eq(row.code.as_bytes(), code.as_bytes()) {
        return Err(AuthError::InvalidVerificationCode);
    }
    let stored = row.code.clone();
    auth.verify_code_and_sign_in(&stored, args).await
}
