//! TOTP second-factor ceremony.
//!
//! `setup` mints an unverified credential and hands back the provisioning
//! URI; `confirm` proves possession and marks it verified; `verify`
//! completes a password sign-in that was deferred by the second-factor
//! gate. Codes are checked with one step of grace either side.

use crate::constants;
use crate::error::{AuthError, Result};
use crate::flows::{SignInArgs, SignInOutcome};
use crate::state::{TotpId, UserId};
use crate::store::records::TotpCredential;
use crate::store::AuthStore;
use crate::providers::TotpProviderConfig;
use crate::utils::random_bytes;
use crate::Auth;
use chrono::Utc;
use constant_time_eq::constant_time_eq;
use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Serialize};
use totp_lite::{totp_custom, Sha1};

/// Verifier payload carried between the password phase and `verify`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PendingTwoFactor {
    user_id: UserId,
}

impl PendingTwoFactor {
    pub(crate) fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub(crate) fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| AuthError::Internal(format!("verifier payload encode failed: {e}")))
    }

    fn decode(signature: &str) -> Result<Self> {
        serde_json::from_str(signature).map_err(|_| AuthError::TotpInvalidVerifier)
    }
}

/// Verifier payload carried between `setup` and `confirm`.
#[derive(Debug, Serialize, Deserialize)]
struct EnrollmentState {
    totp_id: TotpId,
    user_id: UserId,
    secret: String,
    digits: u32,
    period: u64,
}

pub(crate) async fn run<S: AuthStore>(
    auth: &Auth<S>,
    config: &TotpProviderConfig,
    args: &SignInArgs,
) -> Result<SignInOutcome> {
    match args.param("flow") {
        Some("setup") => setup(auth, config, args).await,
        Some("confirm") => confirm(auth, args).await,
        Some("verify") => verify(auth, args).await,
        _ => Err(AuthError::SignInMissingParams),
    }
}

/// Start enrollment for the signed-in user.
async fn setup<S: AuthStore>(
    auth: &Auth<S>,
    config: &TotpProviderConfig,
    args: &SignInArgs,
) -> Result<SignInOutcome> {
    let identity = args.identity.ok_or(AuthError::NotSignedIn)?;
    if auth.live_session(identity).await?.is_none() {
        return Err(AuthError::NotSignedIn);
    }

    let now = Utc::now();
    let secret = BASE32_NOPAD.encode(&random_bytes(constants::TOTP_SECRET_BYTES));
    let totp = TotpCredential {
        id: TotpId::new(),
        user_id: identity.user_id,
        secret: secret.clone(),
        digits: config.digits,
        period: config.period,
        verified: false,
        name: args.param("name").map(str::to_string),
        last_used_at: None,
        created_at: now,
    };
    let totp_id = totp.id;
    auth.store.insert_totp(totp).await?;

    let verifier_id = auth.create_verifier(Some(identity.session_id)).await?;
    let Some(mut verifier) = auth.store.verifier(verifier_id).await? else {
        return Err(AuthError::Internal("verifier vanished mid-flow".into()));
    };
    verifier.signature = Some(
        serde_json::to_string(&EnrollmentState {
            totp_id,
            user_id: identity.user_id,
            secret: secret.clone(),
            digits: config.digits,
            period: config.period,
        })
        .map_err(|e| AuthError::Internal(format!("verifier payload encode failed: {e}")))?,
    );
    auth.store.update_verifier(verifier).await?;

    let issuer = config
        .issuer
        .clone()
        .unwrap_or_else(|| auth.config.site_host().to_string());
    let account_label = match auth.store.user(identity.user_id).await? {
        Some(user) => user.email.unwrap_or_else(|| identity.user_id.to_string()),
        None => identity.user_id.to_string(),
    };
    let uri = provisioning_uri(&issuer, &account_label, &secret, config.digits, config.period);

    Ok(SignInOutcome::TotpSetup {
        uri,
        secret,
        totp_id,
        verifier: verifier_id,
    })
}

/// Confirm enrollment with a live code.
async fn confirm<S: AuthStore>(auth: &Auth<S>, args: &SignInArgs) -> Result<SignInOutcome> {
    let identity = args.identity.ok_or(AuthError::NotSignedIn)?;
    if auth.live_session(identity).await?.is_none() {
        return Err(AuthError::NotSignedIn);
    }
    let code = args.param("code").ok_or(AuthError::SignInMissingParams)?;
    let verifier_id = args.verifier.ok_or(AuthError::TotpInvalidVerifier)?;

    let Some(verifier) = auth.live_verifier(verifier_id).await? else {
        return Err(AuthError::TotpInvalidVerifier);
    };
    let state: EnrollmentState = verifier
        .signature
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .ok_or(AuthError::TotpInvalidVerifier)?;
    if state.user_id != identity.user_id {
        return Err(AuthError::TotpInvalidVerifier);
    }

    let Some(mut totp) = auth.store.totp(state.totp_id).await? else {
        return Err(AuthError::TotpNoEnrollment);
    };
    if totp.verified {
        return Err(AuthError::TotpAlreadyVerified);
    }
    if !code_matches(&totp.secret, totp.digits, totp.period, code)? {
        return Err(AuthError::TotpInvalidCode);
    }

    totp.verified = true;
    totp.last_used_at = Some(Utc::now());
    auth.store.update_totp(totp).await?;
    auth.store.delete_verifier(verifier_id).await?;
    tracing::debug!(user_id = %identity.user_id, "totp enrollment confirmed");

    Ok(SignInOutcome::SignedIn {
        user_id: identity.user_id,
        session_id: identity.session_id,
        tokens: None,
    })
}

/// Complete a password sign-in deferred by the second-factor gate.
async fn verify<S: AuthStore>(auth: &Auth<S>, args: &SignInArgs) -> Result<SignInOutcome> {
    let code = args.param("code").ok_or(AuthError::SignInMissingParams)?;
    let verifier_id = args.verifier.ok_or(AuthError::TotpInvalidVerifier)?;

    let Some(verifier) = auth.live_verifier(verifier_id).await? else {
        return Err(AuthError::TotpInvalidVerifier);
    };
    let pending = PendingTwoFactor::decode(
        verifier
            .signature
            .as_deref()
            .ok_or(AuthError::TotpInvalidVerifier)?,
    )?;

    let mut verified: Vec<_> = auth
        .store
        .totps_by_user(pending.user_id)
        .await?
        .into_iter()
        .filter(|t| t.verified)
        .collect();
    let Some(mut totp) = verified.pop() else {
        return Err(AuthError::TotpNotFound);
    };
    if !code_matches(&totp.secret, totp.digits, totp.period, code)? {
        return Err(AuthError::TotpInvalidCode);
    }

    totp.last_used_at = Some(Utc::now());
    auth.store.update_totp(totp).await?;
    auth.store.delete_verifier(verifier_id).await?;

    auth.finish_sign_in(pending.user_id, verifier.session_id).await
}

/// Check a code at the current step and one step either side.
fn code_matches(secret_base32: &str, digits: u32, period: u64, code: &str) -> Result<bool> {
    let secret = BASE32_NOPAD
        .decode(secret_base32.as_bytes())
        .map_err(|_| AuthError::Internal("stored totp secret is not base32".into()))?;
    #[allow(clippy::cast_sign_loss)]
    let now = Utc::now().timestamp().max(0) as u64;
    for step in -constants::TOTP_GRACE_STEPS..=constants::TOTP_GRACE_STEPS {
        let at = if step.is_negative() {
            now.saturating_sub(period * step.unsigned_abs())
        } else {
            now.saturating_add(period * step.unsigned_abs())
        };
        let expected = totp_custom::<Sha1>(period, digits, &secret, at);
        if constant_time_eq(expected.as_bytes(), code.as_bytes()) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Build the `otpauth://` provisioning URI.
fn provisioning_uri(issuer: &str, account: &str, secret: &str, digits: u32, period: u64) -> String {
    format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}&digits={}&period={}&algorithm=SHA1",
        urlencoding::encode(issuer),
        urlencoding::encode(account),
        secret,
        urlencoding::encode(issuer),
        digits,
        period,
    )
}
