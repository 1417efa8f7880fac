//! RFC 8628 device-authorization ceremony.
//!
//! The default flow issues a device code (persisted only as a SHA-256) and
//! a short vowel-free user code. The device polls with the device code; the
//! user approves (or denies) from a signed-in browser with the user code.
//! Authorized and denied rows are deleted as soon as the device learns the
//! outcome.

use crate::constants;
use crate::error::{AuthError, Result};
use crate::flows::{SignInArgs, SignInOutcome};
use crate::providers::DeviceProviderConfig;
use crate::state::DeviceAuthId;
use crate::store::records::{DeviceAuthorization, DeviceStatus};
use crate::store::AuthStore;
use crate::utils::{random_alphanumeric, random_from_alphabet, sha256_hex};
use crate::Auth;
use chrono::{Duration, Utc};

/// Codes issued to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCodeGrant {
    /// Secret the device polls with; never persisted in the clear.
    pub device_code: String,

    /// Short code the user types, formatted `XXXX-XXXX`.
    pub user_code: String,

    /// Where the user goes to approve.
    pub verification_uri: String,

    /// Verification URI with the user code pre-filled.
    pub verification_uri_complete: String,

    /// Grant lifetime in seconds.
    pub expires_in: u64,

    /// Minimum seconds between polls.
    pub interval: u64,
}

pub(crate) async fn run<S: AuthStore>(
    auth: &Auth<S>,
    config: &DeviceProviderConfig,
    args: &SignInArgs,
) -> Result<SignInOutcome> {
    match args.param("flow") {
        None => issue(auth, config).await,
        Some("poll") => poll(auth, args).await,
        Some("verify") => verify(auth, args).await,
        Some(_) => Err(AuthError::SignInMissingParams),
    }
}

/// Format a raw user code as `XXXX-XXXX`.
fn format_user_code(raw: &str) -> String {
    let (head, tail) = raw.split_at(raw.len() / 2);
    format!("{head}-{tail}")
}

/// Normalize user input back to the canonical `XXXX-XXXX` form.
fn normalize_user_code(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    format_user_code(&cleaned)
}

/// Issue a fresh device/user code pair.
async fn issue<S: AuthStore>(
    auth: &Auth<S>,
    config: &DeviceProviderConfig,
) -> Result<SignInOutcome> {
    let now = Utc::now();
    let device_code = random_alphanumeric(constants::DEVICE_CODE_LEN);
    let user_code = format_user_code(&random_from_alphabet(
        constants::USER_CODE_ALPHABET,
        constants::USER_CODE_LEN,
    ));
    let verification_uri = config
        .verification_uri
        .clone()
        .unwrap_or_else(|| format!("{}/device", auth.config.site_url));

    #[allow(clippy::cast_possible_wrap)]
    let expires_at = now + Duration::seconds(config.expires_in_secs as i64);
    auth.store
        .insert_device_auth(DeviceAuthorization {
            id: DeviceAuthId::new(),
            device_code_hash: sha256_hex(device_code.as_bytes()),
            user_code: user_code.clone(),
            expires_at,
            interval: config.interval_secs,
            status: DeviceStatus::Pending,
            user_id: None,
            session_id: None,
            last_polled_at: None,
            created_at: now,
        })
        .await?;

    let verification_uri_complete = format!(
        "{verification_uri}?user_code={}",
        urlencoding::encode(&user_code)
    );
    Ok(SignInOutcome::DeviceCode(DeviceCodeGrant {
        device_code,
        user_code,
        verification_uri,
        verification_uri_complete,
        expires_in: config.expires_in_secs,
        interval: config.interval_secs,
    }))
}

/// Device-side poll.
async fn poll<S: AuthStore>(auth: &Auth<S>, args: &SignInArgs) -> Result<SignInOutcome> {
    let device_code = args
        .param("deviceCode")
        .ok_or(AuthError::SignInMissingParams)?;
    let now = Utc::now();

    let Some(mut row) = auth
        .store
        .device_auth_by_code_hash(&sha256_hex(device_code.as_bytes()))
        .await?
    else {
        return Err(AuthError::DeviceCodeExpired);
    };
    if row.expires_at <= now {
        self_cleanup(auth, &row).await?;
        return Err(AuthError::DeviceCodeExpired);
    }

    // Minimum poll interval.
    if let Some(last) = row.last_polled_at {
        #[allow(clippy::cast_possible_wrap)]
        if now - last < Duration::seconds(row.interval as i64) {
            row.last_polled_at = Some(now);
            auth.store.update_device_auth(row).await?;
            return Err(AuthError::DeviceSlowDown);
        }
    }
    row.last_polled_at = Some(now);
    auth.store.update_device_auth(row.clone()).await?;

    match row.status {
        DeviceStatus::Pending => Err(AuthError::DeviceAuthorizationPending),
        DeviceStatus::Denied => {
            auth.store.delete_device_auth(row.id).await?;
            Err(AuthError::DeviceCodeDenied)
        }
        DeviceStatus::Authorized => {
            let (Some(user_id), Some(session_id)) = (row.user_id, row.session_id) else {
                return Err(AuthError::Internal("authorized device row lost its session".into()));
            };
            auth.store.delete_device_auth(row.id).await?;
            let tokens = auth
                .issue_tokens(user_id, session_id, crate::session::IssueTokenOptions::default())
                .await?;
            Ok(SignInOutcome::SignedIn {
                user_id,
                session_id,
                tokens: Some(tokens),
            })
        }
    }
}

/// Browser-side approval (or denial) by a signed-in user.
async fn verify<S: AuthStore>(auth: &Auth<S>, args: &SignInArgs) -> Result<SignInOutcome> {
    let identity = args.identity.ok_or(AuthError::NotSignedIn)?;
    if auth.live_session(identity).await?.is_none() {
        return Err(AuthError::NotSignedIn);
    }
    let user_code = args
        .param("userCode")
        .map(normalize_user_code)
        .ok_or(AuthError::SignInMissingParams)?;
    let now = Utc::now();

    let Some(mut row) = auth.store.device_auth_by_user_code(&user_code).await? else {
        return Err(AuthError::DeviceInvalidUserCode);
    };
    if row.expires_at <= now {
        self_cleanup(auth, &row).await?;
        return Err(AuthError::DeviceCodeExpired);
    }
    if row.status != DeviceStatus::Pending {
        return Err(AuthError::DeviceAlreadyAuthorized);
    }

    if args.params.get("approve").and_then(serde_json::Value::as_bool) == Some(false) {
        row.status = DeviceStatus::Denied;
        auth.store.update_device_auth(row).await?;
        tracing::debug!(user_id = %identity.user_id, "device authorization denied");
        return Ok(SignInOutcome::SignedIn {
            user_id: identity.user_id,
            session_id: identity.session_id,
            tokens: None,
        });
    }

    // The device gets its own session, collected on the next poll.
    let session = auth.sign_in_session(identity.user_id, None).await?;
    row.status = DeviceStatus::Authorized;
    row.user_id = Some(identity.user_id);
    row.session_id = Some(session.id);
    auth.store.update_device_auth(row).await?;
    tracing::debug!(
        user_id = %identity.user_id,
        device_session = %session.id,
        "device authorization approved"
    );

    Ok(SignInOutcome::SignedIn {
        user_id: identity.user_id,
        session_id: identity.session_id,
        tokens: None,
    })
}

async fn self_cleanup<S: AuthStore>(
    auth: &Auth<S>,
    row: &DeviceAuthorization,
) -> Result<()> {
    auth.store.delete_device_auth(row.id).await
}
