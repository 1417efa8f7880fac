//! WebAuthn passkey ceremonies.
//!
//! Four flows keyed by `params.flow`: `register-options`,
//! `register-verify`, `auth-options`, `auth-verify`. The verifier row holds
//! the SHA-256 of the issued challenge; the response's clientDataJSON must
//! echo the same challenge, carry the configured origin, and come from the
//! configured relying party. Signature verification itself is delegated to
//! the provider's opaque crypto.

use crate::constants;
use crate::error::{AuthError, Result};
use crate::flows::{SignInArgs, SignInOutcome};
use crate::providers::{parse_client_data, PasskeyProviderConfig};
use crate::state::PasskeyId;
use crate::store::records::{CoseAlgorithm, Passkey, PasskeyDeviceType};
use crate::store::AuthStore;
use crate::utils::{base64url, normalize_email, random_bytes, sha256, sha256_hex};
use crate::Auth;
use chrono::Utc;

pub(crate) async fn run<S: AuthStore>(
    auth: &Auth<S>,
    config: &PasskeyProviderConfig,
    args: &SignInArgs,
) -> Result<SignInOutcome> {
    match args.param("flow") {
        Some("register-options") => register_options(auth, config, args).await,
        Some("register-verify") => register_verify(auth, config, args).await,
        Some("auth-options") => auth_options(auth, config, args).await,
        Some("auth-verify") => auth_verify(auth, config, args).await,
        _ => Err(AuthError::SignInMissingParams),
    }
}

fn rp_id<'a, S>(auth: &'a Auth<S>, config: &'a PasskeyProviderConfig) -> &'a str {
    config.rp_id.as_deref().unwrap_or_else(|| auth.config.site_host())
}

fn origin<'a, S>(auth: &'a Auth<S>, config: &'a PasskeyProviderConfig) -> &'a str {
    config.origin.as_deref().unwrap_or(&auth.config.site_url)
}

/// Mint a challenge and stash its hash in a fresh verifier.
async fn issue_challenge<S: AuthStore>(
    auth: &Auth<S>,
    session_id: Option<crate::state::SessionId>,
) -> Result<(String, crate::state::VerifierId)> {
    let challenge = base64url(&random_bytes(constants::PASSKEY_CHALLENGE_BYTES));
    let verifier_id = auth.create_verifier(session_id).await?;
    let Some(mut verifier) = auth.store.verifier(verifier_id).await? else {
        return Err(AuthError::Internal("verifier vanished mid-flow".into()));
    };
    verifier.signature = Some(sha256_hex(challenge.as_bytes()));
    auth.store.update_verifier(verifier).await?;
    Ok((challenge, verifier_id))
}

/// Validate the echoed client data against the ceremony verifier.
async fn check_client_data<S: AuthStore>(
    auth: &Auth<S>,
    config: &PasskeyProviderConfig,
    args: &SignInArgs,
    client_data_json: &[u8],
    expected_type: &str,
) -> Result<crate::store::records::Verifier> {
    let verifier_id = args.verifier.ok_or(AuthError::PasskeyInvalidChallenge)?;
    let Some(verifier) = auth.live_verifier(verifier_id).await? else {
        return Err(AuthError::PasskeyInvalidChallenge);
    };

    let client_data = parse_client_data(client_data_json)?;
    if client_data.ceremony_type != expected_type {
        return Err(AuthError::PasskeyInvalidClientData);
    }
    if verifier.signature.as_deref() != Some(sha256_hex(client_data.challenge.as_bytes()).as_str())
    {
        return Err(AuthError::PasskeyInvalidChallenge);
    }
    if client_data.origin != origin(auth, config) {
        tracing::warn!(
            got = %client_data.origin,
            expected = %origin(auth, config),
            "passkey ceremony ran on the wrong origin"
        );
        return Err(AuthError::PasskeyInvalidOrigin);
    }
    Ok(verifier)
}

/// Phase 1 of registration: creation options for the signed-in user.
async fn register_options<S: AuthStore>(
    auth: &Auth<S>,
    config: &PasskeyProviderConfig,
    args: &SignInArgs,
) -> Result<SignInOutcome> {
    let identity = args.identity.ok_or(AuthError::NotSignedIn)?;
    if auth.live_session(identity).await?.is_none() {
        return Err(AuthError::NotSignedIn);
    }

    let (challenge, verifier) = issue_challenge(auth, Some(identity.session_id)).await?;

    let user = auth.store.user(identity.user_id).await?;
    let user_name = user
        .as_ref()
        .and_then(|u| u.email.clone())
        .unwrap_or_else(|| identity.user_id.to_string());
    let display_name = user
        .as_ref()
        .and_then(|u| u.name.clone())
        .unwrap_or_else(|| user_name.clone());

    let exclude: Vec<serde_json::Value> = auth
        .store
        .passkeys_by_user(identity.user_id)
        .await?
        .into_iter()
        .map(|p| {
            serde_json::json!({
                "type": "public-key",
                "id": p.credential_id,
                "transports": p.transports,
            })
        })
        .collect();

    let options = serde_json::json!({
        "rp": { "id": rp_id(auth, config), "name": config.rp_name },
        "user": {
            "id": base64url(identity.user_id.to_string().as_bytes()),
            "name": user_name,
            "displayName": display_name,
        },
        "challenge": challenge,
        "pubKeyCredParams": [
            { "type": "public-key", "alg": -7 },
            { "type": "public-key", "alg": -257 },
        ],
        "excludeCredentials": exclude,
        "authenticatorSelection": { "residentKey": "preferred", "userVerification": "preferred" },
        "timeout": 60_000,
    });

    Ok(SignInOutcome::PasskeyOptions { options, verifier })
}

/// Phase 2 of registration: validate the attestation, store the credential.
async fn register_verify<S: AuthStore>(
    auth: &Auth<S>,
    config: &PasskeyProviderConfig,
    args: &SignInArgs,
) -> Result<SignInOutcome> {
    let identity = args.identity.ok_or(AuthError::NotSignedIn)?;
    if auth.live_session(identity).await?.is_none() {
        return Err(AuthError::NotSignedIn);
    }
    let response = args.param("response").ok_or(AuthError::PasskeyNoCredential)?;

    let parsed = config.crypto.parse_attestation(response).await?;
    let verifier = check_client_data(auth, config, args, &parsed.client_data_json, "webauthn.create")
        .await?;

    if parsed.rp_id_hash != sha256(rp_id(auth, config).as_bytes()) {
        return Err(AuthError::PasskeyRpMismatch);
    }
    if !parsed.user_present {
        return Err(AuthError::PasskeyUserPresence);
    }
    let algorithm = CoseAlgorithm::from_cose(parsed.cose_algorithm)
        .ok_or(AuthError::PasskeyUnsupportedAlgorithm)?;

    let now = Utc::now();
    auth.store
        .insert_passkey(Passkey {
            id: PasskeyId::new(),
            user_id: identity.user_id,
            credential_id: parsed.credential_id.clone(),
            public_key: parsed.public_key.clone(),
            algorithm,
            counter: parsed.sign_count,
            transports: parsed.transports.clone(),
            device_type: if parsed.multi_device {
                PasskeyDeviceType::MultiDevice
            } else {
                PasskeyDeviceType::SingleDevice
            },
            backed_up: parsed.backed_up,
            name: args.param("name").map(str::to_string),
            last_used_at: None,
            created_at: now,
        })
        .await?;
    auth.store.delete_verifier(verifier.id).await?;
    tracing::debug!(user_id = %identity.user_id, "passkey registered");

    auth.finish_sign_in(identity.user_id, Some(identity.session_id))
        .await
}

/// Phase 1 of authentication: request options, optionally scoped to one
/// user's credentials.
async fn auth_options<S: AuthStore>(
    auth: &Auth<S>,
    config: &PasskeyProviderConfig,
    args: &SignInArgs,
) -> Result<SignInOutcome> {
    let (challenge, verifier) = issue_challenge(auth, args.identity.map(|i| i.session_id)).await?;

    let mut allow: Vec<serde_json::Value> = Vec::new();
    if let Some(email) = args.param("email").map(|e| normalize_email(e)) {
        if let Some(user) = auth.store.find_user_by_verified_email(&email).await? {
            allow = auth
                .store
                .passkeys_by_user(user.id)
                .await?
                .into_iter()
                .map(|p| {
                    serde_json::json!({
                        "type": "public-key",
                        "id": p.credential_id,
                        "transports": p.transports,
                    })
                })
                .collect();
        }
    }

    let options = serde_json::json!({
        "challenge": challenge,
        "rpId": rp_id(auth, config),
        "allowCredentials": allow,
        "userVerification": "preferred",
        "timeout": 60_000,
    });

    Ok(SignInOutcome::PasskeyOptions { options, verifier })
}

/// Phase 2 of authentication: validate the assertion and issue tokens.
async fn auth_verify<S: AuthStore>(
    auth: &Auth<S>,
    config: &PasskeyProviderConfig,
    args: &SignInArgs,
) -> Result<SignInOutcome> {
    let response = args.param("response").ok_or(AuthError::PasskeyNoCredential)?;

    let parsed = config.crypto.parse_assertion(response).await?;
    let verifier =
        check_client_data(auth, config, args, &parsed.client_data_json, "webauthn.get").await?;

    if parsed.rp_id_hash != sha256(rp_id(auth, config).as_bytes()) {
        return Err(AuthError::PasskeyRpMismatch);
    }
    if !parsed.user_present {
        return Err(AuthError::PasskeyUserPresence);
    }

    let Some(mut passkey) = auth
        .store
        .passkey_by_credential(&parsed.credential_id)
        .await?
    else {
        return Err(AuthError::PasskeyUnknownCredential);
    };

    // The signed message is authenticatorData || SHA256(clientDataJSON).
    let mut message = parsed.authenticator_data.clone();
    message.extend_from_slice(&sha256(&parsed.client_data_json));
    let valid = config
        .crypto
        .verify_signature(passkey.algorithm, &passkey.public_key, &message, &parsed.signature)
        .await?;
    if !valid {
        return Err(AuthError::PasskeyInvalidSignature);
    }

    // Counter monotonicity; both-zero means the authenticator does not
    // support counters.
    if parsed.sign_count != 0 || passkey.counter != 0 {
        if parsed.sign_count <= passkey.counter {
            tracing::warn!(
                credential_id = %passkey.credential_id,
                stored = passkey.counter,
                presented = parsed.sign_count,
                "passkey counter did not advance, possible cloned authenticator"
            );
            return Err(AuthError::PasskeyCounterError);
        }
        passkey.counter = parsed.sign_count;
    }
    passkey.last_used_at = Some(Utc::now());
    let user_id = passkey.user_id;
    auth.store.update_passkey(passkey).await?;
    auth.store.delete_verifier(verifier.id).await?;

    auth.finish_sign_in(user_id, args.identity.map(|i| i.session_id))
        .await
}
