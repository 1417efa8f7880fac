//! Sign-in dispatcher.
//!
//! One entry point, [`Auth::sign_in`], drives every ceremony. The request
//! names a provider (or carries a refresh token / handoff code), and the
//! dispatcher matches exhaustively on the provider variant. Expected
//! credential failures collapse into [`SignInOutcome::Failed`] so callers
//! cannot enumerate accounts.

use crate::error::{AuthError, Result};
use crate::linker::{AccountRef, LinkAttrs, Profile};
use crate::providers::Provider;
use crate::state::{SessionId, SessionIdentity, TokenPair, TotpId, UserId, VerifierId};
use crate::store::records::{User, Verifier};
use crate::store::AuthStore;
use crate::Auth;
use chrono::Utc;

pub mod credentials;
pub mod device;
pub mod oauth;
pub mod otp;
pub mod passkey;
pub mod totp;

pub use device::DeviceCodeGrant;

/// One sign-in request.
#[derive(Debug, Clone, Default)]
pub struct SignInArgs {
    /// Provider id to dispatch on.
    pub provider: Option<String>,

    /// Provider-specific parameters (`code`, `email`, `flow`, …).
    pub params: serde_json::Value,

    /// Client-held ceremony verifier from an earlier phase.
    pub verifier: Option<VerifierId>,

    /// Refresh token, for the refresh path.
    pub refresh_token: Option<String>,

    /// Caller identity, for flows that require a signed-in user.
    pub identity: Option<SessionIdentity>,
}

impl SignInArgs {
    /// Start a ceremony with a provider.
    #[must_use]
    pub fn provider(id: impl Into<String>) -> Self {
        Self {
            provider: Some(id.into()),
            ..Self::default()
        }
    }

    /// Refresh a session.
    #[must_use]
    pub fn refresh(token: impl Into<String>) -> Self {
        Self {
            refresh_token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Finish a ceremony with a handoff or magic-link code.
    #[must_use]
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            params: serde_json::json!({ "code": code.into() }),
            ..Self::default()
        }
    }

    /// Attach parameters.
    #[must_use]
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    /// Attach a ceremony verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: VerifierId) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Attach the caller identity.
    #[must_use]
    pub fn with_identity(mut self, identity: SessionIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// String parameter accessor.
    #[must_use]
    pub(crate) fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(serde_json::Value::as_str)
    }
}

/// What a sign-in request produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SignInOutcome {
    /// OAuth: navigate the user to `url`; hold `verifier` client-side for
    /// the handoff.
    Redirect {
        /// Where to send the user.
        url: String,

        /// Client-held ceremony id.
        verifier: VerifierId,
    },

    /// OTP or magic link sent; wait for the user to return with the code.
    Started,

    /// A session exists.
    SignedIn {
        /// The signed-in user.
        user_id: UserId,

        /// The session.
        session_id: SessionId,

        /// Token pair for token-carrying clients.
        tokens: Option<TokenPair>,
    },

    /// Refresh succeeded.
    Refreshed {
        /// The rotated pair.
        tokens: TokenPair,
    },

    /// WebAuthn phase 1: pass `options` to the browser API, return with the
    /// verifier.
    PasskeyOptions {
        /// Creation or request options, JSON.
        options: serde_json::Value,

        /// Client-held ceremony id.
        verifier: VerifierId,
    },

    /// Password was correct but a verified TOTP exists; present a code.
    TotpRequired {
        /// Client-held ceremony id carrying the pending sign-in.
        verifier: VerifierId,
    },

    /// TOTP enrollment started.
    TotpSetup {
        /// `otpauth://` provisioning URI.
        uri: String,

        /// Base32 secret for manual entry.
        secret: String,

        /// The unverified credential row.
        totp_id: TotpId,

        /// Client-held ceremony id for the confirm phase.
        verifier: VerifierId,
    },

    /// RFC 8628 codes issued.
    DeviceCode(DeviceCodeGrant),

    /// The credential did not verify. Deliberately unspecific.
    Failed,
}

impl<S: AuthStore> Auth<S> {
    /// Run one step of a sign-in ceremony.
    ///
    /// # Errors
    ///
    /// Returns `PROVIDER_NOT_CONFIGURED` for unknown providers,
    /// `SIGN_IN_MISSING_PARAMS` when neither a provider, a refresh token,
    /// nor a code is present, and flow-specific errors otherwise.
    pub async fn sign_in(&self, args: SignInArgs) -> Result<SignInOutcome> {
        let Some(provider_id) = args.provider.clone() else {
            // Refresh path.
            if let Some(token) = &args.refresh_token {
                return Ok(match self.refresh(token).await? {
                    Some(tokens) => SignInOutcome::Refreshed { tokens },
                    None => SignInOutcome::Failed,
                });
            }
            // OAuth callback handoff / magic link consumption.
            if let Some(code) = args.param("code") {
                let code = code.to_string();
                return self.verify_code_and_sign_in(&code, &args).await;
            }
            return Err(AuthError::SignInMissingParams);
        };

        let provider = self
            .config
            .provider(&provider_id)
            .ok_or(AuthError::ProviderNotConfigured(provider_id))?
            .clone();

        match &provider {
            Provider::OAuth(config) => oauth::start(self, config, &args).await,
            Provider::Email(config) => otp::email_flow(self, &provider, config, &args).await,
            Provider::Phone(config) => otp::phone_flow(self, &provider, config, &args).await,
            Provider::Credentials(config) => {
                credentials::run(self, &provider, config, &args).await
            }
            Provider::Passkey(config) => passkey::run(self, config, &args).await,
            Provider::Totp(config) => totp::run(self, config, &args).await,
            Provider::DeviceCode(config) => device::run(self, config, &args).await,
            Provider::Anonymous(_) => self.anonymous_sign_in(&args).await,
        }
    }

    /// Consume a verification code and complete the sign-in it stands for.
    pub(crate) async fn verify_code_and_sign_in(
        &self,
        code: &str,
        args: &SignInArgs,
    ) -> Result<SignInOutcome> {
        let now = Utc::now();
        let Some(row) = self.store.verification_code_by_code(code).await? else {
            return Err(AuthError::InvalidVerificationCode);
        };
        if row.expiration_time <= now {
            self.store.delete_verification_code(row.id).await?;
            return Err(AuthError::InvalidVerificationCode);
        }
        // A code minted against a client-held verifier only verifies from
        // that client.
        if let Some(bound) = row.verifier {
            if args.verifier != Some(bound) {
                return Err(AuthError::InvalidVerificationCode);
            }
        }

        let Some(account) = self.store.account(row.account_id).await? else {
            self.store.delete_verification_code(row.id).await?;
            return Err(AuthError::InvalidVerificationCode);
        };
        let provider = self
            .config
            .provider(&row.provider)
            .ok_or_else(|| AuthError::ProviderNotConfigured(row.provider.clone()))?
            .clone();

        // Run the provider's authorize hook, if any.
        let hook = match &provider {
            Provider::Email(c) => c.authorize.clone(),
            Provider::Phone(c) => c.authorize.clone(),
            _ => None,
        };
        if let Some(hook) = hook {
            hook.authorize(&args.params, &account).await?;
        }

        // Relink and stamp verification through the linker.
        let user = self.store.user(account.user_id).await?;
        let profile = Profile {
            email: if provider.is_email_provider() {
                Some(account.provider_account_id.clone())
            } else if row.email_verified == Some(true) {
                user.as_ref().and_then(|u| u.email.clone())
            } else {
                None
            },
            email_verified: row.email_verified == Some(true),
            phone: if provider.is_phone_provider() {
                Some(account.provider_account_id.clone())
            } else if row.phone_verified == Some(true) {
                user.as_ref().and_then(|u| u.phone.clone())
            } else {
                None
            },
            phone_verified: row.phone_verified == Some(true),
            name: None,
            image: None,
        };
        let (user, _account) = self
            .upsert_user_and_account(
                AccountRef::Existing(account),
                LinkAttrs {
                    provider: &provider,
                    profile,
                    should_link_via_email: false,
                    should_link_via_phone: false,
                },
            )
            .await?;

        self.store.delete_verification_code(row.id).await?;
        if let Some(verifier) = row.verifier {
            self.store.delete_verifier(verifier).await?;
        }

        self.finish_sign_in(user.id, args.identity.map(|i| i.session_id))
            .await
    }

    /// Create the session and issue a root token pair.
    pub(crate) async fn finish_sign_in(
        &self,
        user_id: UserId,
        existing_session_id: Option<SessionId>,
    ) -> Result<SignInOutcome> {
        let session = self.sign_in_session(user_id, existing_session_id).await?;
        let tokens = self
            .issue_tokens(user_id, session.id, crate::session::IssueTokenOptions::default())
            .await?;
        Ok(SignInOutcome::SignedIn {
            user_id,
            session_id: session.id,
            tokens: Some(tokens),
        })
    }

    /// Anonymous provider: mint an `is_anonymous` user and sign it in.
    async fn anonymous_sign_in(&self, args: &SignInArgs) -> Result<SignInOutcome> {
        let now = Utc::now();
        let mut user = User::new(now);
        user.is_anonymous = true;
        let user_id = user.id;
        self.store.insert_user(user).await?;
        tracing::debug!(user_id = %user_id, "anonymous user created");
        self.finish_sign_in(user_id, args.identity.map(|i| i.session_id))
            .await
    }

    /// Create a ceremony verifier row.
    pub(crate) async fn create_verifier(
        &self,
        session_id: Option<SessionId>,
    ) -> Result<VerifierId> {
        let verifier = Verifier {
            id: VerifierId::new(),
            session_id,
            signature: None,
            created_at: Utc::now(),
        };
        let id = verifier.id;
        self.store.insert_verifier(verifier).await?;
        Ok(id)
    }

    /// Load a live verifier; expired rows are reaped on sight.
    pub(crate) async fn live_verifier(&self, id: VerifierId) -> Result<Option<Verifier>> {
        let Some(verifier) = self.store.verifier(id).await? else {
            return Ok(None);
        };
        if Utc::now() - verifier.created_at > crate::constants::verifier_ttl() {
            self.store.delete_verifier(id).await?;
            return Ok(None);
        }
        Ok(Some(verifier))
    }
}
