//! Error types for the authentication runtime.
//!
//! Every failure mode carries a machine-readable code (see [`AuthError::code`])
//! plus a default human message. The HTTP surface maps these to structured
//! `{code, message}` JSON responses.

use thiserror::Error;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Error taxonomy for the authentication runtime.
///
/// Variants are grouped by subsystem. The `code()` string is stable wire
/// vocabulary; variant names and messages are not.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    // ═══════════════════════════════════════════════════════════
    // Configuration
    // ═══════════════════════════════════════════════════════════
    /// The requested provider id has no entry in the configuration.
    #[error("Provider `{0}` is not configured")]
    ProviderNotConfigured(String),

    /// An email flow was started but no email configuration exists.
    #[error("Email configuration is required for this flow")]
    EmailConfigRequired,

    /// A required environment value was not supplied.
    #[error("Missing required environment value `{0}`")]
    MissingEnvVar(String),

    /// A credentials provider was configured without hash/verify functions.
    #[error("Credentials provider is missing its crypto functions")]
    MissingCryptoFunction,

    // ═══════════════════════════════════════════════════════════
    // Authentication
    // ═══════════════════════════════════════════════════════════
    /// The operation requires a signed-in user.
    #[error("Not signed in")]
    NotSignedIn,

    /// The verification code is unknown, expired, or already consumed.
    #[error("Invalid verification code")]
    InvalidVerificationCode,

    /// The refresh token is malformed or does not resolve to a live row.
    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    /// The sign-in request is missing required parameters.
    #[error("Sign-in request is missing required parameters")]
    SignInMissingParams,

    /// The requested redirect target is not allowed.
    #[error("Invalid redirect target")]
    InvalidRedirect,

    // ═══════════════════════════════════════════════════════════
    // Credentials
    // ═══════════════════════════════════════════════════════════
    /// An account with this identifier already exists.
    #[error("Account already exists")]
    AccountAlreadyExists,

    /// No account matches this identifier.
    #[error("Account not found")]
    AccountNotFound,

    /// The named provider exists but is not a credentials provider.
    #[error("Provider is not a credentials provider")]
    InvalidCredentialsProvider,

    /// The supplied secret did not verify.
    #[error("Invalid secret")]
    InvalidSecret,

    /// Too many failed verification attempts inside the window.
    #[error("Too many failed attempts, retry later")]
    TooManyFailedAttempts,

    // ═══════════════════════════════════════════════════════════
    // OAuth
    // ═══════════════════════════════════════════════════════════
    /// The callback names a provider that is unknown or not OAuth.
    #[error("OAuth callback for unknown provider")]
    OAuthMissingProvider,

    /// No verifier accompanies the OAuth round trip.
    #[error("OAuth flow is missing its verifier")]
    OAuthMissingVerifier,

    /// The provider response lacks the expected id token.
    #[error("OAuth provider returned no id token")]
    OAuthMissingIdToken,

    /// The callback `state` does not match the stored ceremony state.
    #[error("OAuth state mismatch")]
    OAuthInvalidState,

    /// The provider profile is missing required fields.
    #[error("OAuth profile is invalid")]
    OAuthInvalidProfile,

    /// The provider reported an error or the exchange failed.
    #[error("OAuth provider error: {0}")]
    OAuthProviderError(String),

    // ═══════════════════════════════════════════════════════════
    // Passkeys
    // ═══════════════════════════════════════════════════════════
    /// clientDataJSON failed to parse or has the wrong type.
    #[error("Passkey client data is invalid")]
    PasskeyInvalidClientData,

    /// The client data origin does not match the configured origin.
    #[error("Passkey origin mismatch")]
    PasskeyInvalidOrigin,

    /// The challenge does not match the stored ceremony challenge.
    #[error("Passkey challenge mismatch")]
    PasskeyInvalidChallenge,

    /// The authenticator RP-ID hash does not match the configured RP.
    #[error("Passkey relying-party mismatch")]
    PasskeyRpMismatch,

    /// The authenticator did not assert user presence.
    #[error("Passkey user presence not asserted")]
    PasskeyUserPresence,

    /// The authenticator did not assert user verification.
    #[error("Passkey user verification not asserted")]
    PasskeyUserVerification,

    /// The response carries no credential.
    #[error("Passkey response carries no credential")]
    PasskeyNoCredential,

    /// The credential uses an algorithm outside the allow-list.
    #[error("Passkey algorithm not supported")]
    PasskeyUnsupportedAlgorithm,

    /// The assertion signature did not verify.
    #[error("Passkey signature is invalid")]
    PasskeyInvalidSignature,

    /// No stored passkey matches the asserted credential id.
    #[error("Unknown passkey credential")]
    PasskeyUnknownCredential,

    /// The signature counter did not advance.
    #[error("Passkey counter did not advance")]
    PasskeyCounterError,

    // ═══════════════════════════════════════════════════════════
    // TOTP
    // ═══════════════════════════════════════════════════════════
    /// No TOTP credential exists for this user.
    #[error("TOTP credential not found")]
    TotpNotFound,

    /// The TOTP credential is already verified.
    #[error("TOTP credential already verified")]
    TotpAlreadyVerified,

    /// The presented TOTP code is wrong.
    #[error("Invalid TOTP code")]
    TotpInvalidCode,

    /// The ceremony verifier is missing or does not carry TOTP state.
    #[error("Invalid TOTP verifier")]
    TotpInvalidVerifier,

    /// The user has no TOTP enrollment to confirm.
    #[error("No TOTP enrollment in progress")]
    TotpNoEnrollment,

    // ═══════════════════════════════════════════════════════════
    // Device authorization (RFC 8628)
    // ═══════════════════════════════════════════════════════════
    /// The user has not yet approved or denied the device.
    #[error("Device authorization pending")]
    DeviceAuthorizationPending,

    /// The device polled faster than the granted interval.
    #[error("Polling too fast, slow down")]
    DeviceSlowDown,

    /// The device code is unknown or expired.
    #[error("Device code expired")]
    DeviceCodeExpired,

    /// The user denied the device.
    #[error("Device authorization denied")]
    DeviceCodeDenied,

    /// The user code does not match a pending authorization.
    #[error("Invalid user code")]
    DeviceInvalidUserCode,

    /// The device row is already bound to an authorized session.
    #[error("Device already authorized")]
    DeviceAlreadyAuthorized,

    // ═══════════════════════════════════════════════════════════
    // API keys
    // ═══════════════════════════════════════════════════════════
    /// The presented key does not resolve to a stored key.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// The key has been revoked.
    #[error("API key revoked")]
    ApiKeyRevoked,

    /// The key is past its expiry.
    #[error("API key expired")]
    ApiKeyExpired,

    /// The key's token bucket is exhausted.
    #[error("API key rate limited")]
    ApiKeyRateLimited,

    /// The requested scopes are outside the configured allow-list.
    #[error("API key scopes not allowed")]
    ApiKeyInvalidScope,

    /// The key's scopes do not cover the requested resource/action.
    #[error("Scope check failed")]
    ScopeCheckFailed,

    // ═══════════════════════════════════════════════════════════
    // Internal
    // ═══════════════════════════════════════════════════════════
    /// Storage or other internal failure (not exposed in detail to users).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ProviderNotConfigured(_) => "PROVIDER_NOT_CONFIGURED",
            Self::EmailConfigRequired => "EMAIL_CONFIG_REQUIRED",
            Self::MissingEnvVar(_) => "MISSING_ENV_VAR",
            Self::MissingCryptoFunction => "MISSING_CRYPTO_FUNCTION",
            Self::NotSignedIn => "NOT_SIGNED_IN",
            Self::InvalidVerificationCode => "INVALID_VERIFICATION_CODE",
            Self::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            Self::SignInMissingParams => "SIGN_IN_MISSING_PARAMS",
            Self::InvalidRedirect => "INVALID_REDIRECT",
            Self::AccountAlreadyExists => "ACCOUNT_ALREADY_EXISTS",
            Self::AccountNotFound => "ACCOUNT_NOT_FOUND",
            Self::InvalidCredentialsProvider => "INVALID_CREDENTIALS_PROVIDER",
            Self::InvalidSecret => "INVALID_SECRET",
            Self::TooManyFailedAttempts => "TOO_MANY_FAILED_ATTEMPTS",
            Self::OAuthMissingProvider => "OAUTH_MISSING_PROVIDER",
            Self::OAuthMissingVerifier => "OAUTH_MISSING_VERIFIER",
            Self::OAuthMissingIdToken => "OAUTH_MISSING_ID_TOKEN",
            Self::OAuthInvalidState => "OAUTH_INVALID_STATE",
            Self::OAuthInvalidProfile => "OAUTH_INVALID_PROFILE",
            Self::OAuthProviderError(_) => "OAUTH_PROVIDER_ERROR",
            Self::PasskeyInvalidClientData => "PASSKEY_INVALID_CLIENT_DATA",
            Self::PasskeyInvalidOrigin => "PASSKEY_INVALID_ORIGIN",
            Self::PasskeyInvalidChallenge => "PASSKEY_INVALID_CHALLENGE",
            Self::PasskeyRpMismatch => "PASSKEY_RP_MISMATCH",
            Self::PasskeyUserPresence => "PASSKEY_USER_PRESENCE",
            Self::PasskeyUserVerification => "PASSKEY_USER_VERIFICATION",
            Self::PasskeyNoCredential => "PASSKEY_NO_CREDENTIAL",
            Self::PasskeyUnsupportedAlgorithm => "PASSKEY_UNSUPPORTED_ALGORITHM",
            Self::PasskeyInvalidSignature => "PASSKEY_INVALID_SIGNATURE",
            Self::PasskeyUnknownCredential => "PASSKEY_UNKNOWN_CREDENTIAL",
            Self::PasskeyCounterError => "PASSKEY_COUNTER_ERROR",
            Self::TotpNotFound => "TOTP_NOT_FOUND",
            Self::TotpAlreadyVerified => "TOTP_ALREADY_VERIFIED",
            Self::TotpInvalidCode => "TOTP_INVALID_CODE",
            Self::TotpInvalidVerifier => "TOTP_INVALID_VERIFIER",
            Self::TotpNoEnrollment => "TOTP_NO_ENROLLMENT",
            Self::DeviceAuthorizationPending => "DEVICE_AUTHORIZATION_PENDING",
            Self::DeviceSlowDown => "DEVICE_SLOW_DOWN",
            Self::DeviceCodeExpired => "DEVICE_CODE_EXPIRED",
            Self::DeviceCodeDenied => "DEVICE_CODE_DENIED",
            Self::DeviceInvalidUserCode => "DEVICE_INVALID_USER_CODE",
            Self::DeviceAlreadyAuthorized => "DEVICE_ALREADY_AUTHORIZED",
            Self::InvalidApiKey => "INVALID_API_KEY",
            Self::ApiKeyRevoked => "API_KEY_REVOKED",
            Self::ApiKeyExpired => "API_KEY_EXPIRED",
            Self::ApiKeyRateLimited => "API_KEY_RATE_LIMITED",
            Self::ApiKeyInvalidScope => "API_KEY_INVALID_SCOPE",
            Self::ScopeCheckFailed => "SCOPE_CHECK_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns `true` if this error is caused by bad user input rather than
    /// a configuration or internal fault.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidVerificationCode
                | Self::InvalidRefreshToken
                | Self::SignInMissingParams
                | Self::InvalidSecret
                | Self::AccountNotFound
                | Self::AccountAlreadyExists
                | Self::TotpInvalidCode
                | Self::DeviceInvalidUserCode
                | Self::InvalidApiKey
        )
    }

    /// Returns `true` if this error indicates a possible attack rather than
    /// an honest mistake.
    #[must_use]
    pub const fn is_security_issue(&self) -> bool {
        matches!(
            self,
            Self::OAuthInvalidState
                | Self::PasskeyInvalidOrigin
                | Self::PasskeyRpMismatch
                | Self::PasskeyInvalidChallenge
                | Self::PasskeyCounterError
                | Self::TooManyFailedAttempts
                | Self::ApiKeyRateLimited
        )
    }

    /// Returns `true` for the expected credential-verification failures the
    /// dispatcher collapses into a generic sign-in failure, so callers
    /// cannot enumerate accounts.
    #[must_use]
    pub(crate) const fn is_expected_credential_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidSecret | Self::AccountNotFound | Self::TooManyFailedAttempts
        )
    }
}
