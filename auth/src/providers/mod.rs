//! Provider configurations.
//!
//! Sign-in methods are a tagged union: the dispatcher looks the provider up
//! by id and matches exhaustively on the variant. Each variant carries its
//! own configuration, including the opaque collaborator it needs (email
//! transport, OAuth client, passkey crypto, secret hasher).

use crate::error::Result;
use crate::store::records::Account;
use crate::BoxFuture;
use std::sync::Arc;

pub mod console_email;
pub mod email;
pub mod oauth;
pub mod passkey;
pub mod secret;
pub mod smtp_email;

pub use console_email::ConsoleEmailSender;
pub use email::{EmailSender, SmsSender, VerificationEmail};
pub use oauth::{
    generate_pkce_verifier, pkce_challenge, HttpOAuthClient, OAuthClient, OAuthEndpoints,
    OAuthProfile,
};
pub use passkey::{
    parse_client_data, CollectedClientData, ParsedAssertion, ParsedAttestation, PasskeyCrypto,
};
pub use secret::{Argon2SecretHasher, SecretHasher};
pub use smtp_email::SmtpEmailSender;

/// Hook run after an OTP/magic-link code matches, before the sign-in
/// completes. Rejecting aborts the sign-in without consuming the code.
pub trait OtpAuthorize: Send + Sync {
    /// Decide whether this verification may complete.
    ///
    /// # Errors
    ///
    /// Any error aborts the sign-in.
    fn authorize<'a>(
        &'a self,
        params: &'a serde_json::Value,
        account: &'a Account,
    ) -> BoxFuture<'a, Result<()>>;
}

/// How an email provider delivers its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmailCodeStyle {
    /// Long link token; the code alone proves ownership.
    #[default]
    MagicLink,

    /// Short numeric OTP; the identifier must be re-submitted alongside it.
    Otp,
}

/// OAuth 2.0 / OIDC provider entry.
#[derive(Clone)]
pub struct OAuthProviderConfig {
    /// Provider id (`"google"`, `"github"`, …).
    pub id: String,

    /// Opaque provider client.
    pub client: Arc<dyn OAuthClient>,

    /// Link to an existing user by unverified profile email. Off by
    /// default; linking otherwise requires the profile to attest the email.
    pub allow_dangerous_email_account_linking: bool,
}

impl OAuthProviderConfig {
    /// Create an OAuth provider entry.
    #[must_use]
    pub fn new(id: impl Into<String>, client: Arc<dyn OAuthClient>) -> Self {
        Self {
            id: id.into(),
            client,
            allow_dangerous_email_account_linking: false,
        }
    }

    /// Opt in to linking by unverified profile email.
    #[must_use]
    pub fn with_dangerous_email_account_linking(mut self, allow: bool) -> Self {
        self.allow_dangerous_email_account_linking = allow;
        self
    }
}

/// Email magic-link / OTP provider entry.
#[derive(Clone)]
pub struct EmailProviderConfig {
    /// Provider id (`"email"` by convention).
    pub id: String,

    /// Sender address; falls back to the global email config.
    pub from: Option<String>,

    /// Transport; falls back to the global email config.
    pub sender: Option<Arc<dyn EmailSender>>,

    /// Code delivery style.
    pub code_style: EmailCodeStyle,

    /// Code lifetime.
    pub code_ttl: chrono::Duration,

    /// Optional authorize hook run at verification time.
    pub authorize: Option<Arc<dyn OtpAuthorize>>,
}

impl EmailProviderConfig {
    /// Create an email provider entry with the default style and TTL.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            from: None,
            sender: None,
            code_style: EmailCodeStyle::MagicLink,
            code_ttl: crate::constants::verification_code_ttl(),
            authorize: None,
        }
    }

    /// Set the sender address.
    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Set the transport.
    #[must_use]
    pub fn with_sender(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Switch to short-OTP delivery.
    #[must_use]
    pub fn with_code_style(mut self, style: EmailCodeStyle) -> Self {
        self.code_style = style;
        self
    }

    /// Set the code lifetime.
    #[must_use]
    pub fn with_code_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.code_ttl = ttl;
        self
    }

    /// Attach an authorize hook.
    #[must_use]
    pub fn with_authorize(mut self, hook: Arc<dyn OtpAuthorize>) -> Self {
        self.authorize = Some(hook);
        self
    }
}

/// Phone OTP provider entry.
#[derive(Clone)]
pub struct PhoneProviderConfig {
    /// Provider id (`"phone"` by convention).
    pub id: String,

    /// SMS transport.
    pub sender: Arc<dyn SmsSender>,

    /// Code lifetime.
    pub code_ttl: chrono::Duration,

    /// Optional authorize hook run at verification time.
    pub authorize: Option<Arc<dyn OtpAuthorize>>,
}

impl PhoneProviderConfig {
    /// Create a phone provider entry.
    #[must_use]
    pub fn new(id: impl Into<String>, sender: Arc<dyn SmsSender>) -> Self {
        Self {
            id: id.into(),
            sender,
            code_ttl: crate::constants::verification_code_ttl(),
            authorize: None,
        }
    }

    /// Set the code lifetime.
    #[must_use]
    pub fn with_code_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.code_ttl = ttl;
        self
    }
}

/// Password credentials provider entry.
#[derive(Clone)]
pub struct CredentialsProviderConfig {
    /// Provider id (`"password"` by convention).
    pub id: String,

    /// Injected hash/verify pair. A provider without one fails password
    /// flows with `MISSING_CRYPTO_FUNCTION`.
    pub hasher: Option<Arc<dyn SecretHasher>>,
}

impl CredentialsProviderConfig {
    /// Create a credentials provider entry with the argon2id default hasher.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            hasher: Some(Arc::new(Argon2SecretHasher::new())),
        }
    }

    /// Replace the hasher.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn SecretHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// Remove the hasher (flows will fail with `MISSING_CRYPTO_FUNCTION`).
    #[must_use]
    pub fn without_hasher(mut self) -> Self {
        self.hasher = None;
        self
    }
}

/// WebAuthn passkey provider entry.
#[derive(Clone)]
pub struct PasskeyProviderConfig {
    /// Provider id (`"passkey"` by convention).
    pub id: String,

    /// Human-readable relying-party name.
    pub rp_name: String,

    /// Relying-party id; defaults to the host of `SITE_URL`.
    pub rp_id: Option<String>,

    /// Expected origin; defaults to `SITE_URL`.
    pub origin: Option<String>,

    /// Opaque parse/verify primitives.
    pub crypto: Arc<dyn PasskeyCrypto>,
}

impl PasskeyProviderConfig {
    /// Create a passkey provider entry.
    #[must_use]
    pub fn new(id: impl Into<String>, rp_name: impl Into<String>, crypto: Arc<dyn PasskeyCrypto>) -> Self {
        Self {
            id: id.into(),
            rp_name: rp_name.into(),
            rp_id: None,
            origin: None,
            crypto,
        }
    }

    /// Override the relying-party id.
    #[must_use]
    pub fn with_rp_id(mut self, rp_id: impl Into<String>) -> Self {
        self.rp_id = Some(rp_id.into());
        self
    }

    /// Override the expected origin.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// TOTP second-factor provider entry.
#[derive(Debug, Clone)]
pub struct TotpProviderConfig {
    /// Provider id (`"totp"` by convention).
    pub id: String,

    /// Issuer label baked into `otpauth://` URIs; defaults to the site host.
    pub issuer: Option<String>,

    /// Code length.
    pub digits: u32,

    /// Step length in seconds.
    pub period: u64,
}

impl TotpProviderConfig {
    /// Create a TOTP provider entry with 6-digit, 30-second codes.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            issuer: None,
            digits: 6,
            period: 30,
        }
    }

    /// Set the issuer label.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }
}

/// RFC 8628 device-authorization provider entry.
#[derive(Debug, Clone)]
pub struct DeviceProviderConfig {
    /// Provider id (`"device"` by convention).
    pub id: String,

    /// Verification URI shown to the user; defaults to `SITE_URL/device`.
    pub verification_uri: Option<String>,

    /// Grant lifetime in seconds.
    pub expires_in_secs: u64,

    /// Minimum poll interval in seconds.
    pub interval_secs: u64,
}

impl DeviceProviderConfig {
    /// Create a device provider entry with the default lifetimes.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            verification_uri: None,
            expires_in_secs: crate::constants::DEVICE_EXPIRES_IN_SECS,
            interval_secs: crate::constants::DEVICE_POLL_INTERVAL_SECS,
        }
    }

    /// Set the verification URI.
    #[must_use]
    pub fn with_verification_uri(mut self, uri: impl Into<String>) -> Self {
        self.verification_uri = Some(uri.into());
        self
    }
}

/// Anonymous provider entry: signs in a fresh `is_anonymous` user directly.
#[derive(Debug, Clone)]
pub struct AnonymousProviderConfig {
    /// Provider id (`"anonymous"` by convention).
    pub id: String,
}

impl AnonymousProviderConfig {
    /// Create an anonymous provider entry.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A configured sign-in method.
#[derive(Clone)]
pub enum Provider {
    /// OAuth 2.0 / OIDC redirect flow.
    OAuth(OAuthProviderConfig),

    /// Email magic link or OTP.
    Email(EmailProviderConfig),

    /// Phone OTP.
    Phone(PhoneProviderConfig),

    /// Password credentials.
    Credentials(CredentialsProviderConfig),

    /// WebAuthn passkeys.
    Passkey(PasskeyProviderConfig),

    /// TOTP second factor.
    Totp(TotpProviderConfig),

    /// RFC 8628 device authorization.
    DeviceCode(DeviceProviderConfig),

    /// Anonymous users.
    Anonymous(AnonymousProviderConfig),
}

impl Provider {
    /// The provider's configured id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::OAuth(c) => &c.id,
            Self::Email(c) => &c.id,
            Self::Phone(c) => &c.id,
            Self::Credentials(c) => &c.id,
            Self::Passkey(c) => &c.id,
            Self::Totp(c) => &c.id,
            Self::DeviceCode(c) => &c.id,
            Self::Anonymous(c) => &c.id,
        }
    }

    /// Whether this provider proves email ownership by delivering codes.
    #[must_use]
    pub const fn is_email_provider(&self) -> bool {
        matches!(self, Self::Email(_))
    }

    /// Whether this provider proves phone ownership by delivering codes.
    #[must_use]
    pub const fn is_phone_provider(&self) -> bool {
        matches!(self, Self::Phone(_))
    }
}
