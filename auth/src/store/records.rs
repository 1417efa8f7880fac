//! Persistent entity records.
//!
//! These mirror the rows the abstract repository stores. Every record
//! carries an opaque system-assigned id and a creation timestamp.

use crate::state::{
    AccountId, ApiKeyId, DeviceAuthId, PasskeyId, RefreshTokenId, SessionId, TotpId, UserId,
    VerificationCodeId, VerifierId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user. At most one user holds any given *verified* email; same for phone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Row id.
    pub id: UserId,

    /// Email address, if known.
    pub email: Option<String>,

    /// When the email was last proven to belong to this user.
    pub email_verification_time: Option<DateTime<Utc>>,

    /// Phone number, if known.
    pub phone: Option<String>,

    /// When the phone was last proven to belong to this user.
    pub phone_verification_time: Option<DateTime<Utc>>,

    /// Display name.
    pub name: Option<String>,

    /// Avatar URL.
    pub image: Option<String>,

    /// Whether this user was created by the anonymous provider.
    pub is_anonymous: bool,

    /// Free-form host extension data, stored verbatim.
    pub extend: Option<serde_json::Value>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create an empty user shell.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: UserId::new(),
            email: None,
            email_verification_time: None,
            phone: None,
            phone_verification_time: None,
            name: None,
            image: None,
            is_anonymous: false,
            extend: None,
            created_at: now,
        }
    }
}

/// An external or local credential bound to a user.
///
/// Unique per `(provider, provider_account_id)`. `secret` is always stored
/// hashed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Row id.
    pub id: AccountId,

    /// Owning user.
    pub user_id: UserId,

    /// Provider id this account belongs to.
    pub provider: String,

    /// Identifier within the provider (email, phone, external subject id).
    pub provider_account_id: String,

    /// Hashed secret for credentials accounts.
    pub secret: Option<String>,

    /// Whether the provider attested the email as verified.
    pub email_verified: Option<bool>,

    /// Whether the provider attested the phone as verified.
    pub phone_verified: Option<bool>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A signed-in session. One user may own many sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Row id.
    pub id: SessionId,

    /// Owning user.
    pub user_id: UserId,

    /// Absolute expiry; the session is dead past this instant.
    pub expiration_time: DateTime<Utc>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One node of a session's refresh-token tree.
///
/// Roots have no parent; each rotation appends a child. `first_used_time`
/// is set on the first successful refresh with this token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    /// Row id.
    pub id: RefreshTokenId,

    /// Owning session.
    pub session_id: SessionId,

    /// Absolute expiry, inherited from the session.
    pub expiration_time: DateTime<Utc>,

    /// When this token was first presented for refresh.
    pub first_used_time: Option<DateTime<Utc>>,

    /// The token this one was rotated from, if any.
    pub parent_id: Option<RefreshTokenId>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A single-use, short-lived credential: OTP, magic-link token, or OAuth
/// callback handoff code. Consumed on successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCode {
    /// Row id.
    pub id: VerificationCodeId,

    /// The account this code proves control of.
    pub account_id: AccountId,

    /// Provider id the code was minted under.
    pub provider: String,

    /// The code value presented back by the user.
    pub code: String,

    /// Absolute expiry.
    pub expiration_time: DateTime<Utc>,

    /// Ceremony verifier bound to this code, if any.
    pub verifier: Option<VerifierId>,

    /// Set when successful consumption proves email ownership.
    pub email_verified: Option<bool>,

    /// Set when successful consumption proves phone ownership.
    pub phone_verified: Option<bool>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Short-lived per-ceremony server state.
///
/// The `signature` column is an opaque string; each ceremony defines its own
/// contents (state hash, challenge hash, JSON payload). The typed wrappers
/// live next to their flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verifier {
    /// Row id.
    pub id: VerifierId,

    /// Session the ceremony belongs to, when one exists yet.
    pub session_id: Option<SessionId>,

    /// Opaque ceremony state.
    pub signature: Option<String>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Token-bucket state for one identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitBucket {
    /// Bucket key (account id, or an API-key id).
    pub identifier: String,

    /// Fractional tokens remaining.
    pub attempts_left: f64,

    /// Instant of the last recorded attempt; refill accrues from here.
    pub last_attempt_time: DateTime<Utc>,
}

/// One scope grant: a resource and the actions allowed on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyScope {
    /// Resource name, or `"*"`.
    pub resource: String,

    /// Allowed actions; may contain `"*"`.
    pub actions: Vec<String>,
}

/// Per-key rate-limit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyRateLimit {
    /// Bucket capacity per window.
    pub max_requests: u32,

    /// Window length in milliseconds.
    pub window_ms: i64,
}

/// A programmatic credential. Raw key material is never persisted; lookups
/// go exclusively through `hashed_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Row id.
    pub id: ApiKeyId,

    /// Owning user.
    pub user_id: UserId,

    /// Display prefix (`prefix + first 4 random chars + "..."`).
    pub prefix: String,

    /// Lowercase hex SHA-256 of the raw key.
    pub hashed_key: String,

    /// Human-assigned name.
    pub name: String,

    /// Scope grants.
    pub scopes: Vec<ApiKeyScope>,

    /// Optional per-key rate limit.
    pub rate_limit: Option<ApiKeyRateLimit>,

    /// Current bucket state when a rate limit is configured.
    pub rate_limit_state: Option<RateLimitBucket>,

    /// Optional absolute expiry.
    pub expires_at: Option<DateTime<Utc>>,

    /// Last successful verification.
    pub last_used_at: Option<DateTime<Utc>>,

    /// Soft-revocation flag.
    pub revoked: bool,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// COSE signature algorithms accepted for passkeys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoseAlgorithm {
    /// ECDSA w/ SHA-256 (COSE -7).
    Es256,

    /// RSASSA-PKCS1-v1_5 w/ SHA-256 (COSE -257).
    Rs256,
}

impl CoseAlgorithm {
    /// Map a COSE algorithm identifier onto the supported set.
    #[must_use]
    pub const fn from_cose(id: i64) -> Option<Self> {
        match id {
            -7 => Some(Self::Es256),
            -257 => Some(Self::Rs256),
            _ => None,
        }
    }
}

/// Kind of authenticator a passkey lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasskeyDeviceType {
    /// Bound to a single device.
    SingleDevice,

    /// Synced across devices (a "multi-device" credential).
    MultiDevice,
}

/// A WebAuthn credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passkey {
    /// Row id.
    pub id: PasskeyId,

    /// Owning user.
    pub user_id: UserId,

    /// Credential id (base64url), unique across the deployment.
    pub credential_id: String,

    /// COSE-encoded public key.
    pub public_key: Vec<u8>,

    /// Signature algorithm.
    pub algorithm: CoseAlgorithm,

    /// Last seen signature counter.
    pub counter: u32,

    /// Authenticator transports, when reported.
    pub transports: Option<Vec<String>>,

    /// Device binding kind.
    pub device_type: PasskeyDeviceType,

    /// Whether the credential is backed up.
    pub backed_up: bool,

    /// Human-assigned name.
    pub name: Option<String>,

    /// Last successful assertion.
    pub last_used_at: Option<DateTime<Utc>>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A TOTP second-factor credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotpCredential {
    /// Row id.
    pub id: TotpId,

    /// Owning user.
    pub user_id: UserId,

    /// Base32-encoded shared secret.
    pub secret: String,

    /// Code length.
    pub digits: u32,

    /// Step length in seconds.
    pub period: u64,

    /// Whether enrollment was confirmed with a valid code.
    pub verified: bool,

    /// Human-assigned name.
    pub name: Option<String>,

    /// Last successful verification.
    pub last_used_at: Option<DateTime<Utc>>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// State of a device-authorization grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Waiting for the user to approve or deny.
    Pending,

    /// Approved; the next poll collects tokens.
    Authorized,

    /// Denied by the user.
    Denied,
}

/// An RFC 8628 device-authorization row.
///
/// Addressed by the SHA-256 of the device code; the raw code is never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuthorization {
    /// Row id.
    pub id: DeviceAuthId,

    /// Lowercase hex SHA-256 of the device code.
    pub device_code_hash: String,

    /// Short code the user types at the verification URI.
    pub user_code: String,

    /// Absolute expiry.
    pub expires_at: DateTime<Utc>,

    /// Minimum seconds between polls.
    pub interval: u64,

    /// Grant state.
    pub status: DeviceStatus,

    /// Approving user, once authorized.
    pub user_id: Option<UserId>,

    /// Session minted at approval time, collected by the next poll.
    pub session_id: Option<SessionId>,

    /// Instant of the last poll, for slow-down enforcement.
    pub last_polled_at: Option<DateTime<Utc>>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
