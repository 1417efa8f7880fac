//! Constants shared across the authentication flows.

use chrono::Duration;

/// Default total session lifetime: 30 days.
#[must_use]
pub fn default_session_duration() -> Duration {
    Duration::days(30)
}

/// Default access-token validity: one hour.
#[must_use]
pub fn default_jwt_duration() -> Duration {
    Duration::hours(1)
}

/// Window after a refresh token's first use during which a repeat of the
/// same token still yields a fresh pair (lost-response retry tolerance).
#[must_use]
pub fn refresh_reuse_window() -> Duration {
    Duration::milliseconds(10_000)
}

/// Default failed-attempt budget per identifier per hour.
pub const DEFAULT_MAX_FAILED_ATTEMPTS_PER_HOUR: u32 = 10;

/// Lifetime of the one-time OAuth callback handoff code.
#[must_use]
pub fn oauth_handoff_ttl() -> Duration {
    Duration::minutes(2)
}

/// Default lifetime of email/phone verification codes.
#[must_use]
pub fn verification_code_ttl() -> Duration {
    Duration::minutes(15)
}

/// Default lifetime of ceremony verifiers (PKCE state, passkey challenges,
/// TOTP enrollment context).
#[must_use]
pub fn verifier_ttl() -> Duration {
    Duration::minutes(10)
}

/// Magic-link / OAuth-handoff code length (base64url chars of 24 random
/// bytes). Spec floor is 24 characters for codes that are not re-bound to
/// the identifier at verification time.
pub const LINK_CODE_BYTES: usize = 24;

/// Digits in a phone/email OTP (identifier re-submitted at verification).
pub const OTP_DIGITS: usize = 8;

/// Length of the RFC 8628 device code.
pub const DEVICE_CODE_LEN: usize = 40;

/// Vowel-free alphabet for user codes (also drops ambiguous glyphs).
pub const USER_CODE_ALPHABET: &[u8] = b"BCDFGHJKMNPQRSTVWXZ23456789";

/// Characters in a user code, excluding the group separator.
pub const USER_CODE_LEN: usize = 8;

/// Default device-authorization lifetime in seconds.
pub const DEVICE_EXPIRES_IN_SECS: u64 = 600;

/// Default minimum device poll interval in seconds.
pub const DEVICE_POLL_INTERVAL_SECS: u64 = 5;

/// Random alphanumeric characters in a raw API key after the prefix.
pub const API_KEY_RANDOM_LEN: usize = 32;

/// TOTP secret size in bytes before base32 encoding.
pub const TOTP_SECRET_BYTES: usize = 20;

/// Grace period for TOTP verification: one step either side.
pub const TOTP_GRACE_STEPS: i64 = 1;

/// Passkey challenge size in bytes.
pub const PASSKEY_CHALLENGE_BYTES: usize = 32;
