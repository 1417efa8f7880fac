//! Abstract storage repository.
//!
//! The core treats persistence through this trait; any key/value or document
//! store with the required indices can back it. Lookups return `Ok(None)` on
//! not-found; `Err` is reserved for storage faults.
//!
//! # Transactions
//!
//! The core is designed to run inside a host runtime that wraps each mutating
//! core operation in one serializable transaction (refresh rotation, code
//! consumption, session deletion). Each trait method must itself be atomic;
//! cross-method atomicity is the host transaction's job. The in-memory
//! implementation serializes every call behind a single mutex, which is the
//! in-process equivalent for tests.

use crate::error::Result;
use crate::state::{
    AccountId, ApiKeyId, DeviceAuthId, PasskeyId, RefreshTokenId, SessionId, TotpId, UserId,
    VerificationCodeId, VerifierId,
};
use std::future::Future;

pub mod memory;
pub mod records;

pub use memory::MemoryStore;
pub use records::{
    Account, ApiKey, ApiKeyRateLimit, ApiKeyScope, CoseAlgorithm, DeviceAuthorization,
    DeviceStatus, Passkey, PasskeyDeviceType, RateLimitBucket, RefreshToken, Session,
    TotpCredential, User, VerificationCode, Verifier,
};

/// Typed CRUD over the persistent entities, with the indexed lookups the
/// flows rely on.
///
/// Update methods replace the full row; callers read-modify-write inside the
/// host transaction.
pub trait AuthStore: Send + Sync {
    // ── Users ──────────────────────────────────────────────────────────

    /// Insert a new user row.
    fn insert_user(&self, user: User) -> impl Future<Output = Result<()>> + Send;

    /// Load a user by id.
    fn user(&self, id: UserId) -> impl Future<Output = Result<Option<User>>> + Send;

    /// Find the unique user whose email matches and is verified.
    fn find_user_by_verified_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<User>>> + Send;

    /// Find the unique user whose phone matches and is verified.
    fn find_user_by_verified_phone(
        &self,
        phone: &str,
    ) -> impl Future<Output = Result<Option<User>>> + Send;

    /// Replace a user row.
    fn update_user(&self, user: User) -> impl Future<Output = Result<()>> + Send;

    // ── Accounts ───────────────────────────────────────────────────────

    /// Insert a new account row.
    fn insert_account(&self, account: Account) -> impl Future<Output = Result<()>> + Send;

    /// Load an account by id.
    fn account(&self, id: AccountId) -> impl Future<Output = Result<Option<Account>>> + Send;

    /// Unique lookup by `(provider, provider_account_id)`.
    fn account_by_provider(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> impl Future<Output = Result<Option<Account>>> + Send;

    /// All accounts a user holds under one provider.
    fn accounts_by_user_provider(
        &self,
        user_id: UserId,
        provider: &str,
    ) -> impl Future<Output = Result<Vec<Account>>> + Send;

    /// Replace an account row.
    fn update_account(&self, account: Account) -> impl Future<Output = Result<()>> + Send;

    /// Delete an account row.
    fn delete_account(&self, id: AccountId) -> impl Future<Output = Result<()>> + Send;

    // ── Sessions ───────────────────────────────────────────────────────

    /// Insert a new session row.
    fn insert_session(&self, session: Session) -> impl Future<Output = Result<()>> + Send;

    /// Load a session by id.
    fn session(&self, id: SessionId) -> impl Future<Output = Result<Option<Session>>> + Send;

    /// All sessions a user owns.
    fn sessions_by_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<Session>>> + Send;

    /// Delete a session row (refresh tokens are swept separately).
    fn delete_session(&self, id: SessionId) -> impl Future<Output = Result<()>> + Send;

    // ── Refresh tokens ─────────────────────────────────────────────────

    /// Insert a new refresh-token row.
    fn insert_refresh_token(
        &self,
        token: RefreshToken,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Load a refresh token by id.
    fn refresh_token(
        &self,
        id: RefreshTokenId,
    ) -> impl Future<Output = Result<Option<RefreshToken>>> + Send;

    /// Replace a refresh-token row.
    fn update_refresh_token(
        &self,
        token: RefreshToken,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Children of `parent` within a session (`None` selects the roots).
    fn refresh_token_children(
        &self,
        session_id: SessionId,
        parent: Option<RefreshTokenId>,
    ) -> impl Future<Output = Result<Vec<RefreshToken>>> + Send;

    /// Every refresh token belonging to a session.
    fn refresh_tokens_by_session(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Vec<RefreshToken>>> + Send;

    /// Delete every refresh token belonging to a session.
    fn delete_refresh_tokens(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<()>> + Send;

    /// The unique not-yet-used token of a session, if one exists.
    fn active_refresh_token(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Option<RefreshToken>>> + Send;

    // ── Verification codes ─────────────────────────────────────────────

    /// Insert a new verification code.
    fn insert_verification_code(
        &self,
        code: VerificationCode,
    ) -> impl Future<Output = Result<()>> + Send;

    /// The live code for an account, if any.
    fn verification_code_by_account(
        &self,
        account_id: AccountId,
    ) -> impl Future<Output = Result<Option<VerificationCode>>> + Send;

    /// Lookup by code value.
    fn verification_code_by_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Option<VerificationCode>>> + Send;

    /// Delete a verification code.
    fn delete_verification_code(
        &self,
        id: VerificationCodeId,
    ) -> impl Future<Output = Result<()>> + Send;

    // ── Verifiers ──────────────────────────────────────────────────────

    /// Insert a new verifier row.
    fn insert_verifier(&self, verifier: Verifier) -> impl Future<Output = Result<()>> + Send;

    /// Load a verifier by id.
    fn verifier(&self, id: VerifierId) -> impl Future<Output = Result<Option<Verifier>>> + Send;

    /// Lookup by stored signature.
    fn verifier_by_signature(
        &self,
        signature: &str,
    ) -> impl Future<Output = Result<Option<Verifier>>> + Send;

    /// Replace a verifier row.
    fn update_verifier(&self, verifier: Verifier) -> impl Future<Output = Result<()>> + Send;

    /// Delete a verifier row.
    fn delete_verifier(&self, id: VerifierId) -> impl Future<Output = Result<()>> + Send;

    // ── Rate limits ────────────────────────────────────────────────────

    /// Load the bucket for an identifier.
    fn rate_limit(
        &self,
        identifier: &str,
    ) -> impl Future<Output = Result<Option<RateLimitBucket>>> + Send;

    /// Create or replace the bucket for an identifier.
    fn put_rate_limit(&self, bucket: RateLimitBucket)
        -> impl Future<Output = Result<()>> + Send;

    /// Drop the bucket for an identifier.
    fn delete_rate_limit(&self, identifier: &str) -> impl Future<Output = Result<()>> + Send;

    // ── API keys ───────────────────────────────────────────────────────

    /// Insert a new API-key row.
    fn insert_api_key(&self, key: ApiKey) -> impl Future<Output = Result<()>> + Send;

    /// Load an API key by id.
    fn api_key(&self, id: ApiKeyId) -> impl Future<Output = Result<Option<ApiKey>>> + Send;

    /// Unique lookup by hashed key. There is no raw-key index.
    fn api_key_by_hash(
        &self,
        hashed_key: &str,
    ) -> impl Future<Output = Result<Option<ApiKey>>> + Send;

    /// All keys a user owns.
    fn api_keys_by_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<ApiKey>>> + Send;

    /// Replace an API-key row.
    fn update_api_key(&self, key: ApiKey) -> impl Future<Output = Result<()>> + Send;

    /// Delete an API-key row.
    fn delete_api_key(&self, id: ApiKeyId) -> impl Future<Output = Result<()>> + Send;

    // ── Passkeys ───────────────────────────────────────────────────────

    /// Insert a new passkey row.
    fn insert_passkey(&self, passkey: Passkey) -> impl Future<Output = Result<()>> + Send;

    /// Unique lookup by credential id.
    fn passkey_by_credential(
        &self,
        credential_id: &str,
    ) -> impl Future<Output = Result<Option<Passkey>>> + Send;

    /// All passkeys a user owns.
    fn passkeys_by_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<Passkey>>> + Send;

    /// Replace a passkey row.
    fn update_passkey(&self, passkey: Passkey) -> impl Future<Output = Result<()>> + Send;

    /// Delete a passkey row.
    fn delete_passkey(&self, id: PasskeyId) -> impl Future<Output = Result<()>> + Send;

    // ── TOTP ───────────────────────────────────────────────────────────

    /// Insert a new TOTP credential.
    fn insert_totp(&self, totp: TotpCredential) -> impl Future<Output = Result<()>> + Send;

    /// Load a TOTP credential by id.
    fn totp(&self, id: TotpId) -> impl Future<Output = Result<Option<TotpCredential>>> + Send;

    /// All TOTP credentials a user owns.
    fn totps_by_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<TotpCredential>>> + Send;

    /// Replace a TOTP credential row.
    fn update_totp(&self, totp: TotpCredential) -> impl Future<Output = Result<()>> + Send;

    /// Delete a TOTP credential row.
    fn delete_totp(&self, id: TotpId) -> impl Future<Output = Result<()>> + Send;

    // ── Device authorizations ──────────────────────────────────────────

    /// Insert a new device-authorization row.
    fn insert_device_auth(
        &self,
        device: DeviceAuthorization,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Lookup by hashed device code.
    fn device_auth_by_code_hash(
        &self,
        device_code_hash: &str,
    ) -> impl Future<Output = Result<Option<DeviceAuthorization>>> + Send;

    /// Lookup by user code.
    fn device_auth_by_user_code(
        &self,
        user_code: &str,
    ) -> impl Future<Output = Result<Option<DeviceAuthorization>>> + Send;

    /// Replace a device-authorization row.
    fn update_device_auth(
        &self,
        device: DeviceAuthorization,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete a device-authorization row.
    fn delete_device_auth(&self, id: DeviceAuthId) -> impl Future<Output = Result<()>> + Send;
}
