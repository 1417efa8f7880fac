//! In-memory store.
//!
//! Backs the test suite and is usable for single-process deployments where
//! durability is not required. Every operation takes one global lock, which
//! stands in for the host's serializable transactions.

use crate::error::{AuthError, Result};
use crate::state::{
    AccountId, ApiKeyId, DeviceAuthId, PasskeyId, RefreshTokenId, SessionId, TotpId, UserId,
    VerificationCodeId, VerifierId,
};
use crate::store::records::{
    Account, ApiKey, DeviceAuthorization, Passkey, RateLimitBucket, RefreshToken, Session,
    TotpCredential, User, VerificationCode, Verifier,
};
use crate::store::AuthStore;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    accounts: HashMap<AccountId, Account>,
    sessions: HashMap<SessionId, Session>,
    refresh_tokens: HashMap<RefreshTokenId, RefreshToken>,
    verification_codes: HashMap<VerificationCodeId, VerificationCode>,
    verifiers: HashMap<VerifierId, Verifier>,
    rate_limits: HashMap<String, RateLimitBucket>,
    api_keys: HashMap<ApiKeyId, ApiKey>,
    passkeys: HashMap<PasskeyId, Passkey>,
    totps: HashMap<TotpId, TotpCredential>,
    device_auths: HashMap<DeviceAuthId, DeviceAuthorization>,
}

/// In-memory [`AuthStore`] implementation.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(inner: &Arc<Mutex<Tables>>) -> Result<MutexGuard<'_, Tables>> {
        inner
            .lock()
            .map_err(|_| AuthError::Internal("store mutex poisoned".into()))
    }
}

impl AuthStore for MemoryStore {
    // ── Users ──────────────────────────────────────────────────────────

    fn insert_user(&self, user: User) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.users.insert(user.id, user);
            Ok(())
        }
    }

    fn user(&self, id: UserId) -> impl Future<Output = Result<Option<User>>> + Send {
        let inner = Arc::clone(&self.inner);
        async move { Ok(Self::lock(&inner)?.users.get(&id).cloned()) }
    }

    fn find_user_by_verified_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<User>>> + Send {
        let inner = Arc::clone(&self.inner);
        let email = email.to_string();
        async move {
            Ok(Self::lock(&inner)?
                .users
                .values()
                .find(|u| u.email.as_deref() == Some(email.as_str()) && u.email_verification_time.is_some())
                .cloned())
        }
    }

    fn find_user_by_verified_phone(
        &self,
        phone: &str,
    ) -> impl Future<Output = Result<Option<User>>> + Send {
        let inner = Arc::clone(&self.inner);
        let phone = phone.to_string();
        async move {
            Ok(Self::lock(&inner)?
                .users
                .values()
                .find(|u| u.phone.as_deref() == Some(phone.as_str()) && u.phone_verification_time.is_some())
                .cloned())
        }
    }

    fn update_user(&self, user: User) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.users.insert(user.id, user);
            Ok(())
        }
    }

    // ── Accounts ───────────────────────────────────────────────────────

    fn insert_account(&self, account: Account) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.accounts.insert(account.id, account);
            Ok(())
        }
    }

    fn account(&self, id: AccountId) -> impl Future<Output = Result<Option<Account>>> + Send {
        let inner = Arc::clone(&self.inner);
        async move { Ok(Self::lock(&inner)?.accounts.get(&id).cloned()) }
    }

    fn account_by_provider(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> impl Future<Output = Result<Option<Account>>> + Send {
        let inner = Arc::clone(&self.inner);
        let provider = provider.to_string();
        let provider_account_id = provider_account_id.to_string();
        async move {
            Ok(Self::lock(&inner)?
                .accounts
                .values()
                .find(|a| a.provider == provider && a.provider_account_id == provider_account_id)
                .cloned())
        }
    }

    fn accounts_by_user_provider(
        &self,
        user_id: UserId,
        provider: &str,
    ) -> impl Future<Output = Result<Vec<Account>>> + Send {
        let inner = Arc::clone(&self.inner);
        let provider = provider.to_string();
        async move {
            Ok(Self::lock(&inner)?
                .accounts
                .values()
                .filter(|a| a.user_id == user_id && a.provider == provider)
                .cloned()
                .collect())
        }
    }

    fn update_account(&self, account: Account) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.accounts.insert(account.id, account);
            Ok(())
        }
    }

    fn delete_account(&self, id: AccountId) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.accounts.remove(&id);
            Ok(())
        }
    }

    // ── Sessions ───────────────────────────────────────────────────────

    fn insert_session(&self, session: Session) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.sessions.insert(session.id, session);
            Ok(())
        }
    }

    fn session(&self, id: SessionId) -> impl Future<Output = Result<Option<Session>>> + Send {
        let inner = Arc::clone(&self.inner);
        async move { Ok(Self::lock(&inner)?.sessions.get(&id).cloned()) }
    }

    fn sessions_by_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<Session>>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Ok(Self::lock(&inner)?
                .sessions
                .values()
                .filter(|s| s.user_id == user_id)
                .cloned()
                .collect())
        }
    }

    fn delete_session(&self, id: SessionId) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.sessions.remove(&id);
            Ok(())
        }
    }

    // ── Refresh tokens ─────────────────────────────────────────────────

    fn insert_refresh_token(
        &self,
        token: RefreshToken,
    ) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.refresh_tokens.insert(token.id, token);
            Ok(())
        }
    }

    fn refresh_token(
        &self,
        id: RefreshTokenId,
    ) -> impl Future<Output = Result<Option<RefreshToken>>> + Send {
        let inner = Arc::clone(&self.inner);
        async move { Ok(Self::lock(&inner)?.refresh_tokens.get(&id).cloned()) }
    }

    fn update_refresh_token(
        &self,
        token: RefreshToken,
    ) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.refresh_tokens.insert(token.id, token);
            Ok(())
        }
    }

    fn refresh_token_children(
        &self,
        session_id: SessionId,
        parent: Option<RefreshTokenId>,
    ) -> impl Future<Output = Result<Vec<RefreshToken>>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Ok(Self::lock(&inner)?
                .refresh_tokens
                .values()
                .filter(|t| t.session_id == session_id && t.parent_id == parent)
                .cloned()
                .collect())
        }
    }

    fn refresh_tokens_by_session(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Vec<RefreshToken>>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Ok(Self::lock(&inner)?
                .refresh_tokens
                .values()
                .filter(|t| t.session_id == session_id)
                .cloned()
                .collect())
        }
    }

    fn delete_refresh_tokens(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?
                .refresh_tokens
                .retain(|_, t| t.session_id != session_id);
            Ok(())
        }
    }

    fn active_refresh_token(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Option<RefreshToken>>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Ok(Self::lock(&inner)?
                .refresh_tokens
                .values()
                .find(|t| t.session_id == session_id && t.first_used_time.is_none())
                .cloned())
        }
    }

    // ── Verification codes ─────────────────────────────────────────────

    fn insert_verification_code(
        &self,
        code: VerificationCode,
    ) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            let mut tables = Self::lock(&inner)?;
            // One live code per account: replace any previous one.
            tables
                .verification_codes
                .retain(|_, c| c.account_id != code.account_id);
            tables.verification_codes.insert(code.id, code);
            Ok(())
        }
    }

    fn verification_code_by_account(
        &self,
        account_id: AccountId,
    ) -> impl Future<Output = Result<Option<VerificationCode>>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Ok(Self::lock(&inner)?
                .verification_codes
                .values()
                .find(|c| c.account_id == account_id)
                .cloned())
        }
    }

    fn verification_code_by_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Option<VerificationCode>>> + Send {
        let inner = Arc::clone(&self.inner);
        let code = code.to_string();
        async move {
            Ok(Self::lock(&inner)?
                .verification_codes
                .values()
                .find(|c| c.code == code)
                .cloned())
        }
    }

    fn delete_verification_code(
        &self,
        id: VerificationCodeId,
    ) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.verification_codes.remove(&id);
            Ok(())
        }
    }

    // ── Verifiers ──────────────────────────────────────────────────────

    fn insert_verifier(&self, verifier: Verifier) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.verifiers.insert(verifier.id, verifier);
            Ok(())
        }
    }

    fn verifier(&self, id: VerifierId) -> impl Future<Output = Result<Option<Verifier>>> + Send {
        let inner = Arc::clone(&self.inner);
        async move { Ok(Self::lock(&inner)?.verifiers.get(&id).cloned()) }
    }

    fn verifier_by_signature(
        &self,
        signature: &str,
    ) -> impl Future<Output = Result<Option<Verifier>>> + Send {
        let inner = Arc::clone(&self.inner);
        let signature = signature.to_string();
        async move {
            Ok(Self::lock(&inner)?
                .verifiers
                .values()
                .find(|v| v.signature.as_deref() == Some(signature.as_str()))
                .cloned())
        }
    }

    fn update_verifier(&self, verifier: Verifier) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.verifiers.insert(verifier.id, verifier);
            Ok(())
        }
    }

    fn delete_verifier(&self, id: VerifierId) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.verifiers.remove(&id);
            Ok(())
        }
    }

    // ── Rate limits ────────────────────────────────────────────────────

    fn rate_limit(
        &self,
        identifier: &str,
    ) -> impl Future<Output = Result<Option<RateLimitBucket>>> + Send {
        let inner = Arc::clone(&self.inner);
        let identifier = identifier.to_string();
        async move { Ok(Self::lock(&inner)?.rate_limits.get(&identifier).cloned()) }
    }

    fn put_rate_limit(
        &self,
        bucket: RateLimitBucket,
    ) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?
                .rate_limits
                .insert(bucket.identifier.clone(), bucket);
            Ok(())
        }
    }

    fn delete_rate_limit(&self, identifier: &str) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        let identifier = identifier.to_string();
        async move {
            Self::lock(&inner)?.rate_limits.remove(&identifier);
            Ok(())
        }
    }

    // ── API keys ───────────────────────────────────────────────────────

    fn insert_api_key(&self, key: ApiKey) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.api_keys.insert(key.id, key);
            Ok(())
        }
    }

    fn api_key(&self, id: ApiKeyId) -> impl Future<Output = Result<Option<ApiKey>>> + Send {
        let inner = Arc::clone(&self.inner);
        async move { Ok(Self::lock(&inner)?.api_keys.get(&id).cloned()) }
    }

    fn api_key_by_hash(
        &self,
        hashed_key: &str,
    ) -> impl Future<Output = Result<Option<ApiKey>>> + Send {
        let inner = Arc::clone(&self.inner);
        let hashed_key = hashed_key.to_string();
        async move {
            Ok(Self::lock(&inner)?
                .api_keys
                .values()
                .find(|k| k.hashed_key == hashed_key)
                .cloned())
        }
    }

    fn api_keys_by_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<ApiKey>>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Ok(Self::lock(&inner)?
                .api_keys
                .values()
                .filter(|k| k.user_id == user_id)
                .cloned()
                .collect())
        }
    }

    fn update_api_key(&self, key: ApiKey) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.api_keys.insert(key.id, key);
            Ok(())
        }
    }

    fn delete_api_key(&self, id: ApiKeyId) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.api_keys.remove(&id);
            Ok(())
        }
    }

    // ── Passkeys ───────────────────────────────────────────────────────

    fn insert_passkey(&self, passkey: Passkey) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.passkeys.insert(passkey.id, passkey);
            Ok(())
        }
    }

    fn passkey_by_credential(
        &self,
        credential_id: &str,
    ) -> impl Future<Output = Result<Option<Passkey>>> + Send {
        let inner = Arc::clone(&self.inner);
        let credential_id = credential_id.to_string();
        async move {
            Ok(Self::lock(&inner)?
                .passkeys
                .values()
                .find(|p| p.credential_id == credential_id)
                .cloned())
        }
    }

    fn passkeys_by_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<Passkey>>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Ok(Self::lock(&inner)?
                .passkeys
                .values()
                .filter(|p| p.user_id == user_id)
                .cloned()
                .collect())
        }
    }

    fn update_passkey(&self, passkey: Passkey) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.passkeys.insert(passkey.id, passkey);
            Ok(())
        }
    }

    fn delete_passkey(&self, id: PasskeyId) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.passkeys.remove(&id);
            Ok(())
        }
    }

    // ── TOTP ───────────────────────────────────────────────────────────

    fn insert_totp(&self, totp: TotpCredential) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.totps.insert(totp.id, totp);
            Ok(())
        }
    }

    fn totp(&self, id: TotpId) -> impl Future<Output = Result<Option<TotpCredential>>> + Send {
        let inner = Arc::clone(&self.inner);
        async move { Ok(Self::lock(&inner)?.totps.get(&id).cloned()) }
    }

    fn totps_by_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<TotpCredential>>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Ok(Self::lock(&inner)?
                .totps
                .values()
                .filter(|t| t.user_id == user_id)
                .cloned()
                .collect())
        }
    }

    fn update_totp(&self, totp: TotpCredential) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.totps.insert(totp.id, totp);
            Ok(())
        }
    }

    fn delete_totp(&self, id: TotpId) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.totps.remove(&id);
            Ok(())
        }
    }

    // ── Device authorizations ──────────────────────────────────────────

    fn insert_device_auth(
        &self,
        device: DeviceAuthorization,
    ) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.device_auths.insert(device.id, device);
            Ok(())
        }
    }

    fn device_auth_by_code_hash(
        &self,
        device_code_hash: &str,
    ) -> impl Future<Output = Result<Option<DeviceAuthorization>>> + Send {
        let inner = Arc::clone(&self.inner);
        let device_code_hash = device_code_hash.to_string();
        async move {
            Ok(Self::lock(&inner)?
                .device_auths
                .values()
                .find(|d| d.device_code_hash == device_code_hash)
                .cloned())
        }
    }

    fn device_auth_by_user_code(
        &self,
        user_code: &str,
    ) -> impl Future<Output = Result<Option<DeviceAuthorization>>> + Send {
        let inner = Arc::clone(&self.inner);
        let user_code = user_code.to_string();
        async move {
            Ok(Self::lock(&inner)?
                .device_auths
                .values()
                .find(|d| d.user_code == user_code)
                .cloned())
        }
    }

    fn update_device_auth(
        &self,
        device: DeviceAuthorization,
    ) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.device_auths.insert(device.id, device);
            Ok(())
        }
    }

    fn delete_device_auth(&self, id: DeviceAuthId) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            Self::lock(&inner)?.device_auths.remove(&id);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn verified_email_lookup_ignores_unverified() {
        let store = MemoryStore::new();
        let mut user = User::new(Utc::now());
        user.email = Some("a@example.com".into());
        store.insert_user(user.clone()).await.unwrap();

        assert!(store
            .find_user_by_verified_email("a@example.com")
            .await
            .unwrap()
            .is_none());

        user.email_verification_time = Some(Utc::now());
        store.update_user(user.clone()).await.unwrap();
        assert_eq!(
            store
                .find_user_by_verified_email("a@example.com")
                .await
                .unwrap()
                .map(|u| u.id),
            Some(user.id)
        );
    }

    #[tokio::test]
    async fn inserting_a_code_replaces_the_previous_one_for_the_account() {
        let store = MemoryStore::new();
        let account_id = AccountId::new();
        let now = Utc::now();
        let code = |value: &str| VerificationCode {
            id: crate::state::VerificationCodeId::new(),
            account_id,
            provider: "email".into(),
            code: value.into(),
            expiration_time: now + chrono::Duration::minutes(5),
            verifier: None,
            email_verified: Some(true),
            phone_verified: None,
            created_at: now,
        };

        store.insert_verification_code(code("first")).await.unwrap();
        store.insert_verification_code(code("second")).await.unwrap();

        assert!(store
            .verification_code_by_code("first")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .verification_code_by_code("second")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn refresh_token_sweep_is_scoped_to_the_session() {
        let store = MemoryStore::new();
        let keep = SessionId::new();
        let sweep = SessionId::new();
        let now = Utc::now();
        for session_id in [keep, sweep] {
            store
                .insert_refresh_token(RefreshToken {
                    id: RefreshTokenId::new(),
                    session_id,
                    expiration_time: now + chrono::Duration::days(30),
                    first_used_time: None,
                    parent_id: None,
                    created_at: now,
                })
                .await
                .unwrap();
        }

        store.delete_refresh_tokens(sweep).await.unwrap();
        assert!(store.refresh_tokens_by_session(sweep).await.unwrap().is_empty());
        assert_eq!(store.refresh_tokens_by_session(keep).await.unwrap().len(), 1);
    }
}
