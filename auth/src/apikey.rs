//! API-key issuance and verification.
//!
//! Raw keys are `{prefix}{32 alphanumeric}`; only their SHA-256 is
//! persisted, and every lookup goes through the hash. Scope grants are
//! validated against the configured allow-list at creation time and checked
//! per request by [`KeyContext::can`]. The token-bucket primitive from
//! [`crate::rate_limit`] backs optional per-key limits.

use crate::constants;
use crate::error::{AuthError, Result};
use crate::rate_limit;
use crate::state::{ApiKeyId, UserId};
use crate::store::records::{ApiKey, ApiKeyRateLimit, ApiKeyScope};
use crate::store::AuthStore;
use crate::utils::{random_alphanumeric, sha256_hex};
use crate::Auth;
use chrono::{DateTime, Duration, Utc};

/// Inputs for [`Auth::create_api_key`].
#[derive(Debug, Clone)]
pub struct CreateApiKey {
    /// Owning user.
    pub user_id: UserId,

    /// Human-assigned name.
    pub name: String,

    /// Scope grants.
    pub scopes: Vec<ApiKeyScope>,

    /// Per-key rate limit; falls back to the configured default.
    pub rate_limit: Option<ApiKeyRateLimit>,

    /// Optional absolute expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

/// A freshly created key. The raw value exists only here.
#[derive(Debug, Clone)]
pub struct CreatedApiKey {
    /// Row id.
    pub key_id: ApiKeyId,

    /// The raw key, shown once.
    pub raw: String,
}

/// Verified caller identity injected into Bearer handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyContext {
    /// Owning user.
    pub user_id: UserId,

    /// The key row.
    pub key_id: ApiKeyId,

    /// Scope grants.
    pub scopes: Vec<ApiKeyScope>,
}

impl KeyContext {
    /// Whether the key covers `(resource, action)`.
    #[must_use]
    pub fn can(&self, resource: &str, action: &str) -> bool {
        self.scopes.iter().any(|scope| {
            (scope.resource == resource || scope.resource == "*")
                && scope
                    .actions
                    .iter()
                    .any(|a| a == action || a == "*")
        })
    }
}

/// Fields [`Auth::update_api_key`] may change.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyUpdate {
    /// New name.
    pub name: Option<String>,

    /// New scope grants (validated against the allow-list).
    pub scopes: Option<Vec<ApiKeyScope>>,

    /// New rate limit.
    pub rate_limit: Option<ApiKeyRateLimit>,

    /// New expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

impl<S: AuthStore> Auth<S> {
    /// Mint a key. The raw value is returned once and never persisted.
    ///
    /// # Errors
    ///
    /// Returns `API_KEY_INVALID_SCOPE` if the requested scopes are outside
    /// the configured allow-list.
    pub async fn create_api_key(&self, request: CreateApiKey) -> Result<CreatedApiKey> {
        self.validate_scopes(&request.scopes)?;

        let random = random_alphanumeric(constants::API_KEY_RANDOM_LEN);
        let raw = format!("{}{}", self.config.api_keys.prefix, random);
        let display_prefix = format!("{}{}...", self.config.api_keys.prefix, &random[..4]);

        let key = ApiKey {
            id: ApiKeyId::new(),
            user_id: request.user_id,
            prefix: display_prefix,
            hashed_key: sha256_hex(raw.as_bytes()),
            name: request.name,
            scopes: request.scopes,
            rate_limit: request
                .rate_limit
                .or(self.config.api_keys.default_rate_limit),
            rate_limit_state: None,
            expires_at: request.expires_at,
            last_used_at: None,
            revoked: false,
            created_at: Utc::now(),
        };
        let key_id = key.id;
        self.store.insert_api_key(key).await?;
        tracing::debug!(user_id = %request.user_id, key_id = %key_id, "api key created");

        Ok(CreatedApiKey { key_id, raw })
    }

    /// Verify a raw key and charge its bucket.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_API_KEY`, `API_KEY_REVOKED`, `API_KEY_EXPIRED`, or
    /// `API_KEY_RATE_LIMITED`.
    pub async fn verify_api_key(&self, raw: &str) -> Result<KeyContext> {
        let hashed = sha256_hex(raw.as_bytes());
        let Some(mut key) = self.store.api_key_by_hash(&hashed).await? else {
            return Err(AuthError::InvalidApiKey);
        };
        if key.revoked {
            return Err(AuthError::ApiKeyRevoked);
        }
        let now = Utc::now();
        if key.expires_at.is_some_and(|at| at <= now) {
            return Err(AuthError::ApiKeyExpired);
        }

        if let Some(limit) = key.rate_limit {
            let decision = rate_limit::check(
                &key.id.to_string(),
                key.rate_limit_state.as_ref(),
                limit.max_requests,
                Duration::milliseconds(limit.window_ms),
                now,
            );
            if !decision.allowed {
                tracing::warn!(key_id = %key.id, "api key rate limited");
                key.rate_limit_state = Some(decision.new_state);
                self.store.update_api_key(key).await?;
                return Err(AuthError::ApiKeyRateLimited);
            }
            // Every verified request consumes one token; the new bucket and
            // last_used_at land in one mutation.
            key.rate_limit_state = Some(rate_limit::consume(&decision));
        }

        key.last_used_at = Some(now);
        let context = KeyContext {
            user_id: key.user_id,
            key_id: key.id,
            scopes: key.scopes.clone(),
        };
        self.store.update_api_key(key).await?;
        Ok(context)
    }

    /// List a user's keys.
    ///
    /// # Errors
    ///
    /// Returns storage errors verbatim.
    pub async fn list_api_keys(&self, user_id: UserId) -> Result<Vec<ApiKey>> {
        self.store.api_keys_by_user(user_id).await
    }

    /// Load one key.
    ///
    /// # Errors
    ///
    /// Returns storage errors verbatim.
    pub async fn get_api_key(&self, id: ApiKeyId) -> Result<Option<ApiKey>> {
        self.store.api_key(id).await
    }

    /// Update a key's mutable fields.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_API_KEY` for unknown ids and
    /// `API_KEY_INVALID_SCOPE` for disallowed scopes.
    pub async fn update_api_key(&self, id: ApiKeyId, update: ApiKeyUpdate) -> Result<()> {
        let Some(mut key) = self.store.api_key(id).await? else {
            return Err(AuthError::InvalidApiKey);
        };
        if let Some(name) = update.name {
            key.name = name;
        }
        if let Some(scopes) = update.scopes {
            self.validate_scopes(&scopes)?;
            key.scopes = scopes;
        }
        if let Some(limit) = update.rate_limit {
            key.rate_limit = Some(limit);
        }
        if let Some(expires_at) = update.expires_at {
            key.expires_at = Some(expires_at);
        }
        self.store.update_api_key(key).await
    }

    /// Soft-revoke a key; it stays listed but stops verifying.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_API_KEY` for unknown ids.
    pub async fn revoke_api_key(&self, id: ApiKeyId) -> Result<()> {
        let Some(mut key) = self.store.api_key(id).await? else {
            return Err(AuthError::InvalidApiKey);
        };
        key.revoked = true;
        self.store.update_api_key(key).await
    }

    /// Hard-delete a key.
    ///
    /// # Errors
    ///
    /// Returns storage errors verbatim.
    pub async fn remove_api_key(&self, id: ApiKeyId) -> Result<()> {
        self.store.delete_api_key(id).await
    }

    fn validate_scopes(&self, scopes: &[ApiKeyScope]) -> Result<()> {
        let Some(allowed) = &self.config.api_keys.scopes else {
            return Ok(());
        };
        for scope in scopes {
            let Some(actions) = allowed.get(&scope.resource) else {
                return Err(AuthError::ApiKeyInvalidScope);
            };
            for action in &scope.actions {
                if action != "*" && !actions.contains(action) {
                    return Err(AuthError::ApiKeyInvalidScope);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(scopes: Vec<ApiKeyScope>) -> KeyContext {
        KeyContext {
            user_id: UserId::new(),
            key_id: ApiKeyId::new(),
            scopes,
        }
    }

    #[test]
    fn scope_check_matches_resource_and_action() {
        let ctx = context(vec![ApiKeyScope {
            resource: "users".into(),
            actions: vec!["read".into(), "list".into()],
        }]);
        assert!(ctx.can("users", "read"));
        assert!(ctx.can("users", "list"));
        assert!(!ctx.can("users", "write"));
        assert!(!ctx.can("posts", "read"));
    }

    #[test]
    fn scope_check_honors_wildcards() {
        let any_action = context(vec![ApiKeyScope {
            resource: "users".into(),
            actions: vec!["*".into()],
        }]);
        assert!(any_action.can("users", "write"));
        assert!(!any_action.can("posts", "read"));

        let any_resource = context(vec![ApiKeyScope {
            resource: "*".into(),
            actions: vec!["read".into()],
        }]);
        assert!(any_resource.can("users", "read"));
        assert!(any_resource.can("posts", "read"));
        assert!(!any_resource.can("posts", "write"));
    }

    #[test]
    fn empty_scopes_cover_nothing() {
        assert!(!context(Vec::new()).can("users", "read"));
    }
}
