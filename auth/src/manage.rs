//! Credential management for signed-in users.
//!
//! Hosts surface these behind their own authenticated endpoints: listing
//! and removing passkeys, TOTP credentials, and linked accounts.

use crate::error::{AuthError, Result};
use crate::state::{PasskeyId, SessionIdentity, TotpId, UserId};
use crate::store::records::{Account, Passkey, TotpCredential};
use crate::store::AuthStore;
use crate::Auth;

impl<S: AuthStore> Auth<S> {
    /// Enumerate a user's passkeys.
    ///
    /// # Errors
    ///
    /// Returns storage errors verbatim.
    pub async fn list_passkeys(&self, user_id: UserId) -> Result<Vec<Passkey>> {
        self.store.passkeys_by_user(user_id).await
    }

    /// Remove one of the caller's passkeys.
    ///
    /// # Errors
    ///
    /// Returns `PASSKEY_UNKNOWN_CREDENTIAL` if the id does not belong to
    /// the caller.
    pub async fn remove_passkey(&self, identity: SessionIdentity, id: PasskeyId) -> Result<()> {
        let owned = self
            .store
            .passkeys_by_user(identity.user_id)
            .await?
            .into_iter()
            .any(|p| p.id == id);
        if !owned {
            return Err(AuthError::PasskeyUnknownCredential);
        }
        self.store.delete_passkey(id).await
    }

    /// Enumerate a user's TOTP credentials.
    ///
    /// # Errors
    ///
    /// Returns storage errors verbatim.
    pub async fn list_totps(&self, user_id: UserId) -> Result<Vec<TotpCredential>> {
        self.store.totps_by_user(user_id).await
    }

    /// Remove one of the caller's TOTP credentials, verified or not.
    ///
    /// # Errors
    ///
    /// Returns `TOTP_NOT_FOUND` if the id does not belong to the caller.
    pub async fn remove_totp(&self, identity: SessionIdentity, id: TotpId) -> Result<()> {
        let owned = self
            .store
            .totps_by_user(identity.user_id)
            .await?
            .into_iter()
            .any(|t| t.id == id);
        if !owned {
            return Err(AuthError::TotpNotFound);
        }
        self.store.delete_totp(id).await
    }

    /// Enumerate a user's accounts under one provider.
    ///
    /// # Errors
    ///
    /// Returns storage errors verbatim.
    pub async fn list_accounts(&self, user_id: UserId, provider: &str) -> Result<Vec<Account>> {
        self.store.accounts_by_user_provider(user_id, provider).await
    }

    /// Unlink an account from the caller. Verification codes pointing at it
    /// die with it.
    ///
    /// # Errors
    ///
    /// Returns `ACCOUNT_NOT_FOUND` if the account does not belong to the
    /// caller.
    pub async fn unlink_account(
        &self,
        identity: SessionIdentity,
        account_id: crate::state::AccountId,
    ) -> Result<()> {
        let Some(account) = self.store.account(account_id).await? else {
            return Err(AuthError::AccountNotFound);
        };
        if account.user_id != identity.user_id {
            return Err(AuthError::AccountNotFound);
        }
        if let Some(code) = self.store.verification_code_by_account(account_id).await? {
            self.store.delete_verification_code(code.id).await?;
        }
        self.store.delete_account(account_id).await
    }
}
