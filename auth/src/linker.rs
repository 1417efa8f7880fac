//! User/account linker.
//!
//! Idempotently resolves "account identified by `(provider,
//! providerAccountId)`" to a user, honoring the verified-email /
//! verified-phone linking policy. Hosts may replace the resolution with the
//! `create_or_update_user` callback; the default order is:
//!
//! 1. An existing account row wins.
//! 2. Link by verified email when the policy allows it.
//! 3. Link by verified phone when the policy allows it.
//! 4. Link by a unique unverified match; two conflicting matches mean a new
//!    user (never silently merge two distinct identities).
//! 5. Insert a new user.

use crate::error::Result;
use crate::providers::Provider;
use crate::state::AccountId;
use crate::store::records::{Account, User};
use crate::store::AuthStore;
use crate::Auth;
use chrono::Utc;

/// Provider-agnostic profile the linker patches onto the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    /// Email address.
    pub email: Option<String>,

    /// Whether email ownership is proven for this sign-in.
    pub email_verified: bool,

    /// Phone number.
    pub phone: Option<String>,

    /// Whether phone ownership is proven for this sign-in.
    pub phone_verified: bool,

    /// Display name.
    pub name: Option<String>,

    /// Avatar URL.
    pub image: Option<String>,
}

/// The account the linker should resolve: an already-loaded row, or the
/// key of a row that may not exist yet.
#[derive(Debug, Clone)]
pub enum AccountRef {
    /// The account row already exists.
    Existing(Account),

    /// Create-or-load by `(provider, provider_account_id)`.
    Key {
        /// Identifier within the provider.
        provider_account_id: String,
    },
}

/// Linking policy and profile for one upsert.
pub struct LinkAttrs<'a> {
    /// The provider the sign-in ran under.
    pub provider: &'a Provider,

    /// Profile to patch onto the user.
    pub profile: Profile,

    /// Force linking by email regardless of verification.
    pub should_link_via_email: bool,

    /// Force linking by phone regardless of verification.
    pub should_link_via_phone: bool,
}

impl<S: AuthStore> Auth<S> {
    /// Resolve the user for an account and commit both rows.
    ///
    /// # Errors
    ///
    /// Returns storage errors and callback errors verbatim.
    pub(crate) async fn upsert_user_and_account(
        &self,
        account: AccountRef,
        attrs: LinkAttrs<'_>,
    ) -> Result<(User, Account)> {
        let now = Utc::now();
        let provider_id = attrs.provider.id().to_string();

        let existing = match &account {
            AccountRef::Existing(row) => Some(row.clone()),
            AccountRef::Key {
                provider_account_id,
            } => {
                self.store
                    .account_by_provider(&provider_id, provider_account_id)
                    .await?
            }
        };

        let user_id = if let Some(hook) = &self.config.callbacks.create_or_update_user {
            hook.create_or_update(
                existing.as_ref().map(|a| a.user_id),
                &provider_id,
                &attrs.profile,
            )
            .await?
        } else {
            self.resolve_user(existing.as_ref(), &attrs).await?
        };

        // Patch the user row with the profile.
        let mut user = match self.store.user(user_id).await? {
            Some(user) => user,
            None => {
                let mut user = User::new(now);
                user.id = user_id;
                self.store.insert_user(user.clone()).await?;
                user
            }
        };
        if let Some(email) = &attrs.profile.email {
            user.email = Some(email.clone());
            if attrs.profile.email_verified {
                user.email_verification_time = Some(now);
            }
        }
        if let Some(phone) = &attrs.profile.phone {
            user.phone = Some(phone.clone());
            if attrs.profile.phone_verified {
                user.phone_verification_time = Some(now);
            }
        }
        if let Some(name) = &attrs.profile.name {
            user.name = Some(name.clone());
        }
        if let Some(image) = &attrs.profile.image {
            user.image = Some(image.clone());
        }
        self.store.update_user(user.clone()).await?;

        // Create or update the account row.
        let account = if let Some(mut row) = existing {
            row.user_id = user_id;
            if attrs.profile.email_verified {
                row.email_verified = Some(true);
            }
            if attrs.profile.phone_verified {
                row.phone_verified = Some(true);
            }
            self.store.update_account(row.clone()).await?;
            row
        } else {
            let AccountRef::Key {
                provider_account_id,
            } = account
            else {
                // Existing variant always yields a row above.
                return Err(crate::AuthError::Internal("account ref mismatch".into()));
            };
            let row = Account {
                id: AccountId::new(),
                user_id,
                provider: provider_id,
                provider_account_id,
                secret: None,
                email_verified: attrs.profile.email_verified.then_some(true),
                phone_verified: attrs.profile.phone_verified.then_some(true),
                created_at: now,
            };
            self.store.insert_account(row.clone()).await?;
            row
        };

        if let Some(hook) = &self.config.callbacks.after_user_created_or_updated {
            hook.after(user_id, &attrs.profile).await?;
        }

        Ok((user, account))
    }

    /// Default resolution steps 1-5.
    async fn resolve_user(
        &self,
        existing: Option<&Account>,
        attrs: &LinkAttrs<'_>,
    ) -> Result<crate::state::UserId> {
        // Step 1: an existing account row wins — unless this sign-in proves
        // an email/phone another user already verified, in which case the
        // account moves there to preserve verified-identity uniqueness.
        if let Some(account) = existing {
            if attrs.profile.email_verified {
                if let Some(email) = &attrs.profile.email {
                    if let Some(holder) = self.store.find_user_by_verified_email(email).await? {
                        if holder.id != account.user_id {
                            tracing::debug!(
                                account_id = %account.id,
                                user_id = %holder.id,
                                "relinking account to the verified email holder"
                            );
                            return Ok(holder.id);
                        }
                    }
                }
            }
            if attrs.profile.phone_verified {
                if let Some(phone) = &attrs.profile.phone {
                    if let Some(holder) = self.store.find_user_by_verified_phone(phone).await? {
                        if holder.id != account.user_id {
                            return Ok(holder.id);
                        }
                    }
                }
            }
            return Ok(account.user_id);
        }

        let may_link_email = attrs.should_link_via_email
            || attrs.profile.email_verified
            || attrs.provider.is_email_provider()
            || matches!(
                attrs.provider,
                Provider::OAuth(c) if c.allow_dangerous_email_account_linking
            );
        let may_link_phone = attrs.should_link_via_phone
            || attrs.profile.phone_verified
            || attrs.provider.is_phone_provider();

        // Steps 2-4: look up the unique verified holders the policy allows,
        // then reconcile. A conflict creates a new user rather than merging
        // two distinct verified identities.
        let email_match = match (&attrs.profile.email, may_link_email) {
            (Some(email), true) => self.store.find_user_by_verified_email(email).await?,
            _ => None,
        };
        let phone_match = match (&attrs.profile.phone, may_link_phone) {
            (Some(phone), true) => self.store.find_user_by_verified_phone(phone).await?,
            _ => None,
        };
        match (email_match, phone_match) {
            (Some(by_email), Some(by_phone)) => {
                if by_email.id == by_phone.id {
                    return Ok(by_email.id);
                }
                tracing::debug!(
                    email_user = %by_email.id,
                    phone_user = %by_phone.id,
                    "email and phone verify to different users, creating a new user"
                );
            }
            (Some(user), None) | (None, Some(user)) => return Ok(user.id),
            (None, None) => {}
        }

        // Step 5: new user.
        let user = User::new(Utc::now());
        let id = user.id;
        self.store.insert_user(user).await?;
        Ok(id)
    }
}
