//! # Gatehouse authentication runtime
//!
//! The core of a self-hostable identity service: issues, refreshes, and
//! validates user sessions, runs multi-phase sign-in ceremonies for several
//! credential types, and gates programmatic access through scoped API keys.
//!
//! ## Architecture
//!
//! Persistence is abstract: everything goes through [`store::AuthStore`],
//! and each core operation is designed to run inside one host transaction.
//! Sign-in methods are a tagged [`providers::Provider`] union; the
//! dispatcher in [`flows`] matches exhaustively and returns a
//! [`SignInOutcome`]. External collaborators (email transport, OAuth
//! provider SDK, WebAuthn crypto, secret hashing) are trait objects carried
//! by the provider configs.
//!
//! ## Example
//!
//! ```rust,ignore
//! use gatehouse_auth::{Auth, AuthConfig, JwtConfig, MemoryStore, SignInArgs};
//!
//! let config = AuthConfig::new(site_url, JwtConfig::new(private_key_pem, jwks))
//!     .with_provider(password_provider)
//!     .with_provider(google_provider);
//! let auth = Auth::new(config, MemoryStore::new())?;
//!
//! let outcome = auth.sign_in(SignInArgs::provider("google")).await?;
//! ```

pub mod apikey;
pub mod config;
pub mod constants;
pub mod error;
pub mod flows;
pub mod http;
pub mod linker;
pub mod manage;
pub mod providers;
pub mod rate_limit;
pub mod session;
pub mod state;
pub mod store;
pub mod tokens;
pub mod utils;

#[cfg(feature = "test-utils")]
pub mod mocks;

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by the dyn-compatible collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// Re-export main types for convenience
pub use config::{AuthConfig, Callbacks, JwtConfig, SessionConfig, SignInConfig};
pub use error::{AuthError, Result};
pub use flows::{SignInArgs, SignInOutcome};
pub use providers::Provider;
pub use state::{SessionIdentity, SessionId, TokenPair, UserId};
pub use store::{AuthStore, MemoryStore};

use store::records::Session;
use tokens::TokenCodec;

/// The authentication runtime.
///
/// Holds the configuration, the signing codec, and the storage handle. No
/// process-global state exists; hosts may run several instances side by
/// side.
pub struct Auth<S> {
    pub(crate) store: S,
    pub(crate) config: AuthConfig,
    pub(crate) codec: TokenCodec,
}

impl<S: AuthStore> Auth<S> {
    /// Build the runtime from a configuration and a storage backend.
    ///
    /// # Errors
    ///
    /// Returns `MISSING_ENV_VAR` for absent required values and
    /// `INTERNAL_ERROR` if the signing key cannot be parsed.
    pub fn new(config: AuthConfig, store: S) -> Result<Self> {
        config.validate()?;
        let codec = TokenCodec::new(&config.jwt, config.site_url.clone())?;
        Ok(Self {
            store,
            config,
            codec,
        })
    }

    /// The storage backend.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// The token codec (JWKS publication, refresh-token parsing).
    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Whether `identity` still names a live session for its user.
    ///
    /// # Errors
    ///
    /// Returns storage errors verbatim.
    pub(crate) async fn live_session(
        &self,
        identity: SessionIdentity,
    ) -> Result<Option<Session>> {
        let Some(session) = self.store.session(identity.session_id).await? else {
            return Ok(None);
        };
        if session.user_id != identity.user_id || session.expiration_time <= chrono::Utc::now() {
            return Ok(None);
        }
        Ok(Some(session))
    }
}
