//! Secret hashing seam for the credentials provider.
//!
//! The credentials provider carries its hashing functions rather than the
//! core choosing an algorithm. A provider configured without one fails with
//! `MISSING_CRYPTO_FUNCTION` when a password flow is attempted.

use crate::error::{AuthError, Result};
use crate::BoxFuture;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

/// Hash-and-verify pair for credentials secrets.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so it can ride inside the
/// `Provider` enum as a trait object.
pub trait SecretHasher: Send + Sync {
    /// Hash a raw secret for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing fails.
    fn hash_secret<'a>(&'a self, secret: &'a str) -> BoxFuture<'a, Result<String>>;

    /// Verify a raw secret against a stored hash.
    ///
    /// # Errors
    ///
    /// Returns an error on internal failure; a simple mismatch is `Ok(false)`.
    fn verify_secret<'a>(&'a self, secret: &'a str, hash: &'a str)
        -> BoxFuture<'a, Result<bool>>;
}

/// Argon2id-backed [`SecretHasher`] in PHC string format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2SecretHasher;

impl Argon2SecretHasher {
    /// Create the default hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SecretHasher for Argon2SecretHasher {
    fn hash_secret<'a>(&'a self, secret: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::default()
                .hash_password(secret.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AuthError::Internal(format!("argon2 hash failed: {e}")))
        })
    }

    fn verify_secret<'a>(
        &'a self,
        secret: &'a str,
        hash: &'a str,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let parsed = PasswordHash::new(hash)
                .map_err(|e| AuthError::Internal(format!("stored hash is malformed: {e}")))?;
            Ok(Argon2::default()
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok())
        })
    }
}
