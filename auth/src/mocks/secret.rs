//! Mock secret hasher: deterministic and fast, for tests only.

use crate::error::Result;
use crate::providers::secret::SecretHasher;
use crate::utils::sha256_hex;
use crate::BoxFuture;
use constant_time_eq::constant_time_eq;

/// SHA-256-based [`SecretHasher`]; runs at memory speed so rate-limit tests
/// can hammer it.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockSecretHasher;

impl MockSecretHasher {
    /// Create the mock hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SecretHasher for MockSecretHasher {
    fn hash_secret<'a>(&'a self, secret: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { Ok(format!("mock${}", sha256_hex(secret.as_bytes()))) })
    }

    fn verify_secret<'a>(
        &'a self,
        secret: &'a str,
        hash: &'a str,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let expected = format!("mock${}", sha256_hex(secret.as_bytes()));
            Ok(constant_time_eq(expected.as_bytes(), hash.as_bytes()))
        })
    }
}
