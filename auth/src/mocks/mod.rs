//! Mock collaborators for tests.
//!
//! In-memory, deterministic implementations of the provider seams. Compiled
//! behind the `test-utils` feature (on by default) so downstream test
//! suites can drive full ceremonies at memory speed.

pub mod email;
pub mod oauth;
pub mod passkey;
pub mod secret;

pub use email::{MockEmailSender, MockSmsSender, SentMessage};
pub use oauth::MockOAuthClient;
pub use passkey::MockPasskeyCrypto;
pub use secret::MockSecretHasher;
