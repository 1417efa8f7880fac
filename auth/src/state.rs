//! Core identifier and token types.
//!
//! All persistent entities are addressed by opaque uuid newtypes. The
//! newtypes exist so a `SessionId` can never be passed where a `UserId` is
//! expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            /// Generate a new random id.
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Parse an id from its canonical string form.
            ///
            /// # Errors
            ///
            /// Returns `None` if the string is not a valid uuid.
            #[must_use]
            pub fn parse(s: &str) -> Option<Self> {
                uuid::Uuid::parse_str(s).ok().map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// Unique identifier for a user.
    UserId
);
id_type!(
    /// Unique identifier for a session.
    SessionId
);
id_type!(
    /// Unique identifier for an account row.
    AccountId
);
id_type!(
    /// Unique identifier for a refresh-token row.
    RefreshTokenId
);
id_type!(
    /// Unique identifier for a verification-code row.
    VerificationCodeId
);
id_type!(
    /// Unique identifier for a verifier row.
    VerifierId
);
id_type!(
    /// Unique identifier for an API key row.
    ApiKeyId
);
id_type!(
    /// Unique identifier for a passkey row.
    PasskeyId
);
id_type!(
    /// Unique identifier for a TOTP credential row.
    TotpId
);
id_type!(
    /// Unique identifier for a device-authorization row.
    DeviceAuthId
);

/// Access/refresh token pair returned by token issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived signed access JWT.
    pub access_token: String,

    /// Opaque rotating refresh token (`"<refreshTokenId>|<sessionId>"`).
    pub refresh_token: String,
}

/// Identity of the caller, derived by the host from a verified access token.
///
/// Flows that require a signed-in user (passkey registration, TOTP setup,
/// device approval) take this as input; the core never re-verifies its own
/// access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    /// The signed-in user.
    pub user_id: UserId,

    /// The session the access token was minted for.
    pub session_id: SessionId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(UserId::new(), UserId::new());
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn id_roundtrips_through_display() {
        let id = UserId::new();
        assert_eq!(UserId::parse(&id.to_string()), Some(id));
        assert_eq!(UserId::parse("not-a-uuid"), None);
    }
}
