//! Email and SMS delivery seams.
//!
//! The core never talks to a mail server directly; it hands the message to
//! one of these traits. Implementations ship for the console (development)
//! and SMTP (production); hosts may bring their own.
//!
//! # Dyn Compatibility
//!
//! These traits use explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` so they can ride inside the `Provider` enum as trait objects.

use crate::error::Result;
use crate::BoxFuture;
use chrono::{DateTime, Utc};

/// Outgoing verification request for an email identifier.
#[derive(Debug, Clone)]
pub struct VerificationEmail<'a> {
    /// Recipient address.
    pub to: &'a str,

    /// Sender address.
    pub from: &'a str,

    /// The one-time code, as the user will type or click it.
    pub code: &'a str,

    /// Magic-link URL embedding the code.
    pub url: &'a str,

    /// When the code stops working.
    pub expires_at: DateTime<Utc>,
}

/// Email transport.
pub trait EmailSender: Send + Sync {
    /// Deliver a verification request.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the message; the enclosing
    /// sign-in aborts and no verification code is persisted.
    fn send_verification<'a>(
        &'a self,
        message: VerificationEmail<'a>,
    ) -> BoxFuture<'a, Result<()>>;
}

/// SMS transport for phone OTPs.
pub trait SmsSender: Send + Sync {
    /// Deliver a one-time code to a phone number.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the message.
    fn send_code<'a>(
        &'a self,
        to: &'a str,
        code: &'a str,
        expires_at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<()>>;
}
