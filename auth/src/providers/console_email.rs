//! Console email sender for development.

use crate::error::Result;
use crate::providers::email::{EmailSender, VerificationEmail};
use crate::BoxFuture;
use chrono::Utc;
use tracing::info;

/// Logs verification emails instead of delivering them.
#[derive(Clone, Debug, Default)]
pub struct ConsoleEmailSender;

impl ConsoleEmailSender {
    /// Create a new console sender.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EmailSender for ConsoleEmailSender {
    fn send_verification<'a>(
        &'a self,
        message: VerificationEmail<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let expires_minutes = (message.expires_at - Utc::now()).num_minutes();
            info!(
                to = %message.to,
                code = %message.code,
                url = %message.url,
                expires_in_minutes = expires_minutes,
                "verification email (console mode)"
            );
            Ok(())
        })
    }
}
