//! Mock email and SMS transports that capture outgoing codes.

use crate::error::{AuthError, Result};
use crate::providers::email::{EmailSender, SmsSender, VerificationEmail};
use crate::BoxFuture;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// A captured outgoing message.
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// Recipient identifier.
    pub to: String,

    /// The delivered code.
    pub code: String,

    /// The delivered link, when one exists.
    pub url: Option<String>,

    /// Expiry communicated to the user.
    pub expires_at: DateTime<Utc>,
}

/// Email transport that records messages instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct MockEmailSender {
    sent: Arc<Mutex<Vec<SentMessage>>>,
}

impl MockEmailSender {
    /// Create an empty mock transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every captured message, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn sent(&self) -> Result<Vec<SentMessage>> {
        Ok(self
            .sent
            .lock()
            .map_err(|_| AuthError::Internal("mock mutex poisoned".into()))?
            .clone())
    }

    /// The code of the most recent message.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn last_code(&self) -> Result<Option<String>> {
        Ok(self.sent()?.last().map(|m| m.code.clone()))
    }
}

impl EmailSender for MockEmailSender {
    fn send_verification<'a>(
        &'a self,
        message: VerificationEmail<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.sent
                .lock()
                .map_err(|_| AuthError::Internal("mock mutex poisoned".into()))?
                .push(SentMessage {
                    to: message.to.to_string(),
                    code: message.code.to_string(),
                    url: Some(message.url.to_string()),
                    expires_at: message.expires_at,
                });
            Ok(())
        })
    }
}

/// SMS transport that records messages instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct MockSmsSender {
    sent: Arc<Mutex<Vec<SentMessage>>>,
}

impl MockSmsSender {
    /// Create an empty mock transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The code of the most recent message.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn last_code(&self) -> Result<Option<String>> {
        Ok(self
            .sent
            .lock()
            .map_err(|_| AuthError::Internal("mock mutex poisoned".into()))?
            .last()
            .map(|m| m.code.clone()))
    }
}

impl SmsSender for MockSmsSender {
    fn send_code<'a>(
        &'a self,
        to: &'a str,
        code: &'a str,
        expires_at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.sent
                .lock()
                .map_err(|_| AuthError::Internal("mock mutex poisoned".into()))?
                .push(SentMessage {
                    to: to.to_string(),
                    code: code.to_string(),
                    url: None,
                    expires_at,
                });
            Ok(())
        })
    }
}
