//! SMTP email sender.

use crate::error::{AuthError, Result};
use crate::providers::email::{EmailSender, VerificationEmail};
use crate::BoxFuture;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Delivers verification emails over SMTP.
#[derive(Clone)]
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailSender {
    /// Connect to an SMTP relay with STARTTLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay host is invalid.
    pub fn new(host: &str, username: String, password: String) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| AuthError::Internal(format!("smtp relay setup failed: {e}")))?
            .credentials(Credentials::new(username, password))
            .build();
        Ok(Self { transport })
    }

    fn render(message: &VerificationEmail<'_>) -> String {
        format!(
            "Your sign-in code is {code}.\n\nOr follow this link: {url}\n\nThe code expires at {expires}.\n",
            code = message.code,
            url = message.url,
            expires = message.expires_at.to_rfc3339(),
        )
    }
}

impl EmailSender for SmtpEmailSender {
    fn send_verification<'a>(
        &'a self,
        message: VerificationEmail<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let email = Message::builder()
                .from(
                    message
                        .from
                        .parse()
                        .map_err(|e| AuthError::Internal(format!("bad from address: {e}")))?,
                )
                .to(message
                    .to
                    .parse()
                    .map_err(|e| AuthError::Internal(format!("bad to address: {e}")))?)
                .subject("Your sign-in code")
                .header(ContentType::TEXT_PLAIN)
                .body(Self::render(&message))
                .map_err(|e| AuthError::Internal(format!("message build failed: {e}")))?;

            self.transport.send(email).await.map_err(|e| {
                tracing::error!(error = %e, "verification email delivery failed");
                AuthError::Internal("email delivery failed".into())
            })?;
            Ok(())
        })
    }
}
