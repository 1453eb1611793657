//! Outbound email: registration confirmations and password resets.
//!
//! All sends are best-effort. Callers spawn them off the request path and
//! log failures; a broken SMTP relay never fails an HTTP response.

use anyhow::Result;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::EmailConfig;
use crate::db::Event;

/// SMTP mail service built from the `[email]` config section.
pub struct Mailer {
    config: EmailConfig,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    /// Confirmation sent to a registrant after a successful registration.
    pub async fn send_registration_confirmation(
        &self,
        to_email: &str,
        event: &Event,
        slot_start: &str,
    ) -> Result<()> {
        let subject = format!("Registration Confirmed: {}", event.title);
        let body = format!(
            "You have successfully registered for {}.\nLocation: {}\nDate: {}\n\nSee you there!",
            event.title,
            event.location_name.as_deref().unwrap_or("TBA"),
            slot_start,
        );
        self.send(to_email, &subject, &body).await
    }

    /// Password reset token email.
    pub async fn send_password_reset(&self, to_email: &str, token: &str) -> Result<()> {
        let subject = "Password Reset Request".to_string();
        let body = format!(
            "A password reset was requested for your account.\n\nReset token: {}\n\nThe token expires in one hour. If you did not request this, ignore this email.",
            token,
        );
        self.send(to_email, &subject, &body).await
    }

    async fn send(&self, to_email: &str, subject: &str, body: &str) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!("Email not configured, skipping email to {}", to_email);
            return Ok(());
        }

        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from: Mailbox = format!("{} <{}>", self.config.from_name, from_address).parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;
        tracing::info!(to = %to_email, subject = %subject, "Email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_mailer_is_a_no_op() {
        let mailer = Mailer::new(EmailConfig::default());
        assert!(!mailer.is_enabled());
        // Must not error when SMTP is not set up
        mailer
            .send_password_reset("user@example.com", "token")
            .await
            .unwrap();
    }
}
