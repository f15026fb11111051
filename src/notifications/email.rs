//! SMTP delivery for account emails.

use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{Mailer, OutgoingEmail};
use crate::config::EmailConfig;

/// Sends mail through the relay in `[email]`
pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Check if email sending is configured
    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    fn transport(&self, smtp_host: &str) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
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

        Ok(mailer.build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        if !self.is_enabled() {
            anyhow::bail!("SMTP is not configured");
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
        let to: Mailbox = email.to.parse()?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.as_str())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html_body),
                    ),
            )?;

        self.transport(smtp_host)?.send(message).await?;

        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "Email sent successfully"
        );

        Ok(())
    }
}

pub fn render_reset_html(reset_url: &str, ttl_minutes: i64) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Password Recovery</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif;
            margin: 0;
            padding: 0;
            background-color: #f5f5f5;
        }}
        .container {{
            max-width: 560px;
            margin: 0 auto;
            padding: 40px 20px;
        }}
        .card {{
            background-color: #ffffff;
            border-radius: 8px;
            padding: 32px 24px;
        }}
        .card p {{
            margin: 0 0 16px;
            color: #374151;
            line-height: 1.6;
        }}
        .button {{
            display: inline-block;
            background-color: #febd69;
            color: #232f3e !important;
            text-decoration: none;
            padding: 14px 32px;
            border-radius: 6px;
            font-weight: 600;
        }}
        .note {{
            color: #6b7280;
            font-size: 13px;
        }}
    </style>
</head>
<body>
    <div class="container">
        <div class="card">
            <p>Your password reset link is below.</p>
            <p><a href="{reset_url}" class="button">Reset Password</a></p>
            <p class="note">The link expires in {ttl_minutes} minutes. If you have not requested this email, you can ignore it.</p>
        </div>
    </div>
</body>
</html>"#,
        reset_url = html_escape(reset_url),
        ttl_minutes = ttl_minutes,
    )
}

pub fn render_reset_text(reset_url: &str, ttl_minutes: i64) -> String {
    format!(
        "Your password reset link is as follows:\n\n{reset_url}\n\n\
         The link expires in {ttl_minutes} minutes. If you have not requested this email, you can ignore it."
    )
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
