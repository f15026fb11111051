//! Outbound email.
//!
//! Handlers depend on the `Mailer` trait so the SMTP relay can be swapped for
//! a recording implementation in tests.

mod email;

pub use email::{render_reset_html, render_reset_text, SmtpMailer};

use anyhow::Result;
use async_trait::async_trait;

/// A rendered message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

impl OutgoingEmail {
    /// Password recovery message carrying the reset link
    pub fn password_reset(to: &str, reset_url: &str, ttl_minutes: i64) -> Self {
        Self {
            to: to.to_string(),
            subject: "ShopIt Password Recovery".to_string(),
            html_body: render_reset_html(reset_url, ttl_minutes),
            text_body: render_reset_text(reset_url, ttl_minutes),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}
