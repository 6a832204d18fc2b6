//! Outbound email abstraction
//!
//! The platform sends transactional mail only (two-factor codes,
//! invitations, approval decisions) and always fire-and-forget: callers log
//! delivery failures and move on, they never propagate them.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::config::MailSettings;
use crate::{Error, Result};

/// Minimal syntactic email check used before sending anything: one `@`,
/// non-empty local part, and a dot somewhere in the domain.
pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
}

/// Trait for sending plain-text transactional emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send an email to a single recipient.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Development mailer that writes emails to the log instead of sending.
///
/// Used whenever no mail endpoint is configured, and in tests.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        info!(to, subject, body, "outbound email (log only)");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct MailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMailPayload {
    sender: MailAddress,
    to: Vec<MailAddress>,
    subject: String,
    text_content: String,
}

/// Mailer backed by an HTTP mail API (JSON POST with an `api-key` header).
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    sender_email: String,
    sender_name: Option<String>,
}

impl HttpMailer {
    /// Build an HTTP mailer from mail settings.
    ///
    /// Returns `None` when the endpoint, key or sender address is missing,
    /// in which case callers fall back to [`LogMailer`].
    pub fn from_settings(settings: &MailSettings) -> Option<Self> {
        let endpoint = settings.endpoint.clone()?;
        let api_key = settings.api_key.clone()?;
        let sender_email = settings.sender_email.clone()?;
        if endpoint.trim().is_empty() || api_key.trim().is_empty() || sender_email.trim().is_empty()
        {
            return None;
        }
        Some(Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            sender_email,
            sender_name: settings.sender_name.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let payload = SendMailPayload {
            sender: MailAddress {
                email: self.sender_email.clone(),
                name: self.sender_name.clone(),
            },
            to: vec![MailAddress {
                email: to.to_string(),
                name: None,
            }],
            subject: subject.to_string(),
            text_content: body.to_string(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Email(format!("Mail API request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Email(format!(
                "Mail API returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
