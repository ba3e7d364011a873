//! Outgoing email

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use super::UpstreamError;
use crate::config::MailConfig;

const SERVICE: &str = "mailgun";
const MAILGUN_API: &str = "https://api.mailgun.net/v3";

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), UpstreamError>;
}

/// Sends through the Mailgun HTTP API
#[derive(Debug, Clone)]
pub struct MailgunMailer {
    client: Client,
    config: MailConfig,
}

impl MailgunMailer {
    pub fn new(config: MailConfig, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Mailer for MailgunMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), UpstreamError> {
        let url = format!("{}/{}/messages", MAILGUN_API, self.config.mailgun_domain);
        let form = [
            ("from", self.config.from.as_str()),
            ("to", to),
            ("subject", subject),
            ("html", html),
        ];

        let resp = self
            .client
            .post(&url)
            .basic_auth("api", Some(&self.config.mailgun_api_key))
            .form(&form)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        info!("Sent '{}' to {}", subject, to);
        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
/// Used when no mail provider is configured.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), UpstreamError> {
        info!("Mail to {} ({}): {}", to, subject, html);
        Ok(())
    }
}
