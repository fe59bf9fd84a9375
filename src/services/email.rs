use super::{EmailService, ImplEmailService};
use crate::{api::otp::OtpChannel, config::AppConfig};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Sends plain-text e-mails through a JSON HTTP mail API
/// (`POST {url}` with `from`, `to`, `subject`, `text`).
pub struct HttpEmailService {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    from: String,
}

impl HttpEmailService {
    /// `None` when no e-mail endpoint is configured.
    pub fn from_config(app_config: &AppConfig) -> anyhow::Result<Option<Self>> {
        if app_config.email_api_url.is_empty() {
            return Ok(None);
        }

        Ok(Some(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(app_config.whatsapp_request_timeout_secs))
                .build()
                .context("failed to build e-mail http client")?,
            endpoint: app_config.email_api_url.clone(),
            token: app_config.email_api_token.clone(),
            from: app_config.email_from.clone(),
        }))
    }
}

#[async_trait]
impl EmailService for HttpEmailService {
    async fn send_email(&self, to: &str, subject: &str, text: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&json!({
                "from": self.from,
                "to": to,
                "subject": subject,
                "text": text,
            }))
            .send()
            .await
            .context("Failed to send request to e-mail API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());

            anyhow::bail!("E-mail API returned error status {}: {}", status, body);
        }

        Ok(())
    }
}

/// Delivers one-time codes by e-mail.
pub struct EmailOtpChannel {
    email_service: ImplEmailService,
    ttl_minutes: i64,
}

impl EmailOtpChannel {
    pub fn new(email_service: ImplEmailService, ttl_seconds: i64) -> Self {
        Self {
            email_service,
            ttl_minutes: (ttl_seconds / 60).max(1),
        }
    }
}

#[async_trait]
impl OtpChannel for EmailOtpChannel {
    async fn deliver_code(&self, destination: &str, code: &str) -> anyhow::Result<()> {
        self.email_service
            .send_email(
                destination,
                "Your verification code",
                &format!(
                    "Your verification code is {code}. It expires in {} minute(s). Do not share it with anyone.",
                    self.ttl_minutes
                ),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MockEmailService;
    use std::sync::Arc;

    #[ntex::test]
    async fn test_code_goes_in_the_body() {
        let mut email_service = MockEmailService::new();
        email_service
            .expect_send_email()
            .withf(|to, _, text| to == "asha@example.com" && text.contains("123456") && text.contains("5 minute"))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let channel = EmailOtpChannel::new(Arc::new(email_service), 300);

        assert!(channel.deliver_code("asha@example.com", "123456").await.is_ok());
    }

    #[ntex::test]
    async fn test_send_errors_propagate() {
        let mut email_service = MockEmailService::new();
        email_service
            .expect_send_email()
            .returning(|_, _, _| Err(anyhow::anyhow!("mailbox unavailable")));

        let channel = EmailOtpChannel::new(Arc::new(email_service), 30);

        assert!(channel.deliver_code("asha@example.com", "123456").await.is_err());
    }
}
