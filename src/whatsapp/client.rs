//! # WhatsApp API Client
//!
//! The provider connection is built once at startup from [`AppConfig`] and
//! shared behind [`MessagingTransport`], so the dispatcher can be exercised
//! against a mock in tests.

use crate::config::AppConfig;
use anyhow::Context;
use async_trait::async_trait;
use derive_more::{Display, Error};
use std::time::Duration;

/// Raw provider answer: HTTP status plus the decoded JSON body.
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub status: u16,
    pub body: serde_json::Value,
}

impl ProviderReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failures where no HTTP status came back at all.
#[derive(Debug, Display, Error)]
pub enum TransportError {
    #[display("request timed out: {_0}")]
    Timeout(#[error(not(source))] String),
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    /// Posts a message body to the provider's messages endpoint.
    async fn post_message(
        &self,
        payload: &serde_json::Value,
    ) -> Result<ProviderReply, TransportError>;
}

/// WhatsApp API client for sending messages
pub struct WhatsAppClient {
    /// HTTP client for making API requests
    client: reqwest::Client,
    /// WhatsApp Business API endpoint for sending messages
    endpoint: String,
    /// Authentication token
    auth_token: String,
}

impl WhatsAppClient {
    /// Creates a new WhatsApp client with the configured request timeout
    pub fn new(app_config: &AppConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(app_config.whatsapp_request_timeout_secs))
            .build()
            .context("failed to build WhatsApp http client")?;

        Ok(Self {
            client,
            endpoint: app_config.whatsapp_send_msg_endpoint(),
            auth_token: app_config.whatsapp_business_auth.clone(),
        })
    }
}

#[async_trait]
impl MessagingTransport for WhatsAppClient {
    async fn post_message(
        &self,
        payload: &serde_json::Value,
    ) -> Result<ProviderReply, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.auth_token)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(into_transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(into_transport_error)?;

        // error pages from proxies are not JSON; keep them readable
        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

        Ok(ProviderReply { status, body })
    }
}

fn into_transport_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envconfig::Envconfig;
    use std::collections::HashMap;

    #[test]
    fn test_client_targets_sender_endpoint() {
        let config = AppConfig::init_from_hashmap(&HashMap::from([
            ("DB_HOST".to_string(), "sqlite::memory:".to_string()),
            ("DB_PASS_ENCRYPT".to_string(), String::new()),
            ("WEP_SERVER_HOST".to_string(), "localhost".to_string()),
            (
                "WHATSAPP_API_BASE_URL".to_string(),
                "https://graph.example.com/v22.0/".to_string(),
            ),
            (
                "WHATSAPP_BUSINESS_PHONE_NUMBER_ID".to_string(),
                "42".to_string(),
            ),
            ("WHATSAPP_BUSINESS_AUTH".to_string(), "token".to_string()),
            ("WHATSAPP_APP_SECRET".to_string(), "secret".to_string()),
            ("WHATSAPP_VERIFY_TOKEN".to_string(), "verify".to_string()),
            (
                "WHATSAPP_BUTTON_DOMAIN".to_string(),
                "shop.example.com".to_string(),
            ),
        ]))
        .unwrap();

        let client = WhatsAppClient::new(&config).unwrap();
        assert_eq!(client.endpoint, "https://graph.example.com/v22.0/42/messages");
    }

    #[test]
    fn test_reply_success_range() {
        let reply = |status| ProviderReply {
            status,
            body: serde_json::Value::Null,
        };

        assert!(reply(200).is_success());
        assert!(!reply(400).is_success());
        assert!(!reply(503).is_success());
    }
}
