//! # Template dispatcher
//!
//! Sends template and plain-text messages to the provider.
//!
//! Every send normalizes and validates the recipient before any I/O, makes at
//! most one retry for transient failures (network errors and 5xx answers) and
//! classifies failures with two independent flags:
//!
//! - `is_template_error`: the template itself was rejected, the caller may fall
//!   back to plain text
//! - `is_permanent`: the provider answered 4xx, retrying will not help

use super::{
    client::{MessagingTransport, ProviderReply, TransportError},
    outgoing_schemas::{
        OutgoingTemplateMessage, OutgoingTextMessage, ProviderErrorEnvelope,
        WhatsAppMessageResponse,
    },
    templates::{TemplateContext, TemplateRegistry, TemplateVariable},
};
use crate::{consts, metric, phone};
use derive_more::{Display, Error};
use ntex::time::{Millis, sleep};
use serde::Serialize;
use std::sync::Arc;

pub const INVALID_PHONE: &str = "INVALID_PHONE";
pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
pub const TIMEOUT: &str = "TIMEOUT";
pub const INVALID_RESPONSE: &str = "INVALID_RESPONSE";

/// Accepted send.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentMessage {
    pub provider_message_id: String,
    /// Normalized recipient the provider accepted.
    pub to: String,
}

#[derive(Debug, Display, Error, Clone, PartialEq, Serialize)]
#[display("[{code}] {message}")]
pub struct SendError {
    /// Provider numeric code as text, or one of the local codes above.
    pub code: String,
    pub message: String,
    pub http_status: Option<u16>,
    pub is_template_error: bool,
    pub is_permanent: bool,
}

impl SendError {
    fn invalid_phone(raw: &str) -> Self {
        Self {
            code: INVALID_PHONE.to_string(),
            message: format!("invalid phone number: {raw}"),
            http_status: None,
            is_template_error: false,
            is_permanent: true,
        }
    }

    fn from_transport(error: TransportError) -> Self {
        let code = match error {
            TransportError::Timeout(_) => TIMEOUT,
            TransportError::Network(_) => NETWORK_ERROR,
        };

        Self {
            code: code.to_string(),
            message: error.to_string(),
            http_status: None,
            is_template_error: false,
            is_permanent: false,
        }
    }

    fn from_reply(reply: &ProviderReply) -> Self {
        let (provider_code, message) =
            match serde_json::from_value::<ProviderErrorEnvelope>(reply.body.clone()) {
                Ok(envelope) => (envelope.error.code, envelope.error.message),
                Err(_) => (None, reply.body.to_string()),
            };

        Self {
            code: provider_code
                .map(|code| code.to_string())
                .unwrap_or_else(|| format!("HTTP_{}", reply.status)),
            is_template_error: is_template_error(provider_code, &message),
            is_permanent: (400..500).contains(&reply.status),
            http_status: Some(reply.status),
            message,
        }
    }

    /// Transport failures and 5xx answers, unless the template was blamed.
    fn is_retryable(&self) -> bool {
        !self.is_template_error && self.http_status.is_none_or(|status| status >= 500)
    }
}

pub fn is_template_error(provider_code: Option<i64>, message: &str) -> bool {
    if provider_code.is_some_and(|code| consts::TEMPLATE_ERROR_CODES.contains(&code)) {
        return true;
    }

    let message = message.to_lowercase();
    consts::TEMPLATE_ERROR_HINTS
        .iter()
        .any(|hint| message.contains(hint))
}

pub struct TemplateDispatcher {
    transport: Arc<dyn MessagingTransport>,
    normalizer: phone::PhoneNormalizer,
    registry: TemplateRegistry,
    context: TemplateContext,
    retry_delay: Millis,
}

impl TemplateDispatcher {
    pub fn new(
        transport: Arc<dyn MessagingTransport>,
        normalizer: phone::PhoneNormalizer,
        registry: TemplateRegistry,
        context: TemplateContext,
    ) -> Self {
        Self {
            transport,
            normalizer,
            registry,
            context,
            retry_delay: Millis(consts::PROVIDER_RETRY_DELAY_MS),
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Millis) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn normalizer(&self) -> &phone::PhoneNormalizer {
        &self.normalizer
    }

    /// Sends `template_name` filled with `variables` in their declared order.
    pub async fn send_template(
        &self,
        to: &str,
        template_name: &str,
        variables: &[TemplateVariable],
        language: &str,
    ) -> Result<SentMessage, SendError> {
        let phone = self.recipient(to)?;
        let components = self.registry.build(template_name, variables, &self.context);
        let message = OutgoingTemplateMessage::new(
            phone.clone(),
            template_name.to_string(),
            language.to_string(),
            components,
        );

        let result = self.deliver(&phone, &message).await;
        if let Err(e) = &result {
            logfire::warn!(
                "template {template} to {to} failed: {error}",
                template = template_name.to_string(),
                to = phone.clone(),
                error = e.to_string()
            );
        }

        result
    }

    pub async fn send_text(&self, to: &str, body: &str) -> Result<SentMessage, SendError> {
        let phone = self.recipient(to)?;
        let message = OutgoingTextMessage::new(phone.clone(), body.to_string());

        let result = self.deliver(&phone, &message).await;
        if let Err(e) = &result {
            logfire::warn!(
                "text message to {to} failed: {error}",
                to = phone.clone(),
                error = e.to_string()
            );
        }

        result
    }

    fn recipient(&self, raw: &str) -> Result<String, SendError> {
        self.normalizer.normalize_valid(raw).ok_or_else(|| {
            metric::incr_message_send_statds(INVALID_PHONE);
            SendError::invalid_phone(raw)
        })
    }

    async fn deliver<T: Serialize>(
        &self,
        to: &str,
        message: &T,
    ) -> Result<SentMessage, SendError> {
        let payload = serde_json::to_value(message).map_err(|e| SendError {
            code: INVALID_RESPONSE.to_string(),
            message: e.to_string(),
            http_status: None,
            is_template_error: false,
            is_permanent: true,
        })?;

        let result = match self.attempt(to, &payload).await {
            Err(e) if e.is_retryable() => {
                logfire::info!(
                    "retrying provider call once: {error}",
                    error = e.to_string()
                );
                if self.retry_delay.0 > 0 {
                    sleep(self.retry_delay).await;
                }
                self.attempt(to, &payload).await
            }
            other => other,
        };

        match &result {
            Ok(_) => metric::incr_message_send_statds("sent"),
            Err(e) => metric::incr_message_send_statds(&e.code),
        }

        result
    }

    async fn attempt(
        &self,
        to: &str,
        payload: &serde_json::Value,
    ) -> Result<SentMessage, SendError> {
        let reply = self
            .transport
            .post_message(payload)
            .await
            .map_err(SendError::from_transport)?;

        if !reply.is_success() {
            return Err(SendError::from_reply(&reply));
        }

        let provider_message_id = serde_json::from_value::<WhatsAppMessageResponse>(reply.body)
            .ok()
            .and_then(|response| response.messages.into_iter().next())
            .map(|message| message.id)
            .ok_or_else(|| SendError {
                code: INVALID_RESPONSE.to_string(),
                message: "provider accepted the message without returning its id".to_string(),
                http_status: Some(reply.status),
                is_template_error: false,
                is_permanent: false,
            })?;

        Ok(SentMessage {
            provider_message_id,
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::whatsapp::{client::MockMessagingTransport, templates};
    use mockall::Sequence;
    use serde_json::json;

    pub(crate) fn accepted(id: &str) -> Result<ProviderReply, TransportError> {
        Ok(ProviderReply {
            status: 200,
            body: json!({
                "messaging_product": "whatsapp",
                "contacts": [{"input": "919876543210", "wa_id": "919876543210"}],
                "messages": [{"id": id}]
            }),
        })
    }

    pub(crate) fn rejected(
        status: u16,
        code: i64,
        message: &str,
    ) -> Result<ProviderReply, TransportError> {
        Ok(ProviderReply {
            status,
            body: json!({"error": {"code": code, "message": message, "type": "OAuthException"}}),
        })
    }

    pub(crate) fn dispatcher(transport: MockMessagingTransport) -> TemplateDispatcher {
        TemplateDispatcher::new(
            Arc::new(transport),
            phone::PhoneNormalizer::new("91"),
            TemplateRegistry::default(),
            TemplateContext {
                button_domain: "shop.example.com".into(),
            },
        )
        .with_retry_delay(Millis(0))
    }

    #[ntex::test]
    async fn test_send_template_posts_normalized_recipient() {
        let mut transport = MockMessagingTransport::new();
        transport
            .expect_post_message()
            .withf(|payload| {
                payload["to"] == "919876543210"
                    && payload["template"]["name"] == templates::OTP_VERIFICATION
                    && payload["template"]["components"][1]["sub_type"] == "url"
            })
            .times(1)
            .returning(|_| accepted("wamid.OK"));

        let sent = dispatcher(transport)
            .send_template(
                "+91 98765-43210",
                templates::OTP_VERIFICATION,
                &[TemplateVariable::text("123456")],
                "en",
            )
            .await
            .unwrap();

        assert_eq!(sent.provider_message_id, "wamid.OK");
        assert_eq!(sent.to, "919876543210");
    }

    #[ntex::test]
    async fn test_retries_once_on_503() {
        let mut transport = MockMessagingTransport::new();
        transport
            .expect_post_message()
            .times(2)
            .returning(|_| rejected(503, 131000, "Service temporarily unavailable"));

        let error = dispatcher(transport)
            .send_text("9876543210", "hello")
            .await
            .unwrap_err();

        assert_eq!(error.http_status, Some(503));
        assert!(!error.is_permanent);
        assert!(!error.is_template_error);
    }

    #[ntex::test]
    async fn test_retry_can_succeed_after_network_error() {
        let mut transport = MockMessagingTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_post_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(TransportError::Network("connection reset".into())));
        transport
            .expect_post_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| accepted("wamid.RETRIED"));

        let sent = dispatcher(transport)
            .send_text("9876543210", "hello")
            .await
            .unwrap();

        assert_eq!(sent.provider_message_id, "wamid.RETRIED");
    }

    #[ntex::test]
    async fn test_no_retry_on_400() {
        let mut transport = MockMessagingTransport::new();
        transport
            .expect_post_message()
            .times(1)
            .returning(|_| rejected(400, 131009, "Invalid value for recipient"));

        let error = dispatcher(transport)
            .send_text("9876543210", "hello")
            .await
            .unwrap_err();

        assert_eq!(error.code, "131009");
        assert!(error.is_permanent);
        assert!(!error.is_template_error);
    }

    #[ntex::test]
    async fn test_template_errors_are_classified_independently() {
        let mut transport = MockMessagingTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_post_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| rejected(404, 132001, "Template name does not exist"));
        transport
            .expect_post_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| rejected(500, 1, "Parameter format does not match"));

        let dispatcher = dispatcher(transport);
        let missing = dispatcher
            .send_template("9876543210", "unknown_template", &[], "en")
            .await
            .unwrap_err();
        assert!(missing.is_template_error);
        assert!(missing.is_permanent);

        // template-classified 5xx: no retry, not permanent
        let mismatch = dispatcher
            .send_template("9876543210", "unknown_template", &[], "en")
            .await
            .unwrap_err();
        assert!(mismatch.is_template_error);
        assert!(!mismatch.is_permanent);
    }

    #[ntex::test]
    async fn test_invalid_phone_fails_before_any_call() {
        let mut transport = MockMessagingTransport::new();
        transport.expect_post_message().never();

        let error = dispatcher(transport)
            .send_text("12-34", "hello")
            .await
            .unwrap_err();

        assert_eq!(error.code, INVALID_PHONE);
        assert!(error.is_permanent);
    }

    #[ntex::test]
    async fn test_success_without_message_id_is_not_retried() {
        let mut transport = MockMessagingTransport::new();
        transport.expect_post_message().times(1).returning(|_| {
            Ok(ProviderReply {
                status: 200,
                body: json!({"messages": []}),
            })
        });

        let error = dispatcher(transport)
            .send_text("9876543210", "hello")
            .await
            .unwrap_err();

        assert_eq!(error.code, INVALID_RESPONSE);
    }

    #[test]
    fn test_is_template_error() {
        assert!(is_template_error(Some(132000), "whatever"));
        assert!(is_template_error(Some(100), "Invalid TEMPLATE language"));
        assert!(is_template_error(None, "translation missing for en_US"));
        assert!(!is_template_error(Some(131026), "Message undeliverable"));
        assert!(!is_template_error(None, ""));
    }
}
