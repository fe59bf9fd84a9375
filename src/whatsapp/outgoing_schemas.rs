//! # WhatsApp Outgoing Message Schemas
//!
//! Data structures for sending messages to the WhatsApp Business API and for
//! reading its replies.

use crate::consts;
use serde::{Deserialize, Serialize};

/// Text message to send to WhatsApp
#[derive(Debug, Serialize, Deserialize)]
pub struct OutgoingTextMessage {
    /// Messaging product, always "whatsapp"
    pub messaging_product: String,
    pub recipient_type: String,
    /// Recipient's WhatsApp ID (phone number)
    pub to: String,
    /// Message type
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Text content
    pub text: OutgoingTextContent,
}

impl OutgoingTextMessage {
    /// Creates a new text message
    pub fn new(to: String, body: String) -> Self {
        Self {
            messaging_product: consts::MESSAGING_PRODUCT.to_string(),
            recipient_type: "individual".to_string(),
            to,
            msg_type: "text".to_string(),
            text: OutgoingTextContent {
                preview_url: false,
                body,
            },
        }
    }
}

/// Text content for outgoing messages
#[derive(Debug, Serialize, Deserialize)]
pub struct OutgoingTextContent {
    pub preview_url: bool,
    /// Message body text
    pub body: String,
}

/// Template message to send to WhatsApp
#[derive(Debug, Serialize, Deserialize)]
pub struct OutgoingTemplateMessage {
    pub messaging_product: String,
    pub recipient_type: String,
    pub to: String,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub template: TemplateContent,
}

impl OutgoingTemplateMessage {
    pub fn new(to: String, name: String, language: String, components: Vec<Component>) -> Self {
        Self {
            messaging_product: consts::MESSAGING_PRODUCT.to_string(),
            recipient_type: "individual".to_string(),
            to,
            msg_type: "template".to_string(),
            template: TemplateContent {
                name,
                language: TemplateLanguage { code: language },
                components,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TemplateContent {
    pub name: String,
    pub language: TemplateLanguage,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub components: Vec<Component>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TemplateLanguage {
    pub code: String,
}

/// Template component (header, body or button) with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Component {
    Header {
        parameters: Vec<Parameter>,
    },
    Body {
        parameters: Vec<Parameter>,
    },
    Button {
        sub_type: ButtonSubType,
        /// Position of the button in the template, as a string
        index: String,
        parameters: Vec<Parameter>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonSubType {
    Url,
    QuickReply,
}

/// Provider parameter shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Parameter {
    Text { text: String },
    Currency { currency: CurrencyValue },
    DateTime { date_time: DateTimeValue },
    Image { image: MediaLink },
    Document { document: MediaLink },
    Video { video: MediaLink },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyValue {
    pub fallback_value: String,
    pub code: String,
    pub amount_1000: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTimeValue {
    pub fallback_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaLink {
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filename: Option<String>,
}

/// Response from WhatsApp API when sending a message
#[derive(Debug, Serialize, Deserialize)]
pub struct WhatsAppMessageResponse {
    /// Messaging product
    #[serde(default)]
    pub messaging_product: String,
    /// Array of contacts (recipients)
    #[serde(default)]
    pub contacts: Vec<WhatsAppContact>,
    /// Array of messages sent
    #[serde(default)]
    pub messages: Vec<WhatsAppMessageStatus>,
}

/// Contact information in response
#[derive(Debug, Serialize, Deserialize)]
pub struct WhatsAppContact {
    /// WhatsApp ID of the contact
    pub wa_id: String,
    /// Input phone number
    pub input: String,
}

/// Message status in response
#[derive(Debug, Serialize, Deserialize)]
pub struct WhatsAppMessageStatus {
    /// Message ID
    pub id: String,
}

/// Error body returned by the Graph API on failed calls
#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderErrorEnvelope {
    pub error: ProviderError,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error_subcode: Option<i64>,
    #[serde(default)]
    pub error_data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_template_message_wire_shape() {
        let message = OutgoingTemplateMessage::new(
            "919876543210".into(),
            "otp_verification".into(),
            "en".into(),
            vec![
                Component::Body {
                    parameters: vec![Parameter::Text {
                        text: "123456".into(),
                    }],
                },
                Component::Button {
                    sub_type: ButtonSubType::Url,
                    index: "0".into(),
                    parameters: vec![Parameter::Text {
                        text: "123456".into(),
                    }],
                },
            ],
        );

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": "919876543210",
                "type": "template",
                "template": {
                    "name": "otp_verification",
                    "language": {"code": "en"},
                    "components": [
                        {"type": "body", "parameters": [{"type": "text", "text": "123456"}]},
                        {"type": "button", "sub_type": "url", "index": "0",
                         "parameters": [{"type": "text", "text": "123456"}]}
                    ]
                }
            })
        );
    }

    #[test]
    fn test_parameter_shapes() {
        let currency = Parameter::Currency {
            currency: CurrencyValue {
                fallback_value: "INR 10.00".into(),
                code: "INR".into(),
                amount_1000: 10_000,
            },
        };
        assert_eq!(
            serde_json::to_value(&currency).unwrap(),
            json!({"type": "currency", "currency": {"fallback_value": "INR 10.00", "code": "INR", "amount_1000": 10000}})
        );

        let document = Parameter::Document {
            document: MediaLink {
                link: "https://cdn.example.com/invoice.pdf".into(),
                filename: Some("invoice.pdf".into()),
            },
        };
        assert_eq!(
            serde_json::to_value(&document).unwrap(),
            json!({"type": "document", "document": {"link": "https://cdn.example.com/invoice.pdf", "filename": "invoice.pdf"}})
        );
    }

    #[test]
    fn test_text_message_wire_shape() {
        let message = OutgoingTextMessage::new("919876543210".into(), "hello".into());
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["type"], "text");
        assert_eq!(value["text"]["body"], "hello");
        assert_eq!(value["to"], "919876543210");
    }

    #[test]
    fn test_error_envelope_parsing() {
        let body = json!({"error": {"message": "(#132001) Template name does not exist in the translation", "type": "OAuthException", "code": 132001, "fbtrace_id": "x"}});
        let envelope: ProviderErrorEnvelope = serde_json::from_value(body).unwrap();

        assert_eq!(envelope.error.code, Some(132001));
        assert!(envelope.error.message.contains("Template name"));
    }
}
