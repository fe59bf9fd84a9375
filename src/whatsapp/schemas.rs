//! # WhatsApp Webhook Schemas
//!
//! This module contains all data structures for WhatsApp Business API webhooks.
//! These schemas define the JSON payload structure sent by WhatsApp when webhook
//! events occur (incoming messages, status updates, etc.).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root webhook payload from WhatsApp
#[derive(Debug, Deserialize, Serialize)]
pub struct WebhookPayload {
    /// The object type, typically "whatsapp_business_account"
    pub object: String,
    /// Array of entry objects containing the actual data
    pub entry: Vec<Entry>,
}

/// Entry object containing changes and metadata
#[derive(Debug, Deserialize, Serialize)]
pub struct Entry {
    /// Business Account ID
    pub id: String,
    /// Array of changes that occurred
    pub changes: Vec<Change>,
}

/// Change object containing the actual webhook data
#[derive(Debug, Deserialize, Serialize)]
pub struct Change {
    /// The field that changed (e.g., "messages")
    pub field: String,
    /// The value containing the actual data
    pub value: ChangeValue,
}

/// Value object containing messages and metadata
#[derive(Debug, Deserialize, Serialize)]
pub struct ChangeValue {
    /// Messaging product (e.g., "whatsapp")
    pub messaging_product: String,
    /// Metadata about the phone number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    /// Array of contacts (senders)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<Contact>>,
    /// Array of messages received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    /// Array of statuses (for sent messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statuses: Option<Vec<Status>>,
}

impl ChangeValue {
    /// Profile name the sender `wa_id` shows in WhatsApp, when present.
    pub fn profile_name(&self, wa_id: &str) -> Option<&str> {
        self.contacts
            .iter()
            .flatten()
            .find(|contact| contact.wa_id == wa_id)
            .map(|contact| contact.profile.name.as_str())
            .filter(|name| !name.trim().is_empty())
    }
}

/// Metadata about the WhatsApp Business phone number
#[derive(Debug, Deserialize, Serialize)]
pub struct Metadata {
    /// Display name of the business phone number
    pub display_phone_number: String,
    /// Phone number ID
    pub phone_number_id: String,
}

/// Contact information for the message sender
#[derive(Debug, Deserialize, Serialize)]
pub struct Contact {
    /// Profile information
    pub profile: Profile,
    /// WhatsApp ID (phone number)
    pub wa_id: String,
}

/// Profile information
#[derive(Debug, Deserialize, Serialize)]
pub struct Profile {
    /// Display name of the contact
    #[serde(default)]
    pub name: String,
}

/// Message object
#[derive(Debug, Deserialize, Serialize)]
pub struct Message {
    /// Sender's WhatsApp ID (phone number)
    pub from: String,
    /// Message ID
    pub id: String,
    /// Timestamp of the message, unix seconds as a string
    pub timestamp: String,
    /// Message type (text, image, video, document, etc.)
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<MediaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<MediaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<MediaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<MediaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sticker: Option<MediaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationMessage>,
    /// Shared contact cards, kept as sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<serde_json::Value>>,
    /// Context (if this is a reply to another message)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
    /// Content of any other message type (reaction, interactive, button, ...)
    #[serde(flatten)]
    pub other: HashMap<String, serde_json::Value>,
}

/// Text message content
#[derive(Debug, Deserialize, Serialize)]
pub struct TextMessage {
    /// The text body of the message
    pub body: String,
}

/// Media message content (image, video, document, audio, sticker)
#[derive(Debug, Deserialize, Serialize)]
pub struct MediaMessage {
    /// Media ID
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Caption (for image, video, document)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Location message content
#[derive(Debug, Deserialize, Serialize)]
pub struct LocationMessage {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Context for reply messages
#[derive(Debug, Deserialize, Serialize)]
pub struct Context {
    pub from: String,
    /// Message ID being referenced
    pub id: String,
}

/// Status update for sent messages
#[derive(Debug, Deserialize, Serialize)]
pub struct Status {
    /// Message ID
    pub id: String,
    /// Status (sent, delivered, read, failed)
    pub status: String,
    /// Timestamp, unix seconds as a string
    pub timestamp: String,
    #[serde(default)]
    pub recipient_id: String,
    /// Present when the status is "failed"
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<StatusError>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StatusError {
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
