use chrono::{DateTime, Utc};
use serde::Serialize;

/// Raw inbound message as persisted in `whatsapp_incoming_messages`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InboundMessageLog {
    pub message_id: String,
    pub from_phone: String,
    pub to_phone: Option<String>,
    pub message_type: String,
    pub message_text: Option<String>,
    pub media_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub raw_payload: String,
}

/// Delivery status callback as persisted in `whatsapp_message_status`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MessageStatusLog {
    pub message_id: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}
