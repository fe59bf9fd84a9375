use chrono::{DateTime, Utc};
use serde::Serialize;

/// Conversation summary, one row per customer phone.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ChatSession {
    pub id: i64,
    pub customer_phone: String,
    pub customer_name: Option<String>,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub status: String,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Latest message seen in either direction for a phone.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatActivity {
    pub customer_phone: String,
    pub customer_name: Option<String>,
    pub last_message: String,
    pub at: DateTime<Utc>,
}
