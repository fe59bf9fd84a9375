use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

#[derive(Debug, Display, Clone, Default, Deserialize, Serialize, PartialEq, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScheduledStatus {
    #[default]
    #[display("pending")]
    Pending,
    /// Claimed by a dispatch run, the send is in flight.
    #[display("sending")]
    Sending,
    #[display("sent")]
    Sent,
    #[display("failed")]
    Failed,
    #[display("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ScheduledMessage {
    pub id: i64,
    pub template_id: Option<i64>,
    pub automation_id: Option<i64>,
    pub phone: String,
    pub message: String,
    pub scheduled_at: DateTime<Utc>,
    pub status: ScheduledStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledMessage {
    pub fn new_pending(
        template_id: Option<i64>,
        automation_id: Option<i64>,
        phone: String,
        message: String,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            template_id,
            automation_id,
            phone,
            message,
            scheduled_at,
            status: ScheduledStatus::Pending,
            sent_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}
