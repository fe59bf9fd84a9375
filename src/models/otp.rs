use chrono::{DateTime, Utc};
use serde::Serialize;

/// Hashed one-time code issued to a phone or e-mail identifier.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OtpRecord {
    pub id: i64,
    #[sqlx(rename = "phone_or_email")]
    pub identifier: String,
    #[serde(skip_serializing)]
    #[sqlx(rename = "otp_hash")]
    pub code_hash: String,
    pub attempts: i64,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl OtpRecord {
    pub fn new(identifier: &str, code_hash: String, ttl_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            identifier: identifier.to_string(),
            code_hash,
            attempts: 0,
            expires_at: now + chrono::Duration::seconds(ttl_seconds),
            used: false,
            created_at: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
