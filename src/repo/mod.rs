pub mod sqlite;
pub mod sqlite_queries;

use crate::models;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AppRepo: Send + Sync {
    async fn delete_unused_otps(&self, identifier: &str) -> anyhow::Result<u64>;

    async fn insert_otp(&self, otp: &models::otp::OtpRecord) -> anyhow::Result<i64>;

    /// Most recent record with `used = false` for the identifier.
    async fn get_latest_unused_otp(
        &self,
        identifier: &str,
    ) -> anyhow::Result<Option<models::otp::OtpRecord>>;

    /// Returns the attempt count after the increment.
    async fn increment_otp_attempts(&self, otp_id: i64) -> anyhow::Result<i64>;

    async fn mark_otp_used(&self, otp_id: i64) -> anyhow::Result<()>;

    async fn delete_expired_otps(&self, now: DateTime<Utc>) -> anyhow::Result<u64>;

    /// Users whose phone ends with the same 10 digits as `phone`, oldest first.
    /// Stored numbers are free-form, callers keep the exact canonical match.
    async fn find_users_by_phone_suffix(
        &self,
        phone: &str,
    ) -> anyhow::Result<Vec<models::user::UserRef>>;

    async fn find_user_by_email(&self, email: &str)
    -> anyhow::Result<Option<models::user::UserRef>>;

    async fn insert_scheduled_messages(
        &self,
        messages: &[models::scheduled_message::ScheduledMessage],
    ) -> anyhow::Result<Vec<i64>>;

    async fn get_scheduled_message(
        &self,
        id: i64,
    ) -> anyhow::Result<Option<models::scheduled_message::ScheduledMessage>>;

    /// Pending rows with `scheduled_at <= now`, oldest first.
    async fn get_due_scheduled_messages(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<Vec<models::scheduled_message::ScheduledMessage>>;

    /// Moves a row from pending to sending. False when another run owns it.
    async fn claim_scheduled_message(&self, id: i64) -> anyhow::Result<bool>;

    async fn mark_scheduled_sent(&self, id: i64, sent_at: DateTime<Utc>) -> anyhow::Result<()>;

    async fn mark_scheduled_failed(&self, id: i64, error: &str) -> anyhow::Result<()>;

    /// Pending rows only. False when the row was already picked up or missing.
    async fn cancel_scheduled_message(&self, id: i64) -> anyhow::Result<bool>;

    async fn upsert_chat_session(
        &self,
        activity: &models::chat_session::ChatActivity,
    ) -> anyhow::Result<()>;

    async fn get_chat_session(
        &self,
        customer_phone: &str,
    ) -> anyhow::Result<Option<models::chat_session::ChatSession>>;

    /// False when the provider message id was already stored.
    async fn insert_inbound_message(
        &self,
        message: &models::inbound::InboundMessageLog,
    ) -> anyhow::Result<bool>;

    /// False when the same (message id, status) pair was already stored.
    async fn insert_message_status(
        &self,
        status: &models::inbound::MessageStatusLog,
    ) -> anyhow::Result<bool>;

    /// COD orders awaiting a reply whose phone ends with the same 10 digits,
    /// newest first. Callers keep the exact canonical match.
    async fn find_pending_cod_orders(
        &self,
        customer_phone: &str,
    ) -> anyhow::Result<Vec<models::order::PendingCodOrder>>;

    async fn update_order_status(
        &self,
        order_id: i64,
        status: models::order::OrderStatus,
    ) -> anyhow::Result<()>;
}

pub type ImplAppRepo = Arc<dyn AppRepo>;
