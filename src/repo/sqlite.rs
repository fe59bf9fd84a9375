use crate::{consts, models};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::{AppRepo, sqlite_queries};

#[derive(Clone)]
pub struct SqlxSqliteRepo {
    pub db_pool: SqlitePool,
}

#[async_trait]
impl AppRepo for SqlxSqliteRepo {
    async fn delete_unused_otps(&self, identifier: &str) -> anyhow::Result<u64> {
        Ok(sqlx::query(sqlite_queries::QUERY_DELETE_UNUSED_OTPS)
            .bind(identifier)
            .execute(&self.db_pool)
            .await?
            .rows_affected())
    }

    async fn insert_otp(&self, otp: &models::otp::OtpRecord) -> anyhow::Result<i64> {
        Ok(sqlx::query(sqlite_queries::QUERY_INSERT_OTP)
            .bind(&otp.identifier)
            .bind(&otp.code_hash)
            .bind(otp.attempts)
            .bind(otp.expires_at)
            .bind(otp.used)
            .bind(otp.created_at)
            .execute(&self.db_pool)
            .await?
            .last_insert_rowid())
    }

    async fn get_latest_unused_otp(
        &self,
        identifier: &str,
    ) -> anyhow::Result<Option<models::otp::OtpRecord>> {
        Ok(
            sqlx::query_as::<_, models::otp::OtpRecord>(
                sqlite_queries::QUERY_GET_LATEST_UNUSED_OTP,
            )
            .bind(identifier)
            .fetch_optional(&self.db_pool)
            .await?,
        )
    }

    async fn increment_otp_attempts(&self, otp_id: i64) -> anyhow::Result<i64> {
        Ok(
            sqlx::query_scalar::<_, i64>(sqlite_queries::QUERY_INCREMENT_OTP_ATTEMPTS)
                .bind(otp_id)
                .fetch_one(&self.db_pool)
                .await?,
        )
    }

    async fn mark_otp_used(&self, otp_id: i64) -> anyhow::Result<()> {
        Ok(sqlx::query("UPDATE otps SET used=1 WHERE id=$1;")
            .bind(otp_id)
            .execute(&self.db_pool)
            .await
            .map(|_| ())?)
    }

    async fn delete_expired_otps(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        Ok(sqlx::query("DELETE FROM otps WHERE expires_at < $1;")
            .bind(now)
            .execute(&self.db_pool)
            .await?
            .rows_affected())
    }

    async fn find_users_by_phone_suffix(
        &self,
        phone: &str,
    ) -> anyhow::Result<Vec<models::user::UserRef>> {
        Ok(sqlx::query_as::<_, models::user::UserRef>(
            sqlite_queries::QUERY_GET_USERS_BY_PHONE_SUFFIX,
        )
        .bind(phone)
        .fetch_all(&self.db_pool)
        .await?)
    }

    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> anyhow::Result<Option<models::user::UserRef>> {
        Ok(
            sqlx::query_as::<_, models::user::UserRef>(sqlite_queries::QUERY_GET_USER_BY_EMAIL)
                .bind(email)
                .fetch_optional(&self.db_pool)
                .await?,
        )
    }

    async fn insert_scheduled_messages(
        &self,
        messages: &[models::scheduled_message::ScheduledMessage],
    ) -> anyhow::Result<Vec<i64>> {
        let mut transaction = self.db_pool.begin().await?;
        let mut ids = Vec::with_capacity(messages.len());

        for message in messages {
            let id = sqlx::query(sqlite_queries::QUERY_INSERT_SCHEDULED_MESSAGE)
                .bind(message.template_id)
                .bind(message.automation_id)
                .bind(&message.phone)
                .bind(&message.message)
                .bind(message.scheduled_at)
                .bind(&message.status)
                .bind(message.sent_at)
                .bind(&message.error_message)
                .bind(message.created_at)
                .bind(message.updated_at)
                .execute(&mut *transaction)
                .await?
                .last_insert_rowid();
            ids.push(id);
        }

        transaction.commit().await?;

        Ok(ids)
    }

    async fn get_scheduled_message(
        &self,
        id: i64,
    ) -> anyhow::Result<Option<models::scheduled_message::ScheduledMessage>> {
        Ok(sqlx::query_as::<_, models::scheduled_message::ScheduledMessage>(
            sqlite_queries::QUERY_GET_SCHEDULED_MESSAGE,
        )
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?)
    }

    async fn get_due_scheduled_messages(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<Vec<models::scheduled_message::ScheduledMessage>> {
        Ok(sqlx::query_as::<_, models::scheduled_message::ScheduledMessage>(
            sqlite_queries::QUERY_GET_DUE_SCHEDULED_MESSAGES,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.db_pool)
        .await?)
    }

    async fn claim_scheduled_message(&self, id: i64) -> anyhow::Result<bool> {
        Ok(sqlx::query(sqlite_queries::QUERY_CLAIM_SCHEDULED_MESSAGE)
            .bind(id)
            .bind(Utc::now())
            .execute(&self.db_pool)
            .await?
            .rows_affected()
            == 1)
    }

    async fn mark_scheduled_sent(&self, id: i64, sent_at: DateTime<Utc>) -> anyhow::Result<()> {
        Ok(sqlx::query(sqlite_queries::QUERY_MARK_SCHEDULED_SENT)
            .bind(id)
            .bind(sent_at)
            .bind(Utc::now())
            .execute(&self.db_pool)
            .await
            .map(|_| ())?)
    }

    async fn mark_scheduled_failed(&self, id: i64, error: &str) -> anyhow::Result<()> {
        Ok(sqlx::query(sqlite_queries::QUERY_MARK_SCHEDULED_FAILED)
            .bind(id)
            .bind(error)
            .bind(Utc::now())
            .execute(&self.db_pool)
            .await
            .map(|_| ())?)
    }

    async fn cancel_scheduled_message(&self, id: i64) -> anyhow::Result<bool> {
        Ok(sqlx::query(sqlite_queries::QUERY_CANCEL_SCHEDULED_MESSAGE)
            .bind(id)
            .bind(Utc::now())
            .execute(&self.db_pool)
            .await?
            .rows_affected()
            == 1)
    }

    async fn upsert_chat_session(
        &self,
        activity: &models::chat_session::ChatActivity,
    ) -> anyhow::Result<()> {
        Ok(sqlx::query(sqlite_queries::QUERY_UPSERT_CHAT_SESSION)
            .bind(&activity.customer_phone)
            .bind(&activity.customer_name)
            .bind(&activity.last_message)
            .bind(activity.at)
            .bind(consts::CHAT_SESSION_ACTIVE)
            .bind(Utc::now())
            .execute(&self.db_pool)
            .await
            .map(|_| ())?)
    }

    async fn get_chat_session(
        &self,
        customer_phone: &str,
    ) -> anyhow::Result<Option<models::chat_session::ChatSession>> {
        Ok(sqlx::query_as::<_, models::chat_session::ChatSession>(
            sqlite_queries::QUERY_GET_CHAT_SESSION,
        )
        .bind(customer_phone)
        .fetch_optional(&self.db_pool)
        .await?)
    }

    async fn insert_inbound_message(
        &self,
        message: &models::inbound::InboundMessageLog,
    ) -> anyhow::Result<bool> {
        Ok(sqlx::query(sqlite_queries::QUERY_INSERT_INBOUND_MESSAGE)
            .bind(&message.message_id)
            .bind(&message.from_phone)
            .bind(&message.to_phone)
            .bind(&message.message_type)
            .bind(&message.message_text)
            .bind(&message.media_url)
            .bind(message.timestamp)
            .bind(&message.status)
            .bind(&message.raw_payload)
            .bind(Utc::now())
            .execute(&self.db_pool)
            .await?
            .rows_affected()
            == 1)
    }

    async fn insert_message_status(
        &self,
        status: &models::inbound::MessageStatusLog,
    ) -> anyhow::Result<bool> {
        Ok(sqlx::query(sqlite_queries::QUERY_INSERT_MESSAGE_STATUS)
            .bind(&status.message_id)
            .bind(&status.status)
            .bind(status.timestamp)
            .bind(&status.error_code)
            .bind(&status.error_message)
            .bind(Utc::now())
            .execute(&self.db_pool)
            .await?
            .rows_affected()
            == 1)
    }

    async fn find_pending_cod_orders(
        &self,
        customer_phone: &str,
    ) -> anyhow::Result<Vec<models::order::PendingCodOrder>> {
        let [pending, processing] = models::order::OrderStatus::AWAITING_REPLY;
        let [cod, cash_on_delivery, cash_on_delivery_spaced] = consts::COD_PAYMENT_METHODS;

        Ok(sqlx::query_as::<_, models::order::PendingCodOrder>(
            sqlite_queries::QUERY_FIND_PENDING_COD_ORDERS,
        )
        .bind(customer_phone)
        .bind(cod)
        .bind(cash_on_delivery)
        .bind(cash_on_delivery_spaced)
        .bind(pending)
        .bind(processing)
        .fetch_all(&self.db_pool)
        .await?)
    }

    async fn update_order_status(
        &self,
        order_id: i64,
        status: models::order::OrderStatus,
    ) -> anyhow::Result<()> {
        Ok(sqlx::query(sqlite_queries::QUERY_UPDATE_ORDER_STATUS)
            .bind(order_id)
            .bind(status)
            .bind(Utc::now())
            .execute(&self.db_pool)
            .await
            .map(|_| ())?)
    }
}

/// Fresh single-connection in-memory database with the messaging schema.
#[cfg(test)]
pub(crate) async fn in_memory_repo() -> SqlxSqliteRepo {
    let db_pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    crate::utils::run_migrations(&db_pool).await.unwrap();

    SqlxSqliteRepo { db_pool }
}

/// Seeds a row in the external `orders` table.
#[cfg(test)]
pub(crate) async fn insert_test_order(
    repo: &SqlxSqliteRepo,
    phone: &str,
    payment_method: &str,
    status: &str,
    created_at: DateTime<Utc>,
) -> i64 {
    sqlx::query(
        "INSERT INTO orders(order_number,customer_name,customer_phone,payment_method,status,created_at,updated_at) VALUES($1,'Asha',$2,$3,$4,$5,$5);",
    )
    .bind(format!("ORD-{}", created_at.timestamp_millis()))
    .bind(phone)
    .bind(payment_method)
    .bind(status)
    .bind(created_at)
    .execute(&repo.db_pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

/// Seeds a row in the external `users` table.
#[cfg(test)]
pub(crate) async fn insert_test_user(repo: &SqlxSqliteRepo, email: &str, phone: &str) -> i64 {
    sqlx::query("INSERT INTO users(name,email,phone,created_at) VALUES('Asha',$1,$2,$3);")
        .bind(email)
        .bind(phone)
        .bind(Utc::now())
        .execute(&repo.db_pool)
        .await
        .unwrap()
        .last_insert_rowid()
}
