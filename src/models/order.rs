use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Order status values this crate reads or writes on the external `orders` table.
#[derive(Debug, Display, Clone, Default, Deserialize, Serialize, PartialEq, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    #[display("pending")]
    Pending,
    #[display("confirmed")]
    Confirmed,
    #[display("processing")]
    Processing,
    #[display("shipped")]
    Shipped,
    #[display("delivered")]
    Delivered,
    #[display("cancelled")]
    Cancelled,
}

impl OrderStatus {
    /// Statuses a YES/NO reply can still resolve.
    pub const AWAITING_REPLY: [OrderStatus; 2] = [OrderStatus::Pending, OrderStatus::Processing];
}

/// Cash-on-delivery order still waiting for the customer's reply.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PendingCodOrder {
    pub id: i64,
    pub order_number: String,
    pub customer_name: Option<String>,
    pub customer_phone: String,
    pub payment_method: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}
