//! Domain objects behind the business-named sends.
//!
//! Each one renders the plain-text body used when its template cannot be
//! delivered. The ordered template variables live next to the template
//! names in [`crate::whatsapp::facade`].

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Amount in hundredths of the currency unit (cents, paise) plus its ISO 4217 code.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Money {
    pub amount_minor: i64,
    pub currency: String,
}

impl Money {
    pub fn display(&self) -> String {
        let sign = if self.amount_minor < 0 { "-" } else { "" };
        let abs = self.amount_minor.unsigned_abs();
        format!(
            "{} {}{}.{:02}",
            self.currency.to_uppercase(),
            sign,
            abs / 100,
            abs % 100
        )
    }

    /// Provider currency parameters are expressed in thousandths.
    /// Assumes two-decimal minor units and saturates at the `i64` bounds.
    pub fn amount_1000(&self) -> i64 {
        self.amount_minor.saturating_mul(10)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginAlert {
    pub customer_name: String,
    pub login_at: DateTime<Utc>,
    pub device: String,
    pub location: Option<String>,
}

impl LoginAlert {
    pub fn login_at_display(&self) -> String {
        self.login_at.format("%d %b %Y, %H:%M UTC").to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CartRecovery {
    pub customer_name: String,
    pub item_count: u32,
    pub cart_total: Money,
}

impl CartRecovery {
    pub fn plain_text(&self, storefront: &str) -> String {
        format!(
            "Hi {}, you left {} item(s) worth {} in your cart. Complete your order at https://{}",
            self.customer_name,
            self.item_count,
            self.cart_total.display(),
            storefront
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderShipment {
    pub customer_name: String,
    pub order_number: String,
    pub carrier: String,
    pub tracking_number: String,
}

impl OrderShipment {
    pub fn plain_text(&self) -> String {
        format!(
            "Hi {}, your order #{} has been shipped via {}. Tracking number: {}",
            self.customer_name, self.order_number, self.carrier, self.tracking_number
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderDelivery {
    pub customer_name: String,
    pub order_number: String,
    pub delivered_at: DateTime<Utc>,
}

impl OrderDelivery {
    pub fn plain_text(&self) -> String {
        format!(
            "Hi {}, your order #{} was delivered on {}. Thank you for shopping with us!",
            self.customer_name,
            self.order_number,
            self.delivered_at.format("%d %b %Y")
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundNotice {
    pub customer_name: String,
    pub order_number: String,
    pub amount: Money,
}

impl RefundNotice {
    pub fn plain_text(&self) -> String {
        format!(
            "Hi {}, a refund of {} for order #{} has been initiated. It may take 5-7 business days to reflect.",
            self.customer_name,
            self.amount.display(),
            self.order_number
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodVerification {
    pub customer_name: String,
    pub order_number: String,
    pub total: Money,
}

impl CodVerification {
    pub fn plain_text(&self) -> String {
        format!(
            "Hi {}, please confirm your cash-on-delivery order #{} of {}. Reply YES to confirm or NO to cancel.",
            self.customer_name,
            self.order_number,
            self.total.display()
        )
    }
}
