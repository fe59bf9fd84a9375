//! Business-named sends built on top of [`TemplateDispatcher`].
//!
//! Authentication-sensitive operations return provider errors untouched.
//! The rest fall back to an equivalent plain-text message when the template
//! is rejected.

use super::{
    dispatcher::{SendError, SentMessage, TemplateDispatcher},
    templates::{self, TemplateVariable, sanitize_button_domain},
};
use crate::{
    api::otp::OtpChannel,
    metric,
    models::{chat_session::ChatActivity, notification},
    repo::ImplAppRepo,
    utils,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub provider_message_id: String,
    /// True when the template was rejected and the plain-text copy went out instead.
    pub fallback_used: bool,
}

impl Delivery {
    fn from_sent(sent: SentMessage, fallback_used: bool) -> Self {
        Self {
            provider_message_id: sent.provider_message_id,
            fallback_used,
        }
    }
}

pub struct MessagingFacade {
    dispatcher: Arc<TemplateDispatcher>,
    repo: ImplAppRepo,
    language: String,
    storefront: String,
}

impl MessagingFacade {
    pub fn new(
        dispatcher: Arc<TemplateDispatcher>,
        repo: ImplAppRepo,
        language: &str,
        button_domain: &str,
    ) -> Self {
        Self {
            dispatcher,
            repo,
            language: language.to_string(),
            storefront: sanitize_button_domain(button_domain),
        }
    }

    pub async fn send_otp(&self, phone: &str, code: &str) -> Result<Delivery, SendError> {
        self.send_strict(
            phone,
            templates::OTP_VERIFICATION,
            &[TemplateVariable::text(code)],
        )
        .await
    }

    pub async fn send_password_reset_code(
        &self,
        phone: &str,
        code: &str,
    ) -> Result<Delivery, SendError> {
        self.send_strict(
            phone,
            templates::PASSWORD_RESET_CODE,
            &[TemplateVariable::text(code)],
        )
        .await
    }

    pub async fn send_signup_confirmation(
        &self,
        phone: &str,
        code: &str,
    ) -> Result<Delivery, SendError> {
        self.send_strict(
            phone,
            templates::SIGNUP_CONFIRMATION,
            &[TemplateVariable::text(code)],
        )
        .await
    }

    pub async fn send_login_alert(
        &self,
        phone: &str,
        alert: &notification::LoginAlert,
    ) -> Result<Delivery, SendError> {
        self.send_strict(
            phone,
            templates::LOGIN_ALERT,
            &[
                TemplateVariable::text(&alert.customer_name),
                TemplateVariable::DateTime(alert.login_at_display()),
                TemplateVariable::text(&alert.device),
                TemplateVariable::text(alert.location.as_deref().unwrap_or("Unknown location")),
            ],
        )
        .await
    }

    pub async fn send_greeting(
        &self,
        phone: &str,
        customer_name: &str,
    ) -> Result<Delivery, SendError> {
        self.send_strict(
            phone,
            templates::GREETING,
            &[TemplateVariable::text(customer_name)],
        )
        .await
    }

    pub async fn send_welcome(
        &self,
        phone: &str,
        customer_name: &str,
    ) -> Result<Delivery, SendError> {
        self.send_strict(
            phone,
            templates::WELCOME_MESSAGE,
            &[TemplateVariable::text(customer_name)],
        )
        .await
    }

    pub async fn send_cart_recovery(
        &self,
        phone: &str,
        cart: &notification::CartRecovery,
    ) -> Result<Delivery, SendError> {
        self.send_with_fallback(
            phone,
            templates::CART_RECOVERY,
            &[
                TemplateVariable::text(&cart.customer_name),
                TemplateVariable::text(cart.item_count.to_string()),
                TemplateVariable::money(&cart.cart_total),
            ],
            &cart.plain_text(&self.storefront),
        )
        .await
    }

    pub async fn send_order_shipped(
        &self,
        phone: &str,
        shipment: &notification::OrderShipment,
    ) -> Result<Delivery, SendError> {
        self.send_with_fallback(
            phone,
            templates::ORDER_SHIPPED,
            &[
                TemplateVariable::text(&shipment.customer_name),
                TemplateVariable::text(&shipment.order_number),
                TemplateVariable::text(&shipment.carrier),
                TemplateVariable::text(&shipment.tracking_number),
            ],
            &shipment.plain_text(),
        )
        .await
    }

    pub async fn send_order_delivered(
        &self,
        phone: &str,
        delivery: &notification::OrderDelivery,
    ) -> Result<Delivery, SendError> {
        self.send_with_fallback(
            phone,
            templates::ORDER_DELIVERED,
            &[
                TemplateVariable::text(&delivery.customer_name),
                TemplateVariable::text(&delivery.order_number),
                TemplateVariable::DateTime(delivery.delivered_at.format("%d %b %Y").to_string()),
            ],
            &delivery.plain_text(),
        )
        .await
    }

    pub async fn send_refund_notice(
        &self,
        phone: &str,
        refund: &notification::RefundNotice,
    ) -> Result<Delivery, SendError> {
        self.send_with_fallback(
            phone,
            templates::REFUND_NOTICE,
            &[
                TemplateVariable::text(&refund.customer_name),
                TemplateVariable::text(&refund.order_number),
                TemplateVariable::money(&refund.amount),
            ],
            &refund.plain_text(),
        )
        .await
    }

    pub async fn send_cod_verification(
        &self,
        phone: &str,
        cod: &notification::CodVerification,
    ) -> Result<Delivery, SendError> {
        self.send_with_fallback(
            phone,
            templates::COD_VERIFICATION,
            &[
                TemplateVariable::text(&cod.customer_name),
                TemplateVariable::text(&cod.order_number),
                TemplateVariable::money(&cod.total),
            ],
            &cod.plain_text(),
        )
        .await
    }

    /// Sends free text and records it on the recipient's chat session.
    pub async fn send_plain_text(&self, phone: &str, body: &str) -> Result<Delivery, SendError> {
        let sent = self.dispatcher.send_text(phone, body).await?;

        let activity = ChatActivity {
            customer_phone: sent.to.clone(),
            customer_name: None,
            last_message: body.to_string(),
            at: Utc::now(),
        };
        utils::best_effort("chat session upsert", self.repo.upsert_chat_session(&activity)).await;

        Ok(Delivery::from_sent(sent, false))
    }

    async fn send_strict(
        &self,
        phone: &str,
        template_name: &str,
        variables: &[TemplateVariable],
    ) -> Result<Delivery, SendError> {
        self.dispatcher
            .send_template(phone, template_name, variables, &self.language)
            .await
            .map(|sent| Delivery::from_sent(sent, false))
    }

    async fn send_with_fallback(
        &self,
        phone: &str,
        template_name: &str,
        variables: &[TemplateVariable],
        fallback_text: &str,
    ) -> Result<Delivery, SendError> {
        match self.send_strict(phone, template_name, variables).await {
            Err(e) if e.is_template_error => {
                logfire::warn!(
                    "template {template} rejected ({error}), sending plain text instead",
                    template = template_name.to_string(),
                    error = e.to_string()
                );
                metric::incr_message_send_statds("fallback");

                let delivery = self.send_plain_text(phone, fallback_text).await?;
                Ok(Delivery {
                    fallback_used: true,
                    ..delivery
                })
            }
            other => other,
        }
    }
}

#[async_trait]
impl OtpChannel for MessagingFacade {
    async fn deliver_code(&self, destination: &str, code: &str) -> anyhow::Result<()> {
        self.send_otp(destination, code).await?;
        Ok(())
    }
}
