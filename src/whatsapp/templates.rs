//! Template names, variables and the per-template component builders.
//!
//! Every approved template has a fixed interaction pattern on the provider
//! side. The registry maps a template name to a pure builder producing the
//! `components` array for that pattern; unknown names get body parameters
//! only.

use super::outgoing_schemas::{
    ButtonSubType, Component, CurrencyValue, DateTimeValue, MediaLink, Parameter,
};
use crate::models::notification::Money;
use std::collections::HashMap;

pub const OTP_VERIFICATION: &str = "otp_verification";
pub const PASSWORD_RESET_CODE: &str = "password_reset_code";
pub const SIGNUP_CONFIRMATION: &str = "signup_confirmation";
pub const LOGIN_ALERT: &str = "login_alert";
pub const GREETING: &str = "greeting";
pub const WELCOME_MESSAGE: &str = "welcome_message";
pub const CART_RECOVERY: &str = "cart_recovery";
pub const ORDER_SHIPPED: &str = "order_shipped";
pub const ORDER_DELIVERED: &str = "order_delivered";
pub const REFUND_NOTICE: &str = "refund_notice";
pub const COD_VERIFICATION: &str = "cod_verification";

/// Positional value for a template placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateVariable {
    Text(String),
    Currency {
        fallback: String,
        code: String,
        amount_1000: i64,
    },
    DateTime(String),
    Image(String),
    Document {
        link: String,
        filename: Option<String>,
    },
    Video(String),
}

impl TemplateVariable {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn money(money: &Money) -> Self {
        Self::Currency {
            fallback: money.display(),
            code: money.currency.to_uppercase(),
            amount_1000: money.amount_1000(),
        }
    }

    fn is_media(&self) -> bool {
        matches!(
            self,
            Self::Image(_) | Self::Document { .. } | Self::Video(_)
        )
    }

    pub fn to_parameter(&self) -> Parameter {
        match self {
            Self::Text(text) => Parameter::Text { text: text.clone() },
            Self::Currency {
                fallback,
                code,
                amount_1000,
            } => Parameter::Currency {
                currency: CurrencyValue {
                    fallback_value: fallback.clone(),
                    code: code.clone(),
                    amount_1000: *amount_1000,
                },
            },
            Self::DateTime(fallback) => Parameter::DateTime {
                date_time: DateTimeValue {
                    fallback_value: fallback.clone(),
                },
            },
            Self::Image(link) => Parameter::Image {
                image: MediaLink {
                    link: link.clone(),
                    filename: None,
                },
            },
            Self::Document { link, filename } => Parameter::Document {
                document: MediaLink {
                    link: link.clone(),
                    filename: filename.clone(),
                },
            },
            Self::Video(link) => Parameter::Video {
                video: MediaLink {
                    link: link.clone(),
                    filename: None,
                },
            },
        }
    }
}

/// Values shared by every builder, independent of the recipient.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub button_domain: String,
}

pub type ComponentBuilder = fn(&[TemplateVariable], &TemplateContext) -> Vec<Component>;

pub struct TemplateRegistry {
    builders: HashMap<String, ComponentBuilder>,
}

impl TemplateRegistry {
    /// Registry without any special case; every name uses [`body_components`].
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    pub fn register(&mut self, template_name: &str, builder: ComponentBuilder) {
        self.builders.insert(template_name.to_string(), builder);
    }

    pub fn is_registered(&self, template_name: &str) -> bool {
        self.builders.contains_key(template_name)
    }

    pub fn build(
        &self,
        template_name: &str,
        variables: &[TemplateVariable],
        context: &TemplateContext,
    ) -> Vec<Component> {
        let builder = self
            .builders
            .get(template_name)
            .copied()
            .unwrap_or(body_components);

        builder(variables, context)
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();

        for name in [OTP_VERIFICATION, PASSWORD_RESET_CODE, SIGNUP_CONFIRMATION] {
            registry.register(name, one_time_code_components);
        }
        for name in [
            LOGIN_ALERT,
            GREETING,
            ORDER_DELIVERED,
            REFUND_NOTICE,
            COD_VERIFICATION,
        ] {
            registry.register(name, body_components);
        }
        for name in [WELCOME_MESSAGE, CART_RECOVERY, ORDER_SHIPPED] {
            registry.register(name, storefront_link_components);
        }

        registry
    }
}

/// Media variables fill the header, everything else the body, in order.
pub fn body_components(variables: &[TemplateVariable], _: &TemplateContext) -> Vec<Component> {
    let (media, body): (Vec<_>, Vec<_>) = variables.iter().partition(|v| v.is_media());
    let mut components = Vec::with_capacity(2);

    if !media.is_empty() {
        components.push(Component::Header {
            parameters: media.iter().map(|v| v.to_parameter()).collect(),
        });
    }
    if !body.is_empty() {
        components.push(Component::Body {
            parameters: body.iter().map(|v| v.to_parameter()).collect(),
        });
    }

    components
}

/// Authentication templates: the code goes in the body and again in the
/// copy-code button.
pub fn one_time_code_components(
    variables: &[TemplateVariable],
    context: &TemplateContext,
) -> Vec<Component> {
    let mut components = body_components(variables, context);

    if let Some(TemplateVariable::Text(code)) = variables.first() {
        components.push(url_button(code.clone()));
    }

    components
}

/// Body parameters plus a url button pointing at the storefront.
pub fn storefront_link_components(
    variables: &[TemplateVariable],
    context: &TemplateContext,
) -> Vec<Component> {
    let mut components = body_components(variables, context);
    let domain = sanitize_button_domain(&context.button_domain);

    if !domain.is_empty() {
        components.push(url_button(domain));
    }

    components
}

fn url_button(value: String) -> Component {
    Component::Button {
        sub_type: ButtonSubType::Url,
        index: "0".to_string(),
        parameters: vec![Parameter::Text { text: value }],
    }
}

/// The url button only accepts the dynamic suffix, so keep just the host:
/// no scheme, path, query or trailing slash.
pub fn sanitize_button_domain(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);

    without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}
