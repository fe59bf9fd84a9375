//! Application configuration management with security considerations.
//!
//! All values are read from the environment once in `main` and handed to the
//! components that need them. Nothing here is a process-wide singleton: the
//! provider credentials bundle is built into a [`crate::whatsapp::client::WhatsAppClient`]
//! and passed by reference from there on.
//!
//! # Security Notes
//! - Sensitive fields are clearly marked and should never be logged
//! - Production environments should use secure secret management systems

use crate::api::otp::OtpSettings;
use envconfig::Envconfig;
use std::str::FromStr;

/// Application configuration with security-aware field management.
#[derive(Envconfig, Clone)]
pub struct AppConfig {
    /// Environment name to deploy the app (NON-SENSITIVE)
    /// Values: "local", "dev", "staging", "prod"
    #[envconfig(default = "local")]
    pub env: String,

    /// Database host value (NON-SENSITIVE)
    /// Example: "sqlite:data/shop.db"
    pub db_host: String,

    /// 🔒 SENSITIVE: Database password to encrypt SQLite data
    pub db_pass_encrypt: String,

    /// Host address for web server binding (NON-SENSITIVE)
    pub wep_server_host: String,

    /// Port for web server binding (NON-SENSITIVE)
    #[envconfig(default = "8080")]
    pub wep_server_port: u16,

    /// Path to SSL private key file (SENSITIVE PATH)
    #[envconfig(default = "server.key")]
    pub private_key_path: String,

    /// Path to SSL certificate file (NON-SENSITIVE)
    #[envconfig(default = "server.crt")]
    pub certificate_path: String,

    /// 🔒 SENSITIVE: Logfire write token. Empty means console logging only.
    #[envconfig(default = "")]
    pub logfire_token: String,

    /// 🔒 SENSITIVE: Shared secret expected in `X-Internal-Secret` by the
    /// internal trigger endpoints.
    #[envconfig(default = "")]
    pub internal_api_secret: String,

    /// Graph API base url, without trailing slash (NON-SENSITIVE)
    #[envconfig(default = "https://graph.facebook.com/v22.0")]
    pub whatsapp_api_base_url: String,

    /// WhatsApp Business phone number ID used as sender (SEMI-SENSITIVE)
    pub whatsapp_business_phone_number_id: String,

    /// 🔒 SENSITIVE: WhatsApp Business bearer token
    pub whatsapp_business_auth: String,

    /// 🔒 SENSITIVE: App secret used to sign webhook payloads
    pub whatsapp_app_secret: String,

    /// 🔒 SENSITIVE: Token echoed back during webhook subscription
    pub whatsapp_verify_token: String,

    /// Language code used for template sends (NON-SENSITIVE)
    #[envconfig(default = "en")]
    pub whatsapp_default_language: String,

    /// Storefront domain placed in url buttons (NON-SENSITIVE)
    /// Example: "shop.example.com"
    pub whatsapp_button_domain: String,

    /// Upper bound for a single provider request, in seconds
    #[envconfig(default = "15")]
    pub whatsapp_request_timeout_secs: u64,

    /// Country calling code prepended to national numbers
    #[envconfig(default = "91")]
    pub default_country_code: String,

    #[envconfig(default = "6")]
    pub otp_length: u32,

    #[envconfig(default = "300")]
    pub otp_ttl_seconds: i64,

    #[envconfig(default = "5")]
    pub otp_max_attempts: i64,

    /// Transactional e-mail HTTP endpoint. Empty disables e-mail delivery.
    #[envconfig(default = "")]
    pub email_api_url: String,

    /// 🔒 SENSITIVE: Bearer token for the e-mail endpoint
    #[envconfig(default = "")]
    pub email_api_token: String,

    /// Sender address for outgoing e-mails
    #[envconfig(default = "")]
    pub email_from: String,

    /// IANA time zone used to interpret scheduled dates, e.g. "Asia/Kolkata"
    #[envconfig(default = "UTC")]
    pub schedule_timezone: String,
}

impl AppConfig {
    /// Checks if running in production environment
    pub fn is_prod(&self) -> bool {
        self.env.to_lowercase() == "prod"
    }

    /// Constructs the WhatsApp Business API endpoint for sending messages
    pub fn whatsapp_send_msg_endpoint(&self) -> String {
        format!(
            "{base}/{id}/messages",
            base = self.whatsapp_api_base_url.trim_end_matches('/'),
            id = self.whatsapp_business_phone_number_id
        )
    }

    pub fn otp_settings(&self) -> anyhow::Result<OtpSettings> {
        OtpSettings {
            length: self.otp_length,
            ttl_seconds: self.otp_ttl_seconds,
            max_attempts: self.otp_max_attempts,
        }
        .validated()
    }

    /// Parses the configured scheduling time zone
    pub fn schedule_tz(&self) -> anyhow::Result<chrono_tz::Tz> {
        chrono_tz::Tz::from_str(&self.schedule_timezone).map_err(|e| {
            anyhow::anyhow!(
                "invalid SCHEDULE_TIMEZONE {}: {}",
                self.schedule_timezone,
                e
            )
        })
    }
}
