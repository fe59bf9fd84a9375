pub const SIGNATURE_HEADER_NAME: &str = "X-Hub-Signature-256";
pub const SIGNATURE_PREFIX: &str = "sha256=";
pub const INTERNAL_SECRET_HEADER_NAME: &str = "X-Internal-Secret";

pub const MESSAGING_PRODUCT: &str = "whatsapp";

/// Max rows drained by one scheduled dispatch run.
pub const SCHEDULED_BATCH_SIZE: i64 = 50;
/// Hour of day (09:00) used when a scheduled date comes without a time.
pub const DEFAULT_SCHEDULE_HOUR: u32 = 9;

/// Delay between the first provider attempt and its single retry.
pub const PROVIDER_RETRY_DELAY_MS: u32 = 1_000;

/// Provider error codes that point at the template itself:
/// param count mismatch, missing template, translated text too long,
/// formatting policy, param format mismatch, paused and disabled templates.
pub const TEMPLATE_ERROR_CODES: [i64; 7] = [132000, 132001, 132005, 132007, 132012, 132015, 132016];
pub const TEMPLATE_ERROR_HINTS: [&str; 3] = ["template", "parameter", "translation"];

pub const CHAT_SESSION_ACTIVE: &str = "active";
pub const INBOUND_MESSAGE_RECEIVED: &str = "received";

/// Payment method values flagged as cash-on-delivery.
pub const COD_PAYMENT_METHODS: [&str; 3] = ["cod", "cash_on_delivery", "cash on delivery"];

pub const COD_CONFIRMED_REPLY: &str =
    "Thank you! Your cash-on-delivery order has been confirmed and will be processed shortly.";
pub const COD_CANCELLED_REPLY: &str =
    "Your cash-on-delivery order has been cancelled. Reply to this chat if this was a mistake.";
