use opentelemetry::{KeyValue, metrics::UpDownCounter};
use std::sync::LazyLock;

static STATDS: LazyLock<UpDownCounter<i64>> = LazyLock::new(|| {
    logfire::i64_up_down_counter("shop_messaging_statds")
        .with_description("Transactional messaging statistics")
        .with_unit("event")
        .build()
});

fn incr_statds(metric: &'static str, value: String) {
    STATDS.add(1, &[KeyValue::new(metric, value)]);
}

/// `outcome` is `sent`, `fallback` or an error code.
pub fn incr_message_send_statds(outcome: &str) {
    incr_statds("message_send", outcome.into())
}

pub fn incr_otp_statds(outcome: &str) {
    incr_statds("otp", outcome.into())
}

pub fn incr_webhook_statds(event: &str) {
    incr_statds("webhook", event.into())
}

pub fn incr_scheduled_statds(outcome: &str) {
    incr_statds("scheduled_message", outcome.into())
}
