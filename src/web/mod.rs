//! HTTP surface: the WhatsApp webhook and the internal trigger API.

pub mod errors;
pub mod internal_api;
pub mod routes;

use crate::{
    api::{
        otp::{OtpManager, SendVia},
        scheduled::ScheduledDispatchRunner,
    },
    config::AppConfig,
    whatsapp::{facade::MessagingFacade, handler::InboundEventProcessor},
};
use std::sync::Arc;

/// Components shared by every worker. Built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub facade: Arc<MessagingFacade>,
    pub inbound: Arc<InboundEventProcessor>,
    pub otp: Arc<OtpManager>,
    /// Channels used by `/internal/otp/issue`
    pub otp_send_via: SendVia,
    pub scheduled: Arc<ScheduledDispatchRunner>,
}
