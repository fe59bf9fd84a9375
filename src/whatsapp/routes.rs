//! WhatsApp webhook endpoint handlers
//!
//! The verification endpoint (GET) answers Meta's subscription challenge.
//! The receiver (POST) checks `X-Hub-Signature-256` against the raw body
//! before anything is parsed.

use super::{schemas, security};
use crate::{
    consts, metric,
    web::{AppState, errors::ApiError},
};
use ntex::{util::Bytes, web};
use serde::Deserialize;

/// Query parameters for webhook verification
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    /// The mode parameter, should be "subscribe"
    #[serde(rename = "hub.mode")]
    pub mode: String,
    /// The verification token from WhatsApp
    #[serde(rename = "hub.verify_token")]
    pub verify_token: String,
    /// The challenge string to echo back
    #[serde(rename = "hub.challenge")]
    pub challenge: String,
}

/// Webhook verification endpoint (GET)
///
/// # Returns
/// - 200 with challenge string if verification succeeds
/// - 403 if verification fails
#[web::get("")]
pub async fn verify(
    query: web::types::Query<VerifyQuery>,
    app_state: web::types::State<AppState>,
) -> Result<impl web::Responder, web::Error> {
    if query.mode != "subscribe" || query.verify_token != app_state.config.whatsapp_verify_token {
        logfire::warn!("Webhook verification rejected");
        return Err(ApiError::Forbidden.into());
    }

    Ok(web::HttpResponse::Ok()
        .content_type("text/plain")
        .body(query.challenge.clone()))
}

/// Webhook receiver endpoint (POST)
///
/// An invalid or missing signature is answered with 401 and nothing is
/// processed. Processing errors of single events are logged, the provider
/// still gets a 200 so it does not redeliver the whole batch.
#[web::post("")]
pub async fn receive(
    req: web::HttpRequest,
    body: Bytes,
    app_state: web::types::State<AppState>,
) -> Result<impl web::Responder, web::Error> {
    let signature = req
        .headers()
        .get(consts::SIGNATURE_HEADER_NAME)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !security::verify_signature(signature, &body, &app_state.config.whatsapp_app_secret) {
        metric::incr_webhook_statds("invalid_signature");
        return Err(ApiError::Unauthorized.into());
    }

    let payload: schemas::WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            logfire::error!(
                "Failed to parse webhook payload: {error}",
                error = e.to_string()
            );
            return Err(ApiError::BadRequest("invalid webhook payload".to_string()).into());
        }
    };

    app_state.inbound.process_webhook(&payload).await;

    Ok(web::HttpResponse::Ok().json(&serde_json::json!({
        "status": "received"
    })))
}
