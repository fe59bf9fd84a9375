//! Internal API endpoints for the periodic trigger and the auth flows.
//!
//! These endpoints are not exposed to the public internet. They require
//! authentication via the X-Internal-Secret header.

use super::{AppState, errors::ApiError};
use crate::{
    api::{
        otp::{OtpChannelKind, SendVia},
        scheduled::ScheduleRequest,
    },
    consts,
    models::notification,
};
use chrono::Utc;
use ntex::web;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use subtle::ConstantTimeEq;

/// Verifies the internal API secret from the request headers.
fn verify_internal_secret(req: &web::HttpRequest, expected: &str) -> bool {
    let secret = req
        .headers()
        .get(consts::INTERNAL_SECRET_HEADER_NAME)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    !expected.is_empty() && bool::from(secret.as_bytes().ct_eq(expected.as_bytes()))
}

fn authorize(req: &web::HttpRequest, app_state: &AppState) -> Result<(), web::Error> {
    if verify_internal_secret(req, &app_state.config.internal_api_secret) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized.into())
    }
}

/// Drains due scheduled messages. Called by the periodic trigger.
#[web::post("/dispatch")]
pub async fn dispatch_scheduled(
    req: web::HttpRequest,
    app_state: web::types::State<AppState>,
) -> Result<impl web::Responder, web::Error> {
    authorize(&req, &app_state)?;

    let summary = app_state
        .scheduled
        .run_due(Utc::now())
        .await
        .map_err(|e| {
            tracing::error!("Failed to run scheduled dispatch: {}", e);
            ApiError::from(e)
        })?;

    Ok(web::HttpResponse::Ok().json(&summary))
}

#[derive(Serialize)]
pub struct ScheduledCreatedResponse {
    pub ids: Vec<i64>,
}

#[web::post("")]
pub async fn create_scheduled(
    req: web::HttpRequest,
    body: web::types::Json<ScheduleRequest>,
    app_state: web::types::State<AppState>,
) -> Result<impl web::Responder, web::Error> {
    authorize(&req, &app_state)?;

    let ids = app_state
        .scheduled
        .schedule(&body)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    Ok(web::HttpResponse::Created().json(&ScheduledCreatedResponse { ids }))
}

#[derive(Deserialize)]
pub struct ScheduledPath {
    pub id: i64,
}

#[derive(Serialize)]
pub struct CancelledResponse {
    pub cancelled: bool,
}

#[web::post("/{id}/cancel")]
pub async fn cancel_scheduled(
    req: web::HttpRequest,
    path: web::types::Path<ScheduledPath>,
    app_state: web::types::State<AppState>,
) -> Result<impl web::Responder, web::Error> {
    authorize(&req, &app_state)?;

    let cancelled = app_state
        .scheduled
        .cancel(path.id)
        .await
        .map_err(ApiError::from)?;

    Ok(web::HttpResponse::Ok().json(&CancelledResponse { cancelled }))
}

#[derive(Deserialize)]
pub struct NotifyPath {
    pub operation: String,
}

/// `data` carries the operation's own fields, e.g. a `CartRecovery` for `cart_recovery`.
#[derive(Deserialize)]
pub struct NotifyRequest {
    pub phone: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Deserialize)]
struct CustomerName {
    customer_name: String,
}

#[derive(Deserialize)]
struct AuthCode {
    code: String,
}

fn notify_data<T: DeserializeOwned>(operation: &str, data: serde_json::Value) -> Result<T, ApiError> {
    serde_json::from_value(data)
        .map_err(|e| ApiError::BadRequest(format!("invalid {operation} data: {e}")))
}

/// Sends one business notification through the messaging facade.
#[web::post("/{operation}")]
pub async fn notify(
    req: web::HttpRequest,
    path: web::types::Path<NotifyPath>,
    body: web::types::Json<NotifyRequest>,
    app_state: web::types::State<AppState>,
) -> Result<impl web::Responder, web::Error> {
    authorize(&req, &app_state)?;

    let operation = path.operation.as_str();
    let NotifyRequest { phone, data } = body.into_inner();
    let facade = &app_state.facade;

    let sent = match operation {
        "password_reset_code" => {
            let data: AuthCode = notify_data(operation, data)?;
            facade.send_password_reset_code(&phone, &data.code).await
        }
        "signup_confirmation" => {
            let data: AuthCode = notify_data(operation, data)?;
            facade.send_signup_confirmation(&phone, &data.code).await
        }
        "login_alert" => {
            let data: notification::LoginAlert = notify_data(operation, data)?;
            facade.send_login_alert(&phone, &data).await
        }
        "greeting" => {
            let data: CustomerName = notify_data(operation, data)?;
            facade.send_greeting(&phone, &data.customer_name).await
        }
        "welcome" => {
            let data: CustomerName = notify_data(operation, data)?;
            facade.send_welcome(&phone, &data.customer_name).await
        }
        "cart_recovery" => {
            let data: notification::CartRecovery = notify_data(operation, data)?;
            facade.send_cart_recovery(&phone, &data).await
        }
        "order_shipped" => {
            let data: notification::OrderShipment = notify_data(operation, data)?;
            facade.send_order_shipped(&phone, &data).await
        }
        "order_delivered" => {
            let data: notification::OrderDelivery = notify_data(operation, data)?;
            facade.send_order_delivered(&phone, &data).await
        }
        "refund_notice" => {
            let data: notification::RefundNotice = notify_data(operation, data)?;
            facade.send_refund_notice(&phone, &data).await
        }
        "cod_verification" => {
            let data: notification::CodVerification = notify_data(operation, data)?;
            facade.send_cod_verification(&phone, &data).await
        }
        other => return Err(ApiError::UnknownOperation(other.to_string()).into()),
    };

    let delivery = sent.map_err(|e| {
        tracing::warn!("notify {} to {} failed: {}", operation, phone, e);
        ApiError::Provider(e)
    })?;

    Ok(web::HttpResponse::Ok().json(&delivery))
}

#[derive(Deserialize)]
pub struct IssueOtpRequest {
    pub identifier: String,
    pub fallback_email: Option<String>,
}

#[derive(Serialize)]
pub struct IssueOtpResponse {
    pub identifier: String,
    pub delivered: bool,
    pub channel: Option<OtpChannelKind>,
    /// Only outside production, for local and staging testing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[web::post("/issue")]
pub async fn issue_otp(
    req: web::HttpRequest,
    body: web::types::Json<IssueOtpRequest>,
    app_state: web::types::State<AppState>,
) -> Result<impl web::Responder, web::Error> {
    authorize(&req, &app_state)?;

    let send_via = SendVia {
        fallback_email: body.fallback_email.clone(),
        ..app_state.otp_send_via.clone()
    };
    let issued = app_state
        .otp
        .issue(&body.identifier, &send_via)
        .await
        .map_err(ApiError::from)?;

    Ok(web::HttpResponse::Ok().json(&IssueOtpResponse {
        identifier: issued.identifier,
        delivered: issued.delivered,
        channel: issued.channel,
        code: (!app_state.config.is_prod()).then_some(issued.code),
    }))
}

#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    pub identifier: String,
    pub code: String,
}

#[web::post("/verify")]
pub async fn verify_otp(
    req: web::HttpRequest,
    body: web::types::Json<VerifyOtpRequest>,
    app_state: web::types::State<AppState>,
) -> Result<impl web::Responder, web::Error> {
    authorize(&req, &app_state)?;

    let verified = app_state
        .otp
        .verify(&body.identifier, &body.code)
        .await
        .map_err(ApiError::from)?;

    Ok(web::HttpResponse::Ok().json(&verified))
}

#[derive(Serialize)]
pub struct PurgedResponse {
    pub deleted: u64,
}

#[web::post("/purge")]
pub async fn purge_otps(
    req: web::HttpRequest,
    app_state: web::types::State<AppState>,
) -> Result<impl web::Responder, web::Error> {
    authorize(&req, &app_state)?;

    let deleted = app_state
        .otp
        .purge_expired()
        .await
        .map_err(ApiError::from)?;

    Ok(web::HttpResponse::Ok().json(&PurgedResponse { deleted }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{
            otp::{OtpManager, OtpSettings},
            scheduled::ScheduledDispatchRunner,
        },
        config::AppConfig,
        phone::PhoneNormalizer,
        repo::sqlite::in_memory_repo,
        web::routes,
        whatsapp::{
            client::MockMessagingTransport,
            dispatcher::tests::{accepted, dispatcher, rejected},
            facade::MessagingFacade,
            handler::InboundEventProcessor,
            security,
        },
    };
    use mockall::Sequence;
    use envconfig::Envconfig;
    use ntex::web::test;
    use std::{collections::HashMap, sync::Arc};

    async fn app_state() -> AppState {
        app_state_with(MockMessagingTransport::new()).await
    }

    async fn app_state_with(transport: MockMessagingTransport) -> AppState {
        let config = AppConfig::init_from_hashmap(&HashMap::from([
            ("DB_HOST".to_string(), "sqlite::memory:".to_string()),
            ("DB_PASS_ENCRYPT".to_string(), String::new()),
            ("WEP_SERVER_HOST".to_string(), "localhost".to_string()),
            ("INTERNAL_API_SECRET".to_string(), "internal".to_string()),
            (
                "WHATSAPP_BUSINESS_PHONE_NUMBER_ID".to_string(),
                "42".to_string(),
            ),
            ("WHATSAPP_BUSINESS_AUTH".to_string(), "token".to_string()),
            ("WHATSAPP_APP_SECRET".to_string(), "app-secret".to_string()),
            ("WHATSAPP_VERIFY_TOKEN".to_string(), "verify".to_string()),
            (
                "WHATSAPP_BUTTON_DOMAIN".to_string(),
                "shop.example.com".to_string(),
            ),
        ]))
        .unwrap();

        let repo = Arc::new(in_memory_repo().await);
        let normalizer = PhoneNormalizer::new("91");
        let facade = Arc::new(MessagingFacade::new(
            Arc::new(dispatcher(transport)),
            repo.clone(),
            "en",
            "shop.example.com",
        ));

        AppState {
            config: Arc::new(config),
            inbound: Arc::new(InboundEventProcessor::new(
                repo.clone(),
                facade.clone(),
                normalizer.clone(),
            )),
            otp: Arc::new(OtpManager::new(
                repo.clone(),
                normalizer.clone(),
                OtpSettings::default(),
            )),
            otp_send_via: SendVia::default(),
            scheduled: Arc::new(ScheduledDispatchRunner::new(
                repo,
                facade.clone(),
                normalizer,
                chrono_tz::UTC,
            )),
            facade,
        }
    }

    #[ntex::test]
    async fn test_internal_endpoints_require_secret() {
        let app = test::init_service(
            web::App::new()
                .state(app_state().await)
                .configure(routes::internal),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/internal/otp/purge")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);

        let req = test::TestRequest::post()
            .uri("/internal/otp/purge")
            .header(consts::INTERNAL_SECRET_HEADER_NAME, "wrong")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);

        let req = test::TestRequest::post()
            .uri("/internal/whatsapp/scheduled/dispatch")
            .header(consts::INTERNAL_SECRET_HEADER_NAME, "internal")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }

    #[ntex::test]
    async fn test_otp_issue_and_verify_over_http() {
        let app = test::init_service(
            web::App::new()
                .state(app_state().await)
                .configure(routes::internal),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/internal/otp/issue")
            .header(consts::INTERNAL_SECRET_HEADER_NAME, "internal")
            .set_json(&serde_json::json!({"identifier": "Asha@Example.com"}))
            .to_request();
        let issued: serde_json::Value = test::read_response_json(&app, req).await;
        assert_eq!(issued["delivered"], false);
        let code = issued["code"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri("/internal/otp/verify")
            .header(consts::INTERNAL_SECRET_HEADER_NAME, "internal")
            .set_json(&serde_json::json!({"identifier": "asha@example.com", "code": code}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);

        let req = test::TestRequest::post()
            .uri("/internal/otp/verify")
            .header(consts::INTERNAL_SECRET_HEADER_NAME, "internal")
            .set_json(&serde_json::json!({"identifier": "asha@example.com", "code": code}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);
    }

    #[ntex::test]
    async fn test_notify_strict_operation_reports_template_error() {
        let mut transport = MockMessagingTransport::new();
        transport
            .expect_post_message()
            .withf(|payload| payload["type"] == "template")
            .times(1)
            .returning(|_| rejected(404, 132001, "Template name does not exist"));
        let app = test::init_service(
            web::App::new()
                .state(app_state_with(transport).await)
                .configure(routes::internal),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/internal/whatsapp/notify/greeting")
            .header(consts::INTERNAL_SECRET_HEADER_NAME, "internal")
            .set_json(&serde_json::json!({
                "phone": "9876543210",
                "data": {"customer_name": "Asha"}
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 502);

        let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert_eq!(body["error"], "132001");
        assert_eq!(body["is_template_error"], true);
    }

    #[ntex::test]
    async fn test_notify_cart_recovery_falls_back_to_text() {
        let mut transport = MockMessagingTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_post_message()
            .withf(|payload| payload["type"] == "template")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| rejected(400, 132000, "Number of parameters does not match"));
        transport
            .expect_post_message()
            .withf(|payload| payload["type"] == "text")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| accepted("wamid.TEXT"));
        let app = test::init_service(
            web::App::new()
                .state(app_state_with(transport).await)
                .configure(routes::internal),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/internal/whatsapp/notify/cart_recovery")
            .header(consts::INTERNAL_SECRET_HEADER_NAME, "internal")
            .set_json(&serde_json::json!({
                "phone": "9876543210",
                "data": {
                    "customer_name": "Asha",
                    "item_count": 2,
                    "cart_total": {"amount_minor": 250000, "currency": "INR"}
                }
            }))
            .to_request();
        let delivery: serde_json::Value = test::read_response_json(&app, req).await;

        assert_eq!(delivery["provider_message_id"], "wamid.TEXT");
        assert_eq!(delivery["fallback_used"], true);
    }

    #[ntex::test]
    async fn test_notify_rejects_unknown_operation_and_bad_data() {
        let mut transport = MockMessagingTransport::new();
        transport.expect_post_message().never();
        let app = test::init_service(
            web::App::new()
                .state(app_state_with(transport).await)
                .configure(routes::internal),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/internal/whatsapp/notify/birthday")
            .header(consts::INTERNAL_SECRET_HEADER_NAME, "internal")
            .set_json(&serde_json::json!({"phone": "9876543210"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);

        let req = test::TestRequest::post()
            .uri("/internal/whatsapp/notify/order_shipped")
            .header(consts::INTERNAL_SECRET_HEADER_NAME, "internal")
            .set_json(&serde_json::json!({"phone": "9876543210", "data": {"customer_name": "Asha"}}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        let req = test::TestRequest::post()
            .uri("/internal/whatsapp/notify/greeting")
            .set_json(&serde_json::json!({"phone": "9876543210", "data": {"customer_name": "Asha"}}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);
    }

    #[ntex::test]
    async fn test_webhook_rejects_bad_signature() {
        let app = test::init_service(
            web::App::new()
                .state(app_state().await)
                .configure(routes::whatsapp_webhook),
        )
        .await;
        let body = r#"{"object":"whatsapp_business_account","entry":[]}"#;

        let req = test::TestRequest::post()
            .uri("/webhook/whatsapp")
            .header(consts::SIGNATURE_HEADER_NAME, "sha256=00")
            .set_payload(body)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);

        let signature = security::signature_header_for(body.as_bytes(), "app-secret").unwrap();
        let req = test::TestRequest::post()
            .uri("/webhook/whatsapp")
            .header(consts::SIGNATURE_HEADER_NAME, signature)
            .set_payload(body)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }

    #[ntex::test]
    async fn test_webhook_challenge() {
        let app = test::init_service(
            web::App::new()
                .state(app_state().await)
                .configure(routes::whatsapp_webhook),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/webhook/whatsapp?hub.mode=subscribe&hub.verify_token=verify&hub.challenge=42")
            .to_request();
        let body = test::read_response(&app, req).await;
        assert_eq!(body, ntex::util::Bytes::from_static(b"42"));

        let req = test::TestRequest::get()
            .uri("/webhook/whatsapp?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=42")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);
    }
}
