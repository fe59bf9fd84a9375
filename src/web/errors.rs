use crate::{
    api::otp::OtpError,
    whatsapp::dispatcher::{INVALID_PHONE, SendError},
};
use derive_more::{Display, Error};
use ntex::{http, web};
use serde_json::json;

#[derive(Debug, Display, Error)]
pub enum ApiError {
    #[display("unauthorized")]
    Unauthorized,
    #[display("forbidden")]
    Forbidden,
    #[display("bad request: {_0}")]
    BadRequest(#[error(not(source))] String),
    #[display("unknown operation: {_0}")]
    UnknownOperation(#[error(not(source))] String),
    #[display("{_0}")]
    Otp(OtpError),
    #[display("provider error: {_0}")]
    Provider(SendError),
    #[display("internal error: {_0}")]
    Internal(#[error(not(source))] String),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<OtpError> for ApiError {
    fn from(e: OtpError) -> Self {
        match e {
            OtpError::Storage(msg) => ApiError::Internal(msg),
            other => ApiError::Otp(other),
        }
    }
}

impl web::error::WebResponseError for ApiError {
    fn error_response(&self, _: &web::HttpRequest) -> web::HttpResponse {
        let body = match self {
            ApiError::Otp(e) => json!({"error": e.code(), "message": e.to_string()}),
            ApiError::Provider(e) => json!({
                "error": e.code,
                "message": e.message,
                "is_template_error": e.is_template_error,
                "is_permanent": e.is_permanent,
            }),
            ApiError::Internal(msg) => {
                logfire::error!("internal api error: {error}", error = msg.clone());
                json!({"error": "internal"})
            }
            other => json!({"error": other.to_string()}),
        };

        web::HttpResponse::build(self.status_code()).json(&body)
    }

    fn status_code(&self) -> http::StatusCode {
        match self {
            ApiError::Unauthorized => http::StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => http::StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => http::StatusCode::BAD_REQUEST,
            ApiError::UnknownOperation(_) => http::StatusCode::NOT_FOUND,
            ApiError::Provider(e) if e.code == INVALID_PHONE => http::StatusCode::BAD_REQUEST,
            ApiError::Provider(_) => http::StatusCode::BAD_GATEWAY,
            ApiError::Otp(OtpError::NotFound) => http::StatusCode::NOT_FOUND,
            ApiError::Otp(OtpError::AttemptsExceeded) => http::StatusCode::TOO_MANY_REQUESTS,
            ApiError::Otp(_) => http::StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
