use super::internal_api;
use crate::whatsapp;
use ntex::web;

pub fn whatsapp_webhook(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/webhook/whatsapp").service((whatsapp::verify, whatsapp::receive)),
    );
}

pub fn internal(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/internal")
            .service(web::scope("/whatsapp/scheduled").service((
                internal_api::dispatch_scheduled,
                internal_api::create_scheduled,
                internal_api::cancel_scheduled,
            )))
            .service(web::scope("/whatsapp/notify").service(internal_api::notify))
            .service(web::scope("/otp").service((
                internal_api::issue_otp,
                internal_api::verify_otp,
                internal_api::purge_otps,
            ))),
    );
}
