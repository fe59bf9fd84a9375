//! # Shop Messaging
//!
//! Transactional WhatsApp messaging for the storefront: template sends,
//! one-time codes, the signed webhook receiver and scheduled dispatch.
#![recursion_limit = "256"]

pub mod api;
pub mod config;
pub mod consts;
pub mod logger;
pub mod metric;
pub mod models;
pub mod phone;
pub mod repo;
pub mod services;
pub mod utils;
pub mod web;
pub mod whatsapp;

use api::{
    otp::{OtpChannel, OtpManager, SendVia},
    scheduled::ScheduledDispatchRunner,
};
use envconfig::Envconfig;
use logfire::config::MetricsOptions;
use ntex::web as ntex_web;
use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod};
use std::sync::Arc;
use whatsapp::{
    client::WhatsAppClient,
    dispatcher::TemplateDispatcher,
    facade::MessagingFacade,
    handler::InboundEventProcessor,
    templates::{TemplateContext, TemplateRegistry},
};

#[ntex::main]
async fn main() -> anyhow::Result<()> {
    let app_config = Arc::new(config::AppConfig::init_from_env()?);

    // Initialize logging and metrics
    let shutdown_handler = if app_config.logfire_token.is_empty() {
        logger::setup_simple_logger()?;
        None
    } else {
        Some(
            logfire::configure()
                .install_panic_handler()
                .with_metrics(Some(MetricsOptions::default()))
                .send_to_logfire(logfire::config::SendToLogfire::Yes)
                .with_token(&app_config.logfire_token)
                .finish()?,
        )
    };

    // Initialize database connection pool
    let db_pool = utils::setup_sqlite_db_pool(&app_config).await?;
    utils::run_migrations(&db_pool).await?;
    let app_repo: repo::ImplAppRepo = Arc::new(repo::sqlite::SqlxSqliteRepo { db_pool });

    let app_state = create_app_state(app_config.clone(), app_repo)?;

    configure_and_run_server(&app_config, app_state).await?;

    if let Some(shutdown_handler) = shutdown_handler {
        shutdown_handler.shutdown()?;
    }

    Ok(())
}

/// Wires the messaging components on top of the repository.
fn create_app_state(
    app_config: Arc<config::AppConfig>,
    app_repo: repo::ImplAppRepo,
) -> anyhow::Result<web::AppState> {
    let normalizer = phone::PhoneNormalizer::new(&app_config.default_country_code);

    let dispatcher = Arc::new(TemplateDispatcher::new(
        Arc::new(WhatsAppClient::new(&app_config)?),
        normalizer.clone(),
        TemplateRegistry::default(),
        TemplateContext {
            button_domain: app_config.whatsapp_button_domain.clone(),
        },
    ));
    let facade = Arc::new(MessagingFacade::new(
        dispatcher,
        app_repo.clone(),
        &app_config.whatsapp_default_language,
        &app_config.whatsapp_button_domain,
    ));

    let otp_settings = app_config.otp_settings()?;
    let email_channel = services::email::HttpEmailService::from_config(&app_config)?.map(|email| {
        Arc::new(services::email::EmailOtpChannel::new(
            Arc::new(email),
            otp_settings.ttl_seconds,
        )) as Arc<dyn OtpChannel>
    });
    if email_channel.is_none() {
        logfire::warn!("EMAIL_API_URL is not set, otp codes go out over WhatsApp only");
    }

    Ok(web::AppState {
        inbound: Arc::new(InboundEventProcessor::new(
            app_repo.clone(),
            facade.clone(),
            normalizer.clone(),
        )),
        otp: Arc::new(OtpManager::new(
            app_repo.clone(),
            normalizer.clone(),
            otp_settings,
        )),
        otp_send_via: SendVia {
            whatsapp: Some(facade.clone() as Arc<dyn OtpChannel>),
            email: email_channel,
            fallback_email: None,
        },
        scheduled: Arc::new(ScheduledDispatchRunner::new(
            app_repo,
            facade.clone(),
            normalizer,
            app_config.schedule_tz()?,
        )),
        facade,
        config: app_config,
    })
}

/// Configures SSL acceptor for production environments
fn setup_ssl_acceptor(
    app_config: &config::AppConfig,
) -> anyhow::Result<openssl::ssl::SslAcceptorBuilder> {
    let mut ssl_acceptor = SslAcceptor::mozilla_intermediate(SslMethod::tls_server())
        .map_err(|e| anyhow::anyhow!("Failed to create SSL acceptor: {}", e))?;

    ssl_acceptor
        .set_private_key_file(&app_config.private_key_path, SslFiletype::PEM)
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to load private key from {}: {}",
                app_config.private_key_path,
                e
            )
        })?;

    ssl_acceptor
        .set_certificate_file(&app_config.certificate_path, SslFiletype::PEM)
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to load certificate from {}: {}",
                app_config.certificate_path,
                e
            )
        })?;

    Ok(ssl_acceptor)
}

/// Configures and starts the web server with appropriate SSL settings
async fn configure_and_run_server(
    app_config: &config::AppConfig,
    app_state: web::AppState,
) -> anyhow::Result<()> {
    let server_addr = ("0.0.0.0", app_config.wep_server_port);

    let server = ntex_web::server(move || {
        ntex_web::App::new()
            .wrap(ntex_web::middleware::Logger::default())
            .wrap(ntex_web::middleware::Compress::default())
            .state(app_state.clone())
            .configure(web::routes::whatsapp_webhook)
            .configure(web::routes::internal)
    });

    let bound_server = if app_config.is_prod() {
        let ssl_acceptor = setup_ssl_acceptor(app_config)?;
        server.bind_openssl(server_addr, ssl_acceptor)?
    } else {
        server.bind(server_addr)?
    };

    bound_server
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))
}
