//! WhatsApp Business integration
//!
//! ## Submodules
//!
//! - [`client`] - Provider transport and its reqwest implementation
//! - [`outgoing_schemas`] - Outbound message bodies and provider replies
//! - [`templates`] - Template names, variables and component builders
//! - [`dispatcher`] - Template and plain-text sends with retry and error classification
//! - [`facade`] - Business-named sends and the plain-text fallback policy
//! - [`schemas`] - Incoming webhook payloads
//! - [`security`] - Webhook signature verification
//! - [`handler`] - Inbound messages, COD replies and status callbacks
//! - [`routes`] - HTTP endpoints for the webhook

pub mod client;
pub mod dispatcher;
pub mod facade;
pub mod handler;
pub mod outgoing_schemas;
pub mod routes;
pub mod schemas;
pub mod security;
pub mod templates;

pub use routes::{receive, verify};
