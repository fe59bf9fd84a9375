//! # API Module
//!
//! Business logic consumed by the internal API and the auth flows.
//!
//! ## Modules
//!
//! - [`otp`] - One-time code issuance and verification
//! - [`scheduled`] - Scheduled message outbox and its dispatch runner

pub mod otp;
pub mod scheduled;
