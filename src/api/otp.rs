//! One-time codes: issuance, delivery and verification.
//!
//! Codes are stored as SHA-256 hex digests only. Each identifier (normalized
//! phone or lower-cased e-mail) has at most one unused record, enforced by
//! deleting older unused rows before inserting a new one.

use crate::{
    metric,
    models::{otp::OtpRecord, user::UserRef},
    phone::{self, PhoneNormalizer},
    repo, utils,
};
use async_trait::async_trait;
use chrono::Utc;
use derive_more::{Display, Error};
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Longest code that still fits a `u64` draw.
pub const MAX_OTP_LENGTH: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OtpSettings {
    /// Number of digits in a code
    pub length: u32,
    pub ttl_seconds: i64,
    /// Failed verifications allowed before the record is burned
    pub max_attempts: i64,
}

impl Default for OtpSettings {
    fn default() -> Self {
        Self {
            length: 6,
            ttl_seconds: 300,
            max_attempts: 5,
        }
    }
}

impl OtpSettings {
    /// Rejects settings under which no issued code could ever verify.
    pub fn validated(self) -> anyhow::Result<Self> {
        if !(1..=MAX_OTP_LENGTH).contains(&self.length) {
            anyhow::bail!(
                "OTP_LENGTH must be between 1 and {MAX_OTP_LENGTH}, got {}",
                self.length
            );
        }
        if self.ttl_seconds <= 0 {
            anyhow::bail!("OTP_TTL_SECONDS must be positive, got {}", self.ttl_seconds);
        }
        if self.max_attempts <= 0 {
            anyhow::bail!(
                "OTP_MAX_ATTEMPTS must be positive, got {}",
                self.max_attempts
            );
        }
        Ok(self)
    }
}

/// A way to get a code in front of the user.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OtpChannel: Send + Sync {
    async fn deliver_code(&self, destination: &str, code: &str) -> anyhow::Result<()>;
}

/// Delivery options for [`OtpManager::issue`].
#[derive(Clone, Default)]
pub struct SendVia {
    pub whatsapp: Option<Arc<dyn OtpChannel>>,
    pub email: Option<Arc<dyn OtpChannel>>,
    /// E-mail used when a phone identifier cannot be reached on WhatsApp.
    /// Looked up from the user owning the phone when absent.
    pub fallback_email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpChannelKind {
    WhatsApp,
    Email,
}

#[derive(Debug, Clone)]
pub struct IssuedOtp {
    pub identifier: String,
    pub delivered: bool,
    pub channel: Option<OtpChannelKind>,
    /// Raw code for the caller. Never logged.
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedOtp {
    pub identifier: String,
    pub user: Option<UserRef>,
}

#[derive(Debug, Display, Error, PartialEq)]
pub enum OtpError {
    #[display("no active code for this identifier")]
    NotFound,
    #[display("code expired")]
    Expired,
    #[display("too many failed attempts")]
    AttemptsExceeded,
    #[display("invalid code")]
    Invalid,
    #[display("code does not have the expected format")]
    FormatMismatch,
    #[display("otp storage error: {_0}")]
    Storage(#[error(not(source))] String),
}

impl OtpError {
    pub fn code(&self) -> &'static str {
        match self {
            OtpError::NotFound => "not_found",
            OtpError::Expired => "expired",
            OtpError::AttemptsExceeded => "attempts_exceeded",
            OtpError::Invalid => "invalid",
            OtpError::FormatMismatch => "format_mismatch",
            OtpError::Storage(_) => "storage",
        }
    }
}

fn storage(e: anyhow::Error) -> OtpError {
    OtpError::Storage(e.to_string())
}

pub struct OtpManager {
    repo: repo::ImplAppRepo,
    normalizer: PhoneNormalizer,
    settings: OtpSettings,
}

impl OtpManager {
    pub fn new(repo: repo::ImplAppRepo, normalizer: PhoneNormalizer, settings: OtpSettings) -> Self {
        Self {
            repo,
            normalizer,
            settings,
        }
    }

    pub fn settings(&self) -> OtpSettings {
        self.settings
    }

    /// Phones are normalized, anything else is treated as an e-mail.
    pub fn normalize_identifier(&self, raw: &str) -> String {
        if phone::looks_like_phone(raw) {
            self.normalizer.normalize(raw)
        } else {
            raw.trim().to_lowercase()
        }
    }

    /// Creates a fresh code for `identifier`, replacing any unused one, and
    /// tries to deliver it.
    ///
    /// Phone identifiers go to WhatsApp first and fall back to e-mail when
    /// that fails or no WhatsApp channel is given.
    pub async fn issue(&self, identifier: &str, send_via: &SendVia) -> anyhow::Result<IssuedOtp> {
        let identifier = self.normalize_identifier(identifier);
        let code = generate_code(self.settings.length);

        self.repo.delete_unused_otps(&identifier).await?;
        self.repo
            .insert_otp(&OtpRecord::new(
                &identifier,
                hash_code(&code),
                self.settings.ttl_seconds,
            ))
            .await?;

        let channel = self.deliver(&identifier, &code, send_via).await;
        metric::incr_otp_statds(if channel.is_some() {
            "issued"
        } else {
            "undelivered"
        });

        Ok(IssuedOtp {
            identifier,
            delivered: channel.is_some(),
            channel,
            code,
        })
    }

    async fn deliver(
        &self,
        identifier: &str,
        code: &str,
        send_via: &SendVia,
    ) -> Option<OtpChannelKind> {
        if !phone::looks_like_phone(identifier) {
            let email = send_via.email.as_ref()?;
            return try_channel(email.as_ref(), identifier, code)
                .await
                .then_some(OtpChannelKind::Email);
        }

        if let Some(whatsapp) = &send_via.whatsapp {
            if try_channel(whatsapp.as_ref(), identifier, code).await {
                return Some(OtpChannelKind::WhatsApp);
            }
        }

        let email = send_via.email.as_ref()?;
        let address = match &send_via.fallback_email {
            Some(address) => Some(address.trim().to_lowercase()),
            None => utils::best_effort("otp fallback e-mail lookup", self.user_by_phone(identifier))
                .await
                .flatten()
                .and_then(|user| user.email),
        }?;

        try_channel(email.as_ref(), &address, code)
            .await
            .then_some(OtpChannelKind::Email)
    }

    /// Checks `raw_code` against the active record for `identifier`.
    ///
    /// Expiry is checked before the code, so an expired record never reports
    /// `Invalid`. A malformed code is rejected without consuming an attempt.
    pub async fn verify(&self, identifier: &str, raw_code: &str) -> Result<VerifiedOtp, OtpError> {
        let identifier = self.normalize_identifier(identifier);
        let result = self.check(&identifier, raw_code).await;

        match &result {
            Ok(_) => metric::incr_otp_statds("verified"),
            Err(e) => metric::incr_otp_statds(e.code()),
        }

        result
    }

    async fn check(&self, identifier: &str, raw_code: &str) -> Result<VerifiedOtp, OtpError> {
        let record = self
            .repo
            .get_latest_unused_otp(identifier)
            .await
            .map_err(storage)?
            .ok_or(OtpError::NotFound)?;

        if record.is_expired_at(Utc::now()) {
            self.repo.mark_otp_used(record.id).await.map_err(storage)?;
            return Err(OtpError::Expired);
        }

        if record.attempts >= self.settings.max_attempts {
            self.repo.mark_otp_used(record.id).await.map_err(storage)?;
            return Err(OtpError::AttemptsExceeded);
        }

        let code = raw_code.trim();
        if code.len() != self.settings.length as usize || !code.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(OtpError::FormatMismatch);
        }

        let supplied = hash_code(code);
        let stored = record.code_hash.as_bytes();
        let matches = supplied.len() == stored.len() && bool::from(supplied.as_bytes().ct_eq(stored));

        if !matches {
            let attempts = self
                .repo
                .increment_otp_attempts(record.id)
                .await
                .map_err(storage)?;

            if attempts >= self.settings.max_attempts {
                self.repo.mark_otp_used(record.id).await.map_err(storage)?;
                return Err(OtpError::AttemptsExceeded);
            }
            return Err(OtpError::Invalid);
        }

        self.repo.mark_otp_used(record.id).await.map_err(storage)?;

        let user = if phone::looks_like_phone(identifier) {
            utils::best_effort("otp user lookup", self.user_by_phone(identifier)).await
        } else {
            utils::best_effort("otp user lookup", self.repo.find_user_by_email(identifier)).await
        }
        .flatten();

        Ok(VerifiedOtp {
            identifier: identifier.to_string(),
            user,
        })
    }

    /// Owner of exactly this canonical phone, never a number from another
    /// country that shares the national part.
    async fn user_by_phone(&self, phone: &str) -> anyhow::Result<Option<UserRef>> {
        let candidates = self.repo.find_users_by_phone_suffix(phone).await?;

        Ok(candidates.into_iter().find(|user| {
            user.phone
                .as_deref()
                .is_some_and(|stored| self.normalizer.is_same_phone(stored, phone))
        }))
    }

    /// Deletes expired records. Meant for a periodic trigger.
    pub async fn purge_expired(&self) -> anyhow::Result<u64> {
        let deleted = self.repo.delete_expired_otps(Utc::now()).await?;
        logfire::info!("purged {deleted} expired otp records", deleted = deleted as i64);
        Ok(deleted)
    }
}

async fn try_channel(channel: &dyn OtpChannel, destination: &str, code: &str) -> bool {
    match channel.deliver_code(destination, code).await {
        Ok(()) => true,
        Err(e) => {
            logfire::warn!("otp delivery failed: {error}", error = e.to_string());
            false
        }
    }
}

/// Uniform draw over `0..10^length`, left padded with zeros.
fn generate_code(length: u32) -> String {
    let length = length.clamp(1, MAX_OTP_LENGTH);
    let value = rand::thread_rng().gen_range(0..10u64.pow(length));
    format!("{value:0width$}", width = length as usize)
}

fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}
