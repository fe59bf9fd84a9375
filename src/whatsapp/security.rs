//! Signature verification for incoming WhatsApp webhook requests.
//!
//! Meta signs every webhook payload with HMAC-SHA256 keyed by the app secret
//! and sends it in the `X-Hub-Signature-256` header as `sha256=<hex>`.
//!
//! - The signature MUST be computed on the raw request body bytes, not parsed JSON
//! - The comparison is constant-time
//! - Any decoding problem is a failed verification, never an error

use crate::consts;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Verifies the X-Hub-Signature-256 header against the request payload
///
/// # Arguments
///
/// * `signature_header` - The value of the X-Hub-Signature-256 header (e.g., "sha256=abc123...")
/// * `payload` - The raw request body bytes
/// * `app_secret` - The app secret shared with the provider
///
/// # Returns
///
/// `true` only when the header carries the exact HMAC of `payload`.
pub fn verify_signature(signature_header: &str, payload: &[u8], app_secret: &str) -> bool {
    let Some(signature_hex) = signature_header.strip_prefix(consts::SIGNATURE_PREFIX) else {
        logfire::warn!("Invalid signature header format: expected 'sha256=' prefix");
        return false;
    };

    let expected_signature = match hex::decode(signature_hex.trim()) {
        Ok(sig) => sig,
        Err(e) => {
            logfire::warn!(
                "Failed to decode signature hex: {error}",
                error = e.to_string()
            );
            return false;
        }
    };

    let computed_signature = match sign(payload, app_secret) {
        Ok(signature) => signature,
        Err(e) => {
            logfire::error!(
                "Failed to create HMAC instance: {error}",
                error = e.to_string()
            );
            return false;
        }
    };

    // ct_eq on slices of different length is false without comparing bytes
    let is_valid: bool = computed_signature.ct_eq(&expected_signature[..]).into();

    if !is_valid {
        logfire::warn!("Webhook signature verification failed: signatures do not match");
    }

    is_valid
}

fn sign(payload: &[u8], app_secret: &str) -> Result<Vec<u8>, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes())?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Builds a header value for `payload`, as the provider would send it.
pub fn signature_header_for(payload: &[u8], app_secret: &str) -> Option<String> {
    sign(payload, app_secret)
        .ok()
        .map(|signature| format!("{}{}", consts::SIGNATURE_PREFIX, hex::encode(signature)))
}
