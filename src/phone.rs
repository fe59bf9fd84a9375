//! Phone number canonicalization.
//!
//! Every number that reaches the provider, the chat sessions table or the
//! otp table goes through [`PhoneNormalizer::normalize`] first, so all of them
//! share a single digits-only international form.

use regex::Regex;
use std::sync::LazyLock;

/// Characters humans put in phone numbers that carry no digits.
static PHONE_NOISE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s+\-()]").unwrap());

/// Shape accepted by the provider. This is the real gate before any network call.
/// ASCII digits only, `\d` would also accept other scripts.
static VALID_PHONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{10,15}$").unwrap());

#[derive(Debug, Clone)]
pub struct PhoneNormalizer {
    country_code: String,
}

impl PhoneNormalizer {
    pub fn new(country_code: &str) -> Self {
        Self {
            country_code: country_code.trim().trim_start_matches('+').to_string(),
        }
    }

    /// Canonicalizes `raw` into digits prefixed with the country code.
    ///
    /// Malformed input is normalized best-effort; callers validate the
    /// result with [`is_valid_phone`].
    pub fn normalize(&self, raw: &str) -> String {
        let mut phone = PHONE_NOISE.replace_all(raw.trim(), "").into_owned();

        if phone.len() == 11 && phone.starts_with('0') {
            phone.remove(0);
        }

        if phone.len() == 10 && !phone.starts_with(&self.country_code) {
            phone.insert_str(0, &self.country_code);
        }

        phone
    }

    /// True when a free-form stored number is the same line as `canonical`.
    ///
    /// Suffix matches in SQL are only a pre-filter: `+1 415 555 0100` and
    /// `+91 41555 50100` share their last 10 digits.
    pub fn is_same_phone(&self, stored: &str, canonical: &str) -> bool {
        self.normalize(stored) == canonical
    }

    /// Returns the normalized phone when `raw` is phone shaped.
    pub fn normalize_valid(&self, raw: &str) -> Option<String> {
        let phone = self.normalize(raw);
        is_valid_phone(&phone).then_some(phone)
    }
}

pub fn is_valid_phone(phone: &str) -> bool {
    VALID_PHONE.is_match(phone)
}

/// Tells phone identifiers apart from e-mail identifiers.
pub fn looks_like_phone(identifier: &str) -> bool {
    !identifier.contains('@')
        && identifier
            .chars()
            .any(|c| c.is_ascii_digit())
        && identifier
            .chars()
            .all(|c| c.is_ascii_digit() || " +-()".contains(c))
}
