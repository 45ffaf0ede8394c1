//! Credential redaction
//!
//! Strips credentials from request headers before they are persisted and masks
//! owner keys in log output.

use std::collections::HashMap;
use std::fmt;

/// Replaces the value of a sensitive header
pub const REDACTED_MARKER: &str = "[REDACTED]";

/// Header names whose values are redacted (case-insensitive)
const SENSITIVE_HEADERS: [&str; 5] = [
    "authorization",
    "x-api-key",
    "cookie",
    "set-cookie",
    "proxy-authorization",
];

/// Masked display of an owner key
///
/// Shows the first 8 characters followed by `***`, safe to put in logs
#[derive(Clone, Debug)]
pub struct SensitiveApiKey<'a> {
    inner: &'a str,
}

impl<'a> SensitiveApiKey<'a> {
    /// Wrap a key for masked display
    ///
    /// # Example
    /// ```
    /// use request_history::redaction::SensitiveApiKey;
    ///
    /// let key = "cr_0123456789abcdef";
    /// let sanitized = SensitiveApiKey::new(key);
    /// assert_eq!(format!("{}", sanitized), "cr_01234***");
    /// ```
    pub fn new(key: &'a str) -> Self {
        Self { inner: key }
    }
}

impl<'a> fmt::Display for SensitiveApiKey<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let visible_len = 8.min(self.inner.len());
        if self.inner.len() <= visible_len || !self.inner.is_char_boundary(visible_len) {
            // too short to show a prefix
            write!(f, "***")
        } else {
            write!(f, "{}***", &self.inner[..visible_len])
        }
    }
}

/// Whether a header name is on the redaction denylist
pub fn is_sensitive_header(name: &str) -> bool {
    SENSITIVE_HEADERS
        .iter()
        .any(|sensitive| sensitive.eq_ignore_ascii_case(name))
}

/// Redact credential headers
///
/// Denylisted values become [`REDACTED_MARKER`]; everything else, including
/// the key casing, is kept as is. `None` yields an empty map.
pub fn sanitize_headers(headers: Option<&HashMap<String, String>>) -> HashMap<String, String> {
    let Some(headers) = headers else {
        return HashMap::new();
    };

    headers
        .iter()
        .map(|(name, value)| {
            if is_sensitive_header(name) {
                (name.clone(), REDACTED_MARKER.to_string())
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}
