//! Redaction of request data before it reaches the access log.
//!
//! # Usage
//!
//! ```
//! use switchyard_observability::redact::BodyRedactor;
//!
//! let redactor = BodyRedactor::new(&[]);
//! let logged = redactor.redact(br#"{"password":"x","email":"a@b.com"}"#);
//! assert_eq!(logged["password"], "*******");
//! assert_eq!(logged["email"], "a@******");
//! ```

use http::HeaderMap;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Replacement for masked body fields.
pub const MASK: &str = "*******";

/// Replacement for the domain part of an email address.
pub const EMAIL_DOMAIN_MASK: &str = "******";

/// Replacement for masked header values.
pub const REDACTED: &str = "[REDACTED]";

/// Body fields that are **always** masked.
pub const ALWAYS_REDACTED_FIELDS: &[&str] = &["password", "password_confirm"];

/// Headers that are **always** masked.
///
/// These carry credentials or session tokens and must never appear in
/// plaintext logs.
pub const ALWAYS_SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-auth-token",
    "x-access-token",
    "proxy-authorization",
];

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern compiles")
});

// ─────────────────────────────────────────────────────────────
// Body redaction
// ─────────────────────────────────────────────────────────────

/// Masks credentials and email domains in JSON request bodies.
#[derive(Debug, Clone, Default)]
pub struct BodyRedactor {
    extra: Vec<String>,
}

impl BodyRedactor {
    /// `extra`: field names masked on top of [`ALWAYS_REDACTED_FIELDS`].
    pub fn new(extra: &[String]) -> Self {
        Self {
            extra: extra
                .iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
        }
    }

    /// Parse and redact a raw body. Bodies that are not JSON log as `null`.
    pub fn redact(&self, body: &[u8]) -> Value {
        if body.is_empty() {
            return Value::Null;
        }
        match serde_json::from_slice::<Value>(body) {
            Ok(mut value) => {
                self.redact_value(&mut value);
                value
            }
            Err(_) => Value::Null,
        }
    }

    /// Redact in place, descending into nested objects and arrays.
    ///
    /// A masked field is masked whatever its type; email masking applies to
    /// string values only.
    pub fn redact_value(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, field) in map.iter_mut() {
                    if self.is_masked_field(key) {
                        *field = Value::String(MASK.to_string());
                    } else {
                        self.redact_value(field);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.redact_value(item);
                }
            }
            Value::String(s) => {
                if let Some(masked) = mask_email(s) {
                    *s = masked;
                }
            }
            _ => {}
        }
    }

    fn is_masked_field(&self, key: &str) -> bool {
        ALWAYS_REDACTED_FIELDS.contains(&key) || self.extra.iter().any(|f| f == key)
    }
}

/// Keep the local part of an email address and mask the domain.
pub fn mask_email(value: &str) -> Option<String> {
    if !EMAIL.is_match(value) {
        return None;
    }
    let local = value.split('@').next().unwrap_or_default();
    Some(format!("{local}@{EMAIL_DOMAIN_MASK}"))
}

// ─────────────────────────────────────────────────────────────
// Header scrubbing
// ─────────────────────────────────────────────────────────────

/// Mask a single header value if the header name is considered sensitive.
///
/// Returns `(masked_value, was_scrubbed)`.
pub fn scrub_header(name: &str, value: &str) -> (String, bool) {
    let lower = name.to_ascii_lowercase();
    if ALWAYS_SENSITIVE_HEADERS.contains(&lower.as_str()) {
        (REDACTED.to_string(), true)
    } else {
        (value.to_string(), false)
    }
}

/// Snapshot request headers for logging, sensitive values masked.
///
/// Repeated headers keep every value in order; non-UTF-8 values are
/// converted lossily.
pub fn scrub_headers(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        let raw = String::from_utf8_lossy(value.as_bytes());
        let (logged, _) = scrub_header(name.as_str(), &raw);
        out.entry(name.as_str().to_string()).or_default().push(logged);
    }
    out
}
