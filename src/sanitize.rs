//! Redaction of sensitive data in errors and request snapshots.
//!
//! Enabled for everything the rail logs and renders with
//! [`RailConfig::sanitize`](crate::RailConfig::sanitize); the functions are
//! also usable on their own, e.g. before exporting an error history.
//!
//! ```
//! use handler_rail::sanitize::sanitize_message;
//!
//! let clean = sanitize_message("login failed for token=abc123 from alice@example.com");
//! assert_eq!(clean, "login failed for token=[REDACTED] from [REDACTED]");
//! ```

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::types::{EnhancedError, RequestSnapshot};

pub const REDACTED: &str = "[REDACTED]";

// Patterns with a capture group keep the key and redact the value.
static SENSITIVE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)(api[_-]?key|token|secret|password|credential)s?["']?\s*[=:]\s*["']?[^"'\s,;]+"#,
        r"(?i)bearer\s+[a-z0-9._\-]+",
        r"eyJ[a-zA-Z0-9\-_]+\.eyJ[a-zA-Z0-9\-_]+\.[a-zA-Z0-9\-_]+",
        r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
        r"\b(?:\d{4}[-\s]?){3}\d{4}\b",
    ]
    .into_iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

const SENSITIVE_KEYS: [&str; 12] = [
    "authorization",
    "cookie",
    "password",
    "secret",
    "token",
    "api-key",
    "api_key",
    "apikey",
    "credential",
    "session",
    "private",
    "x-csrf",
];

/// `true` when a header, query or metadata key names sensitive data.
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|sensitive| key.contains(sensitive))
}

/// Masks credentials, bearer tokens, JWTs, email addresses and card numbers.
pub fn sanitize_message(message: &str) -> String {
    SENSITIVE_PATTERNS.iter().fold(message.to_owned(), |text, pattern| {
        pattern
            .replace_all(&text, |caps: &Captures<'_>| match caps.get(1) {
                Some(key) => format!("{}={REDACTED}", key.as_str()),
                None => REDACTED.to_owned(),
            })
            .into_owned()
    })
}

fn sanitize_map(map: &mut BTreeMap<String, String>) {
    for (key, value) in map.iter_mut() {
        *value = if is_sensitive_key(key) { REDACTED.to_owned() } else { sanitize_message(value) };
    }
}

fn sanitize_value(key: &str, value: &mut Value) {
    if is_sensitive_key(key) {
        *value = Value::String(REDACTED.to_owned());
        return;
    }
    match value {
        Value::String(text) => *text = sanitize_message(text),
        Value::Object(object) => {
            for (key, value) in object.iter_mut() {
                sanitize_value(key, value);
            }
        },
        Value::Array(items) => items.iter_mut().for_each(|item| sanitize_value("", item)),
        _ => {},
    }
}

/// Redacts sensitive headers, query values and metadata.
pub fn sanitize_snapshot(mut snapshot: RequestSnapshot) -> RequestSnapshot {
    sanitize_map(&mut snapshot.headers);
    sanitize_map(&mut snapshot.query);
    snapshot.url = sanitize_message(&snapshot.url);
    for (key, value) in snapshot.metadata.iter_mut() {
        sanitize_value(key, value);
    }
    snapshot
}

/// Redacts the message, the stack and the captured request of `error`.
///
/// Identity fields (id, correlation id, category, status) are kept.
pub fn sanitize_error(mut error: EnhancedError) -> EnhancedError {
    let message = sanitize_message(error.error.message());
    let stack = error.error.stack().map(sanitize_message);
    let mut inner = error.error.with_message(message);
    if let Some(stack) = stack {
        inner = inner.with_stack(stack);
    }
    error.error = inner;
    error.context = error.context.map(sanitize_snapshot);
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::{EnhanceOptions, Enricher};
    use crate::types::RouteError;

    #[test]
    fn credentials_keep_their_key() {
        assert_eq!(sanitize_message("password: hunter2"), "password=[REDACTED]");
        assert_eq!(sanitize_message("Bearer abc.def-ghi"), "[REDACTED]");
    }

    #[test]
    fn plain_messages_are_untouched() {
        assert_eq!(sanitize_message("User not found"), "User not found");
    }

    #[test]
    fn snapshot_headers_and_metadata_are_redacted() {
        let mut snapshot = RequestSnapshot::default();
        snapshot.headers.insert("authorization".into(), "Bearer xyz".into());
        snapshot.headers.insert("accept".into(), "application/json".into());
        snapshot.metadata.insert("session_id".into(), Value::from("s-1"));
        snapshot.metadata.insert("note".into(), Value::from("mail bob@example.org"));

        let clean = sanitize_snapshot(snapshot);
        assert_eq!(clean.headers["authorization"], REDACTED);
        assert_eq!(clean.headers["accept"], "application/json");
        assert_eq!(clean.metadata["session_id"], REDACTED);
        assert_eq!(clean.metadata["note"], "mail [REDACTED]");
    }

    #[test]
    fn error_identity_survives() {
        let enhanced = Enricher::default().enhance(
            RouteError::new("bad api_key=sk_live_123").with_stack("at handler api_key=sk_live_123"),
            None,
            EnhanceOptions::new().correlation_id("corr-9"),
        );
        let id = enhanced.id();

        let clean = sanitize_error(enhanced);
        assert_eq!(clean.id(), id);
        assert_eq!(clean.correlation_id(), "corr-9");
        assert_eq!(clean.message(), "bad api_key=[REDACTED]");
        assert_eq!(clean.error().stack(), Some("at handler api_key=[REDACTED]"));
    }
}
