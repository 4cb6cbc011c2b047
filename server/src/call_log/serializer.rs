//! Text rendering for logged payloads.
//!
//! Every function here is total: whatever goes in, a `String` comes out.
//! Values `serde_json` cannot encode degrade to a bracketed `Debug` dump
//! instead of an error.

use std::fmt::{self, Write as _};

use serde::Serialize;
use tracing::debug;

/// Rendered for absent values and empty bodies.
pub const NULL_SENTINEL: &str = "null";

const NON_SERIALIZABLE_PREFIX: &str = "[Non-serializable object: ";

/// Replacement for masked header values and body fields.
pub const REDACTED: &str = "[redacted]";

/// JSON keys whose values never reach the log, compared lowercased with `_`
/// and `-` removed.
const SECRET_FIELDS: &[&str] = &[
    "password",
    "newpassword",
    "currentpassword",
    "accesstoken",
    "refreshtoken",
    "token",
    "secret",
];

/// Rendered when a value has neither a JSON nor a `Debug` form.
pub const NO_TEXT_FALLBACK: &str = "[Non-serializable object: <no textual representation>]";

/// Pretty-print `value` as JSON, or fall back to its `Debug` form.
///
/// Output is all-or-nothing: a partial JSON document is never returned.
pub fn to_log_text<T>(value: Option<&T>) -> String
where
    T: Serialize + fmt::Debug + ?Sized,
{
    let Some(value) = value else {
        return NULL_SENTINEL.to_string();
    };

    match serde_json::to_string_pretty(value) {
        Ok(text) => text,
        Err(e) => {
            debug!("Serialization fallback: {}", e);
            non_serializable(value)
        }
    }
}

/// Render raw HTTP body bytes.
///
/// JSON bodies are re-indented, other UTF-8 text is logged as a JSON string,
/// binary payloads are summarised by length.
pub fn body_to_log_text(body: &[u8]) -> String {
    if body.is_empty() {
        return NULL_SENTINEL.to_string();
    }

    if let Ok(mut json) = serde_json::from_slice::<serde_json::Value>(body) {
        redact_secret_fields(&mut json);
        return to_log_text(Some(&json));
    }

    match std::str::from_utf8(body) {
        Ok(text) => to_log_text(Some(text)),
        Err(_) => non_serializable(&BinaryBody(body.len())),
    }
}

/// Mask the values of credential fields (matched case-insensitively) at any
/// depth of a JSON document.
pub fn redact_secret_fields(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if is_secret_field(key) {
                    *field = serde_json::Value::String(REDACTED.to_string());
                } else {
                    redact_secret_fields(field);
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(redact_secret_fields),
        _ => {}
    }
}

fn is_secret_field(key: &str) -> bool {
    let key = key.to_ascii_lowercase().replace(['_', '-'], "");
    SECRET_FIELDS.contains(&key.as_str())
}

/// The fallback form: `[Non-serializable object: <Debug>]`.
///
/// A `Debug` impl that errors yields [`NO_TEXT_FALLBACK`].
pub fn non_serializable(value: &(impl fmt::Debug + ?Sized)) -> String {
    let mut out = String::from(NON_SERIALIZABLE_PREFIX);
    match write!(out, "{:?}]", value) {
        Ok(()) => out,
        Err(_) => NO_TEXT_FALLBACK.to_string(),
    }
}

pub fn is_fallback(text: &str) -> bool {
    text.starts_with(NON_SERIALIZABLE_PREFIX)
}

struct BinaryBody(usize);

impl fmt::Debug for BinaryBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} bytes of binary data>", self.0)
    }
}
