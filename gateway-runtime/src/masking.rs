//! Best-effort redaction of secret values from a serialized response.
//!
//! Matching is literal substring replacement over the JSON text, so it can
//! over- or under-redact around overlapping values.

use regex::{NoExpand, Regex};
use serde_json::Value;

use crate::types::SecretMap;

pub const MASK: &str = "***MASKED_SECRET***";

/// Whether a secret is distinctive enough to be worth masking. Short or
/// low-entropy values would redact unrelated text.
pub fn is_complex_secret(value: &str) -> bool {
    let len = value.chars().count();
    let has_upper = value.chars().any(|c| c.is_uppercase());
    let has_lower = value.chars().any(|c| c.is_lowercase());
    let has_digit = value.chars().any(|c| c.is_ascii_digit());

    let mut distinct: Vec<char> = value.chars().collect();
    distinct.sort_unstable();
    distinct.dedup();

    (len >= 8 && has_upper && has_lower && has_digit) || distinct.len() > 8
}

/// Replace every literal occurrence of a complex secret value in `response`.
///
/// Falls back to the unmasked response when the masked text no longer parses.
pub fn mask_secrets(response: &Value, secrets: &SecretMap) -> Value {
    let mut serialized = match serde_json::to_string(response) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Masking skipped, response not serializable: {e}");
            return response.clone();
        }
    };

    for value in secrets.values().filter(|v| is_complex_secret(v)) {
        // Match the value as it appears inside a JSON string literal.
        let Ok(quoted) = serde_json::to_string(value) else {
            continue;
        };
        let escaped = &quoted[1..quoted.len() - 1];
        let Ok(pattern) = Regex::new(&regex::escape(escaped)) else {
            continue;
        };
        serialized = pattern.replace_all(&serialized, NoExpand(MASK)).into_owned();
    }

    match serde_json::from_str(&serialized) {
        Ok(masked) => masked,
        Err(e) => {
            tracing::warn!("Masking produced invalid JSON, returning unmasked response: {e}");
            response.clone()
        }
    }
}
