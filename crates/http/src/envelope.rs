//! Response envelope handling
//!
//! The backend wraps payloads inconsistently: some endpoints answer
//! `{ "status": "success", "data": X }`, some `{ "success": true, "data": X }`,
//! some `{ "data": X }` and some return `X` directly. The helpers here strip
//! those wrappers so callers only ever see the payload.

use serde_json::Value;

const ENVELOPE_KEYS: &[&str] = &["status", "success", "message", "data"];

/// Whether `value` is one of the known envelope shapes around a `data` payload
pub fn is_envelope(value: &Value) -> bool {
    let obj = match value.as_object() {
        Some(obj) => obj,
        None => return false,
    };
    if !obj.contains_key("data") {
        return false;
    }
    if !obj.keys().all(|key| ENVELOPE_KEYS.contains(&key.as_str())) {
        return false;
    }

    let status_ok = match obj.get("status") {
        None => true,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("success") || s.eq_ignore_ascii_case("ok"),
        Some(Value::Number(n)) => n.as_u64().map(|n| (200..300).contains(&n)).unwrap_or(false),
        Some(_) => false,
    };
    let success_ok = !matches!(obj.get("success"), Some(Value::Bool(false)));

    status_ok && success_ok
}

/// Borrowing variant of [`unwrap_envelope`]
pub fn unwrap_envelope_ref(mut value: &Value) -> &Value {
    while is_envelope(value) {
        match value.get("data") {
            Some(inner) => value = inner,
            None => break,
        }
    }
    value
}

/// Strip every envelope layer and return the innermost payload
///
/// Values that are not envelopes are returned unchanged, so applying this
/// twice is the same as applying it once.
pub fn unwrap_envelope(value: Value) -> Value {
    let mut value = value;
    while is_envelope(&value) {
        value = match value {
            Value::Object(mut obj) => obj.remove("data").unwrap_or(Value::Null),
            other => return other,
        };
    }
    value
}

/// Look up the first present, non-null field among `names`
///
/// The raw value is searched first, then the unwrapped payload, so both
/// `{ "token": .. }` and `{ "status": "success", "data": { "token": .. } }`
/// resolve.
pub fn find_field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a Value> {
    let lookup = |v: &'a Value| {
        names
            .iter()
            .filter_map(|name| v.get(*name))
            .find(|field| !field.is_null())
    };
    lookup(value).or_else(|| lookup(unwrap_envelope_ref(value)))
}

/// String variant of [`find_field`]; empty strings count as missing
pub fn find_str<'a>(value: &'a Value, names: &[&str]) -> Option<&'a str> {
    let lookup = |v: &'a Value| {
        names
            .iter()
            .filter_map(|name| v.get(*name))
            .filter_map(Value::as_str)
            .find(|s| !s.is_empty())
    };
    lookup(value).or_else(|| lookup(unwrap_envelope_ref(value)))
}
