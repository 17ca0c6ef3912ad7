// Lenient field readers over decoded JSON objects. None of these fail:
// a missing or mistyped field yields the empty/zero default.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Read a string field. Scalars are stringified, anything else is "".
pub fn text(fields: &Map<String, Value>, key: &str) -> String {
    opt_text(fields, key).unwrap_or_default()
}

/// Read an optional string field. Absent, null, arrays and objects are `None`.
pub fn opt_text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(scalar_text)
}

/// Read the first present string field among `keys`.
pub fn first_text(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| opt_text(fields, key))
}

pub fn flag(fields: &Map<String, Value>, key: &str) -> bool {
    match fields.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    }
}

/// Read a non-negative integer. Negative numbers clamp to 0, fractions are
/// truncated and numeric strings are parsed.
pub fn count(fields: &Map<String, Value>, key: &str) -> u32 {
    fields.get(key).and_then(number).unwrap_or(0)
}

pub fn number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Some(u.min(u32::MAX as u64) as u32)
            } else if let Some(i) = n.as_i64() {
                Some(i.clamp(0, u32::MAX as i64) as u32)
            } else {
                n.as_f64().map(|f| f.clamp(0.0, u32::MAX as f64) as u32)
            }
        }
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

/// Iterate the object elements of an array field, skipping anything else.
pub fn objects<'a>(
    fields: &'a Map<String, Value>,
    key: &str,
) -> impl Iterator<Item = &'a Map<String, Value>> + 'a {
    fields
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// Read an array of strings. Non-string elements become "".
pub fn strings(fields: &Map<String, Value>, key: &str) -> Vec<String> {
    fields
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|v| scalar_text(v).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default()
}

pub fn timestamp(fields: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    let raw = fields.get(key)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Insert `value` under `key` only when present.
pub fn put_opt(fields: &mut Map<String, Value>, key: &str, value: Option<&String>) {
    if let Some(v) = value {
        fields.insert(key.to_string(), Value::String(v.clone()));
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
