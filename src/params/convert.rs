//! Typed coercions of raw parameter values.

use serde_json::Value;

use crate::errors::ApiError;

/// Values `as_bool` treats as true (case-insensitive).
const TRUTHY: [&str; 6] = ["t", "true", "y", "yes", "on", "1"];

/// Split a comma-separated string (or each element of a list) into trimmed,
/// non-empty items.
#[must_use]
pub fn split_strip(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| as_str(item))
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        Value::Null => Vec::new(),
        other => as_str(other)
            .map(|text| {
                text.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Like [`split_strip`], but list elements are comma-split as well.
#[must_use]
pub fn as_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().flat_map(split_strip).collect(),
        other => split_strip(other),
    }
}

/// String form of a scalar value; `None` for arrays, objects and null.
#[must_use]
pub fn as_str(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[must_use]
pub fn as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Null => false,
        Value::Array(items) => items.last().is_some_and(as_bool),
        other => as_str(other)
            .is_some_and(|text| TRUTHY.contains(&text.trim().to_lowercase().as_str())),
    }
}

/// # Errors
///
/// Returns `BadRequest` naming `key` when the value is not an integer.
pub fn as_int(key: &str, value: &Value) -> Result<i64, ApiError> {
    let parsed = match value {
        Value::Number(number) => number.as_i64(),
        Value::Bool(flag) => Some(i64::from(*flag)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        Value::Array(items) if items.len() == 1 => return as_int(key, &items[0]),
        _ => None,
    };
    parsed.ok_or_else(|| {
        ApiError::bad_request(format!("'{key}' must be an integer, got `{value}`"))
    })
}

/// Optional integer: `Ok(None)` when the value is absent.
///
/// # Errors
///
/// Returns `BadRequest` when a present value is not an integer.
pub fn as_opt_int(key: &str, value: Option<&Value>) -> Result<Option<i64>, ApiError> {
    value.map(|value| as_int(key, value)).transpose()
}
