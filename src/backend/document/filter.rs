//! Predicates to document-store filter documents.
//!
//! `age__gt=3&age__lt=9&name__istartswith=jo` becomes
//! `{"age": {"$gt": 3, "$lt": 9}, "name": {"$regex": "^jo", "$options": "i"}}`.

use serde_json::{Map, Value, json};

use crate::errors::ApiError;
use crate::params::convert::{as_bool, as_str};
use crate::params::{Operator, Predicates};
use crate::schema::{FieldKind, ModelSchema};

/// Build the filter document for a set of predicates.
///
/// Values of declared numeric and boolean fields are coerced from their
/// string form.
///
/// # Errors
///
/// Returns `BadRequest` when a string operator gets a non-string value or a
/// value can not be coerced to its field kind.
pub fn build_filter(
    predicates: &Predicates,
    schema: &ModelSchema,
) -> Result<Map<String, Value>, ApiError> {
    let mut filter = Map::new();

    for (key, value) in predicates.iter() {
        let (path, op) = Operator::split(key);
        let kind = schema.kind_of(path);
        let condition = match op {
            None => coerce(path, value, kind)?,
            Some(op) => operator_condition(path, op, value, kind)?,
        };
        merge(&mut filter, path, condition);
    }

    Ok(filter)
}

fn operator_condition(
    path: &str,
    op: Operator,
    value: &Value,
    kind: Option<FieldKind>,
) -> Result<Value, ApiError> {
    let condition = match op {
        Operator::Ne => json!({ "$ne": coerce(path, value, kind)? }),
        Operator::Lt => json!({ "$lt": coerce(path, value, kind)? }),
        Operator::Lte => json!({ "$lte": coerce(path, value, kind)? }),
        Operator::Gt => json!({ "$gt": coerce(path, value, kind)? }),
        Operator::Gte => json!({ "$gte": coerce(path, value, kind)? }),
        Operator::In => json!({ "$in": coerce_each(path, value, kind)? }),
        Operator::Nin => json!({ "$nin": coerce_each(path, value, kind)? }),
        Operator::All => json!({ "$all": coerce_each(path, value, kind)? }),
        Operator::Size => json!({ "$size": value }),
        Operator::Exists => json!({ "$exists": exists_flag(value) }),
        Operator::Contains => regex_condition(path, value, "", "", false)?,
        Operator::IContains => regex_condition(path, value, "", "", true)?,
        Operator::StartsWith => regex_condition(path, value, "^", "", false)?,
        Operator::IStartsWith => regex_condition(path, value, "^", "", true)?,
        Operator::EndsWith => regex_condition(path, value, "", "$", false)?,
        Operator::IEndsWith => regex_condition(path, value, "", "$", true)?,
        Operator::Exact => regex_condition(path, value, "^", "$", false)?,
        Operator::IExact => regex_condition(path, value, "^", "$", true)?,
    };
    Ok(condition)
}

fn exists_flag(value: &Value) -> bool {
    match value {
        Value::Number(number) => number.as_i64() != Some(0),
        other => as_bool(other),
    }
}

fn regex_condition(
    path: &str,
    value: &Value,
    prefix: &str,
    suffix: &str,
    insensitive: bool,
) -> Result<Value, ApiError> {
    let text = as_str(value)
        .ok_or_else(|| ApiError::bad_request(format!("Bad value for '{path}': expecting text")))?;
    let pattern = format!("{prefix}{}{suffix}", regex::escape(&text));
    Ok(if insensitive {
        json!({ "$regex": pattern, "$options": "i" })
    } else {
        json!({ "$regex": pattern })
    })
}

fn coerce_each(path: &str, value: &Value, kind: Option<FieldKind>) -> Result<Value, ApiError> {
    match value {
        Value::Array(items) => {
            // elements of list fields have no declared kind
            let kind = kind.filter(|kind| !matches!(kind, FieldKind::List | FieldKind::SortedList));
            items
                .iter()
                .map(|item| coerce(path, item, kind))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        other => Ok(Value::Array(vec![coerce(path, other, kind)?])),
    }
}

fn coerce(path: &str, value: &Value, kind: Option<FieldKind>) -> Result<Value, ApiError> {
    let Value::String(text) = value else {
        return Ok(value.clone());
    };
    let bad_value = || ApiError::bad_request(format!("Bad value for '{path}': `{text}`"));
    match kind {
        Some(FieldKind::Integer) => text.trim().parse::<i64>().map(Value::from).map_err(|_| bad_value()),
        Some(FieldKind::Float) => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(bad_value),
        Some(FieldKind::Boolean) => Ok(Value::Bool(as_bool(value))),
        _ => Ok(value.clone()),
    }
}

/// Add a condition on `path`, merging operator objects. A plain equality
/// already present becomes `$eq`.
fn merge(filter: &mut Map<String, Value>, path: &str, condition: Value) {
    let Some(existing) = filter.get_mut(path) else {
        filter.insert(path.to_string(), condition);
        return;
    };

    let mut merged = as_operators(existing.take());
    for (op, operand) in as_operators(condition) {
        merged.insert(op, operand);
    }
    *existing = Value::Object(merged);
}

fn as_operators(condition: Value) -> Map<String, Value> {
    match condition {
        Value::Object(map) if is_operator_object(&map) => map,
        other => {
            let mut map = Map::new();
            map.insert("$eq".to_string(), other);
            map
        }
    }
}

/// Whether a condition object is a set of `$` operators rather than an
/// embedded document to match exactly.
#[must_use]
pub fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|key| key.starts_with('$'))
}
