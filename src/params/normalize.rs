use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::convert::{as_bool, as_int, as_list, as_opt_int, split_strip};
use super::predicate::{Operator, Predicates};
use super::raw::RawParams;
use crate::config::QueryConfig;
use crate::errors::ApiError;
use crate::schema::ModelSchema;

/// Control directives understood by the engine
pub const RESERVED_KEYS: [&str; 12] = [
    "_sort",
    "_fields",
    "_count",
    "_first",
    "_start",
    "_page",
    "_limit",
    "_distinct",
    "_group",
    "_scalar",
    "_frequencies",
    "_fq_normalize",
];

/// Prefix of group accumulator directives (`_group$sum=amount`)
pub const GROUP_OP_PREFIX: &str = "_group$";

/// Control directives stripped from the raw parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Specials {
    pub sort: Vec<String>,
    pub fields: Vec<String>,
    pub count: bool,
    pub first: bool,
    pub start: Option<i64>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub distinct: Option<String>,
    pub group: Vec<String>,
    /// `(operator, target fields)` in request order; the operator is the
    /// text after `_group$`
    pub group_ops: Vec<(String, Vec<String>)>,
    pub scalar: Vec<String>,
    pub frequencies: Option<String>,
    pub fq_normalize: bool,
}

/// Split raw parameters into typed predicates and control directives.
///
/// Every key starting with `_` is a directive and never reaches the
/// predicates. Remaining keys are coerced according to their `__<op>`
/// suffix.
///
/// # Errors
///
/// Returns `BadRequest` for non-integer values on integer operators, for
/// `__empty` on a field kind without a sentinel, and (when configured) for
/// unknown directives.
pub fn normalize(
    raw: RawParams,
    schema: &ModelSchema,
    config: &QueryConfig,
) -> Result<(Predicates, Specials), ApiError> {
    let mut specials = Specials::default();
    let mut predicates = Predicates::new();

    for (key, value) in raw {
        if key.starts_with('_') {
            take_directive(&mut specials, &key, &value, config)?;
            continue;
        }
        let mut flat = Vec::new();
        flatten(key, value, &mut flat);
        for (path, value) in flat {
            coerce_predicate(&mut predicates, path, value, schema)?;
        }
    }

    debug!(resource = schema.name(), ?predicates, ?specials, "normalized parameters");
    Ok((predicates, specials))
}

fn take_directive(
    specials: &mut Specials,
    key: &str,
    value: &Value,
    config: &QueryConfig,
) -> Result<(), ApiError> {
    match key {
        "_sort" => specials.sort = as_list(value),
        "_fields" => specials.fields = as_list(value),
        "_count" => specials.count = true,
        "_first" => specials.first = true,
        "_start" => specials.start = as_opt_int(key, Some(value))?,
        "_page" => specials.page = as_opt_int(key, Some(value))?,
        "_limit" => specials.limit = as_opt_int(key, Some(value))?,
        "_distinct" => specials.distinct = first_token(value),
        "_group" => specials.group = as_list(value),
        "_scalar" => specials.scalar = as_list(value),
        "_frequencies" => specials.frequencies = first_token(value),
        "_fq_normalize" => specials.fq_normalize = as_bool(value),
        _ => {
            if let Some(op) = key.strip_prefix(GROUP_OP_PREFIX) {
                specials.group_ops.push((op.to_string(), as_list(value)));
            } else if config.reject_unknown_directives {
                return Err(ApiError::bad_request(format!("Unknown directive '{key}'")));
            } else {
                warn!(directive = key, "dropping unknown directive");
            }
        }
    }
    Ok(())
}

fn first_token(value: &Value) -> Option<String> {
    split_strip(value).into_iter().next()
}

/// Flatten nested mappings into dotted paths; empty mappings stay leaves.
fn flatten(prefix: String, value: Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, nested) in map {
                flatten(format!("{prefix}.{key}"), nested, out);
            }
        }
        other => out.push((prefix, other)),
    }
}

fn coerce_predicate(
    predicates: &mut Predicates,
    key: String,
    value: Value,
    schema: &ModelSchema,
) -> Result<(), ApiError> {
    let Some(pos) = key.rfind("__") else {
        predicates.insert(key, value);
        return Ok(());
    };
    let base = &key[..pos];
    let suffix = &key[pos + 2..];
    match (suffix, Operator::from_suffix(suffix)) {
        (_, Some(op)) if op.takes_list() => {
            // only text is comma-split; typed elements pass through
            let items = match value {
                Value::Array(items) => items.into_iter().flat_map(split_text).collect(),
                other => split_text(other),
            };
            predicates.insert(key, Value::Array(items));
        }
        ("empty", _) => {
            let sentinel = schema.empty_sentinel(base)?;
            if as_int(&key, &value)? == 0 {
                predicates.insert(format!("{base}__ne"), sentinel);
            } else {
                predicates.insert(base, sentinel);
            }
        }
        (_, Some(op)) if op.takes_int() && value.is_string() => {
            let number = as_int(&key, &value)?;
            predicates.insert(key, Value::from(number));
        }
        ("asbool", _) => predicates.insert(base, Value::Bool(as_bool(&value))),
        ("asint", _) => {
            let number = as_int(&key, &value)?;
            predicates.insert(base, Value::from(number));
        }
        _ => predicates.insert(key, value),
    }
    Ok(())
}

fn split_text(value: Value) -> Vec<Value> {
    match value {
        Value::String(_) => split_strip(&value).into_iter().map(Value::String).collect(),
        other => vec![other],
    }
}

/// Convenience for callers holding a plain map.
///
/// # Errors
///
/// See [`normalize`].
pub fn normalize_map(
    map: Map<String, Value>,
    schema: &ModelSchema,
    config: &QueryConfig,
) -> Result<(Predicates, Specials), ApiError> {
    normalize(RawParams::from(map), schema, config)
}
