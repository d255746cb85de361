//! Field projection (`_fields`).
//!
//! Tokens without a marker select fields, `-field` excludes one, and
//! `field__as__alias` shows `field` under `alias`. A dotted token selects
//! its top-level key and records the full path in `nested`, so only that
//! part of the sub-document survives.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::errors::ApiError;

const SHOW_AS: &str = "__as__";

/// `_fields` split into its parts, before the exclusivity check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSpec {
    pub only: Vec<String>,
    pub exclude: Vec<String>,
    /// Dotted path to its top-level key
    pub nested: BTreeMap<String, String>,
    /// Alias to original key
    pub show_as: BTreeMap<String, String>,
}

#[must_use]
pub fn process_fields(tokens: &[String]) -> FieldSpec {
    let mut spec = FieldSpec::default();

    for token in tokens.iter().map(|token| token.trim()).filter(|t| !t.is_empty()) {
        if let Some(field) = token.strip_prefix('-') {
            push_unique(&mut spec.exclude, field);
            continue;
        }

        let field = match token.split_once(SHOW_AS) {
            Some((field, alias)) if !field.is_empty() && !alias.is_empty() => {
                spec.show_as.insert(alias.to_string(), field.to_string());
                field
            }
            _ => token,
        };

        if let Some((top, _)) = field.split_once('.') {
            spec.nested.insert(field.to_string(), top.to_string());
            push_unique(&mut spec.only, top);
        } else {
            push_unique(&mut spec.only, field);
        }
    }

    spec
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}

/// Which fields of each record are returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    Only {
        fields: Vec<String>,
        nested: BTreeMap<String, String>,
        show_as: BTreeMap<String, String>,
    },
    Exclude(Vec<String>),
}

impl Projection {
    /// # Errors
    ///
    /// Returns `BadRequest` when both selected and excluded fields are given.
    pub fn from_spec(spec: FieldSpec) -> Result<Self, ApiError> {
        let FieldSpec {
            only,
            exclude,
            nested,
            show_as,
        } = spec;

        if !only.is_empty() && !exclude.is_empty() {
            return Err(ApiError::bad_request(
                "Can only supply either positive or negative keys, but not both",
            ));
        }

        Ok(if !only.is_empty() || !nested.is_empty() {
            Self::Only {
                fields: only,
                nested,
                show_as,
            }
        } else if !exclude.is_empty() {
            Self::Exclude(exclude)
        } else {
            Self::All
        })
    }

    /// # Errors
    ///
    /// See [`Projection::from_spec`].
    pub fn parse(tokens: &[String]) -> Result<Self, ApiError> {
        Self::from_spec(process_fields(tokens))
    }

    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Subset one record. `Only` always keeps `identity_key`.
    #[must_use]
    pub fn apply(&self, record: Value, identity_key: &str) -> Value {
        let mut map = match record {
            Value::Object(map) => map,
            other => return other,
        };

        match self {
            Self::All => Value::Object(map),
            Self::Exclude(fields) => {
                for field in fields {
                    remove_path(&mut map, field);
                }
                Value::Object(map)
            }
            Self::Only {
                fields,
                nested,
                show_as,
            } => {
                let mut out = Map::new();
                if let Some(id) = map.get(identity_key) {
                    out.insert(identity_key.to_string(), id.clone());
                }

                for field in fields {
                    let mut paths = nested
                        .iter()
                        .filter(|(_, top)| *top == field)
                        .map(|(path, _)| path)
                        .peekable();
                    if paths.peek().is_none() {
                        if let Some(value) = map.get(field) {
                            out.insert(field.clone(), value.clone());
                        }
                        continue;
                    }
                    for path in paths {
                        if let Some(value) = get_path(&map, path) {
                            set_path(&mut out, path, value.clone());
                        }
                    }
                }

                for (alias, original) in show_as {
                    let value = if original.contains('.') {
                        remove_path(&mut out, original)
                    } else {
                        out.shift_remove(original)
                    };
                    if let Some(value) = value {
                        out.insert(alias.clone(), value);
                    }
                }

                map = out;
                Value::Object(map)
            }
        }
    }
}

/// Resolve a dotted path inside a document.
#[must_use]
pub fn get_path<'a>(document: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set a dotted path, creating intermediate documents.
pub fn set_path(document: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            document.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = document
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(child) = child {
                set_path(child, rest, value);
            }
        }
    }
}

/// Remove a dotted path, dropping parents left empty.
pub fn remove_path(document: &mut Map<String, Value>, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => document.shift_remove(path),
        Some((head, rest)) => {
            let Some(Value::Object(child)) = document.get_mut(head) else {
                return None;
            };
            let removed = remove_path(child, rest);
            if removed.is_some() && child.is_empty() {
                document.shift_remove(head);
            }
            removed
        }
    }
}
