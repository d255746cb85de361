//! Model descriptors.
//!
//! A [`ModelSchema`] tells the normalizer which kind each declared field has,
//! which is all it needs to resolve the `__empty` operator: every
//! [`FieldKind`] carries its own statically registered "empty" sentinel.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::errors::ApiError;

/// Declared storage kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    List,
    SortedList,
    Map,
    Integer,
    Float,
    Boolean,
    DateTime,
    Uuid,
    Other,
}

impl FieldKind {
    /// The value an "empty" field of this kind holds, if the kind has one.
    #[must_use]
    pub fn empty_sentinel(self) -> Option<Value> {
        match self {
            Self::String => Some(Value::String(String::new())),
            Self::List | Self::SortedList => Some(Value::Array(Vec::new())),
            Self::Map => Some(Value::Object(Map::new())),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::List => "list",
            Self::SortedList => "sorted list",
            Self::Map => "map",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
            Self::Uuid => "uuid",
            Self::Other => "other",
        }
    }
}

/// Declared fields of one resource model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSchema {
    name: String,
    identity_key: String,
    fields: BTreeMap<String, FieldKind>,
}

impl ModelSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity_key: "id".to_string(),
            fields: BTreeMap::new(),
        }
    }

    /// Declare a field
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(name.into(), kind);
        self
    }

    /// Override the identity key (default: "id")
    #[must_use]
    pub fn identity(mut self, key: impl Into<String>) -> Self {
        self.identity_key = key.into();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn identity_key(&self) -> &str {
        &self.identity_key
    }

    #[must_use]
    pub fn kind_of(&self, field: &str) -> Option<FieldKind> {
        self.fields.get(field).copied()
    }

    /// Sentinel used by `<field>__empty`.
    ///
    /// Undeclared fields are treated as strings.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` when the declared kind has no empty value.
    pub fn empty_sentinel(&self, field: &str) -> Result<Value, ApiError> {
        let kind = self.kind_of(field).unwrap_or(FieldKind::String);
        kind.empty_sentinel().ok_or_else(|| {
            ApiError::bad_request(format!(
                "Can not use `empty` for field `{field}` of type {}",
                kind.name()
            ))
        })
    }
}
