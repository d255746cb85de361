use axum::{extract::FromRequestParts, http::request::Parts};
use serde_json::{Map, Value};

use crate::errors::ApiError;

/// Flat, ordered request parameters as they arrive from a query string or a
/// JSON body.
///
/// Values are strings, lists of strings (repeated query keys merge into a
/// list), or nested mappings (JSON bodies). Parameters are created per
/// request and consumed by [`normalize`](super::normalize).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawParams(Map<String, Value>);

impl RawParams {
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Parse an `application/x-www-form-urlencoded` query string.
    ///
    /// ```rust
    /// # use restplan::params::RawParams;
    /// let params = RawParams::from_query("status=active&tag=a&tag=b");
    /// assert_eq!(params.get("tag"), Some(&serde_json::json!(["a", "b"])));
    /// ```
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.append(key.into_owned(), value.into_owned());
        }
        params
    }

    /// Build parameters from a JSON object body.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if the body is not a JSON object.
    pub fn from_json(body: Value) -> Result<Self, ApiError> {
        match body {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ApiError::bad_request(format!(
                "Expecting a JSON object, got `{other}`"
            ))),
        }
    }

    /// Add a value, merging repeated keys into a list.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = Value::String(value.into());
        match self.0.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.0.insert(key, value);
            }
        }
    }

    /// Set a value, replacing any previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Merge another parameter set into this one; its values win.
    pub fn update(&mut self, other: Self) {
        for (key, value) in other.0 {
            self.0.insert(key, value);
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for RawParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K, V> FromIterator<(K, V)> for RawParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.append(key, value);
        }
        params
    }
}

impl IntoIterator for RawParams {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Extracts the raw query string of a request.
impl<S> FromRequestParts<S> for RawParams
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .uri
            .query()
            .map_or_else(Self::new, Self::from_query))
    }
}
