//! Response shapes.
//!
//! Collection queries come back as `{total, count, data}`; every other mode
//! returns its value bare.

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Records fetched by a backend, with the pre-window total when the backend
/// reports one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub total: Option<u64>,
    pub data: Vec<Value>,
}

impl ResultSet {
    #[must_use]
    pub fn with_total(total: u64, data: Vec<Value>) -> Self {
        Self {
            total: Some(total),
            data,
        }
    }
}

/// Paged collection response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Matching records before the window was applied
    pub total: u64,
    /// Records in `data`
    pub count: u64,
    pub data: Vec<Value>,
}

impl From<ResultSet> for Envelope {
    fn from(result: ResultSet) -> Self {
        let count = result.data.len() as u64;
        Self {
            total: result.total.unwrap_or(count),
            count,
            data: result.data,
        }
    }
}

/// One `_frequencies` entry, rendered as `{value: count}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frequency {
    pub value: Value,
    pub count: Value,
}

impl Frequency {
    /// Map key under which the value is rendered.
    #[must_use]
    pub fn key(&self) -> String {
        match &self.value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

impl Serialize for Frequency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.key(), &self.count)?;
        map.end()
    }
}

/// Result of executing one plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Collection(Envelope),
    Record(Value),
    Scalar(u64),
    Values(Vec<Value>),
    Frequencies(Vec<Frequency>),
    Groups(Vec<Value>),
}

impl QueryOutput {
    /// Render as a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        // string keys and JSON leaves always serialize
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl IntoResponse for QueryOutput {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_total_falls_back_to_count() {
        let envelope = Envelope::from(ResultSet {
            total: None,
            data: vec![json!(1), json!(2)],
        });
        assert_eq!(envelope.total, 2);
        assert_eq!(envelope.count, 2);
    }

    #[test]
    fn test_total_from_backend() {
        let envelope = Envelope::from(ResultSet::with_total(5, vec![json!({"id": 1})]));
        assert_eq!(envelope.total, 5);
        assert_eq!(envelope.count, 1);
    }

    #[test]
    fn test_collection_serializes_as_envelope() {
        let output = QueryOutput::Collection(ResultSet::with_total(3, vec![json!({"id": 1})]).into());
        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({"total": 3, "count": 1, "data": [{"id": 1}]})
        );
    }

    #[test]
    fn test_frequency_entries() {
        let output = QueryOutput::Frequencies(vec![
            Frequency { value: json!("a"), count: json!(3) },
            Frequency { value: json!(7), count: json!(0.5) },
        ]);
        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!([{"a": 3}, {"7": 0.5}])
        );
    }

    #[test]
    fn test_to_json_is_response_body() {
        let output = QueryOutput::Groups(vec![json!({"count": 2, "region": "north"})]);
        assert_eq!(output.to_json(), json!([{"count": 2, "region": "north"}]));
        assert_eq!(QueryOutput::Record(json!({"id": 1})).to_json(), json!({"id": 1}));
    }

    #[test]
    fn test_scalar_is_bare() {
        assert_eq!(serde_json::to_value(QueryOutput::Scalar(4)).unwrap(), json!(4));
    }
}
