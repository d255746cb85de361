//! In-process document collection.
//!
//! Implements the driver capability over a vector of JSON documents:
//! filter documents with the `$` operators produced by
//! [`build_filter`](super::filter::build_filter), sorted finds, distinct
//! values, item frequencies, aggregation pipelines and unique indexes.

use regex::RegexBuilder;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use super::filter::is_operator_object;
use super::pipeline::{GroupAccumulator, GroupSource, Stage};
use super::{
    DUPLICATE_KEY_CODE, DocumentCollection, DocumentError, FieldSelection, FindOptions,
    compare_values,
};
use crate::plan::fields::{get_path, remove_path, set_path};
use crate::plan::{SortDirection, SortKey};

pub struct MemoryCollection {
    name: String,
    identity_key: String,
    unique: Vec<String>,
    documents: RwLock<Vec<Map<String, Value>>>,
    next_id: AtomicU64,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity_key: "id".to_string(),
            unique: Vec::new(),
            documents: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Override the identity key (default: "id")
    #[must_use]
    pub fn identity(mut self, key: impl Into<String>) -> Self {
        self.identity_key = key.into();
        self
    }

    /// Add a unique index on `field`
    #[must_use]
    pub fn unique(mut self, field: impl Into<String>) -> Self {
        self.unique.push(field.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert many documents.
    ///
    /// # Errors
    ///
    /// Stops at the first document violating a unique index.
    pub fn insert_many(
        &self,
        documents: impl IntoIterator<Item = Value>,
    ) -> Result<(), DocumentError> {
        for document in documents {
            self.insert(document)?;
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Map<String, Value>>>, DocumentError> {
        self.documents
            .read()
            .map_err(|_| DocumentError::Operation(format!("collection `{}` is poisoned", self.name)))
    }

    fn matching(&self, filter: &Map<String, Value>) -> Result<Vec<Map<String, Value>>, DocumentError> {
        let documents = self.read()?;
        let mut matched = Vec::new();
        for document in documents.iter() {
            if matches(document, filter)? {
                matched.push(document.clone());
            }
        }
        Ok(matched)
    }
}

impl DocumentCollection for MemoryCollection {
    fn count(&self, filter: &Map<String, Value>) -> Result<u64, DocumentError> {
        Ok(self.matching(filter)?.len() as u64)
    }

    fn find(&self, options: &FindOptions) -> Result<Vec<Value>, DocumentError> {
        let mut documents = self.matching(&options.filter)?;
        sort_documents(&mut documents, &options.sort);
        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let take = options
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(documents
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|document| Value::Object(select_fields(document, &options.fields)))
            .collect())
    }

    fn distinct(
        &self,
        field: &str,
        filter: &Map<String, Value>,
    ) -> Result<Vec<Value>, DocumentError> {
        let mut values: Vec<Value> = Vec::new();
        for document in self.matching(filter)? {
            let Some(value) = get_path(&document, field) else {
                continue;
            };
            let items = match value {
                Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            };
            for item in items {
                if !values.contains(&item) {
                    values.push(item);
                }
            }
        }
        Ok(values)
    }

    fn item_frequencies(
        &self,
        field: &str,
        filter: &Map<String, Value>,
        normalize: bool,
    ) -> Result<Vec<(Value, Value)>, DocumentError> {
        let mut counts: Vec<(Value, u64)> = Vec::new();
        let mut total = 0_u64;
        for document in self.matching(filter)? {
            let items = match get_path(&document, field) {
                Some(Value::Array(items)) => items.clone(),
                Some(other) => vec![other.clone()],
                None => vec![Value::Null],
            };
            for item in items {
                total += 1;
                match counts.iter_mut().find(|(value, _)| *value == item) {
                    Some((_, count)) => *count += 1,
                    None => counts.push((item, 1)),
                }
            }
        }

        Ok(counts
            .into_iter()
            .map(|(value, count)| {
                let count = if normalize {
                    #[allow(clippy::cast_precision_loss)]
                    let share = count as f64 / total as f64;
                    serde_json::Number::from_f64(share).map_or(Value::Null, Value::Number)
                } else {
                    Value::from(count)
                };
                (value, count)
            })
            .collect())
    }

    fn aggregate(&self, pipeline: &[Stage]) -> Result<Vec<Value>, DocumentError> {
        let mut documents = self.read()?.clone();
        for stage in pipeline {
            documents = run_stage(documents, stage)?;
        }
        Ok(documents.into_iter().map(Value::Object).collect())
    }

    fn insert(&self, document: Value) -> Result<Value, DocumentError> {
        let mut document = match document {
            Value::Object(map) => map,
            other => {
                return Err(DocumentError::Validation(format!(
                    "Expecting a document, got `{other}`"
                )));
            }
        };

        let mut documents = self
            .documents
            .write()
            .map_err(|_| DocumentError::Operation(format!("collection `{}` is poisoned", self.name)))?;

        if !document.contains_key(&self.identity_key) {
            let id = self.next_id.fetch_add(1, AtomicOrdering::Relaxed);
            document.insert(self.identity_key.clone(), Value::from(id));
        }

        for field in std::iter::once(&self.identity_key).chain(&self.unique) {
            let Some(value) = get_path(&document, field) else {
                continue;
            };
            if documents
                .iter()
                .any(|existing| get_path(existing, field) == Some(value))
            {
                return Err(DocumentError::NotUnique(format!(
                    "{DUPLICATE_KEY_CODE} duplicate key error collection: {} index: {field}_1 dup key: {{ {field}: {value} }}",
                    self.name
                )));
            }
        }

        documents.push(document.clone());
        Ok(Value::Object(document))
    }
}

// ===== Filter evaluation =====

fn matches(document: &Map<String, Value>, filter: &Map<String, Value>) -> Result<bool, DocumentError> {
    for (path, condition) in filter {
        if path.starts_with('$') {
            return Err(DocumentError::InvalidQuery(format!(
                "unknown top level operator: {path}"
            )));
        }
        let field = get_path(document, path);
        let matched = match condition {
            Value::Object(operators) if is_operator_object(operators) => {
                matches_operators(field, operators)?
            }
            expected => equals(field, expected),
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality with array membership: `tags: "a"` matches `["a", "b"]`.
fn equals(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(value) => value == expected,
    }
}

fn matches_operators(
    field: Option<&Value>,
    operators: &Map<String, Value>,
) -> Result<bool, DocumentError> {
    for (op, operand) in operators {
        let matched = match op.as_str() {
            "$eq" => equals(field, operand),
            "$ne" => !equals(field, operand),
            "$gt" => compares(field, operand, Ordering::is_gt),
            "$gte" => compares(field, operand, Ordering::is_ge),
            "$lt" => compares(field, operand, Ordering::is_lt),
            "$lte" => compares(field, operand, Ordering::is_le),
            "$in" => operand_list(op, operand)?.iter().any(|item| equals(field, item)),
            "$nin" => !operand_list(op, operand)?.iter().any(|item| equals(field, item)),
            "$all" => {
                let items = operand_list(op, operand)?;
                !items.is_empty() && items.iter().all(|item| equals(field, item))
            }
            "$size" => {
                let size = operand.as_u64().ok_or_else(|| {
                    DocumentError::InvalidQuery(format!("$size needs a number, got {operand}"))
                })?;
                matches!(field, Some(Value::Array(items)) if items.len() as u64 == size)
            }
            "$exists" => field.is_some() == operand.as_bool().unwrap_or(true),
            "$regex" => {
                let insensitive = operators
                    .get("$options")
                    .and_then(Value::as_str)
                    .is_some_and(|options| options.contains('i'));
                regex_matches(field, operand, insensitive)?
            }
            "$options" => true,
            other => {
                return Err(DocumentError::InvalidQuery(format!(
                    "unknown operator: {other}"
                )));
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn operand_list<'a>(op: &str, operand: &'a Value) -> Result<&'a Vec<Value>, DocumentError> {
    operand
        .as_array()
        .ok_or_else(|| DocumentError::InvalidQuery(format!("{op} needs an array")))
}

/// Range comparison within one type; arrays match if any element does.
fn compares(field: Option<&Value>, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    let same_type = |value: &Value| {
        std::mem::discriminant(value) == std::mem::discriminant(operand)
            && accept(compare_values(value, operand))
    };
    match field {
        None => false,
        Some(Value::Array(items)) if !operand.is_array() => items.iter().any(same_type),
        Some(value) => same_type(value),
    }
}

fn regex_matches(
    field: Option<&Value>,
    pattern: &Value,
    insensitive: bool,
) -> Result<bool, DocumentError> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| DocumentError::InvalidQuery("$regex needs a string".to_string()))?;
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(insensitive)
        .build()
        .map_err(|err| DocumentError::InvalidQuery(err.to_string()))?;
    Ok(match field {
        Some(Value::String(text)) => regex.is_match(text),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|text| regex.is_match(text)),
        _ => false,
    })
}

fn select_fields(mut document: Map<String, Value>, fields: &FieldSelection) -> Map<String, Value> {
    match fields {
        FieldSelection::All => document,
        FieldSelection::Include(paths) => {
            let mut selected = Map::new();
            for path in paths {
                if let Some(value) = get_path(&document, path) {
                    set_path(&mut selected, path, value.clone());
                }
            }
            selected
        }
        FieldSelection::Exclude(paths) => {
            for path in paths {
                remove_path(&mut document, path);
            }
            document
        }
    }
}

fn sort_documents(documents: &mut [Map<String, Value>], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    documents.sort_by(|a, b| {
        keys.iter()
            .map(|key| {
                let ordering = compare_values(
                    get_path(a, &key.field).unwrap_or(&Value::Null),
                    get_path(b, &key.field).unwrap_or(&Value::Null),
                );
                match key.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

// ===== Aggregation =====

fn run_stage(
    documents: Vec<Map<String, Value>>,
    stage: &Stage,
) -> Result<Vec<Map<String, Value>>, DocumentError> {
    match stage {
        Stage::Match(filter) => {
            let mut matched = Vec::new();
            for document in documents {
                if matches(&document, filter)? {
                    matched.push(document);
                }
            }
            Ok(matched)
        }
        Stage::Group { id, accumulators } => group(documents, id, accumulators),
        Stage::Project(entries) => Ok(documents
            .into_iter()
            .map(|document| {
                // dotted outputs nest, as `$project` does
                let mut projected = Map::new();
                for (output, source) in entries {
                    if let Some(value) = get_path(&document, source) {
                        set_path(&mut projected, output, value.clone());
                    }
                }
                projected
            })
            .collect()),
        Stage::Sort(keys) => {
            let keys: Vec<SortKey> = keys
                .iter()
                .map(|(field, direction)| SortKey {
                    field: field.clone(),
                    direction: *direction,
                })
                .collect();
            let mut documents = documents;
            sort_documents(&mut documents, &keys);
            Ok(documents)
        }
        Stage::Skip(count) => Ok(documents
            .into_iter()
            .skip(usize::try_from(*count).unwrap_or(usize::MAX))
            .collect()),
        Stage::Limit(count) => Ok(documents
            .into_iter()
            .take(usize::try_from(*count).unwrap_or(usize::MAX))
            .collect()),
    }
}

fn group(
    documents: Vec<Map<String, Value>>,
    id: &[(String, String)],
    accumulators: &[GroupAccumulator],
) -> Result<Vec<Map<String, Value>>, DocumentError> {
    let mut groups: Vec<(Value, Vec<Vec<Value>>)> = Vec::new();

    for document in &documents {
        let mut identity = Map::new();
        for (key, path) in id {
            let value = get_path(document, path).cloned().unwrap_or(Value::Null);
            identity.insert(key.clone(), value);
        }
        let identity = Value::Object(identity);

        let position = match groups.iter().position(|(existing, _)| *existing == identity) {
            Some(position) => position,
            None => {
                groups.push((identity, vec![Vec::new(); accumulators.len()]));
                groups.len() - 1
            }
        };

        let inputs = &mut groups[position].1;
        for (accumulator, input) in accumulators.iter().zip(inputs.iter_mut()) {
            let value = match &accumulator.source {
                GroupSource::Const(value) => Some(Value::from(*value)),
                GroupSource::Path(path) => get_path(document, path).cloned(),
            };
            if let Some(value) = value {
                input.push(value);
            }
        }
    }

    groups
        .into_iter()
        .map(|(identity, inputs)| {
            let mut output = Map::new();
            output.insert("_id".to_string(), identity);
            for (accumulator, input) in accumulators.iter().zip(inputs) {
                output.insert(accumulator.output.clone(), accumulate(&accumulator.operator, input)?);
            }
            Ok(output)
        })
        .collect()
}

fn accumulate(operator: &str, values: Vec<Value>) -> Result<Value, DocumentError> {
    let numbers = || values.iter().filter(|value| value.is_number());
    let result = match operator {
        "$sum" => numbers().fold(Value::from(0), |total, value| add(&total, value)),
        "$avg" => {
            let count = numbers().count();
            if count == 0 {
                Value::Null
            } else {
                let total = numbers().filter_map(Value::as_f64).sum::<f64>();
                #[allow(clippy::cast_precision_loss)]
                let average = total / count as f64;
                serde_json::Number::from_f64(average).map_or(Value::Null, Value::Number)
            }
        }
        "$min" => values
            .iter()
            .filter(|value| !value.is_null())
            .min_by(|a, b| compare_values(a, b))
            .cloned()
            .unwrap_or(Value::Null),
        "$max" => values
            .iter()
            .filter(|value| !value.is_null())
            .max_by(|a, b| compare_values(a, b))
            .cloned()
            .unwrap_or(Value::Null),
        "$first" => values.first().cloned().unwrap_or(Value::Null),
        "$last" => values.last().cloned().unwrap_or(Value::Null),
        "$push" => Value::Array(values),
        "$addToSet" => {
            let mut unique: Vec<Value> = Vec::new();
            for value in values {
                if !unique.contains(&value) {
                    unique.push(value);
                }
            }
            Value::Array(unique)
        }
        other => {
            return Err(DocumentError::OperationFailure(format!(
                "unknown group operator '{other}'"
            )));
        }
    };
    Ok(result)
}

fn add(total: &Value, value: &Value) -> Value {
    match (total.as_i64(), value.as_i64()) {
        (Some(a), Some(b)) if a.checked_add(b).is_some() => Value::from(a + b),
        _ => {
            let sum = total.as_f64().unwrap_or(0.0) + value.as_f64().unwrap_or(0.0);
            serde_json::Number::from_f64(sum).map_or(Value::Null, Value::Number)
        }
    }
}
