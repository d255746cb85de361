//! Document-store backend.
//!
//! Plans lower into a [`DocumentQuery`], which is executed against any
//! [`DocumentCollection`] driver. Collection queries become a filtered
//! find with sort and skip/limit; distinct and frequency requests use the
//! driver's dedicated calls; group requests become an aggregation
//! pipeline (see [`pipeline`]).

pub mod filter;
pub mod memory;
pub mod pipeline;
pub mod resource;

use serde_json::{Map, Value};
use std::cmp::Ordering;
use thiserror::Error;
use tracing::debug;

use self::filter::build_filter;
use self::pipeline::{Stage, build_group_count_pipeline, build_group_pipeline, render};
use super::Lowering;
use crate::envelope::{Frequency, QueryOutput, ResultSet};
use crate::errors::ApiError;
use crate::plan::{Aggregation, Mode, Projection, QueryPlan, SortKey, Window};
use crate::schema::ModelSchema;

/// Duplicate-key error code carried by unique index violations
pub const DUPLICATE_KEY_CODE: &str = "E11000";

/// Errors raised by a document-store driver.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("{0}")]
    NotUnique(String),
    #[error("{0}")]
    Operation(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidQuery(String),
    #[error("{0}")]
    OperationFailure(String),
    #[error("multiple objects returned")]
    MultipleObjectsReturned,
    #[error("{0}")]
    DoesNotExist(String),
}

/// Arguments of a filtered find.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub filter: Map<String, Value>,
    pub sort: Vec<SortKey>,
    pub skip: u64,
    /// `None` fetches everything after `skip`
    pub limit: Option<u64>,
    /// Fields the driver returns
    pub fields: FieldSelection,
}

/// Store-side projection pushed down to the driver. Renames and the
/// identity rule stay with [`Projection::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldSelection {
    #[default]
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl FieldSelection {
    /// Paths a driver must return for `projection` to be applied
    /// afterwards. Nested selections include only their dotted paths.
    #[must_use]
    pub fn from_projection(projection: &Projection, identity_key: &str) -> Self {
        match projection {
            Projection::All => Self::All,
            Projection::Exclude(paths) => Self::Exclude(paths.clone()),
            Projection::Only { fields, nested, .. } => {
                let mut paths = vec![identity_key.to_string()];
                for field in fields {
                    let before = paths.len();
                    paths.extend(
                        nested
                            .iter()
                            .filter(|(_, top)| *top == field)
                            .map(|(path, _)| path.clone()),
                    );
                    if paths.len() == before && field != identity_key {
                        paths.push(field.clone());
                    }
                }
                Self::Include(paths)
            }
        }
    }

    /// The store's projection document, `{"title": 1}` or `{"tags": 0}`;
    /// `None` returns whole documents.
    #[must_use]
    pub fn to_document(&self) -> Option<Map<String, Value>> {
        let (paths, flag) = match self {
            Self::All => return None,
            Self::Include(paths) => (paths, 1),
            Self::Exclude(paths) => (paths, 0),
        };
        Some(paths.iter().map(|path| (path.clone(), Value::from(flag))).collect())
    }
}

/// Driver capability the document backend needs from a collection.
pub trait DocumentCollection: Send + Sync {
    /// Number of documents matching `filter`
    fn count(&self, filter: &Map<String, Value>) -> Result<u64, DocumentError>;

    fn find(&self, options: &FindOptions) -> Result<Vec<Value>, DocumentError>;

    /// Distinct values of `field` among matching documents, unordered
    fn distinct(&self, field: &str, filter: &Map<String, Value>)
    -> Result<Vec<Value>, DocumentError>;

    /// `(value, count)` pairs for `field`, unordered; counts are
    /// proportions of the matching documents when `normalize` is set
    fn item_frequencies(
        &self,
        field: &str,
        filter: &Map<String, Value>,
        normalize: bool,
    ) -> Result<Vec<(Value, Value)>, DocumentError>;

    fn aggregate(&self, pipeline: &[Stage]) -> Result<Vec<Value>, DocumentError>;

    /// Store a new document and return it as stored
    fn insert(&self, document: Value) -> Result<Value, DocumentError>;
}

/// Total order over JSON values: null < bool < number < string < array <
/// object, natural order within a type.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let type_order = |value: &Value| -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    };

    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => {
                let a = a.as_f64().unwrap_or(0.0);
                let b = b.as_f64().unwrap_or(0.0);
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b)
            .map(|(a, b)| compare_values(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        _ => type_order(a).cmp(&type_order(b)),
    }
}

/// A plan lowered onto the document store, ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentQuery {
    Collection {
        find: FindOptions,
        projection: Projection,
        scalar: Vec<String>,
        identity_key: String,
    },
    Count {
        filter: Map<String, Value>,
    },
    First {
        find: FindOptions,
        projection: Projection,
        identity_key: String,
        resource: String,
    },
    Distinct {
        field: String,
        filter: Map<String, Value>,
        descending: bool,
        window: Window,
        count: bool,
    },
    Frequencies {
        field: String,
        filter: Map<String, Value>,
        normalize: bool,
        descending: bool,
        start: u64,
        stop: Option<u64>,
    },
    Group {
        pipeline: Vec<Stage>,
    },
    GroupCount {
        pipeline: Vec<Stage>,
    },
}

/// Lowers plans for one model onto the document store.
#[derive(Debug, Clone)]
pub struct DocumentLowering {
    schema: ModelSchema,
}

impl DocumentLowering {
    #[must_use]
    pub fn new(schema: ModelSchema) -> Self {
        Self { schema }
    }
}

impl Lowering for DocumentLowering {
    type Query = DocumentQuery;

    fn lower(&self, plan: &QueryPlan) -> Result<DocumentQuery, ApiError> {
        let filter = build_filter(&plan.predicates, &self.schema)?;
        debug!(resource = self.schema.name(), ?filter, "document filter");

        let query = match &plan.aggregation {
            Some(Aggregation::Frequencies { field, normalize }) => {
                let ascending = plan
                    .sort
                    .first()
                    .is_some_and(|key| key.field == *field && !key.is_descending());
                DocumentQuery::Frequencies {
                    field: field.clone(),
                    filter,
                    normalize: *normalize,
                    descending: !ascending,
                    start: plan.window.start,
                    stop: plan.window.take(),
                }
            }
            Some(Aggregation::Group { keys, accumulators }) => {
                let pipeline = if plan.mode == Mode::Count {
                    build_group_count_pipeline(&filter, keys, accumulators)
                } else {
                    build_group_pipeline(&filter, keys, accumulators, &plan.sort, plan.window)
                };
                debug!(pipeline = %render(&pipeline), "group pipeline");
                if plan.mode == Mode::Count {
                    DocumentQuery::GroupCount { pipeline }
                } else {
                    DocumentQuery::Group { pipeline }
                }
            }
            Some(Aggregation::Distinct { field }) => {
                let count = plan.mode == Mode::Count;
                let descending = if count {
                    false
                } else {
                    distinct_order(field, &plan.sort)?
                };
                DocumentQuery::Distinct {
                    field: field.clone(),
                    filter,
                    descending,
                    window: plan.window,
                    count,
                }
            }
            None => match plan.mode {
                Mode::Count => DocumentQuery::Count { filter },
                Mode::First => DocumentQuery::First {
                    find: FindOptions {
                        filter,
                        sort: plan.sort.clone(),
                        skip: 0,
                        limit: Some(1),
                        fields: FieldSelection::from_projection(
                            &plan.projection,
                            self.schema.identity_key(),
                        ),
                    },
                    projection: plan.projection.clone(),
                    identity_key: self.schema.identity_key().to_string(),
                    resource: self.schema.name().to_string(),
                },
                Mode::Collection => DocumentQuery::Collection {
                    find: FindOptions {
                        filter,
                        sort: plan.sort.clone(),
                        skip: plan.window.start,
                        limit: plan.window.take(),
                        fields: if plan.scalar.is_empty() {
                            FieldSelection::from_projection(
                                &plan.projection,
                                self.schema.identity_key(),
                            )
                        } else {
                            FieldSelection::Include(plan.scalar.clone())
                        },
                    },
                    projection: plan.projection.clone(),
                    scalar: plan.scalar.clone(),
                    identity_key: self.schema.identity_key().to_string(),
                },
            },
        };
        Ok(query)
    }
}

/// Distinct values may only be sorted on the distinct field itself.
fn distinct_order(field: &str, sort: &[SortKey]) -> Result<bool, ApiError> {
    match sort {
        [] => Ok(false),
        [key] if key.field == field => Ok(key.is_descending()),
        _ => Err(ApiError::bad_request("Must sort only on distinct")),
    }
}

impl DocumentQuery {
    /// Run the query once against `collection`.
    ///
    /// # Errors
    ///
    /// Driver errors are classified into API errors; a `First` query that
    /// matches nothing is `NotFound`.
    pub fn execute(self, collection: &dyn DocumentCollection) -> Result<QueryOutput, ApiError> {
        match self {
            Self::Collection {
                find,
                projection,
                scalar,
                identity_key,
            } => {
                let total = collection.count(&find.filter)?;
                let documents = collection.find(&find)?;
                if !scalar.is_empty() {
                    return Ok(QueryOutput::Values(scalar_values(documents, &scalar)));
                }
                let data = documents
                    .into_iter()
                    .map(|document| projection.apply(document, &identity_key))
                    .collect();
                Ok(QueryOutput::Collection(
                    ResultSet::with_total(total, data).into(),
                ))
            }
            Self::Count { filter } => Ok(QueryOutput::Scalar(collection.count(&filter)?)),
            Self::First { ref resource, .. } => {
                let resource = resource.clone();
                self.first_record(collection)?
                    .map(QueryOutput::Record)
                    .ok_or_else(|| ApiError::not_found(resource, None))
            }
            Self::Distinct {
                field,
                filter,
                descending,
                window,
                count,
            } => {
                let mut values = collection.distinct(&field, &filter)?;
                if count {
                    return Ok(QueryOutput::Scalar(values.len() as u64));
                }
                values.sort_by(compare_values);
                if descending {
                    values.reverse();
                }
                Ok(QueryOutput::Values(window.slice(values)))
            }
            Self::Frequencies {
                field,
                filter,
                normalize,
                descending,
                start,
                stop,
            } => {
                let mut pairs = collection.item_frequencies(&field, &filter, normalize)?;
                pairs.sort_by(|(_, a), (_, b)| {
                    let ordering = compare_values(a, b);
                    if descending { ordering.reverse() } else { ordering }
                });
                let skip = usize::try_from(start).unwrap_or(usize::MAX);
                let stop = stop.and_then(|stop| usize::try_from(stop).ok());
                let frequencies = pairs
                    .into_iter()
                    .enumerate()
                    .filter(|(index, _)| *index >= skip && stop.is_none_or(|stop| *index < stop))
                    .map(|(_, (value, count))| Frequency { value, count })
                    .collect();
                Ok(QueryOutput::Frequencies(frequencies))
            }
            Self::Group { pipeline } => Ok(QueryOutput::Groups(collection.aggregate(&pipeline)?)),
            Self::GroupCount { pipeline } => {
                let groups = collection.aggregate(&pipeline)?;
                Ok(QueryOutput::Scalar(groups.len() as u64))
            }
        }
    }

    /// Run a `First` query, `None` when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for any other query shape, or the classified
    /// driver error.
    pub fn first_record(
        self,
        collection: &dyn DocumentCollection,
    ) -> Result<Option<Value>, ApiError> {
        let Self::First {
            find,
            projection,
            identity_key,
            ..
        } = self
        else {
            return Err(ApiError::bad_request("Bad or Insufficient Params"));
        };
        Ok(collection
            .find(&find)?
            .into_iter()
            .next()
            .map(|document| projection.apply(document, &identity_key)))
    }
}

/// Bare field values: one value per record for a single field, an array of
/// values otherwise.
fn scalar_values(documents: Vec<Value>, fields: &[String]) -> Vec<Value> {
    let pick = |document: &Value, field: &str| match document {
        Value::Object(map) => value_at(map, field),
        _ => Value::Null,
    };
    documents
        .iter()
        .map(|document| match fields {
            [field] => pick(document, field),
            _ => Value::Array(fields.iter().map(|field| pick(document, field)).collect()),
        })
        .collect()
}

fn value_at(map: &Map<String, Value>, path: &str) -> Value {
    crate::plan::fields::get_path(map, path)
        .cloned()
        .unwrap_or(Value::Null)
}
