use serde_json::{Map, Value};
use tracing::debug;

use super::filter::{build_filter, is_operator_object};
use super::{DocumentCollection, DocumentError, DocumentLowering, FindOptions, compare_values};
use crate::backend::Lowering;
use crate::config::QueryConfig;
use crate::envelope::QueryOutput;
use crate::errors::ApiError;
use crate::params::{Operator, RawParams};
use crate::plan::PlanBuilder;
use crate::plan::fields::set_path;
use crate::schema::ModelSchema;

/// A model stored in a document collection, queried through request
/// parameters.
pub struct DocumentResource<C: DocumentCollection> {
    collection: C,
    builder: PlanBuilder,
    lowering: DocumentLowering,
}

impl<C: DocumentCollection> DocumentResource<C> {
    pub fn new(collection: C, schema: ModelSchema) -> Self {
        Self {
            collection,
            lowering: DocumentLowering::new(schema.clone()),
            builder: PlanBuilder::new(schema),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.builder = self.builder.with_config(config);
        self
    }

    pub fn collection(&self) -> &C {
        &self.collection
    }

    pub fn schema(&self) -> &ModelSchema {
        self.builder.schema()
    }

    /// Compile, lower and execute one request.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for malformed parameters and the classified
    /// driver error otherwise.
    pub fn get_collection(&self, params: RawParams) -> Result<QueryOutput, ApiError> {
        let plan = self.builder.compile(params)?;
        self.lowering.lower(&plan)?.execute(&self.collection)
    }

    /// First matching record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when nothing matches.
    pub fn get_resource(&self, params: RawParams) -> Result<Value, ApiError> {
        let detail = Value::Object(params.clone().into_inner()).to_string();
        self.get(params)?
            .ok_or_else(|| ApiError::not_found(self.schema().name(), Some(detail)))
    }

    /// First matching record, if any.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for malformed parameters.
    pub fn get(&self, mut params: RawParams) -> Result<Option<Value>, ApiError> {
        params.insert("_first", "");
        let plan = self.builder.compile(params)?;
        self.lowering.lower(&plan)?.first_record(&self.collection)
    }

    /// Records whose identity is one of `ids`, with the page size set to
    /// the number of ids.
    ///
    /// # Errors
    ///
    /// See [`DocumentResource::get_collection`].
    pub fn get_by_ids(&self, ids: &[Value], mut params: RawParams) -> Result<QueryOutput, ApiError> {
        let key = format!("{}__{}", self.schema().identity_key(), Operator::In.suffix());
        params.insert(key, Value::Array(ids.to_vec()));
        params.insert("_limit", ids.len().to_string());
        self.get_collection(params)
    }

    /// The single record matching `params`, created from the equality
    /// predicates plus `defaults` when none exists.
    ///
    /// Returns the record and whether it was created.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` when several records match and `Conflict` when
    /// creation violates a unique index.
    pub fn get_or_create(
        &self,
        params: RawParams,
        defaults: Map<String, Value>,
    ) -> Result<(Value, bool), ApiError> {
        let (predicates, _) =
            crate::params::normalize(params, self.schema(), self.builder.config())?;
        let filter = build_filter(&predicates, self.schema())?;
        let find = FindOptions {
            filter,
            limit: Some(2),
            ..FindOptions::default()
        };

        let mut found = self.collection.find(&find)?;
        match found.len() {
            0 => {
                let mut document = Map::new();
                for (path, condition) in &find.filter {
                    if !matches!(condition, Value::Object(map) if is_operator_object(map)) {
                        set_path(&mut document, path, condition.clone());
                    }
                }
                document.extend(defaults);
                debug!(resource = self.schema().name(), ?document, "creating document");
                let created = self.collection.insert(Value::Object(document))?;
                Ok((created, true))
            }
            1 => Ok((found.remove(0), false)),
            _ => Err(DocumentError::MultipleObjectsReturned.into()),
        }
    }

    /// Sorted distinct values for each field.
    ///
    /// # Errors
    ///
    /// Returns the classified driver error.
    pub fn to_distincts(
        &self,
        fields: &[&str],
        descending: bool,
    ) -> Result<Map<String, Value>, ApiError> {
        let mut distincts = Map::new();
        for field in fields {
            let mut values = self.collection.distinct(field, &Map::new())?;
            values.sort_by(compare_values);
            if descending {
                values.reverse();
            }
            distincts.insert((*field).to_string(), Value::Array(values));
        }
        Ok(distincts)
    }
}
