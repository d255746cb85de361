//! Relational backend on Sea-ORM.
//!
//! Plans lower onto a filtered, ordered `Select<E>`. Only collection, count
//! and single-record queries exist here; aggregation and `_scalar`
//! requests fail instead of degrading, and collection queries need an
//! explicit `_limit`.
//!
//! Every execution runs inside its own transaction, which is rolled back
//! before an error is returned.

use async_trait::async_trait;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, ColumnType, Condition, DatabaseConnection,
    DatabaseTransaction, EntityTrait, IdenStatic, Iterable, Order, PaginatorTrait,
    PrimaryKeyToColumn, QueryFilter, QueryOrder, QuerySelect, Select, TransactionTrait,
    sea_query::{Expr, Func, LikeExpr, SimpleExpr, Value as SqlValue},
};
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::str::FromStr;
use tracing::{debug, warn};

use super::Lowering;
use crate::config::QueryConfig;
use crate::envelope::{QueryOutput, ResultSet};
use crate::errors::ApiError;
use crate::params::convert::{as_bool, as_str};
use crate::params::{Operator, Predicates, RawParams};
use crate::plan::{Aggregation, Mode, PlanBuilder, Projection, QueryPlan, SortDirection, Window};
use crate::schema::{FieldKind, ModelSchema};

/// Backend name used in unsupported-operation errors
pub const BACKEND: &str = "relational";

const LIKE_ESCAPE: char = '\\';

const NO_LIMIT: u64 = i64::MAX.unsigned_abs();

/// Map a column type onto the field kinds the normalizer knows.
#[must_use]
pub fn field_kind(column_type: &ColumnType) -> FieldKind {
    match column_type {
        ColumnType::Char(_) | ColumnType::String(_) | ColumnType::Text => FieldKind::String,
        ColumnType::TinyInteger
        | ColumnType::SmallInteger
        | ColumnType::Integer
        | ColumnType::BigInteger
        | ColumnType::TinyUnsigned
        | ColumnType::SmallUnsigned
        | ColumnType::Unsigned
        | ColumnType::BigUnsigned => FieldKind::Integer,
        ColumnType::Float | ColumnType::Double | ColumnType::Decimal(_) => FieldKind::Float,
        ColumnType::Boolean => FieldKind::Boolean,
        ColumnType::DateTime
        | ColumnType::Timestamp
        | ColumnType::TimestampWithTimeZone
        | ColumnType::Date
        | ColumnType::Time => FieldKind::DateTime,
        ColumnType::Uuid => FieldKind::Uuid,
        ColumnType::Json | ColumnType::JsonBinary => FieldKind::Map,
        ColumnType::Array(_) => FieldKind::List,
        _ => FieldKind::Other,
    }
}

/// Describe an entity's columns; the identity key is its first primary key
/// column.
#[must_use]
pub fn schema_for<E: EntityTrait>(name: &str) -> ModelSchema {
    let mut schema = E::Column::iter().fold(ModelSchema::new(name), |schema, column| {
        schema.field(column.as_str(), field_kind(column.def().get_column_type()))
    });
    if let Some(primary_key) = E::PrimaryKey::iter().next() {
        schema = schema.identity(primary_key.into_column().as_str());
    }
    schema
}

fn resolve_column<E: EntityTrait>(name: &str) -> Result<E::Column, ApiError> {
    E::Column::from_str(name).map_err(|_| ApiError::bad_request(format!("Bad attribute '{name}'")))
}

/// Convert a predicate value into the SQL value variant of its column.
fn to_sql_value(column_type: &ColumnType, attribute: &str, value: &Value) -> Result<SqlValue, ApiError> {
    let bad_value = || ApiError::bad_request(format!("Bad value for '{attribute}': `{value}`"));
    let integer = || -> Result<i64, ApiError> {
        match value {
            Value::Number(number) => number.as_i64().ok_or_else(bad_value),
            Value::String(text) => text.trim().parse().map_err(|_| bad_value()),
            Value::Bool(flag) => Ok(i64::from(*flag)),
            _ => Err(bad_value()),
        }
    };
    let float = || -> Result<f64, ApiError> {
        match value {
            Value::Number(number) => number.as_f64().ok_or_else(bad_value),
            Value::String(text) => text.trim().parse().map_err(|_| bad_value()),
            _ => Err(bad_value()),
        }
    };

    let converted = match column_type {
        ColumnType::TinyInteger => SqlValue::from(i8::try_from(integer()?).map_err(|_| bad_value())?),
        ColumnType::SmallInteger => SqlValue::from(i16::try_from(integer()?).map_err(|_| bad_value())?),
        ColumnType::Integer => SqlValue::from(i32::try_from(integer()?).map_err(|_| bad_value())?),
        ColumnType::BigInteger => SqlValue::from(integer()?),
        ColumnType::TinyUnsigned => SqlValue::from(u8::try_from(integer()?).map_err(|_| bad_value())?),
        ColumnType::SmallUnsigned => SqlValue::from(u16::try_from(integer()?).map_err(|_| bad_value())?),
        ColumnType::Unsigned => SqlValue::from(u32::try_from(integer()?).map_err(|_| bad_value())?),
        ColumnType::BigUnsigned => SqlValue::from(u64::try_from(integer()?).map_err(|_| bad_value())?),
        #[allow(clippy::cast_possible_truncation)]
        ColumnType::Float => SqlValue::from(float()? as f32),
        ColumnType::Double => SqlValue::from(float()?),
        ColumnType::Boolean => SqlValue::from(as_bool(value)),
        ColumnType::Uuid => {
            let text = as_str(value).ok_or_else(bad_value)?;
            SqlValue::from(uuid::Uuid::parse_str(text.trim()).map_err(|_| bad_value())?)
        }
        ColumnType::Json | ColumnType::JsonBinary => SqlValue::from(value.clone()),
        _ => SqlValue::from(as_str(value).ok_or_else(bad_value)?),
    };
    Ok(converted)
}

/// Column types whose SQL value variant matches the model field exactly.
const fn settable(column_type: &ColumnType) -> bool {
    matches!(
        column_type,
        ColumnType::Char(_)
            | ColumnType::String(_)
            | ColumnType::Text
            | ColumnType::TinyInteger
            | ColumnType::SmallInteger
            | ColumnType::Integer
            | ColumnType::BigInteger
            | ColumnType::TinyUnsigned
            | ColumnType::SmallUnsigned
            | ColumnType::Unsigned
            | ColumnType::BigUnsigned
            | ColumnType::Float
            | ColumnType::Double
            | ColumnType::Boolean
            | ColumnType::Uuid
            | ColumnType::Json
            | ColumnType::JsonBinary
    )
}

/// Escape `%` and `_` for a `LIKE` pattern.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

fn like(column: impl ColumnTrait, pattern: String, insensitive: bool) -> SimpleExpr {
    if insensitive {
        SimpleExpr::FunctionCall(Func::upper(Expr::col(column)))
            .like(LikeExpr::new(pattern.to_uppercase()).escape(LIKE_ESCAPE))
    } else {
        Expr::col(column).like(LikeExpr::new(pattern).escape(LIKE_ESCAPE))
    }
}

fn list_values(column_type: &ColumnType, attribute: &str, value: &Value) -> Result<Vec<SqlValue>, ApiError> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| to_sql_value(column_type, attribute, item))
            .collect(),
        other => Ok(vec![to_sql_value(column_type, attribute, other)?]),
    }
}

/// Build the `WHERE` condition for the predicates of entity `E`.
///
/// # Errors
///
/// Returns `BadRequest` for unknown columns or uncoercible values, and an
/// unsupported error for `__all` and `__size`.
pub fn build_condition<E: EntityTrait>(predicates: &Predicates) -> Result<Condition, ApiError> {
    let mut condition = Condition::all();

    for (key, value) in predicates.iter() {
        let (attribute, op) = Operator::split(key);
        let column = resolve_column::<E>(attribute)?;
        let column_type = column.def().get_column_type().clone();
        let scalar = |value: &Value| to_sql_value(&column_type, attribute, value);

        let expr = match op {
            None => match value {
                Value::Null => column.is_null(),
                Value::Array(_) => column.is_in(list_values(&column_type, attribute, value)?),
                other => column.eq(scalar(other)?),
            },
            Some(Operator::Ne) => match value {
                Value::Null => column.is_not_null(),
                other => column.ne(scalar(other)?),
            },
            Some(Operator::Lt) => column.lt(scalar(value)?),
            Some(Operator::Lte) => column.lte(scalar(value)?),
            Some(Operator::Gt) => column.gt(scalar(value)?),
            Some(Operator::Gte) => column.gte(scalar(value)?),
            Some(Operator::In) => column.is_in(list_values(&column_type, attribute, value)?),
            Some(Operator::Nin) => column.is_not_in(list_values(&column_type, attribute, value)?),
            Some(Operator::Exists) => {
                let present = match value {
                    Value::Number(number) => number.as_i64() != Some(0),
                    other => as_bool(other),
                };
                if present {
                    column.is_not_null()
                } else {
                    column.is_null()
                }
            }
            Some(op @ (Operator::All | Operator::Size)) => {
                return Err(ApiError::unsupported(BACKEND, format!("__{}", op.suffix())));
            }
            Some(op) => {
                let text = as_str(value).ok_or_else(|| {
                    ApiError::bad_request(format!("Bad value for '{attribute}': expecting text"))
                })?;
                let escaped = escape_like(&text);
                match op {
                    Operator::Contains => like(column, format!("%{escaped}%"), false),
                    Operator::IContains => like(column, format!("%{escaped}%"), true),
                    Operator::StartsWith => like(column, format!("{escaped}%"), false),
                    Operator::IStartsWith => like(column, format!("{escaped}%"), true),
                    Operator::EndsWith => like(column, format!("%{escaped}"), false),
                    Operator::IEndsWith => like(column, format!("%{escaped}"), true),
                    Operator::IExact => SimpleExpr::FunctionCall(Func::upper(Expr::col(column)))
                        .eq(text.to_uppercase()),
                    _ => column.eq(text),
                }
            }
        };
        condition = condition.add(expr);
    }

    Ok(condition)
}

/// A plan lowered onto a Sea-ORM select, ready to execute.
pub struct RelationalQuery<E: EntityTrait> {
    pub select: Select<E>,
    pub mode: Mode,
    pub window: Window,
    pub projection: Projection,
    pub identity_key: String,
    pub resource: String,
}

/// Lowers plans for entity `E`.
pub struct RelationalLowering<E: EntityTrait> {
    schema: ModelSchema,
    entity: PhantomData<E>,
}

impl<E: EntityTrait> RelationalLowering<E> {
    #[must_use]
    pub fn new(schema: ModelSchema) -> Self {
        Self {
            schema,
            entity: PhantomData,
        }
    }
}

impl<E: EntityTrait> Lowering for RelationalLowering<E> {
    type Query = RelationalQuery<E>;

    fn lower(&self, plan: &QueryPlan) -> Result<RelationalQuery<E>, ApiError> {
        if let Some(aggregation) = &plan.aggregation {
            let directive = match aggregation {
                Aggregation::Distinct { .. } => "_distinct",
                Aggregation::Group { .. } => "_group",
                Aggregation::Frequencies { .. } => "_frequencies",
            };
            return Err(ApiError::unsupported(BACKEND, directive));
        }
        if !plan.scalar.is_empty() {
            return Err(ApiError::unsupported(BACKEND, "_scalar"));
        }
        if plan.mode == Mode::Collection && !plan.limit_supplied {
            return Err(ApiError::bad_request("Missing _limit"));
        }

        match &plan.projection {
            Projection::All => {}
            Projection::Only { fields, .. } | Projection::Exclude(fields) => {
                for field in fields {
                    resolve_column::<E>(field)?;
                }
            }
        }

        let mut select = E::find().filter(build_condition::<E>(&plan.predicates)?);
        for key in &plan.sort {
            let column = resolve_column::<E>(&key.field)?;
            let order = match key.direction {
                SortDirection::Ascending => Order::Asc,
                SortDirection::Descending => Order::Desc,
            };
            select = select.order_by(column, order);
        }

        Ok(RelationalQuery {
            select,
            mode: plan.mode,
            window: plan.window,
            projection: plan.projection.clone(),
            identity_key: self.schema.identity_key().to_string(),
            resource: self.schema.name().to_string(),
        })
    }
}

impl<E> RelationalQuery<E>
where
    E: EntityTrait,
    E::Model: Sync,
{
    /// Run the query inside a fresh transaction.
    ///
    /// # Errors
    ///
    /// Driver errors are classified into API errors after the transaction
    /// has been rolled back; a `First` query that matches nothing is
    /// `NotFound`.
    pub async fn execute(self, db: &DatabaseConnection) -> Result<QueryOutput, ApiError> {
        let txn = db.begin().await?;
        match self.run(&txn).await {
            Ok(output) => {
                txn.commit().await?;
                Ok(output)
            }
            Err(err) => {
                if let Err(rollback) = txn.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn run(self, txn: &DatabaseTransaction) -> Result<QueryOutput, ApiError> {
        match self.mode {
            Mode::Count => Ok(QueryOutput::Scalar(self.select.count(txn).await?)),
            Mode::First => {
                let record = self.select.limit(1).into_json().one(txn).await?;
                record
                    .map(|record| QueryOutput::Record(self.projection.apply(record, &self.identity_key)))
                    .ok_or_else(|| ApiError::not_found(self.resource, None))
            }
            Mode::Collection => {
                let total = self.select.clone().count(txn).await?;
                let select = match (self.window.start, self.window.take()) {
                    (0, None) => self.select,
                    // an offset needs a limit in SQLite
                    (start, take) => self.select.offset(start).limit(take.unwrap_or(NO_LIMIT)),
                };
                let data = select
                    .into_json()
                    .all(txn)
                    .await?
                    .into_iter()
                    .map(|record| self.projection.apply(record, &self.identity_key))
                    .collect();
                Ok(QueryOutput::Collection(ResultSet::with_total(total, data).into()))
            }
        }
    }
}

/// A Sea-ORM entity queried through request parameters.
#[async_trait]
pub trait RelationalResource: Sized + Send + Sync {
    type EntityType: EntityTrait<Model: Sync> + Sync;

    const RESOURCE_NAME: &'static str;

    #[must_use]
    fn schema() -> ModelSchema {
        schema_for::<Self::EntityType>(Self::RESOURCE_NAME)
    }

    #[must_use]
    fn config() -> QueryConfig {
        QueryConfig::default()
    }

    #[must_use]
    fn plan_builder() -> PlanBuilder {
        PlanBuilder::new(Self::schema()).with_config(Self::config())
    }

    /// Compile, lower and execute one request.
    async fn get_collection(
        db: &DatabaseConnection,
        params: RawParams,
    ) -> Result<QueryOutput, ApiError> {
        let plan = Self::plan_builder().compile(params)?;
        RelationalLowering::<Self::EntityType>::new(Self::schema())
            .lower(&plan)?
            .execute(db)
            .await
    }

    /// The single matching record; `NotFound` when there is none and
    /// `BadRequest` when several match.
    async fn get_resource(db: &DatabaseConnection, params: RawParams) -> Result<Value, ApiError> {
        let detail = Value::Object(params.clone().into_inner()).to_string();
        Self::get(db, params)
            .await?
            .ok_or_else(|| ApiError::not_found(Self::RESOURCE_NAME, Some(detail)))
    }

    /// Like [`RelationalResource::get_resource`] but `None` when nothing
    /// matches.
    async fn get(db: &DatabaseConnection, mut params: RawParams) -> Result<Option<Value>, ApiError> {
        params.insert("_limit", "2");
        match Self::get_collection(db, params).await? {
            QueryOutput::Collection(mut envelope) => match envelope.data.len() {
                0 => Ok(None),
                1 => Ok(envelope.data.pop()),
                _ => Err(ApiError::bad_request("Bad or Insufficient Params")),
            },
            _ => Err(ApiError::bad_request("Bad or Insufficient Params")),
        }
    }
}

/// Fetch the single record matching `params`, or insert `defaults` with the
/// equality predicates applied. Returns the record and whether it was
/// created.
///
/// # Errors
///
/// Returns `BadRequest` when several records match or a predicate can not
/// be stored, and `Conflict` when the insert violates a unique constraint.
pub async fn get_or_create<R, A>(
    db: &DatabaseConnection,
    params: RawParams,
    defaults: A,
) -> Result<(Value, bool), ApiError>
where
    R: RelationalResource,
    A: ActiveModelTrait<Entity = R::EntityType> + ActiveModelBehavior + Send,
    <R::EntityType as EntityTrait>::Model: Serialize + sea_orm::IntoActiveModel<A>,
{
    if let Some(record) = R::get(db, params.clone()).await? {
        return Ok((record, false));
    }

    let builder = R::plan_builder();
    let (predicates, _) = crate::params::normalize(params, builder.schema(), builder.config())?;
    let mut active = defaults;
    for (key, value) in predicates.iter() {
        let (attribute, op) = Operator::split(key);
        if op.is_some() || value.is_array() {
            continue;
        }
        let column = resolve_column::<R::EntityType>(attribute)?;
        let column_type = column.def().get_column_type().clone();
        if !settable(&column_type) {
            return Err(ApiError::bad_request(format!("Can not create from '{attribute}'")));
        }
        active.set(column, to_sql_value(&column_type, attribute, value)?);
    }

    debug!(resource = R::RESOURCE_NAME, "creating record");
    let model = active.insert(db).await?;
    let record = serde_json::to_value(model)
        .map_err(|err| ApiError::internal("Failed to serialize record", Some(err.to_string())))?;
    Ok((record, true))
}
