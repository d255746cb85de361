use serde::Serialize;
use tracing::debug;

use super::fields::Projection;
use super::sort::{SortKey, parse_sort};
use super::window::{Window, resolve_window};
use crate::config::QueryConfig;
use crate::errors::ApiError;
use crate::params::{Predicates, RawParams, Specials, normalize};
use crate::schema::ModelSchema;

/// Replace `.` with `__` so a dotted path can be used as an output key.
#[must_use]
pub fn undot(path: &str) -> String {
    path.replace('.', "__")
}

/// Group accumulator named by a `_group$<op>` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccumulatorOp {
    /// Unique values (`addtoset`, `set`)
    AddToSet,
    /// All values (`push`, `list`)
    Push,
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    /// Passed to the store verbatim
    Other(String),
}

impl AccumulatorOp {
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "addtoset" | "set" => Self::AddToSet,
            "push" | "list" => Self::Push,
            "sum" => Self::Sum,
            "avg" => Self::Avg,
            "min" => Self::Min,
            "max" => Self::Max,
            "first" => Self::First,
            "last" => Self::Last,
            _ => Self::Other(name.to_string()),
        }
    }

    /// Suffix of the accumulator's output key
    #[must_use]
    pub fn suffix(&self) -> &str {
        match self {
            Self::AddToSet => "set",
            Self::Push => "list",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::First => "first",
            Self::Last => "last",
            Self::Other(name) => name,
        }
    }

    /// Operator name in the document store's dialect
    #[must_use]
    pub fn operator(&self) -> String {
        match self {
            Self::AddToSet => "$addToSet".to_string(),
            Self::Push => "$push".to_string(),
            other => format!("${}", other.suffix()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Accumulator {
    pub op: AccumulatorOp,
    /// Source field path
    pub field: String,
}

impl Accumulator {
    /// `<undotted field>_<suffix>`, e.g. `amount_sum`
    #[must_use]
    pub fn output_key(&self) -> String {
        format!("{}_{}", undot(&self.field), self.op.suffix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Aggregation {
    Distinct {
        field: String,
    },
    Group {
        keys: Vec<String>,
        accumulators: Vec<Accumulator>,
    },
    Frequencies {
        field: String,
        normalize: bool,
    },
}

/// How the result is shaped. With an aggregation, `Count` asks for the
/// size of the aggregated result instead of its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Collection,
    First,
    Count,
}

/// Compiled, backend-agnostic query. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub predicates: Predicates,
    pub sort: Vec<SortKey>,
    pub window: Window,
    pub projection: Projection,
    pub aggregation: Option<Aggregation>,
    pub mode: Mode,
    /// Fields whose bare values are returned instead of records
    pub scalar: Vec<String>,
    /// Whether `_limit` came from the request rather than the config
    pub limit_supplied: bool,
}

/// Compiles parameters into a [`QueryPlan`] for one model.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    schema: ModelSchema,
    config: QueryConfig,
}

impl PlanBuilder {
    #[must_use]
    pub fn new(schema: ModelSchema) -> Self {
        Self {
            schema,
            config: QueryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    #[must_use]
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Normalize and build in one step.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for any malformed or conflicting parameter.
    pub fn compile(&self, raw: RawParams) -> Result<QueryPlan, ApiError> {
        let (predicates, specials) = normalize(raw, &self.schema, &self.config)?;
        self.build(predicates, specials)
    }

    /// # Errors
    ///
    /// Returns `BadRequest` for an invalid window, an invalid sort token or
    /// a projection mixing selected and excluded fields.
    pub fn build(&self, predicates: Predicates, specials: Specials) -> Result<QueryPlan, ApiError> {
        let limit_supplied = specials.limit.is_some();
        let limit = specials.limit.unwrap_or(self.config.default_limit);
        let window = resolve_window(specials.start, specials.page, limit)?;
        let sort = parse_sort(&specials.sort)?;
        let projection = Projection::parse(&specials.fields)?;

        let aggregation = if let Some(field) = specials.frequencies {
            Some(Aggregation::Frequencies {
                field,
                normalize: specials.fq_normalize,
            })
        } else if !specials.group.is_empty() {
            let accumulators = specials
                .group_ops
                .iter()
                .flat_map(|(op, fields)| {
                    let op = AccumulatorOp::parse(op);
                    fields.iter().map(move |field| Accumulator {
                        op: op.clone(),
                        field: field.clone(),
                    })
                })
                .collect();
            Some(Aggregation::Group {
                keys: specials.group,
                accumulators,
            })
        } else {
            specials
                .distinct
                .map(|field| Aggregation::Distinct { field })
        };

        let mode = if aggregation.is_some() {
            if specials.count {
                Mode::Count
            } else {
                Mode::Collection
            }
        } else if specials.first {
            Mode::First
        } else if specials.count {
            Mode::Count
        } else {
            Mode::Collection
        };

        let plan = QueryPlan {
            predicates,
            sort,
            window,
            projection,
            aggregation,
            mode,
            scalar: specials.scalar,
            limit_supplied,
        };
        debug!(resource = self.schema.name(), ?plan, "compiled query plan");
        Ok(plan)
    }
}
