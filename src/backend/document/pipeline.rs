//! Aggregation pipeline descriptors.
//!
//! A group query runs through match, group, project, sort, skip and limit
//! stages in that order. Stages are plain values and the builders below
//! are pure, so a pipeline can be inspected, logged or rendered to the
//! store's JSON dialect before it is executed.

use serde_json::{Map, Value, json};

use crate::plan::{Accumulator, SortDirection, SortKey, Window, undot};

/// Name of the synthetic group-size accumulator
pub const COUNT_KEY: &str = "count";

#[derive(Debug, Clone, PartialEq)]
pub enum GroupSource {
    Const(i64),
    Path(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupAccumulator {
    pub output: String,
    /// Operator in the store's dialect, e.g. `$sum`
    pub operator: String,
    pub source: GroupSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Map<String, Value>),
    Group {
        /// `(identity key, source path)`
        id: Vec<(String, String)>,
        accumulators: Vec<GroupAccumulator>,
    },
    /// `(output key, source path)`; the group identity is dropped
    Project(Vec<(String, String)>),
    Sort(Vec<(String, SortDirection)>),
    Skip(u64),
    Limit(u64),
}

impl Stage {
    /// Render the stage as the store expects it, e.g. `{"$skip": 10}`.
    #[must_use]
    pub fn to_document(&self) -> Value {
        match self {
            Self::Match(filter) => json!({ "$match": filter }),
            Self::Group { id, accumulators } => {
                let mut identity = Map::new();
                for (key, path) in id {
                    identity.insert(key.clone(), Value::String(format!("${path}")));
                }
                let mut group = Map::new();
                group.insert("_id".to_string(), Value::Object(identity));
                for accumulator in accumulators {
                    let operand = match &accumulator.source {
                        GroupSource::Const(value) => Value::from(*value),
                        GroupSource::Path(path) => Value::String(format!("${path}")),
                    };
                    let mut expression = Map::new();
                    expression.insert(accumulator.operator.clone(), operand);
                    group.insert(accumulator.output.clone(), Value::Object(expression));
                }
                json!({ "$group": group })
            }
            Self::Project(entries) => {
                let mut projection = Map::new();
                projection.insert("_id".to_string(), Value::from(0));
                for (output, source) in entries {
                    projection.insert(output.clone(), Value::String(format!("${source}")));
                }
                json!({ "$project": projection })
            }
            Self::Sort(keys) => {
                let mut sort = Map::new();
                for (field, direction) in keys {
                    sort.insert(field.clone(), Value::from(direction.as_i32()));
                }
                json!({ "$sort": sort })
            }
            Self::Skip(count) => json!({ "$skip": count }),
            Self::Limit(count) => json!({ "$limit": count }),
        }
    }
}

/// Render a whole pipeline.
#[must_use]
pub fn render(stages: &[Stage]) -> Value {
    Value::Array(stages.iter().map(Stage::to_document).collect())
}

fn match_stage(filter: &Map<String, Value>) -> Option<Stage> {
    (!filter.is_empty()).then(|| Stage::Match(filter.clone()))
}

fn group_stage(keys: &[String], accumulators: &[Accumulator]) -> Stage {
    let id = keys.iter().map(|key| (undot(key), key.clone())).collect();
    let count = GroupAccumulator {
        output: COUNT_KEY.to_string(),
        operator: "$sum".to_string(),
        source: GroupSource::Const(1),
    };
    let accumulators = std::iter::once(count)
        .chain(accumulators.iter().map(|accumulator| GroupAccumulator {
            output: accumulator.output_key(),
            operator: accumulator.op.operator(),
            source: GroupSource::Path(accumulator.field.clone()),
        }))
        .collect();
    Stage::Group { id, accumulators }
}

fn project_stage(keys: &[String], accumulators: &[Accumulator]) -> Stage {
    let entries = std::iter::once((COUNT_KEY.to_string(), COUNT_KEY.to_string()))
        .chain(keys.iter().map(|key| (key.clone(), format!("_id.{}", undot(key)))))
        .chain(accumulators.iter().map(|accumulator| {
            let output = accumulator.output_key();
            (output.clone(), output)
        }))
        .collect();
    Stage::Project(entries)
}

fn sort_stage(sort: &[SortKey]) -> Stage {
    if sort.is_empty() {
        return Stage::Sort(vec![(COUNT_KEY.to_string(), SortDirection::Descending)]);
    }
    Stage::Sort(
        sort.iter()
            .map(|key| (key.field.clone(), key.direction))
            .collect(),
    )
}

fn window_stages(window: Window) -> impl Iterator<Item = Stage> {
    std::iter::once(Stage::Skip(window.start)).chain(window.take().map(Stage::Limit))
}

/// Full group pipeline: match, group, project, sort, skip, limit.
#[must_use]
pub fn build_group_pipeline(
    filter: &Map<String, Value>,
    keys: &[String],
    accumulators: &[Accumulator],
    sort: &[SortKey],
    window: Window,
) -> Vec<Stage> {
    match_stage(filter)
        .into_iter()
        .chain([
            group_stage(keys, accumulators),
            project_stage(keys, accumulators),
            sort_stage(sort),
        ])
        .chain(window_stages(window))
        .collect()
}

/// Match and group only; the caller counts the resulting groups.
#[must_use]
pub fn build_group_count_pipeline(
    filter: &Map<String, Value>,
    keys: &[String],
    accumulators: &[Accumulator],
) -> Vec<Stage> {
    match_stage(filter)
        .into_iter()
        .chain(std::iter::once(group_stage(keys, accumulators)))
        .collect()
}
