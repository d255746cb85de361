//! Query plan compilation: pagination window, projection, sort and the
//! optional aggregation request.

pub mod builder;
pub mod fields;
pub mod sort;
pub mod window;

pub use builder::{
    Accumulator, AccumulatorOp, Aggregation, Mode, PlanBuilder, QueryPlan, undot,
};
pub use fields::{FieldSpec, Projection, process_fields};
pub use sort::{SortDirection, SortKey, parse_sort};
pub use window::{UNBOUNDED, Window, resolve_window};
