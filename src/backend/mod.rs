//! Storage backends.
//!
//! Both backends consume the same [`QueryPlan`]; each decides on its own
//! which plan shapes it can express.

pub mod document;
pub mod relational;

use crate::errors::ApiError;
use crate::plan::QueryPlan;

/// Lowers a backend-agnostic plan into a backend-specific query.
pub trait Lowering {
    type Query;

    /// # Errors
    ///
    /// Returns `BadRequest` for plans the backend can not express.
    fn lower(&self, plan: &QueryPlan) -> Result<Self::Query, ApiError>;
}
