pub mod backend;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod models;
pub mod params;
pub mod plan;
pub mod schema;

pub use backend::Lowering;
pub use backend::document::{DocumentCollection, DocumentLowering, memory::MemoryCollection, resource::DocumentResource};
pub use backend::relational::{RelationalLowering, RelationalResource};
pub use config::QueryConfig;
pub use envelope::{Envelope, QueryOutput};
pub use errors::{ApiError, ErrorKind};
pub use params::RawParams;
pub use plan::{PlanBuilder, QueryPlan};
pub use schema::{FieldKind, ModelSchema};
